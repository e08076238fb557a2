/// The trading loop: poll, decide, act, sleep
///
/// One `Trader` owns one symbol's decision cycle. The loop runs as a spawned
/// task; `stop`/`emergency_stop`/`status` may be called concurrently from a
/// control path and synchronize through the shared `TradingContext`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SymbolSettings};
use crate::core::{
    LoopState, OrderIntent, OrderOutcome, RejectReason, RiskDecision, StatusReport, StopReason,
    TradeSignal, TradingContext,
};
use crate::execution::{OrderExecutor, PositionReconciler};
use crate::predictor::Predictor;
use crate::risk::RiskGate;
use crate::venue::{MarketVenue, SymbolSpec};

/// How a single iteration resolved. Everything except `SnapshotError` resets
/// the consecutive-error counter; nothing here ever kills the loop on its own.
#[derive(Debug)]
enum IterationOutcome {
    SnapshotError,
    NoSignal,
    RiskRejected(RejectReason),
    OrderFailed,
    Traded,
}

pub struct Trader {
    symbol: String,
    venue: Arc<dyn MarketVenue>,
    predictor: Arc<dyn Predictor>,
    spec: SymbolSpec,
    settings: SymbolSettings,
    ctx: Arc<TradingContext>,
    risk: Arc<RiskGate>,
    executor: Arc<OrderExecutor>,
    reconciler: Arc<PositionReconciler>,
    next_trade_id: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Trader {
    pub fn new(
        symbol: &str,
        venue: Arc<dyn MarketVenue>,
        predictor: Arc<dyn Predictor>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let settings = config.resolve(symbol);
        let spec = venue
            .symbol_spec(symbol)
            .with_context(|| format!("symbol {} unavailable", symbol))?;
        if !spec.trade_allowed {
            anyhow::bail!("trading is disabled for {}", symbol);
        }

        let ctx = Arc::new(TradingContext::new());
        let risk = Arc::new(RiskGate::new(settings.clone()));
        let executor = Arc::new(OrderExecutor::new(
            venue.clone(),
            ctx.clone(),
            config.execution.clone(),
        ));
        let reconciler = Arc::new(PositionReconciler::new(
            venue.clone(),
            risk.clone(),
            settings.clone(),
        ));

        Ok(Self {
            symbol: symbol.to_string(),
            venue,
            predictor,
            spec,
            settings,
            ctx,
            risk,
            executor,
            reconciler,
            next_trade_id: Arc::new(AtomicU64::new(1)),
            task: Mutex::new(None),
        })
    }

    /// Spawns the polling loop. Errors if a run is already active; may be
    /// called again after the previous run reached `Stopped`.
    pub fn start(&self) -> anyhow::Result<()> {
        if !self.ctx.begin_run() {
            anyhow::bail!("trading loop is already active");
        }

        info!(symbol = %self.symbol, "starting trading loop");
        let task = tokio::spawn(run_loop(
            self.symbol.clone(),
            self.venue.clone(),
            self.predictor.clone(),
            self.spec.clone(),
            self.settings.clone(),
            self.ctx.clone(),
            self.risk.clone(),
            self.executor.clone(),
            self.reconciler.clone(),
            self.next_trade_id.clone(),
        ));
        *self.task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Graceful stop: the in-flight iteration finishes, no new positions are
    /// opened, existing ones stay untouched. Returns false when no run was
    /// active.
    pub fn stop(&self) -> bool {
        if self.ctx.request_stop() {
            info!(symbol = %self.symbol, "stop requested");
            true
        } else {
            debug!("stop requested but no loop is running");
            false
        }
    }

    /// Halts new trading and closes all open exposure. With a live loop the
    /// request pre-empts the sleep phase and the loop performs the close-out;
    /// without one the sweep runs inline and its result is returned directly.
    pub fn emergency_stop(&self) -> Option<(usize, usize)> {
        if self.ctx.request_emergency() {
            warn!(symbol = %self.symbol, "emergency stop requested, loop will close all positions");
            None
        } else {
            warn!(symbol = %self.symbol, "emergency stop with no active loop, sweeping directly");
            let result = self.reconciler.close_all(Some(&self.symbol));
            self.ctx
                .set_state(LoopState::Stopped(StopReason::EmergencyStop));
            Some(result)
        }
    }

    /// Observable state snapshot, derivable at any time without pausing the
    /// loop. A dead venue degrades to an empty position list.
    pub fn status(&self) -> StatusReport {
        let open_positions = match self.venue.list_positions(Some(&self.symbol)) {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "position list unavailable for status");
                Vec::new()
            }
        };
        StatusReport {
            loop_state: self.ctx.state(),
            current_symbol: Some(self.symbol.clone()),
            open_positions_count: open_positions.len(),
            open_positions,
            daily_loss: self.risk.daily_loss(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.ctx.state()
    }

    /// Waits for the loop task to finish.
    pub async fn join(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "trading loop task failed");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    symbol: String,
    venue: Arc<dyn MarketVenue>,
    predictor: Arc<dyn Predictor>,
    spec: SymbolSpec,
    settings: SymbolSettings,
    ctx: Arc<TradingContext>,
    risk: Arc<RiskGate>,
    executor: Arc<OrderExecutor>,
    reconciler: Arc<PositionReconciler>,
    next_trade_id: Arc<AtomicU64>,
) {
    info!(
        symbol = %symbol,
        interval_secs = settings.poll_interval_secs,
        "trading loop running"
    );
    let mut consecutive_errors = 0u32;

    loop {
        match ctx.state() {
            LoopState::Running => {}
            LoopState::StopRequested => {
                info!(symbol = %symbol, "stopping on operator request");
                ctx.set_state(LoopState::Stopped(StopReason::OperatorStop));
                break;
            }
            // EmergencyStopping routes to the close-out below; anything else
            // means the run is over.
            _ => break,
        }

        let outcome = run_iteration(
            &symbol,
            &venue,
            &predictor,
            &spec,
            &settings,
            &risk,
            &executor,
            &next_trade_id,
        )
        .await;

        match outcome {
            IterationOutcome::SnapshotError => {
                consecutive_errors += 1;
                warn!(
                    consecutive_errors,
                    ceiling = settings.max_consecutive_errors,
                    "snapshot unavailable or invalid"
                );
                if consecutive_errors >= settings.max_consecutive_errors {
                    if ctx.state() != LoopState::EmergencyStopping {
                        error!(
                            symbol = %symbol,
                            "max consecutive snapshot errors reached, stopping loop"
                        );
                        ctx.set_state(LoopState::Stopped(StopReason::MaxSnapshotErrors));
                    }
                    break;
                }
            }
            outcome => {
                consecutive_errors = 0;
                debug!(?outcome, "iteration finished");
            }
        }

        ctx.wait_cancellable(Duration::from_secs(settings.poll_interval_secs))
            .await;
    }

    if ctx.state() == LoopState::EmergencyStopping {
        warn!(symbol = %symbol, "emergency stop: closing all open positions");
        let (closed, total) = reconciler.close_all(Some(&symbol));
        warn!(closed, total, "emergency close-out finished");
        ctx.set_state(LoopState::Stopped(StopReason::EmergencyStop));
    }

    info!(symbol = %symbol, state = %ctx.state(), "trading loop exited");
}

/// One pass of the pipeline: snapshot -> signal -> risk gate -> submission.
/// Each stage's output is the next stage's input; nothing is refreshed
/// mid-pipeline (the executor refreshes prices itself, per retry).
#[allow(clippy::too_many_arguments)]
async fn run_iteration(
    symbol: &str,
    venue: &Arc<dyn MarketVenue>,
    predictor: &Arc<dyn Predictor>,
    spec: &SymbolSpec,
    settings: &SymbolSettings,
    risk: &Arc<RiskGate>,
    executor: &Arc<OrderExecutor>,
    next_trade_id: &Arc<AtomicU64>,
) -> IterationOutcome {
    let snapshot = match venue.get_snapshot(symbol, settings.bars_count) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(symbol, error = %e, "snapshot fetch failed");
            return IterationOutcome::SnapshotError;
        }
    };
    if !snapshot.is_valid() {
        warn!(
            symbol,
            bid = snapshot.bid,
            ask = snapshot.ask,
            "invalid snapshot, skipping iteration"
        );
        return IterationOutcome::SnapshotError;
    }

    // A predictor without an opinion is a quiet cycle, not an error.
    let prediction = match predictor.predict(&snapshot) {
        Some(prediction) => prediction,
        None => {
            debug!(symbol, "predictor has no opinion");
            return IterationOutcome::NoSignal;
        }
    };
    let signal = TradeSignal::new(prediction.direction, prediction.confidence);
    info!(
        symbol,
        direction = %signal.direction,
        confidence = signal.confidence,
        "signal derived"
    );

    match risk.check_and_size(spec, &snapshot, &signal) {
        RiskDecision::Rejected(reason) => {
            info!(symbol, %reason, "risk gate rejected trade");
            IterationOutcome::RiskRejected(reason)
        }
        RiskDecision::Approved {
            volume,
            stop_loss,
            take_profit,
        } => {
            let intent = OrderIntent {
                symbol: symbol.to_string(),
                direction: signal.direction,
                volume,
                price: signal.direction.entry_price(&snapshot),
                stop_loss: Some(stop_loss),
                take_profit: Some(take_profit),
                deviation_points: settings.deviation_points,
                fill_policy: settings.fill_policy,
                magic: settings.magic_number,
                trade_id: next_trade_id.fetch_add(1, Ordering::Relaxed),
                attempt: 1,
                position: None,
            };

            match executor.submit(intent).await {
                OrderOutcome::Filled {
                    order_id,
                    fill_price,
                    volume,
                } => {
                    info!(symbol, order_id, fill_price, volume, "trade opened");
                    IterationOutcome::Traded
                }
                OrderOutcome::Failed { code, class } => {
                    warn!(symbol, code = %code, class = %class, "trade attempt abandoned");
                    IterationOutcome::OrderFailed
                }
            }
        }
    }
}
