/// Shared value types for the decision-and-execution loop

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::venue::VenueCode;

/// One OHLCV bar as reported by the venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Immutable market view captured once per loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub bars: Vec<Bar>,
    pub captured_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// A live market always quotes bid strictly below ask; anything else
    /// (crossed book, zero prices from a halted feed) short-circuits the
    /// iteration.
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid < self.ask
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side the venue fills an opening order at: ask for longs, bid for shorts.
    pub fn entry_price(&self, snapshot: &MarketSnapshot) -> f64 {
        match self {
            Direction::Long => snapshot.ask,
            Direction::Short => snapshot.bid,
        }
    }

    /// Opposing quote used to flatten the position.
    pub fn closing_price(&self, snapshot: &MarketSnapshot) -> f64 {
        match self {
            Direction::Long => snapshot.bid,
            Direction::Short => snapshot.ask,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional signal derived from the predictor for a single iteration.
/// Never persisted; discarded once the iteration's decision is made.
#[derive(Debug, Clone)]
pub struct TradeSignal {
    pub direction: Direction,
    pub confidence: f64,
    pub derived_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn new(direction: Direction, confidence: f64) -> Self {
        Self {
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            derived_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DailyLossCeiling,
    LowConfidence,
    SpreadTooWide,
    VolumeTooSmall,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::DailyLossCeiling => write!(f, "daily loss ceiling reached"),
            RejectReason::LowConfidence => write!(f, "confidence below threshold"),
            RejectReason::SpreadTooWide => write!(f, "spread exceeds maximum"),
            RejectReason::VolumeTooSmall => write!(f, "computed volume too small"),
        }
    }
}

/// Output of the risk gate: either a rejection or a fully sized trade with
/// protective levels already computed against the live snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Rejected(RejectReason),
    Approved {
        volume: f64,
        stop_loss: f64,
        take_profit: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    #[default]
    Ioc,
    Fok,
}

/// A single order submission. Never mutated after creation; each retry builds
/// a fresh intent differing only by price (and stops, on reprice) and attempt
/// counter.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub deviation_points: u32,
    pub fill_policy: FillPolicy,
    pub magic: u32,
    /// Logical trade id; together with `attempt` this tags every submission.
    pub trade_id: u64,
    pub attempt: u32,
    /// Set when this order closes an existing position by ticket.
    pub position: Option<u64>,
}

impl OrderIntent {
    /// Same trade with the entry price refreshed from a newer snapshot.
    pub fn refreshed(&self, snapshot: &MarketSnapshot) -> Self {
        Self {
            price: self.direction.entry_price(snapshot),
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Refreshed price plus stop/target levels shifted to keep their original
    /// distance from the new entry. Used when the venue rejected the previous
    /// levels outright.
    pub fn repriced(&self, snapshot: &MarketSnapshot) -> Self {
        let price = self.direction.entry_price(snapshot);
        Self {
            stop_loss: self.stop_loss.map(|sl| price - (self.price - sl)),
            take_profit: self.take_profit.map(|tp| price + (tp - self.price)),
            price,
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// How a venue result code maps onto the retry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    RequiresReprice,
    NonRetryable,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Retryable => write!(f, "retryable"),
            FailureClass::RequiresReprice => write!(f, "requires-reprice"),
            FailureClass::NonRetryable => write!(f, "non-retryable"),
        }
    }
}

/// Terminal result of one `OrderExecutor::submit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled {
        order_id: u64,
        fill_price: f64,
        volume: f64,
    },
    Failed {
        code: VenueCode,
        class: FailureClass,
    },
}

/// Venue-owned position mirrored read-only by the reconciler. The core never
/// invents or deletes one of these, it only requests closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub open_price: f64,
    pub current_price: f64,
    pub profit: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    OperatorStop,
    EmergencyStop,
    MaxSnapshotErrors,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::OperatorStop => write!(f, "operator stop"),
            StopReason::EmergencyStop => write!(f, "emergency stop"),
            StopReason::MaxSnapshotErrors => write!(f, "max consecutive snapshot errors"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Idle,
    Running,
    StopRequested,
    EmergencyStopping,
    Stopped(StopReason),
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Running => write!(f, "running"),
            LoopState::StopRequested => write!(f, "stop requested"),
            LoopState::EmergencyStopping => write!(f, "emergency stopping"),
            LoopState::Stopped(reason) => write!(f, "stopped ({})", reason),
        }
    }
}

/// Externally observable state snapshot; derivable at any time without
/// pausing the loop.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub loop_state: LoopState,
    pub current_symbol: Option<String>,
    pub open_positions_count: usize,
    pub open_positions: Vec<PositionRecord>,
    pub daily_loss: f64,
}

/// Mutex-guarded lifecycle state shared between the polling task and the
/// control path. The only process-wide mutable state in the core besides the
/// risk gate's daily-loss accumulator.
pub struct TradingContext {
    state: Mutex<LoopState>,
}

impl TradingContext {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState::Idle),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap() = state;
    }

    /// Idle/Stopped -> Running. Returns false when a run is already active.
    pub fn begin_run(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            LoopState::Idle | LoopState::Stopped(_) => {
                *state = LoopState::Running;
                true
            }
            _ => false,
        }
    }

    /// Graceful stop: Running -> StopRequested. The in-flight iteration is
    /// allowed to finish; no new positions are opened, none are closed.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            LoopState::Running => {
                *state = LoopState::StopRequested;
                true
            }
            _ => false,
        }
    }

    /// Running/StopRequested -> EmergencyStopping. Pre-empts the sleep phase;
    /// the loop routes to close-all at its next decision point.
    pub fn request_emergency(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            LoopState::Running | LoopState::StopRequested => {
                *state = LoopState::EmergencyStopping;
                true
            }
            _ => false,
        }
    }

    /// True once any form of stop has been requested or reached.
    pub fn stop_requested(&self) -> bool {
        matches!(
            self.state(),
            LoopState::StopRequested | LoopState::EmergencyStopping | LoopState::Stopped(_)
        )
    }

    /// Sleeps for `duration` in ticks of at most one second, bailing out as
    /// soon as a stop is requested. Returns true when the full duration
    /// elapsed, false when interrupted.
    pub async fn wait_cancellable(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.stop_requested() {
                return false;
            }
            let step = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        !self.stop_requested()
    }
}

impl Default for TradingContext {
    fn default() -> Self {
        Self::new()
    }
}
