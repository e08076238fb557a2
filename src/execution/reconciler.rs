/// Read-only mirror of venue-held positions, plus bulk close-out

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SymbolSettings;
use crate::core::{OrderIntent, PositionRecord, VenueError};
use crate::risk::RiskGate;
use crate::venue::MarketVenue;

pub struct PositionReconciler {
    venue: Arc<dyn MarketVenue>,
    risk: Arc<RiskGate>,
    settings: SymbolSettings,
}

impl PositionReconciler {
    pub fn new(venue: Arc<dyn MarketVenue>, risk: Arc<RiskGate>, settings: SymbolSettings) -> Self {
        Self {
            venue,
            risk,
            settings,
        }
    }

    /// Pass-through query. Positions change between calls and close-out
    /// decisions cannot tolerate staleness, so nothing is cached.
    pub fn list_open(&self, symbol: Option<&str>) -> Result<Vec<PositionRecord>, VenueError> {
        self.venue.list_positions(symbol)
    }

    /// Best-effort sweep closing every open position at the opposing quote.
    /// Individual failures are logged and counted but never abort the rest of
    /// the sweep; for an emergency stop, maximizing closed exposure matters
    /// more than all-or-nothing semantics. Returns (closed, total).
    pub fn close_all(&self, symbol: Option<&str>) -> (usize, usize) {
        let positions = match self.venue.list_positions(symbol) {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "cannot list positions for close-out");
                return (0, 0);
            }
        };

        let total = positions.len();
        let mut closed = 0;

        for position in &positions {
            let snapshot = match self.venue.get_snapshot(&position.symbol, 1) {
                Ok(snapshot) if snapshot.is_valid() => snapshot,
                Ok(_) => {
                    warn!(ticket = position.ticket, "invalid quote, skipping close");
                    continue;
                }
                Err(e) => {
                    warn!(ticket = position.ticket, error = %e, "no quote, skipping close");
                    continue;
                }
            };

            let intent = OrderIntent {
                symbol: position.symbol.clone(),
                direction: position.direction.opposite(),
                volume: position.volume,
                price: position.direction.closing_price(&snapshot),
                stop_loss: None,
                take_profit: None,
                deviation_points: self.settings.deviation_points,
                fill_policy: self.settings.fill_policy,
                magic: self.settings.magic_number,
                trade_id: position.ticket,
                attempt: 1,
                position: Some(position.ticket),
            };

            match self.venue.submit_order(&intent) {
                Ok(reply) if reply.code.is_done() => {
                    closed += 1;
                    self.risk.record_realized_pnl(position.profit);
                    info!(
                        ticket = position.ticket,
                        symbol = %position.symbol,
                        profit = position.profit,
                        "position closed"
                    );
                }
                Ok(reply) => {
                    warn!(
                        ticket = position.ticket,
                        code = %reply.code,
                        "venue refused to close position"
                    );
                }
                Err(e) => {
                    warn!(ticket = position.ticket, error = %e, "close order failed");
                }
            }
        }

        info!(closed, total, "close-out sweep finished");
        (closed, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::Direction;
    use crate::venue::{SimVenue, VenueCode};

    fn reconciler(venue: &Arc<SimVenue>) -> (PositionReconciler, Arc<RiskGate>) {
        let settings = Config::default().resolve("EURUSD");
        let risk = Arc::new(RiskGate::new(settings.clone()));
        (
            PositionReconciler::new(venue.clone() as Arc<dyn MarketVenue>, risk.clone(), settings),
            risk,
        )
    }

    #[test]
    fn close_all_reports_partial_success() {
        let venue = Arc::new(SimVenue::new());
        venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10000);
        venue.seed_position("EURUSD", Direction::Short, 0.02, 1.10050);
        venue.seed_position("EURUSD", Direction::Long, 0.01, 1.09900);

        // Second close is refused venue-side; the sweep must continue.
        venue.script_reply(VenueCode::Done);
        venue.script_reply(VenueCode::MarketClosed);
        venue.script_reply(VenueCode::Done);

        let (reconciler, _risk) = reconciler(&venue);
        assert_eq!(reconciler.close_all(Some("EURUSD")), (2, 3));
        assert_eq!(venue.open_position_count(), 1);
    }

    #[test]
    fn realized_losses_feed_the_risk_gate() {
        let venue = Arc::new(SimVenue::new());
        venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10100);
        // Quote below the open price: the long closes at a loss.
        venue.set_quote("EURUSD", 1.10000, 1.10012);

        let (reconciler, risk) = reconciler(&venue);
        assert_eq!(reconciler.close_all(None), (1, 1));
        // 100 points against 0.01 lots of a 100k contract.
        assert!((risk.daily_loss() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn list_open_is_a_passthrough() {
        let venue = Arc::new(SimVenue::new());
        let (reconciler, _risk) = reconciler(&venue);
        assert!(reconciler.list_open(None).unwrap().is_empty());

        venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10000);
        assert_eq!(reconciler.list_open(Some("EURUSD")).unwrap().len(), 1);
    }
}
