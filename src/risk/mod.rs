/// Risk gate: the single authority on whether, and how large, a trade may be

use std::sync::Mutex;

use tracing::{debug, info};

use crate::config::SymbolSettings;
use crate::core::{MarketSnapshot, RejectReason, RiskDecision, TradeSignal};
use crate::venue::SymbolSpec;

pub struct RiskGate {
    settings: SymbolSettings,
    /// Realized losses for the current day. Approvals never touch it; only
    /// closed-trade P&L does.
    daily_loss: Mutex<f64>,
}

impl RiskGate {
    pub fn new(settings: SymbolSettings) -> Self {
        Self {
            settings,
            daily_loss: Mutex::new(0.0),
        }
    }

    /// Decides whether a candidate trade may proceed, and sizes it. Checks in
    /// order: daily-loss ceiling, confidence threshold, spread cap, then
    /// volume and protective levels.
    pub fn check_and_size(
        &self,
        spec: &SymbolSpec,
        snapshot: &MarketSnapshot,
        signal: &TradeSignal,
    ) -> RiskDecision {
        let daily_loss = *self.daily_loss.lock().unwrap();
        if daily_loss >= self.settings.daily_loss_limit {
            info!(
                daily_loss,
                limit = self.settings.daily_loss_limit,
                "daily loss ceiling reached, trading suspended"
            );
            return RiskDecision::Rejected(RejectReason::DailyLossCeiling);
        }

        if signal.confidence < self.settings.min_confidence {
            debug!(
                confidence = signal.confidence,
                threshold = self.settings.min_confidence,
                "signal below confidence threshold"
            );
            return RiskDecision::Rejected(RejectReason::LowConfidence);
        }

        if snapshot.spread() > self.settings.max_spread {
            info!(
                spread = snapshot.spread(),
                max_spread = self.settings.max_spread,
                "spread too wide"
            );
            return RiskDecision::Rejected(RejectReason::SpreadTooWide);
        }

        let volume = self
            .settings
            .lot_size
            .clamp(self.settings.min_lot, self.settings.max_lot);
        if volume <= 0.0 {
            return RiskDecision::Rejected(RejectReason::VolumeTooSmall);
        }

        let entry = signal.direction.entry_price(snapshot);
        let (stop_distance, target_distance) = self.protective_distances(spec);
        let (stop_loss, take_profit) = match signal.direction {
            crate::core::Direction::Long => (entry - stop_distance, entry + target_distance),
            crate::core::Direction::Short => (entry + stop_distance, entry - target_distance),
        };

        RiskDecision::Approved {
            volume,
            stop_loss,
            take_profit,
        }
    }

    /// Configured distances widened to at least twice the instrument's
    /// minimum-stops level. Venues reject protective levels inside that band
    /// (invalid stops), so this is correctness, not tuning.
    fn protective_distances(&self, spec: &SymbolSpec) -> (f64, f64) {
        let floor = 2.0 * spec.min_stop_distance();
        (
            self.settings.stop_loss_distance.max(floor),
            self.settings.take_profit_distance.max(floor),
        )
    }

    /// Feeds realized P&L from a closed trade into the daily accumulator.
    /// Losses accumulate; profits do not pay the budget back.
    pub fn record_realized_pnl(&self, pnl: f64) {
        let mut daily_loss = self.daily_loss.lock().unwrap();
        *daily_loss += (-pnl).max(0.0);
        debug!(pnl, daily_loss = *daily_loss, "realized pnl recorded");
    }

    pub fn daily_loss(&self) -> f64 {
        *self.daily_loss.lock().unwrap()
    }

    /// Start-of-day reset.
    pub fn reset_daily(&self) {
        *self.daily_loss.lock().unwrap() = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::Direction;
    use chrono::Utc;

    fn settings() -> SymbolSettings {
        Config::default().resolve("EURUSD")
    }

    fn spec(min_stop_points: u32) -> SymbolSpec {
        SymbolSpec {
            name: "EURUSD".to_string(),
            point: 0.00001,
            min_stop_points,
            digits: 5,
            trade_allowed: true,
        }
    }

    fn snapshot(bid: f64, ask: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "EURUSD".to_string(),
            bid,
            ask,
            bars: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn low_confidence_is_rejected() {
        let gate = RiskGate::new(settings());
        let signal = TradeSignal::new(Direction::Long, 0.55);
        let decision = gate.check_and_size(&spec(10), &snapshot(1.10000, 1.10012), &signal);
        assert_eq!(decision, RiskDecision::Rejected(RejectReason::LowConfidence));
    }

    #[test]
    fn wide_spread_is_rejected() {
        let mut settings = settings();
        settings.max_spread = 0.00015;
        let gate = RiskGate::new(settings);
        let signal = TradeSignal::new(Direction::Long, 0.9);
        // Spread 0.00020 against a 0.00015 cap.
        let decision = gate.check_and_size(&spec(10), &snapshot(1.10000, 1.10020), &signal);
        assert_eq!(decision, RiskDecision::Rejected(RejectReason::SpreadTooWide));
    }

    #[test]
    fn daily_loss_at_ceiling_suspends_trading() {
        let gate = RiskGate::new(settings());
        let signal = TradeSignal::new(Direction::Long, 0.9);
        let snap = snapshot(1.10000, 1.10012);

        gate.record_realized_pnl(-49.99);
        assert!(matches!(
            gate.check_and_size(&spec(10), &snap, &signal),
            RiskDecision::Approved { .. }
        ));

        gate.record_realized_pnl(-0.01);
        assert_eq!(
            gate.check_and_size(&spec(10), &snap, &signal),
            RiskDecision::Rejected(RejectReason::DailyLossCeiling)
        );
    }

    #[test]
    fn profits_do_not_pay_back_the_loss_budget() {
        let gate = RiskGate::new(settings());
        gate.record_realized_pnl(-10.0);
        gate.record_realized_pnl(25.0);
        assert_eq!(gate.daily_loss(), 10.0);

        gate.reset_daily();
        assert_eq!(gate.daily_loss(), 0.0);
    }

    #[test]
    fn approved_long_uses_entry_side_and_configured_distances() {
        let gate = RiskGate::new(settings());
        let signal = TradeSignal::new(Direction::Long, 0.82);
        let snap = snapshot(1.10000, 1.10012);

        match gate.check_and_size(&spec(10), &snap, &signal) {
            RiskDecision::Approved {
                volume,
                stop_loss,
                take_profit,
            } => {
                assert_eq!(volume, 0.01);
                // 10-point minimum: 2x floor (0.00020) is below the
                // configured 0.0050/0.0080, so distances are untouched.
                assert!((stop_loss - (1.10012 - 0.0050)).abs() < 1e-9);
                assert!((take_profit - (1.10012 + 0.0080)).abs() < 1e-9);
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn short_levels_are_mirrored() {
        let gate = RiskGate::new(settings());
        let signal = TradeSignal::new(Direction::Short, 0.82);
        let snap = snapshot(1.10000, 1.10012);

        match gate.check_and_size(&spec(10), &snap, &signal) {
            RiskDecision::Approved {
                stop_loss,
                take_profit,
                ..
            } => {
                assert!((stop_loss - (1.10000 + 0.0050)).abs() < 1e-9);
                assert!((take_profit - (1.10000 - 0.0080)).abs() < 1e-9);
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn stops_are_widened_to_twice_the_minimum_distance() {
        let gate = RiskGate::new(settings());
        let signal = TradeSignal::new(Direction::Long, 0.9);
        let snap = snapshot(1.10000, 1.10012);

        // 400-point minimum: 0.00400 in price, 2x floor 0.00800 beats both
        // configured distances.
        let wide_spec = spec(400);
        match gate.check_and_size(&wide_spec, &snap, &signal) {
            RiskDecision::Approved {
                stop_loss,
                take_profit,
                ..
            } => {
                let floor = 2.0 * wide_spec.min_stop_distance();
                assert!(1.10012 - stop_loss >= floor - 1e-9);
                assert!(take_profit - 1.10012 >= floor - 1e-9);
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn lot_is_clamped_to_bounds() {
        let mut settings = settings();
        settings.lot_size = 5.0;
        let gate = RiskGate::new(settings);
        let signal = TradeSignal::new(Direction::Long, 0.9);

        match gate.check_and_size(&spec(10), &snapshot(1.10000, 1.10012), &signal) {
            RiskDecision::Approved { volume, .. } => assert_eq!(volume, 1.0),
            other => panic!("expected approval, got {:?}", other),
        }
    }
}
