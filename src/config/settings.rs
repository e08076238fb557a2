/// Robot configuration structures
///
/// Loaded from TOML; every field has a default so a partial (or missing)
/// file still yields a working configuration. Per-symbol overrides are merged
/// over the trading/risk sections by `resolve`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::FillPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: Trading,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default)]
    pub execution: Execution,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub symbols: HashMap<String, SymbolOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Trading {
    pub symbol: String,
    pub lot_size: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub max_spread: f64,
    pub poll_interval_secs: u64,
    pub max_consecutive_errors: u32,
    pub deviation_points: u32,
    pub fill_policy: FillPolicy,
    pub magic_number: u32,
}

impl Default for Trading {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            lot_size: 0.01,
            min_lot: 0.01,
            max_lot: 1.0,
            max_spread: 0.00020,
            poll_interval_secs: 60,
            max_consecutive_errors: 5,
            deviation_points: 20,
            fill_policy: FillPolicy::Ioc,
            magic_number: 234000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Risk {
    /// Absolute currency amount of realized losses allowed per day.
    pub daily_loss_limit: f64,
    pub min_confidence: f64,
    pub stop_loss_distance: f64,
    pub take_profit_distance: f64,
}

impl Default for Risk {
    fn default() -> Self {
        Self {
            daily_loss_limit: 50.0,
            min_confidence: 0.7,
            stop_loss_distance: 0.0050,
            take_profit_distance: 0.0080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Execution {
    pub max_retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_backoff_ms: 1000,
            settle_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Data {
    pub bars_count: usize,
}

impl Default for Data {
    fn default() -> Self {
        Self { bars_count: 50 }
    }
}

/// Optional per-symbol deviations from the global trading/risk sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolOverride {
    pub lot_size: Option<f64>,
    pub max_spread: Option<f64>,
    pub min_confidence: Option<f64>,
    pub stop_loss_distance: Option<f64>,
    pub take_profit_distance: Option<f64>,
}

/// Flattened, per-symbol view the trading components consume.
#[derive(Debug, Clone)]
pub struct SymbolSettings {
    pub symbol: String,
    pub lot_size: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub max_spread: f64,
    pub daily_loss_limit: f64,
    pub min_confidence: f64,
    pub stop_loss_distance: f64,
    pub take_profit_distance: f64,
    pub poll_interval_secs: u64,
    pub max_consecutive_errors: u32,
    pub deviation_points: u32,
    pub fill_policy: FillPolicy,
    pub magic_number: u32,
    pub bars_count: usize,
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Global settings with any `[symbols.<SYM>]` overrides applied.
    pub fn resolve(&self, symbol: &str) -> SymbolSettings {
        let overrides = self.symbols.get(symbol).cloned().unwrap_or_default();
        SymbolSettings {
            symbol: symbol.to_string(),
            lot_size: overrides.lot_size.unwrap_or(self.trading.lot_size),
            min_lot: self.trading.min_lot,
            max_lot: self.trading.max_lot,
            max_spread: overrides.max_spread.unwrap_or(self.trading.max_spread),
            daily_loss_limit: self.risk.daily_loss_limit,
            min_confidence: overrides.min_confidence.unwrap_or(self.risk.min_confidence),
            stop_loss_distance: overrides
                .stop_loss_distance
                .unwrap_or(self.risk.stop_loss_distance),
            take_profit_distance: overrides
                .take_profit_distance
                .unwrap_or(self.risk.take_profit_distance),
            poll_interval_secs: self.trading.poll_interval_secs,
            max_consecutive_errors: self.trading.max_consecutive_errors,
            deviation_points: self.trading.deviation_points,
            fill_policy: self.trading.fill_policy,
            magic_number: self.trading.magic_number,
            bars_count: self.data.bars_count,
        }
    }
}
