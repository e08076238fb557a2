/// Market venue seam: the contract the trading core consumes

pub mod codes;
pub mod sim;

pub use codes::VenueCode;
pub use sim::SimVenue;

use crate::core::{MarketSnapshot, OrderIntent, PositionRecord, VenueError};

/// Instrument metadata needed for sizing and stop placement.
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    pub name: String,
    /// Smallest price increment.
    pub point: f64,
    /// Venue-imposed minimum stop distance, in points.
    pub min_stop_points: u32,
    pub digits: u32,
    pub trade_allowed: bool,
}

impl SymbolSpec {
    /// Minimum stop distance expressed in price units.
    pub fn min_stop_distance(&self) -> f64 {
        self.min_stop_points as f64 * self.point
    }
}

/// Raw result of an order submission, before classification.
#[derive(Debug, Clone, Copy)]
pub struct VenueReply {
    pub code: VenueCode,
    pub order_id: u64,
    pub fill_price: f64,
    pub volume: f64,
}

/// Brokerage terminal contract. Calls are synchronous and assumed short; the
/// loop never overlaps two of them. Connectivity, reconnection and transport
/// live behind implementations of this trait.
pub trait MarketVenue: Send + Sync {
    fn get_snapshot(&self, symbol: &str, bars: usize) -> Result<MarketSnapshot, VenueError>;

    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, VenueError>;

    /// Submits an order and returns the venue's raw verdict. A reply with a
    /// non-done code is not an `Err`; errors are reserved for transport-level
    /// failures.
    fn submit_order(&self, intent: &OrderIntent) -> Result<VenueReply, VenueError>;

    fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<bool, VenueError>;

    fn list_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionRecord>, VenueError>;
}
