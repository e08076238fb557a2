/// Error types crossing the venue seam

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("venue unavailable: {0}")]
    Unavailable(String),

    #[error("symbol {0} not known to the venue")]
    SymbolNotFound(String),

    #[error("position {0} not found")]
    PositionNotFound(u64),

    #[error("quote for {0} is stale or missing")]
    NoQuote(String),
}
