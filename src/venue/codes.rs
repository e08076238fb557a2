/// Venue result codes and their retry classification
///
/// The numeric values follow the MT5-family retcode table the gateway speaks.
/// Classification is a pure function so the retry protocol can be tested
/// without a venue.

use crate::core::FailureClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueCode {
    /// Request completed.
    Done,
    /// Quote moved since the request was formed; venue offers a requote.
    Requote,
    /// Request canceled by timeout.
    Timeout,
    /// No connection to the trade server.
    ConnectionLost,
    /// Prices changed while the request was in flight.
    PriceChanged,
    /// Venue is throttling; too many requests.
    TooManyRequests,
    /// No quotes to process the request.
    PriceOff,
    /// Invalid request price.
    InvalidPrice,
    /// Invalid stop or target levels (inside the minimum-stops distance).
    InvalidStops,
    /// Trading disabled on the account or instrument.
    TradeDisabled,
    /// Market closed.
    MarketClosed,
    /// Insufficient funds.
    InsufficientFunds,
    /// Invalid volume.
    InvalidVolume,
    /// Autotrading disabled terminal-side.
    AutotradingDisabled,
    /// Anything the taxonomy does not recognize.
    Other(u32),
}

impl VenueCode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            10009 => VenueCode::Done,
            10004 => VenueCode::Requote,
            10012 => VenueCode::Timeout,
            10031 => VenueCode::ConnectionLost,
            10020 => VenueCode::PriceChanged,
            10024 => VenueCode::TooManyRequests,
            10021 => VenueCode::PriceOff,
            10015 => VenueCode::InvalidPrice,
            10016 => VenueCode::InvalidStops,
            10017 => VenueCode::TradeDisabled,
            10018 => VenueCode::MarketClosed,
            10019 => VenueCode::InsufficientFunds,
            10014 => VenueCode::InvalidVolume,
            10027 => VenueCode::AutotradingDisabled,
            other => VenueCode::Other(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            VenueCode::Done => 10009,
            VenueCode::Requote => 10004,
            VenueCode::Timeout => 10012,
            VenueCode::ConnectionLost => 10031,
            VenueCode::PriceChanged => 10020,
            VenueCode::TooManyRequests => 10024,
            VenueCode::PriceOff => 10021,
            VenueCode::InvalidPrice => 10015,
            VenueCode::InvalidStops => 10016,
            VenueCode::TradeDisabled => 10017,
            VenueCode::MarketClosed => 10018,
            VenueCode::InsufficientFunds => 10019,
            VenueCode::InvalidVolume => 10014,
            VenueCode::AutotradingDisabled => 10027,
            VenueCode::Other(raw) => *raw,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, VenueCode::Done)
    }

    /// Maps a failed result onto the retry protocol. `Done` has no
    /// classification.
    pub fn classify(&self) -> Option<FailureClass> {
        match self {
            VenueCode::Done => None,

            VenueCode::Requote
            | VenueCode::Timeout
            | VenueCode::ConnectionLost
            | VenueCode::PriceChanged
            | VenueCode::TooManyRequests
            | VenueCode::PriceOff => Some(FailureClass::Retryable),

            VenueCode::InvalidPrice | VenueCode::InvalidStops => {
                Some(FailureClass::RequiresReprice)
            }

            VenueCode::TradeDisabled
            | VenueCode::MarketClosed
            | VenueCode::InsufficientFunds
            | VenueCode::InvalidVolume
            | VenueCode::AutotradingDisabled
            | VenueCode::Other(_) => Some(FailureClass::NonRetryable),
        }
    }
}

impl std::fmt::Display for VenueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VenueCode::Done => "done",
            VenueCode::Requote => "requote",
            VenueCode::Timeout => "timeout",
            VenueCode::ConnectionLost => "connection lost",
            VenueCode::PriceChanged => "price changed",
            VenueCode::TooManyRequests => "too many requests",
            VenueCode::PriceOff => "no quotes",
            VenueCode::InvalidPrice => "invalid price",
            VenueCode::InvalidStops => "invalid stops",
            VenueCode::TradeDisabled => "trade disabled",
            VenueCode::MarketClosed => "market closed",
            VenueCode::InsufficientFunds => "insufficient funds",
            VenueCode::InvalidVolume => "invalid volume",
            VenueCode::AutotradingDisabled => "autotrading disabled",
            VenueCode::Other(_) => "unrecognized",
        };
        write!(f, "{} ({})", name, self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        for raw in [10009, 10004, 10016, 10018, 10024, 99999] {
            assert_eq!(VenueCode::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn classification_table() {
        assert_eq!(VenueCode::Done.classify(), None);
        assert_eq!(
            VenueCode::Requote.classify(),
            Some(FailureClass::Retryable)
        );
        assert_eq!(
            VenueCode::ConnectionLost.classify(),
            Some(FailureClass::Retryable)
        );
        assert_eq!(
            VenueCode::InvalidStops.classify(),
            Some(FailureClass::RequiresReprice)
        );
        assert_eq!(
            VenueCode::InvalidPrice.classify(),
            Some(FailureClass::RequiresReprice)
        );
        assert_eq!(
            VenueCode::MarketClosed.classify(),
            Some(FailureClass::NonRetryable)
        );
        assert_eq!(
            VenueCode::Other(31337).classify(),
            Some(FailureClass::NonRetryable)
        );
    }
}
