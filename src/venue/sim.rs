/// Scripted in-memory venue
///
/// Backs `--paper` runs and the test suite. Keeps a real position book and
/// deliberately mimics the awkward parts of the live terminal: market orders
/// fill without honoring requested stop/target fields, so protective levels
/// must be attached with a separate modify call.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;

use crate::core::{Bar, Direction, MarketSnapshot, OrderIntent, PositionRecord, VenueError};

use super::{MarketVenue, SymbolSpec, VenueCode, VenueReply};

/// Standard forex lot size, used to turn price distances into currency P&L.
const CONTRACT_SIZE: f64 = 100_000.0;

struct SimInner {
    specs: HashMap<String, SymbolSpec>,
    quotes: HashMap<String, (f64, f64)>,
    scripted_quotes: HashMap<String, VecDeque<(f64, f64)>>,
    replies: VecDeque<VenueCode>,
    modify_replies: VecDeque<bool>,
    snapshot_failures: u32,
    misreport_order_ids: bool,
    positions: BTreeMap<u64, PositionRecord>,
    next_ticket: u64,
    tick: u64,
    submit_calls: u64,
}

pub struct SimVenue {
    inner: Mutex<SimInner>,
}

impl SimVenue {
    /// A venue quoting EURUSD at 1.10000/1.10012 with a 10-point minimum
    /// stops level.
    pub fn new() -> Self {
        let venue = Self {
            inner: Mutex::new(SimInner {
                specs: HashMap::new(),
                quotes: HashMap::new(),
                scripted_quotes: HashMap::new(),
                replies: VecDeque::new(),
                modify_replies: VecDeque::new(),
                snapshot_failures: 0,
                misreport_order_ids: false,
                positions: BTreeMap::new(),
                next_ticket: 1,
                tick: 0,
                submit_calls: 0,
            }),
        };
        venue.add_symbol(
            SymbolSpec {
                name: "EURUSD".to_string(),
                point: 0.00001,
                min_stop_points: 10,
                digits: 5,
                trade_allowed: true,
            },
            1.10000,
            1.10012,
        );
        venue
    }

    pub fn add_symbol(&self, spec: SymbolSpec, bid: f64, ask: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.quotes.insert(spec.name.clone(), (bid, ask));
        inner.specs.insert(spec.name.clone(), spec);
    }

    pub fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.quotes.insert(symbol.to_string(), (bid, ask));
    }

    /// Queues a quote consumed by exactly one snapshot; afterwards the venue
    /// keeps quoting it until the next scripted quote or `set_quote`.
    pub fn push_quote(&self, symbol: &str, bid: f64, ask: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripted_quotes
            .entry(symbol.to_string())
            .or_default()
            .push_back((bid, ask));
    }

    /// Queues the verdict for the next order submission. With nothing queued
    /// every submission succeeds.
    pub fn script_reply(&self, code: VenueCode) {
        self.inner.lock().unwrap().replies.push_back(code);
    }

    /// The next `n` snapshot fetches fail at transport level.
    pub fn script_snapshot_errors(&self, n: u32) {
        self.inner.lock().unwrap().snapshot_failures += n;
    }

    pub fn script_modify_reply(&self, ok: bool) {
        self.inner.lock().unwrap().modify_replies.push_back(ok);
    }

    /// Makes fill replies carry a bogus order id, forcing the executor's
    /// most-recently-opened fallback when it attaches protective levels.
    pub fn misreport_order_ids(&self) {
        self.inner.lock().unwrap().misreport_order_ids = true;
    }

    /// Plants a venue-side position directly, bypassing order flow.
    pub fn seed_position(
        &self,
        symbol: &str,
        direction: Direction,
        volume: f64,
        open_price: f64,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.positions.insert(
            ticket,
            PositionRecord {
                ticket,
                symbol: symbol.to_string(),
                direction,
                volume,
                open_price,
                current_price: open_price,
                profit: 0.0,
                stop_loss: None,
                take_profit: None,
                opened_at: Utc::now(),
            },
        );
        ticket
    }

    pub fn position(&self, ticket: u64) -> Option<PositionRecord> {
        self.inner.lock().unwrap().positions.get(&ticket).cloned()
    }

    pub fn open_position_count(&self) -> usize {
        self.inner.lock().unwrap().positions.len()
    }

    /// Number of order submissions seen, entry and close alike.
    pub fn submit_count(&self) -> u64 {
        self.inner.lock().unwrap().submit_calls
    }
}

impl Default for SimVenue {
    fn default() -> Self {
        Self::new()
    }
}

fn synth_bars(bid: f64, point: f64, count: usize, tick: u64) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(count);
    let mut prev_close = bid;
    for i in 0..count {
        let phase = (tick as f64 + i as f64) * 0.35;
        let close = bid * (1.0 + 0.0002 * phase.sin());
        bars.push(Bar {
            open: prev_close,
            high: prev_close.max(close) + point,
            low: prev_close.min(close) - point,
            close,
            volume: 100.0,
        });
        prev_close = close;
    }
    bars
}

fn refresh_profit(position: &mut PositionRecord, bid: f64, ask: f64) {
    let close_price = match position.direction {
        Direction::Long => bid,
        Direction::Short => ask,
    };
    position.current_price = close_price;
    let per_unit = match position.direction {
        Direction::Long => close_price - position.open_price,
        Direction::Short => position.open_price - close_price,
    };
    position.profit = per_unit * position.volume * CONTRACT_SIZE;
}

impl MarketVenue for SimVenue {
    fn get_snapshot(&self, symbol: &str, bars: usize) -> Result<MarketSnapshot, VenueError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.snapshot_failures > 0 {
            inner.snapshot_failures -= 1;
            return Err(VenueError::Unavailable("scripted outage".to_string()));
        }

        let scripted = inner
            .scripted_quotes
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front());
        if let Some(quote) = scripted {
            inner.quotes.insert(symbol.to_string(), quote);
        }

        let (bid, ask) = *inner
            .quotes
            .get(symbol)
            .ok_or_else(|| VenueError::NoQuote(symbol.to_string()))?;
        let point = inner.specs.get(symbol).map(|s| s.point).unwrap_or(0.00001);
        let tick = inner.tick;
        inner.tick += 1;

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            bid,
            ask,
            bars: synth_bars(bid, point, bars, tick),
            captured_at: Utc::now(),
        })
    }

    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, VenueError> {
        self.inner
            .lock()
            .unwrap()
            .specs
            .get(symbol)
            .cloned()
            .ok_or_else(|| VenueError::SymbolNotFound(symbol.to_string()))
    }

    fn submit_order(&self, intent: &OrderIntent) -> Result<VenueReply, VenueError> {
        let mut inner = self.inner.lock().unwrap();
        inner.submit_calls += 1;
        let code = inner.replies.pop_front().unwrap_or(VenueCode::Done);
        if !code.is_done() {
            return Ok(VenueReply {
                code,
                order_id: 0,
                fill_price: 0.0,
                volume: 0.0,
            });
        }

        if let Some(ticket) = intent.position {
            inner
                .positions
                .remove(&ticket)
                .ok_or(VenueError::PositionNotFound(ticket))?;
            return Ok(VenueReply {
                code,
                order_id: ticket,
                fill_price: intent.price,
                volume: intent.volume,
            });
        }

        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.positions.insert(
            ticket,
            PositionRecord {
                ticket,
                symbol: intent.symbol.clone(),
                direction: intent.direction,
                volume: intent.volume,
                open_price: intent.price,
                current_price: intent.price,
                profit: 0.0,
                // Stops are not honored atomically; a modify call must follow.
                stop_loss: None,
                take_profit: None,
                opened_at: Utc::now(),
            },
        );

        let order_id = if inner.misreport_order_ids { 0 } else { ticket };
        Ok(VenueReply {
            code,
            order_id,
            fill_price: intent.price,
            volume: intent.volume,
        })
    }

    fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<bool, VenueError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ok) = inner.modify_replies.pop_front() {
            if !ok {
                return Ok(false);
            }
        }
        match inner.positions.get_mut(&ticket) {
            Some(position) => {
                position.stop_loss = Some(stop_loss);
                position.take_profit = Some(take_profit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionRecord>, VenueError> {
        let mut inner = self.inner.lock().unwrap();
        let quotes = inner.quotes.clone();
        for position in inner.positions.values_mut() {
            if let Some(&(bid, ask)) = quotes.get(&position.symbol) {
                refresh_profit(position, bid, ask);
            }
        }
        Ok(inner
            .positions
            .values()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }
}
