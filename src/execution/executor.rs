/// Order submission with bounded retries and venue-code classification

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Execution;
use crate::core::{
    FailureClass, OrderIntent, OrderOutcome, TradingContext, VenueError,
};
use crate::venue::{MarketVenue, VenueCode, VenueReply};

pub struct OrderExecutor {
    venue: Arc<dyn MarketVenue>,
    ctx: Arc<TradingContext>,
    settings: Execution,
}

impl OrderExecutor {
    pub fn new(venue: Arc<dyn MarketVenue>, ctx: Arc<TradingContext>, settings: Execution) -> Self {
        Self {
            venue,
            ctx,
            settings,
        }
    }

    fn backoff(&self) -> Duration {
        Duration::from_millis(self.settings.retry_backoff_ms)
    }

    /// Submits an order intent, retrying within the configured budget. Each
    /// retry refreshes the price from the venue; reprice-class rejections
    /// additionally recompute the protective levels against the fresh quote.
    /// At most one order is in flight per symbol because the loop calls this
    /// synchronously from a single iteration.
    pub async fn submit(&self, intent: OrderIntent) -> OrderOutcome {
        let max_attempts = self.settings.max_retry_attempts.max(1);
        let mut intent = intent;
        let mut last = (VenueCode::Timeout, FailureClass::Retryable);

        for attempt in 1..=max_attempts {
            let reply = match self.venue.submit_order(&intent) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(
                        symbol = %intent.symbol,
                        trade_id = intent.trade_id,
                        attempt,
                        error = %e,
                        "venue transport failure during submit"
                    );
                    transport_failure_reply(&e)
                }
            };

            if reply.code.is_done() {
                info!(
                    symbol = %intent.symbol,
                    direction = %intent.direction,
                    volume = intent.volume,
                    fill_price = reply.fill_price,
                    order_id = reply.order_id,
                    attempt,
                    "order filled"
                );
                self.attach_protective(&intent, &reply).await;
                return OrderOutcome::Filled {
                    order_id: reply.order_id,
                    fill_price: reply.fill_price,
                    volume: reply.volume,
                };
            }

            let class = reply.code.classify().unwrap_or(FailureClass::NonRetryable);
            warn!(
                symbol = %intent.symbol,
                trade_id = intent.trade_id,
                attempt,
                code = %reply.code,
                class = %class,
                "order submission rejected"
            );
            last = (reply.code, class);

            if class == FailureClass::NonRetryable || attempt == max_attempts {
                break;
            }

            // Let the quote stabilize before hitting the venue again.
            if !self.ctx.wait_cancellable(self.backoff()).await {
                debug!(trade_id = intent.trade_id, "retry backoff interrupted by stop request");
                break;
            }

            intent = match self.venue.get_snapshot(&intent.symbol, 1) {
                Ok(fresh) if fresh.is_valid() => match class {
                    FailureClass::RequiresReprice => intent.repriced(&fresh),
                    _ => intent.refreshed(&fresh),
                },
                _ => {
                    warn!(
                        symbol = %intent.symbol,
                        "could not refresh quote before retry, resubmitting at last price"
                    );
                    OrderIntent {
                        attempt: intent.attempt + 1,
                        ..intent
                    }
                }
            };
        }

        OrderOutcome::Failed {
            code: last.0,
            class: last.1,
        }
    }

    /// Venues fill market orders without honoring requested stop/target
    /// fields atomically, so protective levels are attached with a separate
    /// modify call once the position shows up in the open-position list.
    async fn attach_protective(&self, intent: &OrderIntent, reply: &VenueReply) {
        let (stop_loss, take_profit) = match (intent.stop_loss, intent.take_profit) {
            (Some(sl), Some(tp)) => (sl, tp),
            _ => return,
        };

        // Settle delay; an early wake from a stop request still attempts the
        // attach immediately rather than leaving the fill unprotected.
        self.ctx
            .wait_cancellable(Duration::from_millis(self.settings.settle_delay_ms))
            .await;

        let ticket = match self.locate_ticket(&intent.symbol, reply.order_id).await {
            Some(ticket) => ticket,
            None => {
                warn!(
                    symbol = %intent.symbol,
                    order_id = reply.order_id,
                    "no open position found, protective levels not attached"
                );
                return;
            }
        };

        match self.venue.modify_position(ticket, stop_loss, take_profit) {
            Ok(true) => info!(ticket, stop_loss, take_profit, "protective levels attached"),
            Ok(false) => warn!(ticket, "venue refused protective level modification"),
            Err(e) => warn!(ticket, error = %e, "protective level modification failed"),
        }
    }

    /// Finds the ticket for a just-filled order. Correlation by order id can
    /// legitimately fail under concurrent activity on the symbol; after the
    /// retry budget this falls back to the most recently opened position,
    /// which is a heuristic and logged as such.
    async fn locate_ticket(&self, symbol: &str, order_id: u64) -> Option<u64> {
        let max_attempts = self.settings.max_retry_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.venue.list_positions(Some(symbol)) {
                Ok(positions) => {
                    if let Some(position) = positions.iter().find(|p| p.ticket == order_id) {
                        return Some(position.ticket);
                    }
                    if attempt == max_attempts {
                        return match positions.iter().max_by_key(|p| p.opened_at) {
                            Some(latest) => {
                                warn!(
                                    order_id,
                                    ticket = latest.ticket,
                                    "ticket correlation failed, falling back to most recently opened position"
                                );
                                Some(latest.ticket)
                            }
                            None => None,
                        };
                    }
                }
                Err(e) => {
                    warn!(symbol, attempt, error = %e, "position list unavailable while locating fill");
                }
            }
            self.ctx.wait_cancellable(self.backoff()).await;
        }
        None
    }
}

fn transport_failure_reply(error: &VenueError) -> VenueReply {
    let code = match error {
        VenueError::Unavailable(_) | VenueError::NoQuote(_) => VenueCode::ConnectionLost,
        _ => VenueCode::Other(0),
    };
    VenueReply {
        code,
        order_id: 0,
        fill_price: 0.0,
        volume: 0.0,
    }
}
