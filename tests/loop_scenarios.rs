/// End-to-end trading loop scenarios against the paper venue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use osprey::config::Config;
use osprey::core::{Direction, LoopState, StopReason};
use osprey::predictor::StaticPredictor;
use osprey::trading::Trader;
use osprey::venue::{MarketVenue, SimVenue, VenueCode};

fn config(poll_interval_secs: u64) -> Config {
    let mut config = Config::default();
    config.trading.poll_interval_secs = poll_interval_secs;
    config.execution.retry_backoff_ms = 0;
    config.execution.settle_delay_ms = 0;
    config
}

fn trader(
    venue: &Arc<SimVenue>,
    predictor: StaticPredictor,
    config: &Config,
) -> Arc<Trader> {
    Arc::new(
        Trader::new(
            "EURUSD",
            venue.clone() as Arc<dyn MarketVenue>,
            Arc::new(predictor),
            config,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn confident_signal_opens_a_protected_position() {
    let venue = Arc::new(SimVenue::new());
    let trader = trader(&venue, StaticPredictor::new(Direction::Long, 0.9), &config(60));

    trader.start().unwrap();
    // First iteration runs immediately; the loop then sleeps a full interval.
    tokio::time::sleep(Duration::from_millis(50)).await;
    trader.stop();
    trader.join().await;

    assert_eq!(trader.state(), LoopState::Stopped(StopReason::OperatorStop));
    let positions = venue.list_positions(Some("EURUSD")).unwrap();
    assert_eq!(positions.len(), 1);

    // Entry at the ask, protective levels at the configured distances.
    let position = &positions[0];
    assert_eq!(position.direction, Direction::Long);
    assert!((position.open_price - 1.10012).abs() < 1e-9);
    assert!((position.volume - 0.01).abs() < 1e-9);
    assert!((position.stop_loss.unwrap() - 1.09512).abs() < 1e-9);
    assert!((position.take_profit.unwrap() - 1.10812).abs() < 1e-9);
}

#[tokio::test]
async fn wide_spread_blocks_the_trade() {
    let venue = Arc::new(SimVenue::new());
    // 30-point spread against a 20-point cap.
    venue.set_quote("EURUSD", 1.10000, 1.10030);
    let trader = trader(&venue, StaticPredictor::new(Direction::Long, 0.9), &config(60));

    trader.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    trader.stop();
    trader.join().await;

    assert_eq!(trader.state(), LoopState::Stopped(StopReason::OperatorStop));
    assert_eq!(venue.open_position_count(), 0);
    // The rejection happened before any venue submission.
    assert_eq!(venue.submit_count(), 0);
}

#[tokio::test]
async fn snapshot_error_ceiling_stops_the_loop() {
    let venue = Arc::new(SimVenue::new());
    venue.script_snapshot_errors(5);
    let trader = trader(&venue, StaticPredictor::new(Direction::Long, 0.9), &config(0));

    trader.start().unwrap();
    trader.join().await;

    assert_eq!(
        trader.state(),
        LoopState::Stopped(StopReason::MaxSnapshotErrors)
    );
    assert_eq!(venue.submit_count(), 0);
}

#[tokio::test]
async fn crossed_quotes_count_toward_the_ceiling() {
    let venue = Arc::new(SimVenue::new());
    // bid >= ask never passes snapshot validation.
    venue.set_quote("EURUSD", 1.10020, 1.10000);
    let trader = trader(&venue, StaticPredictor::new(Direction::Long, 0.9), &config(0));

    trader.start().unwrap();
    trader.join().await;

    assert_eq!(
        trader.state(),
        LoopState::Stopped(StopReason::MaxSnapshotErrors)
    );
    assert_eq!(venue.open_position_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_resets_the_error_counter() {
    let venue = Arc::new(SimVenue::new());
    // Four failures, one good cycle, four more failures: never five in a row,
    // so the run must end on the operator's stop instead of the ceiling.
    venue.script_snapshot_errors(4);
    let trader = trader(&venue, StaticPredictor::no_opinion(), &config(0));

    trader.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    venue.script_snapshot_errors(4);
    tokio::time::sleep(Duration::from_millis(20)).await;
    trader.stop();
    trader.join().await;

    assert_eq!(trader.state(), LoopState::Stopped(StopReason::OperatorStop));
}

#[tokio::test]
async fn emergency_stop_wakes_the_sleep_and_closes_positions() {
    let venue = Arc::new(SimVenue::new());
    venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10000);
    venue.seed_position("EURUSD", Direction::Short, 0.02, 1.10050);
    venue.seed_position("EURUSD", Direction::Long, 0.01, 1.09900);
    // The second close is refused; the sweep keeps going.
    venue.script_reply(VenueCode::Done);
    venue.script_reply(VenueCode::MarketClosed);
    venue.script_reply(VenueCode::Done);

    let trader = trader(&venue, StaticPredictor::no_opinion(), &config(600));
    trader.start().unwrap();
    // Let the loop finish its quiet iteration and enter the long sleep.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let requested_at = Instant::now();
    assert_eq!(trader.emergency_stop(), None);
    trader.join().await;

    // The sleep is checked once per second, not once per interval.
    assert!(requested_at.elapsed() < Duration::from_secs(3));
    assert_eq!(
        trader.state(),
        LoopState::Stopped(StopReason::EmergencyStop)
    );
    assert_eq!(venue.open_position_count(), 1);
}

#[tokio::test]
async fn emergency_stop_without_a_run_sweeps_inline() {
    let venue = Arc::new(SimVenue::new());
    venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10000);
    venue.seed_position("EURUSD", Direction::Long, 0.02, 1.10010);

    let trader = trader(&venue, StaticPredictor::no_opinion(), &config(60));
    assert_eq!(trader.emergency_stop(), Some((2, 2)));
    assert_eq!(venue.open_position_count(), 0);
    assert_eq!(
        trader.state(),
        LoopState::Stopped(StopReason::EmergencyStop)
    );
}

#[tokio::test]
async fn realized_losses_gate_the_next_run() {
    let venue = Arc::new(SimVenue::new());
    // A long that is 500 points underwater on 0.2 lots: closing realizes a
    // 100-currency loss, past the 50 daily limit.
    venue.seed_position("EURUSD", Direction::Long, 0.2, 1.10500);
    let trader = trader(&venue, StaticPredictor::new(Direction::Long, 0.9), &config(60));

    assert_eq!(trader.emergency_stop(), Some((1, 1)));

    trader.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    trader.stop();
    trader.join().await;

    // The confident signal was rejected by the daily-loss ceiling.
    assert_eq!(venue.open_position_count(), 0);
    let report = trader.status();
    assert!(report.daily_loss >= 50.0);
}

#[tokio::test]
async fn status_is_idempotent_and_does_not_pause_the_loop() {
    let venue = Arc::new(SimVenue::new());
    venue.seed_position("EURUSD", Direction::Long, 0.01, 1.10000);
    let trader = trader(&venue, StaticPredictor::no_opinion(), &config(60));

    let first = trader.status();
    let second = trader.status();
    assert_eq!(first.loop_state, LoopState::Idle);
    assert_eq!(first.open_positions_count, second.open_positions_count);
    assert_eq!(first.current_symbol.as_deref(), Some("EURUSD"));

    trader.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let running = trader.status();
    assert_eq!(running.loop_state, LoopState::Running);
    assert_eq!(running.open_positions_count, 1);

    trader.stop();
    trader.join().await;
    let stopped = trader.status();
    assert_eq!(
        stopped.loop_state,
        LoopState::Stopped(StopReason::OperatorStop)
    );
    assert_eq!(stopped.open_positions_count, 1);
}
