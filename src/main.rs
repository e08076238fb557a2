use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use osprey::config::Config;
use osprey::predictor::MomentumPredictor;
use osprey::trading::Trader;
use osprey::venue::{MarketVenue, SimVenue};

#[derive(Parser)]
#[command(name = "osprey", about = "Autonomous directional trading robot")]
struct Cli {
    /// Path to the toml configuration file
    #[arg(long, default_value = "osprey.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling trading loop until interrupted
    Trade {
        /// Symbol to trade; defaults to the configured one
        #[arg(long)]
        symbol: Option<String>,
        /// Trade against the in-process paper venue
        #[arg(long)]
        paper: bool,
    },
    /// Print a one-shot status report
    Status {
        #[arg(long)]
        symbol: Option<String>,
        /// Emit the report as JSON instead of the colored table
        #[arg(long)]
        json: bool,
    },
    /// Close all open positions on the paper venue and halt
    EmergencyStop {
        #[arg(long)]
        symbol: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("osprey=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::load_from_file(path).with_context(|| format!("failed to load config {}", path))
    } else {
        info!(path, "no config file found, using built-in defaults");
        Ok(Config::default())
    }
}

fn build_trader(symbol: &str, config: &Config) -> Result<Arc<Trader>> {
    let venue = Arc::new(SimVenue::new()) as Arc<dyn MarketVenue>;
    let predictor = Arc::new(MomentumPredictor::new(config.data.bars_count / 2));
    Ok(Arc::new(Trader::new(symbol, venue, predictor, config)?))
}

async fn run_trade(symbol: &str, config: &Config) -> Result<()> {
    let trader = build_trader(symbol, config)?;
    trader.start()?;

    // First Ctrl-C finishes the current iteration and exits; a second one
    // escalates to an emergency close-out of all open positions.
    let control = trader.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current iteration (press again to close all positions)");
            control.stop();
            if signal::ctrl_c().await.is_ok() {
                warn!("second interrupt, escalating to emergency stop");
                control.emergency_stop();
            }
        }
    });

    trader.join().await;

    let report = trader.status();
    info!(
        state = %report.loop_state,
        open_positions = report.open_positions_count,
        daily_loss = report.daily_loss,
        "trading session finished"
    );
    Ok(())
}

fn print_status(trader: &Trader, json: bool) -> Result<()> {
    let report = trader.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Osprey Status ===".bold());
    println!("State:       {}", report.loop_state.to_string().cyan());
    if let Some(symbol) = &report.current_symbol {
        println!("Symbol:      {}", symbol);
    }
    println!("Daily loss:  {:.2}", report.daily_loss);
    println!("Open positions: {}", report.open_positions_count);
    for position in &report.open_positions {
        let profit = if position.profit >= 0.0 {
            format!("{:+.2}", position.profit).green()
        } else {
            format!("{:+.2}", position.profit).red()
        };
        println!(
            "  #{} {} {} {:.2} @ {:.5}  {}",
            position.ticket,
            position.symbol,
            position.direction,
            position.volume,
            position.open_price,
            profit
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Trade { symbol, paper } => {
            if !paper {
                anyhow::bail!(
                    "live venue connectivity is not configured in this build; pass --paper"
                );
            }
            let symbol = symbol.unwrap_or_else(|| config.trading.symbol.clone());
            run_trade(&symbol, &config).await
        }
        Command::Status { symbol, json } => {
            let symbol = symbol.unwrap_or_else(|| config.trading.symbol.clone());
            let trader = build_trader(&symbol, &config)?;
            print_status(&trader, json)
        }
        Command::EmergencyStop { symbol } => {
            let symbol = symbol.unwrap_or_else(|| config.trading.symbol.clone());
            let trader = build_trader(&symbol, &config)?;
            match trader.emergency_stop() {
                Some((closed, total)) => {
                    println!("Closed {} of {} open positions", closed, total);
                    Ok(())
                }
                None => Ok(()),
            }
        }
    }
}
