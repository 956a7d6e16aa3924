//! # fbot-runner
//!
//! Command-line entry point for the futures order bot.
//!
//! Loads a JSON configuration file, connects the engine to Binance USDT-M
//! futures (testnet by default), runs one command and exits.
//!
//! # Usage
//!
//! ```bash
//! fbot-runner config.json market BTCUSDT buy 0.003
//! fbot-runner config.json limit BTCUSDT sell 0.002 112000
//! fbot-runner config.json stop-limit BTCUSDT sell 0.002 99000 99500
//! fbot-runner config.json twap BTCUSDT buy 0.003 --minutes 60 --slices 10
//! fbot-runner config.json grid BTCUSDT buy 0.005 108000 112000 --levels 5
//! fbot-runner config.json cancel-run <run-id> --symbol BTCUSDT
//! fbot-runner config.json --log-level debug open-orders
//! ```
//!
//! Ctrl+C during a TWAP stops further slices; slices already sent stay.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fbot_core::types::*;
use fbot_td::TradingEngine;
use fbot_td::binance::FuturesClient;
use fbot_td::event::{EngineEvent, EngineEventReceiver};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

/// Binance USDT-M Futures order bot.
#[derive(Parser)]
#[command(name = "fbot-runner", about = "Binance USDT-M Futures order bot")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Market order.
    Market { symbol: String, side: Side, quantity: Decimal },

    /// Limit order.
    Limit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        /// GTC, IOC, FOK or GTX.
        #[arg(long)]
        tif: Option<TimeInForce>,
    },

    /// Stop-limit order: rests as a limit at `price` once `stop_price` trades.
    StopLimit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        stop_price: Decimal,
        #[arg(long)]
        tif: Option<TimeInForce>,
    },

    /// Split a market order into equal slices over time.
    Twap {
        symbol: String,
        side: Side,
        quantity: Decimal,
        #[arg(long)]
        minutes: u32,
        #[arg(long)]
        slices: u32,
    },

    /// Resting limit orders at evenly spaced prices.
    Grid {
        symbol: String,
        side: Side,
        quantity: Decimal,
        lower: Decimal,
        upper: Decimal,
        #[arg(long, default_value_t = 5)]
        levels: u32,
    },

    /// Clock sync and account overview.
    Status,

    /// Cancel one order.
    Cancel { symbol: String, order_id: u64 },

    /// Cancel the resting orders of an earlier run.
    CancelRun {
        run_id: Uuid,
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Wallet balances.
    Balance,

    /// Open orders, optionally for one symbol.
    OpenOrders {
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Query one order.
    Order { symbol: String, order_id: u64 },

    /// Last traded price.
    Price { symbol: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = fbot_td::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_dir = cli.log_dir.as_deref().or(config.logging.log_dir.as_deref());
    fbot_core::logging::init_logging(level, log_dir, &config.logging.module_name);
    info!("fbot-runner starting: config={}, endpoint={}", cli.config.display(), config.binance.rest_url);

    // 3. Build the engine
    let client = FuturesClient::new(&config.binance)?;
    let (engine, events) = TradingEngine::new(Arc::new(client), config.engine.clone());
    let resync = engine.start_clock_sync().await;
    let printer = tokio::spawn(print_events(events));

    // 4. Run the command
    let result = run(&engine, cli.command).await;

    resync.abort();
    let _ = resync.await;
    drop(engine);
    let _ = printer.await;
    result
}

async fn run(engine: &TradingEngine, command: Command) -> Result<()> {
    match command {
        Command::Market { symbol, side, quantity } => {
            let intent = simple(symbol, side, OrderType::Market, quantity, None, None, None);
            report(&engine.place_simple_order(intent).await?);
        }
        Command::Limit { symbol, side, quantity, price, tif } => {
            let intent = simple(symbol, side, OrderType::Limit, quantity, Some(price), None, tif);
            report(&engine.place_simple_order(intent).await?);
        }
        Command::StopLimit { symbol, side, quantity, price, stop_price, tif } => {
            let intent = simple(symbol, side, OrderType::StopLimit, quantity, Some(price), Some(stop_price), tif);
            report(&engine.place_simple_order(intent).await?);
        }
        Command::Twap { symbol, side, quantity, minutes, slices } => {
            let intent = TwapIntent {
                symbol: symbol.to_uppercase(),
                side,
                total_quantity: quantity,
                duration_minutes: minutes,
                slices,
            };
            let run_id = engine.prepare_twap(intent).await?;
            println!("run {run_id}: press Ctrl+C to stop after the current slice");

            let exec = engine.execute(run_id);
            tokio::pin!(exec);
            let finished = tokio::select! {
                run = &mut exec => Some(run),
                _ = tokio::signal::ctrl_c() => None,
            };
            let run = match finished {
                Some(run) => run?,
                None => {
                    warn!("shutdown signal received, cancelling run {run_id}");
                    engine.cancel_run(run_id).await?;
                    exec.await?
                }
            };
            report(&run);
        }
        Command::Grid { symbol, side, quantity, lower, upper, levels } => {
            let intent = GridIntent {
                symbol: symbol.to_uppercase(),
                side,
                total_quantity: quantity,
                lower_price: lower,
                upper_price: upper,
                levels,
            };
            report(&engine.place_grid(intent).await?);
        }
        Command::Status => {
            let clock = engine.gateway().clock();
            println!(
                "clock offset: {} ms{}",
                clock.offset_ms(),
                if clock.is_degraded() { " (degraded: using local time)" } else { "" }
            );
            let balances = engine.balance().await?;
            println!("USDT balance: {}", balances.get("USDT").copied().unwrap_or_default());
            println!("open orders: {}", engine.open_orders(None).await?.len());
        }
        Command::Cancel { symbol, order_id } => {
            let snap = engine.cancel_order(&symbol.to_uppercase(), order_id).await?;
            print_order(&snap);
        }
        Command::CancelRun { run_id, symbol } => {
            let symbol = symbol.map(|s| s.to_uppercase());
            let results = engine.cancel_tagged_orders(symbol.as_deref(), run_id).await?;
            if results.is_empty() {
                println!("no open orders for run {run_id}");
            }
            for r in results {
                match r.result {
                    Ok(status) => println!("{} #{}: {status:?}", r.symbol, r.order_id),
                    Err(e) => println!("{} #{}: cancel failed: {e}", r.symbol, r.order_id),
                }
            }
        }
        Command::Balance => {
            for (asset, amount) in engine.balance().await? {
                println!("{asset:<8} {amount}");
            }
        }
        Command::OpenOrders { symbol } => {
            let symbol = symbol.map(|s| s.to_uppercase());
            let orders = engine.open_orders(symbol.as_deref()).await?;
            if orders.is_empty() {
                println!("no open orders");
            }
            orders.iter().for_each(print_order);
        }
        Command::Order { symbol, order_id } => {
            print_order(&engine.order_status(&symbol.to_uppercase(), order_id).await?);
        }
        Command::Price { symbol } => {
            let symbol = symbol.to_uppercase();
            println!("{symbol} {}", engine.price(&symbol).await?);
        }
    }
    Ok(())
}

fn simple(
    symbol: String,
    side: Side,
    order_type: OrderType,
    quantity: Decimal,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    time_in_force: Option<TimeInForce>,
) -> SimpleIntent {
    SimpleIntent { symbol: symbol.to_uppercase(), side, order_type, quantity, price, stop_price, time_in_force }
}

fn report(run: &StrategyRun) {
    println!(
        "run {} [{}] {}: {}/{} accepted, {} skipped, filled {}",
        run.id,
        run.kind(),
        run.status,
        run.accepted(),
        run.planned,
        run.skipped(),
        run.filled_quantity()
    );
    for (i, child) in run.children.iter().enumerate() {
        match &child.outcome {
            OrderOutcome::Accepted { order_id, status, filled_qty, avg_price } => println!(
                "  #{i} {} -> order {order_id} {status:?} filled {filled_qty} @ {avg_price}",
                child.request.summary()
            ),
            OrderOutcome::Rejected { reason, .. } => {
                println!("  #{i} {} -> rejected: {reason}", child.request.summary())
            }
        }
    }
}

fn print_order(o: &OrderSnapshot) {
    println!(
        "{} #{} {} {} {:?} qty={} filled={} price={} stop={} avg={}",
        o.symbol,
        o.order_id,
        o.order_type,
        o.side,
        o.status,
        o.quantity,
        o.filled_quantity,
        o.price,
        o.stop_price,
        o.avg_price
    );
}

/// Log engine events until the engine is dropped.
async fn print_events(mut events: EngineEventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::RunStarted { run_id, kind, planned } => {
                info!("[event] run {run_id} started ({kind}, {planned} orders)")
            }
            EngineEvent::ChildRecorded { run_id, index, child } => {
                info!("[event] run {run_id} child {index}: {:?}", child.outcome)
            }
            EngineEvent::RunFinished { run_id, status, cancelled } => {
                info!("[event] run {run_id} finished: {status}{}", if cancelled { " (cancelled)" } else { "" })
            }
            EngineEvent::ClockSynced { offset_ms } => info!("[event] clock offset {offset_ms} ms"),
            EngineEvent::ClockSyncFailed { message } => warn!("[event] clock sync failed: {message}"),
        }
    }
}
