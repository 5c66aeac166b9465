//! Entry point that loads a TOML config, wires one `SymbolRuntime` per
//! configured symbol against a mock exchange (real venue integrations are
//! out of scope), and runs until interrupted.
//!
//! Since there is no live venue here, this binary also drives a simple
//! synthetic price walk into the mock exchange so the grid has something
//! to react to — a real deployment would instead run nothing but the
//! `SymbolRuntime`s against a genuine `Exchange` implementation.

#[path = "../common.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{error, info};

use gridmm_core::config::Config;
use gridmm_core::exchange::Candle;
use gridmm_core::monitoring::{MetricsRegistry, MetricsServer, MetricsServerConfig};
use gridmm_core::runtime::SymbolRuntime;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs a grid market maker against one or more symbols")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gridmm.toml")]
    config: String,

    /// Starting price for the synthetic mock-exchange price walk.
    #[arg(long, default_value = "100")]
    initial_price: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    common::init_logging(&config.metrics)?;

    let metrics = Arc::new(MetricsRegistry::new());
    let storage = common::build_storage(&config.persistence);

    if config.monitoring.enable_prometheus {
        let server_config = MetricsServerConfig {
            listen_addr: config.monitoring.metrics_addr.parse()?,
            metrics_path: config.monitoring.metrics_path.clone(),
        };
        let server = MetricsServer::new(server_config, metrics.clone());
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!(%e, "metrics server exited");
            }
        });
    }

    let mut runtimes = Vec::new();
    for symbol_config in &config.symbols {
        let exchange = common::mock_exchange(&symbol_config.symbol, args.initial_price);
        let runtime = SymbolRuntime::build(
            symbol_config.clone(),
            exchange.clone(),
            storage.clone(),
            metrics.clone(),
        )
        .await?;
        runtime.start().await?;
        info!(symbol = %symbol_config.symbol, "runtime started");
        runtimes.push((runtime, exchange));
    }

    let drivers = runtimes
        .iter()
        .map(|(_, exchange)| tokio::spawn(drive_synthetic_price(exchange.clone(), args.initial_price)))
        .collect::<Vec<_>>();

    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || shutdown_signal.notify_one())?;
    info!("gridmm running, press ctrl-c to stop");
    shutdown.notified().await;

    info!("shutting down");
    for driver in drivers {
        driver.abort();
    }
    for (runtime, _) in &runtimes {
        if let Err(e) = runtime.stop().await {
            error!(symbol = %runtime.symbol(), %e, "error during shutdown");
        }
    }
    Ok(())
}

/// Generates a simple bounded random walk and periodically closes a
/// 1-minute candle from it, since the mock exchange has no market data of
/// its own.
async fn drive_synthetic_price(
    exchange: Arc<gridmm_core::exchange::mock::MockExchange>,
    initial_price: Decimal,
) {
    let mut price = initial_price;
    let mut candle_open = price;
    let mut candle_high = price;
    let mut candle_low = price;
    let mut candle_volume = Decimal::ZERO;
    let mut ticks_in_candle = 0u32;
    let mut ts = 0i64;

    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        ts += 2_000;

        let drift: f64 = rand::thread_rng().gen_range(-0.004..0.004);
        price = (price * (Decimal::ONE + Decimal::try_from(drift).unwrap_or_default()))
            .round_dp(2)
            .max(Decimal::new(1, 2));
        exchange.set_price(price, ts).await;

        candle_high = candle_high.max(price);
        candle_low = candle_low.min(price);
        candle_volume += Decimal::new(rand::thread_rng().gen_range(1..50), 0);
        ticks_in_candle += 1;

        if ticks_in_candle >= 30 {
            exchange.seed_candles(vec![Candle {
                open_ts_millis: ts,
                open: candle_open,
                high: candle_high,
                low: candle_low,
                close: price,
                volume: candle_volume,
            }]);
            candle_open = price;
            candle_high = price;
            candle_low = price;
            candle_volume = Decimal::ZERO;
            ticks_in_candle = 0;
        }
    }
}
