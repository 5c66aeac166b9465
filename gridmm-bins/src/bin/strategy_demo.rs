//! Runs a single symbol for a fixed duration with the `gridmm-strategies`
//! capabilities attached, then prints a summary of the resulting grid
//! state. Useful for eyeballing how a `Strategy` shifts entries/window
//! sizing relative to the plain ladder.

#[path = "../common.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use gridmm_core::config::{RiskConfig, SymbolConfig};
use gridmm_core::exchange::Candle;
use gridmm_core::monitoring::MetricsRegistry;
use gridmm_core::persistence::NullTradeStorage;
use gridmm_core::runtime::SymbolRuntime;
use gridmm_core::strategy::Strategy;
use gridmm_strategies::{DipBuyStrategy, VolatilityWindowStrategy};

#[derive(Parser, Debug)]
#[command(author, version, about = "Short demo run of the grid with strategies attached")]
struct Args {
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    #[arg(long, default_value = "100")]
    initial_price: Decimal,

    #[arg(long, default_value = "60")]
    duration_seconds: u64,

    /// Which bundled strategy to attach: "volatility", "dip-buy", or "none".
    #[arg(long, default_value = "volatility")]
    strategy: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_target(false).init();

    let symbol_config = SymbolConfig {
        symbol: args.symbol.clone(),
        exchange: "mock".to_string(),
        price_interval: dec!(2),
        order_quantity: dec!(30),
        buy_window_size: 3,
        sell_window_size: 3,
        max_leverage: dec!(5),
        risk: RiskConfig::default(),
        reconcile_interval_seconds: 3600,
        close_positions_on_exit: false,
        order_executor: Default::default(),
        timezone: "UTC".to_string(),
    };

    let exchange = common::mock_exchange(&args.symbol, args.initial_price);
    let metrics = Arc::new(MetricsRegistry::new());
    let storage = Arc::new(NullTradeStorage);

    let strategy: Option<Arc<dyn Strategy>> = match args.strategy.as_str() {
        "volatility" => Some(Arc::new(VolatilityWindowStrategy::with_defaults())),
        "dip-buy" => Some(Arc::new(DipBuyStrategy::with_defaults())),
        "none" => None,
        other => anyhow::bail!("unknown strategy '{other}', expected volatility/dip-buy/none"),
    };

    let runtime = SymbolRuntime::build_with_strategy(
        symbol_config,
        exchange.clone(),
        storage,
        metrics.clone(),
        strategy,
    )
    .await?;
    runtime.start().await?;
    info!(strategy = %args.strategy, "demo runtime started");

    let mut price = args.initial_price;
    let mut ts = 0i64;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration_seconds);
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(500)).await;
        ts += 500;
        let drift: f64 = rand::thread_rng().gen_range(-0.01..0.01);
        price = (price * (Decimal::ONE + Decimal::try_from(drift).unwrap_or_default()))
            .round_dp(2)
            .max(Decimal::new(1, 2));
        exchange.set_price(price, ts).await;
        exchange.seed_candles(vec![Candle {
            open_ts_millis: ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::new(rand::thread_rng().gen_range(1..200), 0),
        }]);
    }

    runtime.stop().await?;

    let grid = runtime.grid();
    let filled = grid.filled_slots().len();
    info!(
        total_slots = grid.len(),
        filled_slots = filled,
        final_price = %price,
        "demo run complete"
    );
    Ok(())
}
