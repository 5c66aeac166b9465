//! Shared setup code for the `gridmm-bins` binaries: logging init and the
//! concrete mock `Exchange`/`TradeStorage` wiring used since real venue
//! integrations are out of scope here.

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;

use gridmm_core::config::{MetricsConfig, PersistenceConfig};
use gridmm_core::exchange::mock::MockExchange;
use gridmm_core::exchange::SymbolMetadata;
use gridmm_core::persistence::{JsonlTradeStorage, NullTradeStorage, TradeStorage};

/// Initialize tracing, honoring `RUST_LOG` over the configured level and
/// switching to JSON output when `json_logs` is set.
pub fn init_logging(metrics: &MetricsConfig) -> Result<()> {
    gridmm_core::utils::init_logger(&metrics.log_level, metrics.json_logs);
    Ok(())
}

/// Builds the `TradeStorage` backend selected by `persistence.enable_journal`.
pub fn build_storage(config: &PersistenceConfig) -> Arc<dyn TradeStorage> {
    if config.enable_journal {
        Arc::new(JsonlTradeStorage::spawn(config.journal_path.clone()))
    } else {
        Arc::new(NullTradeStorage)
    }
}

/// Constructs a `MockExchange` seeded at `initial_price`, standing in for a
/// real venue connection (out of scope here).
pub fn mock_exchange(symbol: &str, initial_price: Decimal) -> Arc<MockExchange> {
    Arc::new(MockExchange::new(
        symbol,
        initial_price,
        SymbolMetadata {
            price_decimals: 2,
            quantity_decimals: 6,
            min_notional: Decimal::from(5),
        },
    ))
}
