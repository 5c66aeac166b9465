//! Runtime configuration (spec.md §6.3): a `Config` holding one
//! `SymbolConfig` per traded symbol, loaded from a TOML file via `serde` +
//! `toml`, following the teacher's nested-struct-per-concern shape with
//! `#[serde(default = ...)]` filling in non-critical fields.
//!
//! Grid parameters are cold-path (read once per `AdjustOrders` cycle, not
//! per tick) so runtime TOML loading is appropriate here even though the
//! teacher itself favors compile-time feature flags for its hot path.

pub mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("config must define at least one symbol");
        }
        for sym in &self.symbols {
            sym.validate()?;
        }
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.metrics.log_level.as_str()) {
            anyhow::bail!(
                "invalid log level '{}', must be one of: {:?}",
                self.metrics.log_level,
                valid_log_levels
            );
        }
        Ok(())
    }
}

impl SymbolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.price_interval <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("{}: price_interval must be positive", self.symbol);
        }
        if self.order_quantity <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("{}: order_quantity must be positive", self.symbol);
        }
        if self.buy_window_size == 0 && self.sell_window_size == 0 {
            anyhow::bail!(
                "{}: at least one of buy_window_size/sell_window_size must be nonzero",
                self.symbol
            );
        }
        if self.max_leverage <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("{}: max_leverage must be positive", self.symbol);
        }
        if self.risk.volume_multiplier <= 0.0 {
            anyhow::bail!("{}: risk.volume_multiplier must be positive", self.symbol);
        }
        if self.order_executor.rate_limit == 0 {
            anyhow::bail!("{}: order_executor.rate_limit must be nonzero", self.symbol);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[[symbols]]
symbol = "BTCUSDT"
exchange = "mock"
price_interval = "2"
order_quantity = "30"
buy_window_size = 3
sell_window_size = 3
max_leverage = "5"
close_positions_on_exit = true

[metrics]
log_level = "debug"
"#;

    #[test]
    fn loads_and_validates_sample_toml() {
        let config: Config = toml::from_str(SAMPLE_TOML).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols[0].symbol, "BTCUSDT");
        assert_eq!(config.symbols[0].reconcile_interval_seconds, 60);
        assert_eq!(config.metrics.log_level, "debug");
    }

    #[test]
    fn rejects_empty_symbol_list() {
        let config = Config {
            symbols: vec![],
            metrics: MetricsConfig::default(),
            monitoring: MonitoringConfig::default(),
            persistence: PersistenceConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config: Config = toml::from_str(SAMPLE_TOML).unwrap();
        config.metrics.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
