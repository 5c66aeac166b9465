use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration: one `Config` per process, one `SymbolConfig`
/// per traded symbol (spec.md §6.3). `ApplyConfigUpdate` diffs two
/// `SymbolConfig`s field by field to decide hot-update vs re-init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub symbols: Vec<SymbolConfig>,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Per-symbol grid parameters and risk thresholds (spec.md §6.3 table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    pub exchange: String,

    pub price_interval: Decimal,
    pub order_quantity: Decimal,
    pub buy_window_size: u32,
    pub sell_window_size: u32,

    pub max_leverage: Decimal,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default = "default_reconcile_interval_seconds")]
    pub reconcile_interval_seconds: u64,

    #[serde(default)]
    pub close_positions_on_exit: bool,

    #[serde(default)]
    pub order_executor: OrderExecutorConfig,

    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl SymbolConfig {
    /// Fields whose change requires a full re-init of the symbol runtime
    /// rather than an in-place hot-update (spec.md §6.3: "Hot-updates that
    /// change `price_interval`, `exchange`, or `symbol` require re-init").
    pub fn requires_reinit(&self, other: &SymbolConfig) -> bool {
        self.price_interval != other.price_interval
            || self.exchange != other.exchange
            || self.symbol != other.symbol
    }
}

/// Circuit breaker thresholds (spec.md §4.5.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,

    #[serde(default = "default_price_move_threshold")]
    pub price_move_threshold: f64,

    #[serde(default = "default_recovery_window")]
    pub recovery_window: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            volume_multiplier: default_volume_multiplier(),
            price_move_threshold: default_price_move_threshold(),
            recovery_window: default_recovery_window(),
        }
    }
}

/// Order Executor tuning (spec.md §4.2/§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderExecutorConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit: u32,
}

impl Default for OrderExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rate_limit: default_rate_limit_per_sec(),
        }
    }
}

/// Ambient logging configuration (not part of spec.md's domain table, but
/// carried regardless per the ambient-stack rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Prometheus `/metrics` server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_prometheus: bool,

    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            metrics_addr: default_metrics_addr(),
            metrics_path: default_metrics_path(),
        }
    }
}

/// `TradeStorage` backend selection (spec.md §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enable_journal: bool,

    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enable_journal: false,
            journal_path: default_journal_path(),
        }
    }
}

fn default_reconcile_interval_seconds() -> u64 {
    60
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_volume_multiplier() -> f64 {
    5.0
}

fn default_price_move_threshold() -> f64 {
    0.02
}

fn default_recovery_window() -> u32 {
    3
}

fn default_max_retries() -> usize {
    5
}

fn default_rate_limit_per_sec() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("./data/trades.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol_config() -> SymbolConfig {
        SymbolConfig {
            symbol: "BTCUSDT".to_string(),
            exchange: "mock".to_string(),
            price_interval: dec!(2),
            order_quantity: dec!(30),
            buy_window_size: 3,
            sell_window_size: 3,
            max_leverage: dec!(5),
            risk: RiskConfig::default(),
            reconcile_interval_seconds: 60,
            close_positions_on_exit: false,
            order_executor: OrderExecutorConfig::default(),
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn price_interval_change_requires_reinit() {
        let a = symbol_config();
        let mut b = a.clone();
        b.price_interval = dec!(3);
        assert!(a.requires_reinit(&b));
    }

    #[test]
    fn window_size_change_is_hot_updatable() {
        let a = symbol_config();
        let mut b = a.clone();
        b.buy_window_size = 5;
        assert!(!a.requires_reinit(&b));
    }

    #[test]
    fn risk_defaults_match_spec_thresholds() {
        let risk = RiskConfig::default();
        assert_eq!(risk.volume_multiplier, 5.0);
        assert_eq!(risk.price_move_threshold, 0.02);
        assert_eq!(risk.recovery_window, 3);
    }
}
