//! gridmm-core — perpetual-futures grid market maker.
//!
//! A grid of price-keyed slots maintains a band of resting buy orders below
//! the market and sell orders above filled slots, harvesting the spread on
//! every round trip. See each module's doc comment for its piece of the
//! system:
//!
//! - [`grid`] — the concurrent slot table and its per-slot state machine.
//! - [`price_monitor`] — the single canonical price stream per symbol.
//! - [`executor`] — batched order placement/cancellation with retry and
//!   rate limiting.
//! - [`safety`] — pre-trade checks, the volatility circuit breaker, and the
//!   periodic reconciler.
//! - [`position_manager`] — the `AdjustOrders` loop tying the above
//!   together.
//! - [`runtime`] — per-symbol lifecycle and hot config reload.
//! - [`exchange`] — the venue-agnostic `Exchange` capability trait plus a
//!   mock implementation for tests.
//! - [`persistence`] — the `TradeStorage` capability.
//! - [`config`] — runtime TOML configuration.
//! - [`monitoring`] — Prometheus metrics and the `/metrics` endpoint.
//! - [`strategy`] — the optional strategy-driven-entry capability.

pub mod config;
pub mod core;
pub mod exchange;
pub mod executor;
pub mod grid;
pub mod monitoring;
pub mod persistence;
pub mod position_manager;
pub mod price_monitor;
pub mod resilience;
pub mod runtime;
pub mod safety;
pub mod strategy;
pub mod utils;

pub use anyhow::{Error, Result};

pub use core::{ClientOid, ErrKind, GridError, OrderEventStatus, Side};
pub use exchange::Exchange;
pub use grid::{Grid, GridParams, Slot};
pub use runtime::SymbolRuntime;

/// Convenience re-exports for binaries wiring a `SymbolRuntime` together.
pub mod prelude {
    pub use crate::config::{Config, SymbolConfig};
    pub use crate::core::{ClientOid, ErrKind, GridError, OrderEventStatus, Side};
    pub use crate::exchange::{Exchange, ExchangeError};
    pub use crate::executor::OrderExecutor;
    pub use crate::grid::{Grid, GridParams};
    pub use crate::monitoring::MetricsRegistry;
    pub use crate::persistence::TradeStorage;
    pub use crate::price_monitor::PriceMonitor;
    pub use crate::runtime::SymbolRuntime;
    pub use crate::strategy::{Strategy, StrategyAction, StrategyDecision};
    pub use crate::{Error, Result};
}
