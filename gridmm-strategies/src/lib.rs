//! Concrete implementations of `gridmm_core::strategy::Strategy`, the
//! optional strategy-driven-entry capability (spec.md §9 "Design Notes").
//!
//! A grid runs fine with no strategy attached; these are additional
//! sources of buy intent or window bias layered on top of the plain
//! ladder, wired in at `SymbolRuntime::build_with_strategy` time.
//!
//! - [`volatility`] — widens/narrows the buy window off candle volume and
//!   price-move ratios.
//! - [`dip_buy`] — proposes an extra buy entry on a sharp drawdown from a
//!   rolling high-water mark.

pub mod dip_buy;
pub mod volatility;

pub use dip_buy::DipBuyStrategy;
pub use volatility::VolatilityWindowStrategy;
