//! Safety (C5, spec.md §4.5): the pre-trade gate, the active risk monitor,
//! and the periodic reconciler. None of these talk to `Exchange` for order
//! placement directly — they report into the [`crate::position_manager::PositionManager`]
//! (pausing/unpausing quoting, force-clearing slots) and let the normal
//! `AdjustOrders` path do the actual order traffic.

pub mod circuit_breaker;
pub mod pre_trade;
pub mod reconciler;

pub use circuit_breaker::{CircuitBreaker, RiskEvent};
pub use pre_trade::{run_pre_trade_checks, PreTradeInputs, PreTradeReport};
pub use reconciler::reconcile_once;
