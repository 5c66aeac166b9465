//! The optional `Strategy` capability (spec.md §9 "Design Notes"): the
//! source's runtime plugin loader and dynamic strategy dispatch is
//! re-architected here as a single callback trait the Position Manager may
//! consult for strategy-driven entries, rather than the grid's ordinary
//! price-window logic. A grid runs perfectly well with no `Strategy`
//! attached at all — `AdjustOrders` (spec.md §4.4.2) never requires one;
//! this capability only adds an optional extra source of buy intents on
//! top of the plain grid ladder.
//!
//! Grounded in the teacher's legacy `bog_core::strategy::Strategy` trait
//! (`strategy/mod.rs`): a `Send + Sync` object-safe trait so variants are
//! chosen once at wiring time and held as `Arc<dyn Strategy>`, the same
//! shape the teacher uses for its `Box<dyn Strategy>` dispatch before its
//! newer const-generic engine. Unlike the teacher's mutable `&mut self`
//! `on_update`, candle-driven strategies here take `&self` — any strategy
//! that needs to remember state (an EWMA, a cooldown) holds it behind its
//! own interior-mutability lock, the way `gridmm-strategies`' concrete
//! implementations do, so the trait itself stays `Sync` without forcing
//! every caller to serialize behind a single `&mut` borrow.

use rust_decimal::Decimal;

use crate::exchange::Candle;
use crate::grid::GridParams;

/// What a strategy proposes the Position Manager do this cycle, over and
/// above the plain grid ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyAction {
    /// Propose an additional buy entry at the decision's `price`, outside
    /// the ordinary `{p - k*interval}` ladder.
    EnterBuy,
    /// Propose widening the effective buy window by one level (e.g. a
    /// volatility strategy judging the market calmer than usual).
    WidenWindow,
    /// Propose narrowing the effective buy window by one level.
    NarrowWindow,
    /// No action this cycle.
    Skip,
}

/// One strategy decision, produced from a single closed candle.
#[derive(Debug, Clone)]
pub struct StrategyDecision {
    pub action: StrategyAction,
    pub price: Decimal,
    pub reason: String,
}

impl StrategyDecision {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: StrategyAction::Skip,
            price: Decimal::ZERO,
            reason: reason.into(),
        }
    }

    pub fn enter_buy(price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            action: StrategyAction::EnterBuy,
            price,
            reason: reason.into(),
        }
    }

    pub fn widen_window(reason: impl Into<String>) -> Self {
        Self {
            action: StrategyAction::WidenWindow,
            price: Decimal::ZERO,
            reason: reason.into(),
        }
    }

    pub fn narrow_window(reason: impl Into<String>) -> Self {
        Self {
            action: StrategyAction::NarrowWindow,
            price: Decimal::ZERO,
            reason: reason.into(),
        }
    }
}

/// The optional strategy capability. Implementations are pure functions of
/// the candle stream plus the current grid parameters; they never touch
/// the `Exchange` or the grid directly; the `PositionManager` decides how
/// (or whether) to act on a returned decision.
pub trait Strategy: Send + Sync {
    /// Called once per closed candle (the same cadence as the Safety
    /// candle reader, spec.md §4.5.2/T4). Returns `None` if this strategy
    /// has nothing to add this cycle.
    fn on_candle(&self, candle: &Candle, grid: &GridParams) -> Option<StrategyDecision>;

    /// Short identifier for logging/metrics labels.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSkip;
    impl Strategy for AlwaysSkip {
        fn on_candle(&self, _candle: &Candle, _grid: &GridParams) -> Option<StrategyDecision> {
            None
        }
        fn name(&self) -> &str {
            "always_skip"
        }
    }

    #[test]
    fn object_safe_and_usable_behind_arc() {
        let strategy: std::sync::Arc<dyn Strategy> = std::sync::Arc::new(AlwaysSkip);
        let candle = Candle {
            open_ts_millis: 0,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ZERO,
        };
        let grid = GridParams {
            price_interval: Decimal::ONE,
            order_quantity: Decimal::ONE,
            buy_window_size: 1,
            sell_window_size: 1,
            price_decimals: 2,
            quantity_decimals: 6,
        };
        assert!(strategy.on_candle(&candle, &grid).is_none());
        assert_eq!(strategy.name(), "always_skip");
    }
}
