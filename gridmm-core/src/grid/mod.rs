//! The Slot Grid (spec.md §3/§4.3): a concurrent price-keyed slot table.
//! Slots are created lazily and never destroyed during a run; the table is
//! bounded in practice by `buy_window + sell_window + transient overshoot`.

pub mod slot;

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

pub use slot::{PositionStatus, Slot, SlotSnapshot, SlotStatus, TransitionError};

/// Grid-wide parameters (spec.md §3 "Grid"). Hot-updatable fields
/// (`price_interval`, `order_quantity`, window sizes) are held here rather
/// than duplicated per slot so `ApplyConfigUpdate` can swap them in one
/// place.
#[derive(Debug, Clone, Copy)]
pub struct GridParams {
    pub price_interval: Decimal,
    pub order_quantity: Decimal,
    pub buy_window_size: u32,
    pub sell_window_size: u32,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
}

/// Round `price` down to the nearest grid-aligned level: `floor(p/interval) * interval`.
pub fn align_down(price: Decimal, interval: Decimal) -> Decimal {
    if interval == Decimal::ZERO {
        return price;
    }
    (price / interval).floor() * interval
}

pub struct Grid {
    params: parking_lot::RwLock<GridParams>,
    slots: DashMap<Decimal, Arc<Slot>>,
}

impl Grid {
    pub fn new(params: GridParams) -> Self {
        Self {
            params: parking_lot::RwLock::new(params),
            slots: DashMap::new(),
        }
    }

    pub fn params(&self) -> GridParams {
        *self.params.read()
    }

    pub fn set_params(&self, params: GridParams) {
        *self.params.write() = params;
    }

    /// `order_quantity` expressed as base-asset quantity at `price`.
    pub fn quantity_at(&self, price: Decimal) -> Decimal {
        let p = self.params();
        if price == Decimal::ZERO {
            return Decimal::ZERO;
        }
        (p.order_quantity / price).round_dp(p.quantity_decimals)
    }

    pub fn aligned_price(&self, price: Decimal) -> Decimal {
        let p = self.params();
        align_down(price, p.price_interval).round_dp(p.price_decimals)
    }

    /// `get_or_create(price)` — idempotent; `price` must already be
    /// grid-aligned (callers use [`Grid::aligned_price`]).
    pub fn get_or_create(&self, price: Decimal) -> Arc<Slot> {
        if let Some(slot) = self.slots.get(&price) {
            return slot.clone();
        }
        self.slots
            .entry(price)
            .or_insert_with(|| Arc::new(Slot::new(price)))
            .clone()
    }

    pub fn get(&self, price: Decimal) -> Option<Arc<Slot>> {
        self.slots.get(&price).map(|s| s.clone())
    }

    /// All slots currently tracked, for snapshotting in `AdjustOrders`.
    pub fn all_slots(&self) -> Vec<Arc<Slot>> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }

    pub fn filled_slots(&self) -> Vec<Arc<Slot>> {
        self.slots
            .iter()
            .filter(|e| e.value().snapshot().position_status == PositionStatus::Filled)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> GridParams {
        GridParams {
            price_interval: dec!(2),
            order_quantity: dec!(30),
            buy_window_size: 3,
            sell_window_size: 3,
            price_decimals: 2,
            quantity_decimals: 6,
        }
    }

    #[test]
    fn align_down_snaps_to_grid() {
        assert_eq!(align_down(dec!(101.3), dec!(2)), dec!(100));
        assert_eq!(align_down(dec!(100.0), dec!(2)), dec!(100));
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let grid = Grid::new(params());
        let a = grid.get_or_create(dec!(98));
        let b = grid.get_or_create(dec!(98));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn quantity_at_converts_notional_to_base() {
        let grid = Grid::new(params());
        let qty = grid.quantity_at(dec!(98));
        assert_eq!(qty, (dec!(30) / dec!(98)).round_dp(6));
    }

    #[test]
    fn filled_slots_filters_by_position_status() {
        let grid = Grid::new(params());
        let s1 = grid.get_or_create(dec!(98));
        let s2 = grid.get_or_create(dec!(96));
        s1.reserve_buy("b1").unwrap();
        s1.confirm_buy_filled(dec!(98), dec!(0.3)).unwrap();

        let filled = grid.filled_slots();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].price, dec!(98));
        let _ = s2;
    }
}
