//! Desired-window computation (spec.md §4.4.1-§4.4.2): given the latest
//! price, work out which (price, side) pairs SHOULD have a resting order
//! and diff that against what the grid already has live.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::Side;
use crate::grid::{Grid, GridParams, PositionStatus, Slot, SlotStatus};

/// One order the executor should place this cycle.
#[derive(Debug, Clone)]
pub struct PlaceIntent {
    pub slot: Arc<Slot>,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// One resting order the executor should cancel this cycle.
#[derive(Debug, Clone)]
pub struct CancelIntent {
    pub slot: Arc<Slot>,
    pub side: Side,
    pub order_id: String,
}

/// Output of one `AdjustOrders` snapshot+diff pass (spec.md §4.4.2 steps 1-3).
#[derive(Debug, Default)]
pub struct Deltas {
    pub to_cancel: Vec<CancelIntent>,
    pub to_place: Vec<PlaceIntent>,
}

/// `base - k*interval` for `k = 1..=window`, the desired buy ladder below
/// `base` (spec.md §4.4.1).
fn buy_levels(base: Decimal, params: &GridParams, window: u32) -> Vec<Decimal> {
    (1..=window)
        .map(|k| (base - params.price_interval * Decimal::from(k)).round_dp(params.price_decimals))
        .collect()
}

/// Snapshot the grid and compute the cancel/place deltas for one adjust
/// cycle. `effective_buy_window` lets the caller apply the one-cycle margin
/// shrink (spec.md §4.4.2 step 6) without mutating grid parameters.
pub fn compute_deltas(
    grid: &Grid,
    price: Decimal,
    effective_buy_window: u32,
    risk_paused: bool,
    extra_buys: &[Decimal],
) -> Deltas {
    let params = grid.params();
    let base = grid.aligned_price(price);

    // want_buys: §4.4.1 buy ladder, restricted to slots that are currently
    // Free/Empty (a Filled or already-Reserved slot is never a buy
    // candidate). Risk pause (§4.5.2) makes this ladder empty outright so
    // every existing buy falls into `to_cancel` below. `extra_buys` folds in
    // any strategy-proposed entries (spec.md §9 "Design Notes" / optional
    // `Strategy` capability) outside the plain ladder, subject to the same
    // Free/Empty eligibility check; a risk pause suppresses these too.
    let mut want_buys: HashSet<Decimal> = HashSet::new();
    if !risk_paused {
        for level in buy_levels(base, &params, effective_buy_window).into_iter().chain(
            extra_buys
                .iter()
                .map(|p| p.round_dp(params.price_decimals)),
        ) {
            let slot = grid.get_or_create(level);
            let snap = slot.snapshot();
            if snap.position_status == PositionStatus::Empty && snap.slot_status == SlotStatus::Free {
                want_buys.insert(level);
            }
        }
    }

    // want_sells: one step above every Filled slot that lies in the
    // combined buy+sell window around `base` (spec.md §4.4.1).
    let lower_bound = base - params.price_interval * Decimal::from(params.buy_window_size);
    let upper_bound = base + params.price_interval * Decimal::from(params.sell_window_size);
    let mut want_sells: HashMap<Decimal, Arc<Slot>> = HashMap::new();
    for slot in grid.filled_slots() {
        if slot.price >= lower_bound && slot.price <= upper_bound {
            // Only a Free slot (no resting sell, no place already in
            // flight) is a fresh sell candidate; a Busy/Reserved slot
            // already has an intention accounted for this cycle.
            if slot.snapshot().slot_status == SlotStatus::Free {
                let sell_price = (slot.price + params.price_interval).round_dp(params.price_decimals);
                want_sells.insert(sell_price, slot);
            }
        }
    }

    // Existing open orders, keyed the same way as the desired sets above so
    // set difference is a straight key comparison.
    let mut existing_buys: HashMap<Decimal, Arc<Slot>> = HashMap::new();
    let mut existing_sells: HashMap<Decimal, Arc<Slot>> = HashMap::new();
    for slot in grid.all_slots() {
        if slot.buy_order_id().is_some() {
            existing_buys.insert(slot.price, slot.clone());
        }
        if slot.sell_order_id().is_some() {
            let sell_price = (slot.price + params.price_interval).round_dp(params.price_decimals);
            existing_sells.insert(sell_price, slot.clone());
        }
    }

    let mut deltas = Deltas::default();

    for (price, slot) in &existing_buys {
        if !want_buys.contains(price) {
            if let Some(order_id) = slot.buy_order_id() {
                deltas.to_cancel.push(CancelIntent {
                    slot: slot.clone(),
                    side: Side::Buy,
                    order_id,
                });
            }
        }
    }
    for (price, slot) in &existing_sells {
        if !want_sells.contains_key(price) {
            if let Some(order_id) = slot.sell_order_id() {
                deltas.to_cancel.push(CancelIntent {
                    slot: slot.clone(),
                    side: Side::Sell,
                    order_id,
                });
            }
        }
    }

    // Claiming the slot (Free -> Busy) here, under the same manager-mutex
    // critical section that produced `want_buys`/`want_sells`, is what
    // keeps two concurrent `AdjustOrders` passes from both selecting the
    // same slot: the losing pass's `begin_*_reservation` simply fails its
    // precondition and the intent is dropped for this cycle.
    for price in &want_buys {
        if !existing_buys.contains_key(price) {
            let slot = grid.get_or_create(*price);
            if slot.begin_buy_reservation().is_ok() {
                deltas.to_place.push(PlaceIntent {
                    slot,
                    side: Side::Buy,
                    price: *price,
                    quantity: grid.quantity_at(*price),
                });
            }
        }
    }
    for (sell_price, owning_slot) in &want_sells {
        if !existing_sells.contains_key(sell_price) && owning_slot.begin_sell_reservation().is_ok() {
            let quantity = owning_slot.snapshot().position_qty;
            deltas.to_place.push(PlaceIntent {
                slot: owning_slot.clone(),
                side: Side::Sell,
                price: *sell_price,
                quantity,
            });
        }
    }

    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridParams;
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
    fn cold_start_wants_buy_ladder_only() {
        let grid = Grid::new(params());
        let deltas = compute_deltas(&grid, dec!(100), 3, false, &[]);
        assert_eq!(deltas.to_cancel.len(), 0);
        let mut prices: Vec<Decimal> = deltas
            .to_place
            .iter()
            .filter(|p| p.side == Side::Buy)
            .map(|p| p.price)
            .collect();
        prices.sort();
        assert_eq!(prices, vec![dec!(94), dec!(96), dec!(98)]);
        assert!(deltas.to_place.iter().all(|p| p.side == Side::Buy));
    }

    #[test]
    fn filled_slot_wants_a_sell_one_interval_above() {
        let grid = Grid::new(params());
        let slot = grid.get_or_create(dec!(98));
        slot.reserve_buy("b1").unwrap();
        slot.confirm_buy_filled(dec!(98), dec!(0.3)).unwrap();

        let deltas = compute_deltas(&grid, dec!(100), 3, false, &[]);
        let sell = deltas.to_place.iter().find(|p| p.side == Side::Sell).unwrap();
        assert_eq!(sell.price, dec!(100));
        assert_eq!(sell.quantity, dec!(0.3));
    }

    #[test]
    fn risk_paused_wants_no_buys() {
        let grid = Grid::new(params());
        let deltas = compute_deltas(&grid, dec!(100), 3, true, &[]);
        assert!(deltas.to_place.iter().all(|p| p.side != Side::Buy));
    }

    #[test]
    fn already_reserved_buy_is_not_requested_again() {
        let grid = Grid::new(params());
        let slot = grid.get_or_create(dec!(98));
        slot.reserve_buy("b1").unwrap();

        let deltas = compute_deltas(&grid, dec!(100), 3, false, &[]);
        assert!(!deltas.to_place.iter().any(|p| p.price == dec!(98)));
        assert!(deltas.to_cancel.is_empty());
    }

    #[test]
    fn sell_falling_outside_window_is_canceled() {
        let grid = Grid::new(params());
        let slot = grid.get_or_create(dec!(98));
        slot.reserve_buy("b1").unwrap();
        slot.confirm_buy_filled(dec!(98), dec!(0.3)).unwrap();
        slot.reserve_sell("s1").unwrap();

        // Price has moved far enough away that slot(98) is outside the
        // combined window; the resting sell should be canceled.
        let deltas = compute_deltas(&grid, dec!(200), 3, false, &[]);
        assert!(deltas
            .to_cancel
            .iter()
            .any(|c| c.side == Side::Sell && c.order_id == "s1"));
    }

    #[test]
    fn strategy_extra_buy_outside_ladder_is_placed() {
        let grid = Grid::new(params());
        // 80 is outside the buy_window=3 ladder around 100 (94/96/98), but a
        // Strategy capability may still propose it as an entry.
        let deltas = compute_deltas(&grid, dec!(100), 3, false, &[dec!(80)]);
        assert!(deltas
            .to_place
            .iter()
            .any(|p| p.side == Side::Buy && p.price == dec!(80)));
    }

    #[test]
    fn strategy_extra_buy_on_non_free_slot_is_ignored() {
        let grid = Grid::new(params());
        let slot = grid.get_or_create(dec!(80));
        slot.reserve_buy("b1").unwrap();
        slot.confirm_buy_filled(dec!(80), dec!(0.3)).unwrap();

        let deltas = compute_deltas(&grid, dec!(100), 3, false, &[dec!(80)]);
        assert!(!deltas
            .to_place
            .iter()
            .any(|p| p.side == Side::Buy && p.price == dec!(80)));
    }
}
