//! A single grid price level (spec.md §3 "Slot") and the state machine
//! that enforces invariants I1-I5 on every transition.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Whether this slot currently has an order intent in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free,
    Reserved,
    Busy,
}

/// Whether this slot currently attributes inventory to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Empty,
    Filled,
}

/// Mutable slot state, always accessed through [`Slot::mutate`] so every
/// transition is checked against I1-I4 before it commits.
#[derive(Debug, Clone)]
struct SlotState {
    slot_status: SlotStatus,
    position_status: PositionStatus,
    position_qty: Decimal,
    buy_order_id: Option<String>,
    sell_order_id: Option<String>,
    entry_price: Decimal,
    last_transition_ts: i64,
}

impl SlotState {
    fn fresh() -> Self {
        Self {
            slot_status: SlotStatus::Free,
            position_status: PositionStatus::Empty,
            position_qty: Decimal::ZERO,
            buy_order_id: None,
            sell_order_id: None,
            entry_price: Decimal::ZERO,
            last_transition_ts: now_millis(),
        }
    }

    /// I1: Free implies no resting order ids.
    /// I2: Empty implies zero qty.
    /// I4: never both a live buy and a live sell.
    fn violates_invariants(&self) -> Option<&'static str> {
        if self.slot_status == SlotStatus::Free
            && (self.buy_order_id.is_some() || self.sell_order_id.is_some())
        {
            return Some("I1: Free slot must not hold an order id");
        }
        if self.position_status == PositionStatus::Empty && self.position_qty != Decimal::ZERO {
            return Some("I2: Empty slot must have zero position_qty");
        }
        if self.buy_order_id.is_some() && self.sell_order_id.is_some() {
            return Some("I4: slot cannot have both a live buy and a live sell");
        }
        None
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The primitive unit of the grid: a price level with its own mutex so
/// transitions on different slots never contend (spec.md §5).
pub struct Slot {
    pub price: Decimal,
    state: Mutex<SlotState>,
}

/// Reported reason a requested transition did not apply. The grid never
/// panics on an invalid transition (spec.md §4.3): it logs and no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Preconditions for the requested transition were not met.
    PreconditionFailed,
    /// Applying the transition would itself violate an invariant (should be
    /// unreachable if preconditions are checked correctly; logged loudly).
    InvariantViolation,
}

/// A read-only view of a slot's state, returned by `snapshot`.
#[derive(Debug, Clone, Copy)]
pub struct SlotSnapshot {
    pub price: Decimal,
    pub slot_status: SlotStatus,
    pub position_status: PositionStatus,
    pub position_qty: Decimal,
    pub entry_price: Decimal,
    pub last_transition_ts: i64,
}

impl Slot {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            state: Mutex::new(SlotState::fresh()),
        }
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        let s = self.state.lock();
        SlotSnapshot {
            price: self.price,
            slot_status: s.slot_status,
            position_status: s.position_status,
            position_qty: s.position_qty,
            entry_price: s.entry_price,
            last_transition_ts: s.last_transition_ts,
        }
    }

    pub fn buy_order_id(&self) -> Option<String> {
        self.state.lock().buy_order_id.clone()
    }

    pub fn sell_order_id(&self) -> Option<String> {
        self.state.lock().sell_order_id.clone()
    }

    /// `reserve_buy` (spec.md §4.3): requires Free/Empty.
    pub fn reserve_buy(&self, order_id: &str) -> Result<(), TransitionError> {
        self.mutate("reserve_buy", |s| {
            if s.slot_status != SlotStatus::Free || s.position_status != PositionStatus::Empty {
                return Err(TransitionError::PreconditionFailed);
            }
            s.slot_status = SlotStatus::Reserved;
            s.buy_order_id = Some(order_id.to_string());
            Ok(())
        })
    }

    /// `begin_buy_reservation` (spec.md §1.2 "at most one in-flight
    /// intention per slot"): claims a Free/Empty slot for an about-to-be
    /// submitted buy *before* the place call leaves the manager mutex, so a
    /// concurrent `AdjustOrders` pass computing its own deltas sees this
    /// slot as Busy rather than Free and does not also claim it. Resolved
    /// by `commit_buy_reserved` or `abort_buy_reservation` once the place
    /// call returns.
    pub fn begin_buy_reservation(&self) -> Result<(), TransitionError> {
        self.mutate("begin_buy_reservation", |s| {
            if s.slot_status != SlotStatus::Free || s.position_status != PositionStatus::Empty {
                return Err(TransitionError::PreconditionFailed);
            }
            s.slot_status = SlotStatus::Busy;
            Ok(())
        })
    }

    /// Commits a successful placement: Busy -> Reserved with the resulting
    /// order id.
    pub fn commit_buy_reserved(&self, order_id: &str) -> Result<(), TransitionError> {
        self.mutate("commit_buy_reserved", |s| {
            if s.slot_status != SlotStatus::Busy {
                return Err(TransitionError::PreconditionFailed);
            }
            s.slot_status = SlotStatus::Reserved;
            s.buy_order_id = Some(order_id.to_string());
            Ok(())
        })
    }

    /// Reverts a failed placement: Busy -> Free. No-op (logged) if the slot
    /// is not Busy, which can happen if a reconciler or order-event
    /// transition already reset it while the place call was in flight.
    pub fn abort_buy_reservation(&self) {
        let mut s = self.state.lock();
        if s.slot_status == SlotStatus::Busy {
            s.slot_status = SlotStatus::Free;
            s.last_transition_ts = now_millis();
        }
    }

    /// `confirm_buy_filled`.
    pub fn confirm_buy_filled(&self, avg_price: Decimal, qty: Decimal) -> Result<(), TransitionError> {
        self.mutate("confirm_buy_filled", |s| {
            s.position_status = PositionStatus::Filled;
            s.slot_status = SlotStatus::Free;
            s.buy_order_id = None;
            s.entry_price = avg_price;
            s.position_qty = qty;
            Ok(())
        })
    }

    /// `reserve_sell`: requires Filled and no existing sell order. Sets
    /// `slot_status = Reserved` (mirroring `reserve_buy`) so I1 holds while
    /// the sell order is live: a slot with a resting order, buy or sell,
    /// is never reported `Free`.
    pub fn reserve_sell(&self, order_id: &str) -> Result<(), TransitionError> {
        self.mutate("reserve_sell", |s| {
            if s.position_status != PositionStatus::Filled || s.sell_order_id.is_some() {
                return Err(TransitionError::PreconditionFailed);
            }
            s.sell_order_id = Some(order_id.to_string());
            s.slot_status = SlotStatus::Reserved;
            Ok(())
        })
    }

    /// `begin_sell_reservation`: the sell-side counterpart of
    /// `begin_buy_reservation`, claimed on a just-filled slot (Filled,
    /// Free, no resting sell) before the place call leaves the manager
    /// mutex.
    pub fn begin_sell_reservation(&self) -> Result<(), TransitionError> {
        self.mutate("begin_sell_reservation", |s| {
            if s.position_status != PositionStatus::Filled
                || s.slot_status != SlotStatus::Free
                || s.sell_order_id.is_some()
            {
                return Err(TransitionError::PreconditionFailed);
            }
            s.slot_status = SlotStatus::Busy;
            Ok(())
        })
    }

    /// Commits a successful sell placement: Busy -> Reserved.
    pub fn commit_sell_reserved(&self, order_id: &str) -> Result<(), TransitionError> {
        self.mutate("commit_sell_reserved", |s| {
            if s.slot_status != SlotStatus::Busy || s.position_status != PositionStatus::Filled {
                return Err(TransitionError::PreconditionFailed);
            }
            s.slot_status = SlotStatus::Reserved;
            s.sell_order_id = Some(order_id.to_string());
            Ok(())
        })
    }

    /// Reverts a failed sell placement: Busy -> Free (position remains
    /// Filled, awaiting another sell attempt next cycle).
    pub fn abort_sell_reservation(&self) {
        let mut s = self.state.lock();
        if s.slot_status == SlotStatus::Busy {
            s.slot_status = SlotStatus::Free;
            s.last_transition_ts = now_millis();
        }
    }

    /// `confirm_sell_filled`: requires Filled and a matching sell order id.
    /// Returns the trade's entry/exit/qty for the caller to build a
    /// `TradeRecord`; resets the slot to Free/Empty.
    pub fn confirm_sell_filled(
        &self,
        matching_order_id: &str,
        avg_price: Decimal,
        qty: Decimal,
    ) -> Result<(Decimal, Decimal, Decimal), TransitionError> {
        let mut s = self.state.lock();
        if s.position_status != PositionStatus::Filled {
            return Err(TransitionError::PreconditionFailed);
        }
        match &s.sell_order_id {
            Some(id) if id == matching_order_id => {}
            _ => return Err(TransitionError::PreconditionFailed),
        }
        let entry_price = s.entry_price;
        s.position_status = PositionStatus::Empty;
        s.position_qty = Decimal::ZERO;
        s.sell_order_id = None;
        s.slot_status = SlotStatus::Free;
        s.entry_price = Decimal::ZERO;
        s.last_transition_ts = now_millis();
        if let Some(reason) = s.violates_invariants() {
            error!(price = %self.price, reason, "slot invariant violation after confirm_sell_filled");
            return Err(TransitionError::InvariantViolation);
        }
        Ok((entry_price, avg_price, qty))
    }

    /// `force_clear`: unconditionally reset to Free/Empty. Used when the
    /// reconciler or a reduce-only rejection proves current state is fiction.
    pub fn force_clear(&self) {
        let mut s = self.state.lock();
        s.slot_status = SlotStatus::Free;
        s.position_status = PositionStatus::Empty;
        s.position_qty = Decimal::ZERO;
        s.buy_order_id = None;
        s.sell_order_id = None;
        s.entry_price = Decimal::ZERO;
        s.last_transition_ts = now_millis();
    }

    /// `canceled(slot, side)`: clears the order id for `side` without
    /// touching `position_status`.
    pub fn canceled(&self, side: crate::core::Side) {
        let mut s = self.state.lock();
        match side {
            crate::core::Side::Buy => {
                if s.buy_order_id.take().is_some() {
                    s.slot_status = SlotStatus::Free;
                }
            }
            crate::core::Side::Sell => {
                if s.sell_order_id.take().is_some() {
                    s.slot_status = SlotStatus::Free;
                }
            }
        }
        s.last_transition_ts = now_millis();
    }

    fn mutate(
        &self,
        name: &'static str,
        f: impl FnOnce(&mut SlotState) -> Result<(), TransitionError>,
    ) -> Result<(), TransitionError> {
        let mut s = self.state.lock();
        let before = s.clone();
        match f(&mut s) {
            Ok(()) => {
                s.last_transition_ts = now_millis();
                if let Some(reason) = s.violates_invariants() {
                    error!(
                        price = %self.price,
                        transition = name,
                        reason,
                        "slot invariant violation, reverting transition"
                    );
                    *s = before;
                    Err(TransitionError::InvariantViolation)
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("Slot")
            .field("price", &snap.price)
            .field("slot_status", &snap.slot_status)
            .field("position_status", &snap.position_status)
            .field("position_qty", &snap.position_qty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn reserve_buy_requires_free_empty() {
        let slot = Slot::new(dec!(98));
        assert!(slot.reserve_buy("oid-1").is_ok());
        // Already Reserved: a second reserve_buy must fail.
        assert_eq!(
            slot.reserve_buy("oid-2"),
            Err(TransitionError::PreconditionFailed)
        );
    }

    #[test]
    fn full_round_trip_returns_to_free_empty() {
        let slot = Slot::new(dec!(98));
        slot.reserve_buy("buy-1").unwrap();
        slot.confirm_buy_filled(dec!(98.00), dec!(0.3061)).unwrap();
        assert_eq!(slot.snapshot().position_status, PositionStatus::Filled);

        slot.reserve_sell("sell-1").unwrap();
        let (entry, exit, qty) = slot
            .confirm_sell_filled("sell-1", dec!(100.00), dec!(0.3061))
            .unwrap();
        assert_eq!(entry, dec!(98.00));
        assert_eq!(exit, dec!(100.00));
        assert_eq!(qty, dec!(0.3061));

        let snap = slot.snapshot();
        assert_eq!(snap.slot_status, SlotStatus::Free);
        assert_eq!(snap.position_status, PositionStatus::Empty);
        assert_eq!(snap.position_qty, Decimal::ZERO);
    }

    #[test]
    fn reserve_buy_then_canceled_restores_original_state() {
        let slot = Slot::new(dec!(98));
        let before = slot.snapshot();
        slot.reserve_buy("buy-1").unwrap();
        slot.canceled(Side::Buy);
        let after = slot.snapshot();
        assert_eq!(before.slot_status, after.slot_status);
        assert_eq!(before.position_status, after.position_status);
        assert_eq!(before.position_qty, after.position_qty);
    }

    #[test]
    fn reserve_sell_then_canceled_restores_filled_state() {
        let slot = Slot::new(dec!(98));
        slot.reserve_buy("buy-1").unwrap();
        slot.confirm_buy_filled(dec!(98), dec!(0.3)).unwrap();
        let before = slot.snapshot();

        slot.reserve_sell("sell-1").unwrap();
        assert_eq!(slot.snapshot().slot_status, SlotStatus::Reserved);

        slot.canceled(Side::Sell);
        let after = slot.snapshot();
        assert_eq!(before.slot_status, after.slot_status);
        assert_eq!(before.position_status, after.position_status);
        assert_eq!(before.position_qty, after.position_qty);
    }

    #[test]
    fn cannot_reserve_sell_without_fill() {
        let slot = Slot::new(dec!(98));
        assert_eq!(
            slot.reserve_sell("sell-1"),
            Err(TransitionError::PreconditionFailed)
        );
    }

    #[test]
    fn force_clear_resets_regardless_of_state() {
        let slot = Slot::new(dec!(98));
        slot.reserve_buy("buy-1").unwrap();
        slot.confirm_buy_filled(dec!(98), dec!(0.3)).unwrap();
        slot.force_clear();
        let snap = slot.snapshot();
        assert_eq!(snap.slot_status, SlotStatus::Free);
        assert_eq!(snap.position_status, PositionStatus::Empty);
    }
}

/// P1 (spec.md §8): "for every slot, I1-I4 hold" under any reachable
/// sequence of transitions. Rather than enumerate reachable states by
/// hand, drive a single slot through random action sequences and check
/// the invariant holds after every step, whether the action applied or
/// was rejected as a precondition failure.
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::core::Side;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[derive(Debug, Clone, Copy)]
    enum Action {
        ReserveBuy,
        ReserveSell,
        ConfirmBuyFilled,
        ConfirmSellFilled,
        CancelBuy,
        CancelSell,
        ForceClear,
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::ReserveBuy),
            Just(Action::ReserveSell),
            Just(Action::ConfirmBuyFilled),
            Just(Action::ConfirmSellFilled),
            Just(Action::CancelBuy),
            Just(Action::CancelSell),
            Just(Action::ForceClear),
        ]
    }

    /// I1: Free implies no resting order id on either side.
    fn check_i1(slot: &Slot) {
        let snap = slot.snapshot();
        if snap.slot_status == SlotStatus::Free {
            assert!(slot.buy_order_id().is_none(), "I1 violated: Free slot has a buy_order_id");
            assert!(slot.sell_order_id().is_none(), "I1 violated: Free slot has a sell_order_id");
        }
    }

    /// I2: Empty implies zero position_qty.
    fn check_i2(slot: &Slot) {
        let snap = slot.snapshot();
        if snap.position_status == PositionStatus::Empty {
            assert_eq!(snap.position_qty, Decimal::ZERO, "I2 violated: Empty slot has nonzero position_qty");
        }
    }

    /// I4: never both a live buy and a live sell at once.
    fn check_i4(slot: &Slot) {
        assert!(
            !(slot.buy_order_id().is_some() && slot.sell_order_id().is_some()),
            "I4 violated: slot has both a live buy and a live sell"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// P1: invariants I1, I2, I4 hold after every step of any reachable
        /// action sequence (whether or not the step's precondition is met).
        #[test]
        fn invariants_hold_after_any_action_sequence(actions in prop::collection::vec(action_strategy(), 0..32)) {
            let slot = Slot::new(dec!(100));
            let mut buy_oid = 0u32;
            let mut sell_oid = 0u32;

            for action in actions {
                match action {
                    Action::ReserveBuy => {
                        buy_oid += 1;
                        let _ = slot.reserve_buy(&format!("buy-{buy_oid}"));
                    }
                    Action::ReserveSell => {
                        sell_oid += 1;
                        let _ = slot.reserve_sell(&format!("sell-{sell_oid}"));
                    }
                    Action::ConfirmBuyFilled => {
                        let _ = slot.confirm_buy_filled(dec!(100), dec!(0.3));
                    }
                    Action::ConfirmSellFilled => {
                        if let Some(id) = slot.sell_order_id() {
                            let _ = slot.confirm_sell_filled(&id, dec!(102), dec!(0.3));
                        }
                    }
                    Action::CancelBuy => slot.canceled(Side::Buy),
                    Action::CancelSell => slot.canceled(Side::Sell),
                    Action::ForceClear => slot.force_clear(),
                }

                check_i1(&slot);
                check_i2(&slot);
                check_i4(&slot);
            }
        }

        /// L2: reserve_buy -> canceled(Buy) is always an identity on
        /// (slot_status, position_status, position_qty), regardless of what
        /// the slot's state was beforehand, as long as the reserve succeeded.
        #[test]
        fn l2_reserve_buy_then_cancel_is_identity(seed_filled in any::<bool>()) {
            let slot = Slot::new(dec!(100));
            if seed_filled {
                slot.reserve_buy("seed").unwrap();
                slot.confirm_buy_filled(dec!(100), dec!(0.3)).unwrap();
            }
            let before = slot.snapshot();
            if slot.reserve_buy("probe").is_ok() {
                slot.canceled(Side::Buy);
                let after = slot.snapshot();
                prop_assert_eq!(before.slot_status, after.slot_status);
                prop_assert_eq!(before.position_status, after.position_status);
                prop_assert_eq!(before.position_qty, after.position_qty);
            }
        }
    }
}
