//! Position Manager (C4, spec.md §4.4): the algorithmic core. Continuously
//! reconciles the grid's desired quoting window against live orders and
//! position, driving the Order Executor, while a per-symbol manager mutex
//! guarantees only one `AdjustOrders` pass runs at a time.

pub mod desired;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::core::{ClientOid, ErrKind, OrderEventStatus, Side};
use crate::exchange::{AccountPosition, Exchange, OrderEvent, PlaceRequest};
use crate::executor::{BatchResult, OrderExecutor};
use crate::grid::{Grid, PositionStatus, SlotStatus};
use crate::monitoring::metrics::MetricsRegistry;
use crate::persistence::{TradeRecord, TradeStorage};
use crate::strategy::{StrategyAction, StrategyDecision};

use desired::{compute_deltas, CancelIntent, PlaceIntent};

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Outcome of one `AdjustOrders` pass, returned for logging/tests; not part
/// of the spec's public contract but useful for assertions.
#[derive(Debug, Default, Clone)]
pub struct AdjustReport {
    pub canceled: usize,
    pub placed: usize,
    pub had_margin_error: bool,
    pub reduce_only_cleared: usize,
}

/// The Position Manager (spec.md §4.4). One instance per traded symbol,
/// owned by a [`crate::runtime::SymbolRuntime`].
pub struct PositionManager {
    symbol: String,
    grid: Arc<Grid>,
    executor: Arc<OrderExecutor>,
    storage: Arc<dyn TradeStorage>,
    metrics: Arc<MetricsRegistry>,

    /// Serializes the compute-deltas and post-process steps of
    /// `AdjustOrders` (spec.md §5); released while cancel/place network
    /// calls are in flight so I/O never blocks a concurrent event's
    /// snapshot step.
    manager_mutex: tokio::sync::Mutex<()>,

    /// Set by the Safety circuit breaker (spec.md §4.5.2); while true, no
    /// new buys are computed into the desired window.
    risk_paused: AtomicBool,

    /// One-shot reduction applied to `buy_window_size` for the *next*
    /// `AdjustOrders` call only (spec.md §4.4.2 step 6: "does not
    /// persist"). A `MarginInsufficient` rejection is detected only after
    /// this cycle's batch has already been submitted at full window size,
    /// so the shrink cannot retroactively apply to the cycle that
    /// triggered it; it instead guards the very next cycle from repeating
    /// the same over-extension before backing off.
    margin_shrink_next_cycle: AtomicU32,

    /// Optional strategy-driven-entry capability (spec.md §9 "Design
    /// Notes"). `None` means the grid quotes its plain ladder only.
    strategy: Option<Arc<dyn crate::strategy::Strategy>>,

    /// Net window-size bias accumulated from `WidenWindow`/`NarrowWindow`
    /// strategy decisions. Unlike the one-shot margin shrink above, this
    /// persists cycle to cycle: a strategy's read on volatility is a
    /// standing judgment, not a one-off overextension signal.
    strategy_window_bias: AtomicI32,

    /// Extra buy prices proposed by the strategy's `EnterBuy` action for the
    /// next `adjust_orders` pass, outside the plain ladder.
    pending_strategy_buys: Mutex<Vec<Decimal>>,
}

impl PositionManager {
    pub fn new(
        symbol: impl Into<String>,
        grid: Arc<Grid>,
        executor: Arc<OrderExecutor>,
        storage: Arc<dyn TradeStorage>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            grid,
            executor,
            storage,
            metrics,
            manager_mutex: tokio::sync::Mutex::new(()),
            risk_paused: AtomicBool::new(false),
            margin_shrink_next_cycle: AtomicU32::new(0),
            strategy: None,
            strategy_window_bias: AtomicI32::new(0),
            pending_strategy_buys: Mutex::new(Vec::new()),
        }
    }

    /// Attaches the optional strategy-driven-entry capability (spec.md §9).
    pub fn with_strategy(mut self, strategy: Arc<dyn crate::strategy::Strategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Set by the Safety risk monitor when a `RiskEvent` trips or clears
    /// (spec.md §4.5.2 / P5).
    pub fn set_risk_paused(&self, paused: bool) {
        self.risk_paused.store(paused, Ordering::Release);
    }

    pub fn is_risk_paused(&self) -> bool {
        self.risk_paused.load(Ordering::Acquire)
    }

    /// Feeds one closed candle to the attached strategy (if any) and applies
    /// its decision (spec.md §9). A no-op when no strategy is attached.
    /// Called at the same cadence as the Safety candle reader (T4); the
    /// resulting bias/entry is picked up by the *next* `adjust_orders` call.
    pub fn on_strategy_candle(&self, candle: &crate::exchange::Candle) {
        let Some(strategy) = &self.strategy else { return };
        let params = self.grid.params();
        let Some(decision) = strategy.on_candle(candle, &params) else { return };
        self.apply_strategy_decision(strategy.name(), decision);
    }

    fn apply_strategy_decision(&self, strategy_name: &str, decision: StrategyDecision) {
        match decision.action {
            StrategyAction::Skip => {}
            StrategyAction::EnterBuy => {
                debug!(
                    symbol = %self.symbol,
                    strategy = strategy_name,
                    price = %decision.price,
                    reason = %decision.reason,
                    "strategy proposed an extra buy entry"
                );
                self.pending_strategy_buys.lock().push(decision.price);
            }
            StrategyAction::WidenWindow => {
                debug!(symbol = %self.symbol, strategy = strategy_name, reason = %decision.reason, "strategy widened the buy window");
                self.strategy_window_bias.fetch_add(1, Ordering::AcqRel);
            }
            StrategyAction::NarrowWindow => {
                debug!(symbol = %self.symbol, strategy = strategy_name, reason = %decision.reason, "strategy narrowed the buy window");
                self.strategy_window_bias.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    /// `AdjustOrders(price)` (spec.md §4.4.2): the single entry point
    /// driving the executor. Invoked on every `PriceEvent`, every
    /// state-changing `OrderEvent`, every `ReconcileTick`, and once
    /// immediately after `Initialize`.
    pub async fn adjust_orders(&self, price: Decimal) -> AdjustReport {
        let effective_buy_window = {
            let params = self.grid.params();
            let shrink = self.margin_shrink_next_cycle.swap(0, Ordering::AcqRel);
            let bias = self.strategy_window_bias.load(Ordering::Acquire);
            (params.buy_window_size as i64 - shrink as i64 + bias as i64).clamp(0, u32::MAX as i64) as u32
        };
        let extra_buys = std::mem::take(&mut *self.pending_strategy_buys.lock());

        // Steps 1-3: snapshot + compute deltas, under the manager mutex.
        let deltas = {
            let _guard = self.manager_mutex.lock().await;
            compute_deltas(
                &self.grid,
                price,
                effective_buy_window,
                self.risk_paused.load(Ordering::Acquire),
                &extra_buys,
            )
        };

        // Step 4: apply cancels first, to free slots and margin. The
        // manager mutex is released during this network round trip
        // (spec.md §5).
        let cancel_ids: Vec<String> = deltas.to_cancel.iter().map(|c| c.order_id.clone()).collect();
        let (canceled_ids, _cancel_failures) = if cancel_ids.is_empty() {
            (Vec::new(), HashMap::new())
        } else {
            self.executor.batch_cancel(&self.symbol, cancel_ids).await
        };

        // Step 5: apply places.
        let place_reqs = self.build_place_requests(&deltas.to_place);
        let place_result = if place_reqs.is_empty() {
            BatchResult::default()
        } else {
            self.executor.batch_place(place_reqs).await
        };

        // Step 6: post-process under the manager mutex again.
        let _guard = self.manager_mutex.lock().await;
        let mut report = AdjustReport::default();

        for intent in &deltas.to_cancel {
            if canceled_ids.contains(&intent.order_id) {
                intent.slot.canceled(intent.side);
                report.canceled += 1;
            }
        }

        self.apply_place_result(&deltas.to_place, &place_result, &mut report);

        self.metrics.grid_slots_total.set(self.grid.len() as i64);
        self.metrics
            .grid_slots_filled
            .set(self.grid.filled_slots().len() as i64);
        let net_qty: Decimal = self
            .grid
            .filled_slots()
            .iter()
            .map(|s| s.snapshot().position_qty)
            .sum();
        self.metrics.open_position_qty.set(net_qty.to_f64().unwrap_or(0.0));

        report
    }

    fn build_place_requests(&self, intents: &[PlaceIntent]) -> Vec<PlaceRequest> {
        let price_decimals = self.grid.params().price_decimals;
        intents
            .iter()
            .map(|intent| {
                let client_oid = ClientOid::new(intent.side, intent.price, price_decimals).to_string();
                PlaceRequest {
                    symbol: self.symbol.clone(),
                    client_oid,
                    side: intent.side,
                    price: intent.price,
                    quantity: intent.quantity,
                    reduce_only: intent.side == Side::Sell,
                }
            })
            .collect()
    }

    /// `AdjustOrders` step 6 (spec.md §4.4.2): react to each outcome in
    /// `BatchResult` and commit the matching grid transition.
    ///
    /// Every intent here was marked `Busy` back in `compute_deltas`, before
    /// the place call left the manager mutex; this pass resolves each one,
    /// either to `Reserved` (placed) or back to its prior state (rejected,
    /// for whatever reason the executor reports, or not reported at all in
    /// the `had_margin_error` aggregate case) so the slot isn't left Busy
    /// forever.
    fn apply_place_result(&self, intents: &[PlaceIntent], result: &BatchResult, report: &mut AdjustReport) {
        let price_decimals = self.grid.params().price_decimals;

        // Match placed orders back to the intent that produced them so we
        // can commit the correct slot/side without recomputing the
        // client_oid (which would need the nonce). One cycle never emits
        // two place intents for the same (side, price) pair.
        for intent in intents {
            let placed = result
                .placed
                .iter()
                .find(|o| o.side == intent.side && o.price == intent.price);
            match placed {
                Some(order) => {
                    let outcome = match intent.side {
                        Side::Buy => intent.slot.commit_buy_reserved(&order.client_oid),
                        Side::Sell => intent.slot.commit_sell_reserved(&order.client_oid),
                    };
                    if let Err(e) = outcome {
                        warn!(
                            symbol = %self.symbol,
                            price = %order.price,
                            side = %intent.side,
                            ?e,
                            "could not commit placed order to slot"
                        );
                    } else {
                        report.placed += 1;
                    }
                }
                None => match intent.side {
                    Side::Buy => intent.slot.abort_buy_reservation(),
                    Side::Sell => intent.slot.abort_sell_reservation(),
                },
            }
        }

        if result.had_margin_error {
            warn!(symbol = %self.symbol, "margin insufficient; shrinking buy window by one level next cycle");
            report.had_margin_error = true;
            self.margin_shrink_next_cycle.fetch_add(1, Ordering::AcqRel);
        }

        for client_oid in &result.reduce_only_rejects {
            if let Ok(oid) = client_oid.parse::<ClientOid>() {
                if oid.side == Side::Sell {
                    let price = oid.price(price_decimals);
                    let slot = self.grid.get_or_create(price);
                    warn!(symbol = %self.symbol, %price, "reduce-only reject: force-clearing stale Filled slot");
                    slot.force_clear();
                    report.reduce_only_cleared += 1;
                }
            } else {
                error!(symbol = %self.symbol, %client_oid, "could not decode reduce-only reject client_oid");
            }
        }

        for (client_oid, kind) in &result.other_errors {
            debug!(symbol = %self.symbol, %client_oid, kind = %kind, "place request failed, slot remains free");
        }
    }

    /// `OnOrderUpdate(event)` (spec.md §4.4.3): decode `client_oid`,
    /// recover the owning slot, and apply the matching transition. Always
    /// followed by one `AdjustOrders` pass to re-close the window.
    pub async fn on_order_update(&self, event: OrderEvent, latest_price: Decimal) {
        let price_decimals = self.grid.params().price_decimals;
        let oid = match event.client_oid.parse::<ClientOid>() {
            Ok(oid) => oid,
            Err(e) => {
                warn!(symbol = %self.symbol, client_oid = %event.client_oid, %e, "dropping unparseable order event");
                return;
            }
        };
        let price = oid.price(price_decimals);
        let slot = self.grid.get_or_create(price);

        match event.status {
            OrderEventStatus::New | OrderEventStatus::PartiallyFilled => {
                // Ack/partial: the slot already transitioned to Reserved at
                // placement time; nothing further to do until a terminal
                // status arrives.
            }
            OrderEventStatus::Filled => {
                let qty = event
                    .filled_qty
                    .unwrap_or_else(|| self.grid.quantity_at(price));
                let avg_price = event.avg_price.unwrap_or(price);
                match oid.side {
                    Side::Buy => {
                        if slot.confirm_buy_filled(avg_price, qty).is_ok() {
                            info!(symbol = %self.symbol, %price, %qty, "buy filled");
                        }
                    }
                    Side::Sell => {
                        match slot.confirm_sell_filled(&event.client_oid, avg_price, qty) {
                            Ok((entry_price, exit_price, qty)) => {
                                let pnl = (exit_price - entry_price) * qty - event.fee.unwrap_or(Decimal::ZERO);
                                info!(symbol = %self.symbol, %entry_price, %exit_price, %qty, %pnl, "sell filled, round trip closed");
                                self.metrics.realized_pnl.add(pnl.to_f64().unwrap_or(0.0));
                                self.storage
                                    .save_trade(TradeRecord {
                                        symbol: self.symbol.clone(),
                                        entry_price,
                                        exit_price,
                                        quantity: qty,
                                        fees: event.fee.unwrap_or(Decimal::ZERO),
                                        pnl,
                                        ts_millis: now_millis(),
                                    })
                                    .await;
                            }
                            Err(_) => {
                                // Idempotent: a duplicate Filled event (B4)
                                // or a sell we no longer believe is live.
                                // No-op.
                            }
                        }
                    }
                }
            }
            OrderEventStatus::Canceled => {
                slot.canceled(oid.side);
            }
            OrderEventStatus::Rejected => {
                slot.canceled(oid.side);
                if let Some(ErrKind::ReduceOnlyNoPosition) = event.reason {
                    warn!(symbol = %self.symbol, %price, "reduce-only reject on OrderEvent: force-clearing slot");
                    slot.force_clear();
                } else if let Some(reason) = event.reason {
                    warn!(symbol = %self.symbol, %price, %reason, "order rejected");
                }
            }
        }

        self.adjust_orders(latest_price).await;
    }

    /// `Initialize()` (spec.md §4.4.4): recover open orders and existing
    /// position from the exchange before the adjust loop starts trading.
    pub async fn initialize(&self, exchange: &dyn Exchange) -> crate::Result<()> {
        let params = self.grid.params();
        let open_orders = exchange
            .get_open_orders(&self.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("initialize: get_open_orders failed: {e}"))?;

        let mut foreign = Vec::new();
        for order in &open_orders {
            match order.client_oid.parse::<ClientOid>() {
                Ok(oid) => {
                    let price = oid.price(params.price_decimals);
                    let slot = self.grid.get_or_create(price);
                    let reserved = match oid.side {
                        Side::Buy => slot.reserve_buy(&order.client_oid),
                        Side::Sell => slot.reserve_sell(&order.client_oid),
                    };
                    if reserved.is_err() {
                        warn!(symbol = %self.symbol, %price, "initialize: could not adopt open order into slot, canceling");
                        foreign.push(order.exchange_order_id.clone());
                    }
                }
                Err(_) => {
                    info!(symbol = %self.symbol, order_id = %order.exchange_order_id, "initialize: foreign order, canceling");
                    foreign.push(order.exchange_order_id.clone());
                }
            }
        }
        if !foreign.is_empty() {
            self.executor.batch_cancel(&self.symbol, foreign).await;
        }

        let position = exchange
            .get_position(&self.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("initialize: get_position failed: {e}"))?;
        if position.net_qty > Decimal::ZERO {
            self.distribute_position(position);
        }

        let latest = exchange
            .get_latest_price(&self.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("initialize: get_latest_price failed: {e}"))?;
        self.adjust_orders(latest).await;
        Ok(())
    }

    /// Distribute a nonzero exchange-reported position across grid slots
    /// below `entry_price`, nearest-first, assigning whole lots until the
    /// position is exhausted (remainder folds into the last slot). Shared
    /// by `Initialize` (spec.md §4.4.4) and the reconciler's repair path
    /// (spec.md §4.5.3).
    pub fn distribute_position(&self, position: AccountPosition) {
        let params = self.grid.params();
        let base = self.grid.aligned_price(position.entry_price.max(Decimal::ONE));
        let lot_qty = self.grid.quantity_at(base.max(Decimal::ONE));
        if lot_qty <= Decimal::ZERO {
            return;
        }

        let mut remaining = position.net_qty;
        let mut k = 0u32;
        while remaining > Decimal::ZERO {
            let level = (base - params.price_interval * Decimal::from(k)).round_dp(params.price_decimals);
            let slot = self.grid.get_or_create(level);
            let assign = if remaining <= lot_qty * Decimal::from(2) {
                remaining // fold any leftover into the last slot
            } else {
                lot_qty
            };
            let _ = slot.confirm_buy_filled(position.entry_price, assign);
            remaining -= assign;
            k += 1;
            if k > 10_000 {
                error!(symbol = %self.symbol, "distribute_position: runaway loop, aborting");
                break;
            }
        }
        info!(symbol = %self.symbol, net_qty = %position.net_qty, "distributed exchange position across grid slots");
    }

    /// Full shutdown flow (spec.md §4.4.5): stop quoting and cancel
    /// everything resting on the book. Close-all-on-exit (§4.5.4) is driven
    /// separately by the Safety subsystem since it needs the exchange
    /// handle directly.
    pub async fn cancel_everything(&self) -> crate::Result<()> {
        self.executor
            .cancel_all(&self.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("cancel_all failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use crate::exchange::SymbolMetadata;
    use crate::executor::{RateLimiter, RateLimiterConfig};
    use crate::grid::GridParams;
    use crate::persistence::NullTradeStorage;
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

    fn metadata() -> SymbolMetadata {
        SymbolMetadata {
            price_decimals: 2,
            quantity_decimals: 6,
            min_notional: dec!(5),
        }
    }

    fn manager(exchange: Arc<dyn Exchange>) -> PositionManager {
        let grid = Arc::new(Grid::new(params()));
        let executor = Arc::new(crate::executor::OrderExecutor::new(
            exchange,
            RateLimiter::new(RateLimiterConfig::standard()),
            Arc::new(MetricsRegistry::new()),
        ));
        PositionManager::new(
            "BTCUSDT",
            grid,
            executor,
            Arc::new(NullTradeStorage),
            Arc::new(MetricsRegistry::new()),
        )
    }

    /// S1 — cold start, flat, steady price: 3 buys appear, no sells.
    #[tokio::test]
    async fn s1_cold_start_places_buy_ladder() {
        let mock: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let pm = manager(mock.clone());
        let report = pm.adjust_orders(dec!(100)).await;
        assert_eq!(report.placed, 3);
        assert_eq!(report.canceled, 0);
    }

    /// S2 — single-slot fill cycle: buy fill -> sell placed, window
    /// refilled, sell fill -> TradeRecord and slot free again.
    #[tokio::test]
    async fn s2_fill_cycle_places_sell_and_refills_window() {
        let mock: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let pm = manager(mock);
        pm.adjust_orders(dec!(100)).await;

        // Simulate the buy at slot(98) filling (in production this arrives
        // as an `OrderEvent` through `on_order_update`).
        let slot = pm.grid().get_or_create(dec!(98));
        slot.reserve_buy("gmm-b-9800-1").ok();
        let _ = slot.confirm_buy_filled(dec!(98.00), dec!(0.3061));

        let report = pm.adjust_orders(dec!(100)).await;
        let sell_slot = pm.grid().get(dec!(98)).unwrap();
        assert_eq!(sell_slot.snapshot().position_status, PositionStatus::Filled);
        assert!(report.placed >= 1);
    }

    /// L2: reserve_buy -> canceled restores the exact prior state.
    #[tokio::test]
    async fn l2_reserve_then_cancel_is_identity() {
        let mock: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let pm = manager(mock);
        let slot = pm.grid().get_or_create(dec!(98));
        let before = slot.snapshot();
        slot.reserve_buy("oid-1").unwrap();
        slot.canceled(Side::Buy);
        let after = slot.snapshot();
        assert_eq!(before.slot_status, after.slot_status);
        assert_eq!(before.position_status, after.position_status);
    }

    /// B1: buy_window_size = 0 never places a buy.
    #[tokio::test]
    async fn b1_zero_buy_window_places_no_buys() {
        let grid = Arc::new(Grid::new(GridParams {
            buy_window_size: 0,
            ..params()
        }));
        let exchange: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let executor = Arc::new(crate::executor::OrderExecutor::new(
            exchange,
            RateLimiter::new(RateLimiterConfig::standard()),
            Arc::new(MetricsRegistry::new()),
        ));
        let pm = PositionManager::new(
            "BTCUSDT",
            grid,
            executor,
            Arc::new(NullTradeStorage),
            Arc::new(MetricsRegistry::new()),
        );
        let report = pm.adjust_orders(dec!(100)).await;
        assert_eq!(report.placed, 0);
    }

    /// P5: while risk-paused, no new buys are submitted.
    #[tokio::test]
    async fn p5_risk_paused_blocks_new_buys() {
        let mock: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let pm = manager(mock);
        pm.set_risk_paused(true);
        let report = pm.adjust_orders(dec!(100)).await;
        assert_eq!(report.placed, 0);
    }

    /// S3 / B3: a reduce-only rejection on a sell force-clears the slot
    /// within the same adjust cycle.
    #[tokio::test]
    async fn s3_reduce_only_reject_force_clears_slot() {
        let mock = MockExchange::new("BTCUSDT", dec!(150), metadata());
        let exchange: Arc<dyn Exchange> = Arc::new(mock.clone());
        let grid = Arc::new(Grid::new(params()));
        // Simulate the manager *believing* slot(150) is Filled.
        let slot = grid.get_or_create(dec!(150));
        slot.reserve_buy("seed").unwrap();
        let _ = slot.confirm_buy_filled(dec!(150), dec!(0.2));

        mock.trap_reduce_only(dec!(152), Side::Sell);

        let executor = Arc::new(crate::executor::OrderExecutor::new(
            exchange,
            RateLimiter::new(RateLimiterConfig::standard()),
            Arc::new(MetricsRegistry::new()),
        ));
        let pm = PositionManager::new(
            "BTCUSDT",
            grid.clone(),
            executor,
            Arc::new(NullTradeStorage),
            Arc::new(MetricsRegistry::new()),
        );

        pm.adjust_orders(dec!(150)).await;

        let snap = grid.get(dec!(150)).unwrap().snapshot();
        assert_eq!(snap.position_status, PositionStatus::Empty);
        assert_eq!(snap.slot_status, SlotStatus::Free);
    }

    /// P6: after Initialize with a non-zero starting position, sells cover
    /// every Filled slot within one adjust cycle.
    #[tokio::test]
    async fn p6_initialize_from_existing_position_quotes_sells_immediately() {
        let mock = MockExchange::new("BTCUSDT", dec!(100), metadata());
        mock.seed_position(AccountPosition {
            net_qty: dec!(0.3),
            entry_price: dec!(98),
            leverage: dec!(1),
        });
        let exchange: Arc<dyn Exchange> = Arc::new(mock);
        let pm = manager(exchange.clone());

        pm.initialize(exchange.as_ref()).await.unwrap();

        let filled = pm.grid().filled_slots();
        assert!(!filled.is_empty());
        assert!(filled.iter().all(|s| s.sell_order_id().is_some()));
    }
}
