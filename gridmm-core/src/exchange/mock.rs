//! In-memory `Exchange` implementation for tests and the `gridmm-bins`
//! demo binaries. Grounded in the teacher's `execution::simulated`
//! (`SimulatedExecutor`): orders are tracked in a map and resolved
//! deterministically rather than against a real venue, but here resolution
//! is driven explicitly by the test (`fill_order`, `set_price`) instead of
//! filling immediately on placement, since the grid's whole point is to
//! react to fills and price motion over time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::core::{ErrKind, OrderEventStatus, Side};

use super::{
    AccountPosition, Candle, Exchange, ExchangeError, ExchangeOrder, OrderEvent, PlaceRequest,
    PriceTick, SymbolMetadata,
};

struct MockState {
    price: Decimal,
    orders: HashMap<String, ExchangeOrder>,
    position: AccountPosition,
    balance: Decimal,
    candles: Vec<Candle>,
    next_exchange_order_id: u64,
    order_tx: Option<Sender<OrderEvent>>,
    price_tx: Vec<Sender<PriceTick>>,
    /// Orders that should be rejected with `ErrKind::ReduceOnlyNoPosition`
    /// the next time they're placed, keyed by price+side — used to test
    /// spec.md §8 B3 / S3 (reduce-only feedback healing stale state).
    reduce_only_traps: Vec<(Decimal, Side)>,
}

/// A handle shared between the test/binary driver and the `Exchange` trait
/// object passed into a `SymbolRuntime`.
#[derive(Clone)]
pub struct MockExchange {
    symbol: String,
    metadata: SymbolMetadata,
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new(symbol: impl Into<String>, initial_price: Decimal, metadata: SymbolMetadata) -> Self {
        Self {
            symbol: symbol.into(),
            metadata,
            state: Arc::new(Mutex::new(MockState {
                price: initial_price,
                orders: HashMap::new(),
                position: AccountPosition::default(),
                balance: Decimal::from(100_000),
                candles: Vec::new(),
                next_exchange_order_id: 1,
                order_tx: None,
                price_tx: Vec::new(),
                reduce_only_traps: Vec::new(),
            })),
        }
    }

    /// Push a new price to every subscriber (test driver's clock tick).
    pub async fn set_price(&self, price: Decimal, ts_millis: i64) {
        let senders = {
            let mut state = self.state.lock();
            state.price = price;
            state.price_tx.clone()
        };
        for tx in senders {
            let _ = tx.send(PriceTick { price, ts_millis }).await;
        }
    }

    pub fn seed_candles(&self, candles: Vec<Candle>) {
        self.state.lock().candles = candles;
    }

    pub fn seed_position(&self, position: AccountPosition) {
        self.state.lock().position = position;
    }

    /// Arrange for the next `place_order` at `(price, side)` to fail with
    /// `ReduceOnlyNoPosition` instead of succeeding.
    pub fn trap_reduce_only(&self, price: Decimal, side: Side) {
        self.state.lock().reduce_only_traps.push((price, side));
    }

    /// Simulate a fill for a resting order and push the `OrderEvent`.
    pub async fn fill_order(&self, client_oid: &str, filled_qty: Decimal, avg_price: Decimal) {
        let (order, tx) = {
            let mut state = self.state.lock();
            let order = state.orders.remove(client_oid);
            (order, state.order_tx.clone())
        };
        let Some(order) = order else {
            debug!(client_oid, "fill_order: no such resting order");
            return;
        };
        if let Some(tx) = tx {
            let _ = tx
                .send(OrderEvent {
                    client_oid: order.client_oid.clone(),
                    status: OrderEventStatus::Filled,
                    filled_qty: Some(filled_qty),
                    avg_price: Some(avg_price),
                    fee: Some(Decimal::ZERO),
                    reason: None,
                })
                .await;
        }
    }

    /// Simulate the exchange canceling a resting order out-of-band (e.g.
    /// maintenance), as in spec.md §8 S5.
    pub async fn cancel_from_exchange_side(&self, client_oid: &str) {
        let (removed, tx) = {
            let mut state = self.state.lock();
            let removed = state.orders.remove(client_oid).is_some();
            (removed, state.order_tx.clone())
        };
        if removed {
            if let Some(tx) = tx {
                let _ = tx
                    .send(OrderEvent {
                        client_oid: client_oid.to_string(),
                        status: OrderEventStatus::Canceled,
                        filled_qty: None,
                        avg_price: None,
                        fee: None,
                        reason: None,
                    })
                    .await;
            }
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.state.lock().orders.len()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_latest_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        Ok(self.state.lock().price)
    }

    async fn subscribe_price_stream(
        &self,
        _symbol: &str,
        tx: Sender<PriceTick>,
    ) -> Result<(), ExchangeError> {
        self.state.lock().price_tx.push(tx);
        Ok(())
    }

    async fn subscribe_order_stream(&self, tx: Sender<OrderEvent>) -> Result<(), ExchangeError> {
        self.state.lock().order_tx = Some(tx);
        Ok(())
    }

    async fn place_order(&self, req: PlaceRequest) -> Result<ExchangeOrder, ErrKind> {
        let mut state = self.state.lock();

        if let Some(pos) = state
            .reduce_only_traps
            .iter()
            .position(|(p, s)| *p == req.price && *s == req.side)
        {
            state.reduce_only_traps.remove(pos);
            return Err(ErrKind::ReduceOnlyNoPosition);
        }

        let exchange_order_id = state.next_exchange_order_id.to_string();
        state.next_exchange_order_id += 1;

        let order = ExchangeOrder {
            exchange_order_id,
            client_oid: req.client_oid.clone(),
            side: req.side,
            price: req.price,
            quantity: req.quantity,
        };
        state.orders.insert(req.client_oid.clone(), order.clone());

        let tx = state.order_tx.clone();
        drop(state);
        if let Some(tx) = tx {
            let _ = tx
                .send(OrderEvent {
                    client_oid: req.client_oid,
                    status: OrderEventStatus::New,
                    filled_qty: None,
                    avg_price: None,
                    fee: None,
                    reason: None,
                })
                .await;
        }

        info!(order_id = %order.exchange_order_id, "mock exchange: placed order");
        Ok(order)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), ErrKind> {
        let mut state = self.state.lock();
        let client_oid = state
            .orders
            .iter()
            .find(|(_, o)| o.exchange_order_id == order_id)
            .map(|(oid, _)| oid.clone());
        match client_oid {
            Some(oid) => {
                state.orders.remove(&oid);
                Ok(())
            }
            None => Err(ErrKind::PermanentReject),
        }
    }

    async fn get_open_orders(&self, _symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        Ok(self.state.lock().orders.values().cloned().collect())
    }

    async fn get_position(&self, _symbol: &str) -> Result<AccountPosition, ExchangeError> {
        Ok(self.state.lock().position)
    }

    async fn get_balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(self.state.lock().balance)
    }

    async fn get_historical_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let state = self.state.lock();
        let len = state.candles.len();
        let start = len.saturating_sub(limit);
        Ok(state.candles[start..].to_vec())
    }

    async fn symbol_metadata(&self, symbol: &str) -> Result<SymbolMetadata, ExchangeError> {
        if symbol != self.symbol {
            return Err(ExchangeError::new(format!("unknown symbol {symbol}")));
        }
        Ok(self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> SymbolMetadata {
        SymbolMetadata {
            price_decimals: 2,
            quantity_decimals: 6,
            min_notional: dec!(5),
        }
    }

    #[tokio::test]
    async fn place_then_cancel() {
        let ex = MockExchange::new("BTCUSDT", dec!(100), metadata());
        let order = ex
            .place_order(PlaceRequest {
                symbol: "BTCUSDT".into(),
                client_oid: "gmm-b-10000-1".into(),
                side: Side::Buy,
                price: dec!(100),
                quantity: dec!(0.3),
                reduce_only: false,
            })
            .await
            .unwrap();

        assert_eq!(ex.open_order_count(), 1);
        ex.cancel_order("BTCUSDT", &order.exchange_order_id)
            .await
            .unwrap();
        assert_eq!(ex.open_order_count(), 0);
    }

    #[tokio::test]
    async fn reduce_only_trap_fires_once() {
        let ex = MockExchange::new("BTCUSDT", dec!(100), metadata());
        ex.trap_reduce_only(dec!(152), Side::Sell);

        let req = PlaceRequest {
            symbol: "BTCUSDT".into(),
            client_oid: "gmm-s-15200-1".into(),
            side: Side::Sell,
            price: dec!(152),
            quantity: dec!(0.3),
            reduce_only: true,
        };

        let err = ex.place_order(req.clone()).await.unwrap_err();
        assert_eq!(err, ErrKind::ReduceOnlyNoPosition);

        // Second attempt at the same price/side succeeds (trap consumed).
        ex.place_order(req).await.unwrap();
    }
}
