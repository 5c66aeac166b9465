//! The `Exchange` capability (spec.md §6.1): the single trait every venue
//! adapter implements and the only thing the rest of the core depends on.
//! Venue-specific REST/WebSocket glue is out of scope; this module defines
//! the trait plus the wire types it passes, and [`mock`] provides an
//! in-memory implementation used by tests and the `gridmm-bins` binaries.

pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{ErrKind, OrderEventStatus, Side};

/// A single price observation from the venue's mark/last-price stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceTick {
    pub price: Decimal,
    pub ts_millis: i64,
}

/// A normalized fill/ack/cancel/reject notification. `client_oid` is always
/// present and always one this system generated, so `OnOrderUpdate`
/// (position_manager) can decode it directly.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub client_oid: String,
    pub status: OrderEventStatus,
    pub filled_qty: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub reason: Option<ErrKind>,
}

/// A place request as submitted by the Order Executor.
#[derive(Debug, Clone)]
pub struct PlaceRequest {
    pub symbol: String,
    pub client_oid: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub reduce_only: bool,
}

/// Confirmation of a successfully routed (not necessarily filled) order.
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub exchange_order_id: String,
    pub client_oid: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// One OHLCV candle as returned by `get_historical_candles`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open_ts_millis: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Venue rounding/sizing rules for a symbol.
#[derive(Debug, Clone, Copy)]
pub struct SymbolMetadata {
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    pub min_notional: Decimal,
}

/// Cached, exchange-reported account position on a symbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountPosition {
    pub net_qty: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
}

/// Failures that originate below the `ErrKind`-classified order path:
/// reads (price, position, balance, candles, metadata) that simply fail.
#[derive(Debug, Clone)]
pub struct ExchangeError {
    pub message: String,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExchangeError {}

impl ExchangeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The capability every venue adapter implements. `gridmm-core` is generic
/// over this trait; it never matches on venue-specific error codes or wire
/// shapes (spec.md §9 "Error surfacing") — only the adapter's own error
/// classification table does that, before handing a `GridError`-wrapped
/// `ErrKind` up through this interface.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_latest_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    async fn subscribe_price_stream(
        &self,
        symbol: &str,
        tx: tokio::sync::mpsc::Sender<PriceTick>,
    ) -> Result<(), ExchangeError>;

    async fn subscribe_order_stream(
        &self,
        tx: tokio::sync::mpsc::Sender<OrderEvent>,
    ) -> Result<(), ExchangeError>;

    async fn place_order(&self, req: PlaceRequest) -> Result<ExchangeOrder, ErrKind>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ErrKind>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    async fn get_position(&self, symbol: &str) -> Result<AccountPosition, ExchangeError>;

    async fn get_balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;

    async fn get_historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn symbol_metadata(&self, symbol: &str) -> Result<SymbolMetadata, ExchangeError>;
}
