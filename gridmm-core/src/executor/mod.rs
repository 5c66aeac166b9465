//! Order Executor (C2, spec.md §4.2): translates the Position Manager's
//! place/cancel intentions into exchange calls, with retry, rate-limit,
//! and structured failure reporting. The Position Manager never talks to
//! `Exchange` directly.

pub mod rate_limiter;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{ErrKind, GridError};
use crate::exchange::{Exchange, ExchangeOrder, PlaceRequest};
use crate::monitoring::metrics::MetricsRegistry;
use crate::resilience::{BackoffConfig, ExponentialBackoff};

pub use rate_limiter::{RateLimiter, RateLimiterConfig};

/// Per-request retry policy (spec.md §4.2: 200ms x 2^k, cap 5s, default 5
/// attempts).
pub fn executor_backoff_config(max_retries: usize) -> BackoffConfig {
    BackoffConfig {
        initial_delay: std::time::Duration::from_millis(200),
        max_delay: std::time::Duration::from_secs(5),
        multiplier: 2.0,
        max_retries: Some(max_retries),
        jitter_factor: 0.2,
    }
}

/// Outcome of a `BatchPlace` call.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub placed: Vec<ExchangeOrder>,
    pub had_margin_error: bool,
    pub reduce_only_rejects: HashSet<String>,
    pub other_errors: HashMap<String, ErrKind>,
}

pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    rate_limiter: RateLimiter,
    metrics: Arc<MetricsRegistry>,
    max_retries: usize,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, rate_limiter: RateLimiter, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            exchange,
            rate_limiter,
            metrics,
            max_retries: 5,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `BatchPlace(reqs)`: requests are submitted concurrently, bounded by
    /// the shared rate limiter (spec.md §4.2 "Side-effect ordering"); the
    /// Position Manager treats each request's outcome as independent.
    pub async fn batch_place(&self, reqs: Vec<PlaceRequest>) -> BatchResult {
        let mut set = tokio::task::JoinSet::new();
        for req in reqs {
            let exchange = self.exchange.clone();
            let rate_limiter = self.rate_limiter.clone();
            let max_retries = self.max_retries;
            let metrics = self.metrics.clone();
            set.spawn(place_with_retry(exchange, rate_limiter, max_retries, metrics, req));
        }
        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.push(outcome);
            }
        }

        let mut result = BatchResult::default();
        for (client_oid, outcome) in outcomes {
            match outcome {
                Ok(order) => {
                    self.metrics.orders_placed_total.inc();
                    debug!(client_oid = %order.client_oid, price = %order.price, "order placed");
                    result.placed.push(order);
                }
                Err(ErrKind::MarginInsufficient) => {
                    self.metrics.orders_rejected_total.inc();
                    self.metrics
                        .rejections_by_reason
                        .with_label_values(&["margin_insufficient"])
                        .inc();
                    warn!(client_oid, "margin insufficient, window will shrink this cycle");
                    result.had_margin_error = true;
                }
                Err(ErrKind::ReduceOnlyNoPosition) => {
                    self.metrics.orders_rejected_total.inc();
                    self.metrics
                        .rejections_by_reason
                        .with_label_values(&["reduce_only_no_position"])
                        .inc();
                    warn!(client_oid, "reduce-only reject: no position to reduce");
                    result.reduce_only_rejects.insert(client_oid);
                }
                Err(kind) => {
                    self.metrics.orders_rejected_total.inc();
                    self.metrics
                        .rejections_by_reason
                        .with_label_values(&[&kind.to_string()])
                        .inc();
                    warn!(client_oid, kind = %kind, "order placement failed");
                    result.other_errors.insert(client_oid, kind);
                }
            }
        }
        result
    }

    /// `BatchCancel(order_ids)`.
    pub async fn batch_cancel(
        &self,
        symbol: &str,
        order_ids: Vec<String>,
    ) -> (Vec<String>, HashMap<String, ErrKind>) {
        let mut set = tokio::task::JoinSet::new();
        for id in order_ids {
            let exchange = self.exchange.clone();
            let rate_limiter = self.rate_limiter.clone();
            let max_retries = self.max_retries;
            let symbol = symbol.to_string();
            let metrics = self.metrics.clone();
            set.spawn(cancel_with_retry(exchange, rate_limiter, max_retries, metrics, symbol, id));
        }

        let mut canceled = Vec::new();
        let mut failures = HashMap::new();
        while let Some(joined) = set.join_next().await {
            let Ok((id, outcome)) = joined else { continue };
            match outcome {
                Ok(()) => {
                    self.metrics.orders_canceled_total.inc();
                    canceled.push(id);
                }
                Err(kind) => {
                    failures.insert(id, kind);
                }
            }
        }
        (canceled, failures)
    }

    /// `CancelAll(symbol)`.
    pub async fn cancel_all(&self, symbol: &str) -> Result<(), GridError> {
        let open = self
            .exchange
            .get_open_orders(symbol)
            .await
            .map_err(|e| GridError::transient(e.to_string()))?;
        let ids = open.into_iter().map(|o| o.exchange_order_id).collect();
        let (_, failures) = self.batch_cancel(symbol, ids).await;
        if let Some((id, kind)) = failures.into_iter().next() {
            return Err(GridError::new(kind, format!("cancel_all: order {id} failed")));
        }
        Ok(())
    }
}

async fn place_with_retry(
    exchange: Arc<dyn Exchange>,
    rate_limiter: RateLimiter,
    max_retries: usize,
    metrics: Arc<MetricsRegistry>,
    req: PlaceRequest,
) -> (String, Result<ExchangeOrder, ErrKind>) {
    let client_oid = req.client_oid.clone();
    let mut backoff = ExponentialBackoff::with_config(executor_backoff_config(max_retries));

    loop {
        if !rate_limiter.allow() {
            metrics.rate_limited_total.inc();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        }

        match exchange.place_order(req.clone()).await {
            Ok(order) => return (client_oid, Ok(order)),
            Err(kind) if kind.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    debug!(client_oid, attempt = backoff.attempt_number(), "retrying place after transient error");
                    tokio::time::sleep(delay).await;
                }
                None => return (client_oid, Err(kind)),
            },
            Err(kind) => return (client_oid, Err(kind)),
        }
    }
}

async fn cancel_with_retry(
    exchange: Arc<dyn Exchange>,
    rate_limiter: RateLimiter,
    max_retries: usize,
    metrics: Arc<MetricsRegistry>,
    symbol: String,
    order_id: String,
) -> (String, Result<(), ErrKind>) {
    let mut backoff = ExponentialBackoff::with_config(executor_backoff_config(max_retries));
    loop {
        if !rate_limiter.allow() {
            metrics.rate_limited_total.inc();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        }
        match exchange.cancel_order(&symbol, &order_id).await {
            Ok(()) => return (order_id, Ok(())),
            Err(kind) if kind.is_retryable() => match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return (order_id, Err(kind)),
            },
            Err(kind) => return (order_id, Err(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use crate::exchange::mock::MockExchange;
    use crate::exchange::SymbolMetadata;
    use rust_decimal_macros::dec;

    fn metadata() -> SymbolMetadata {
        SymbolMetadata {
            price_decimals: 2,
            quantity_decimals: 6,
            min_notional: dec!(5),
        }
    }

    fn executor(exchange: Arc<dyn Exchange>) -> OrderExecutor {
        OrderExecutor::new(
            exchange,
            RateLimiter::new(RateLimiterConfig::standard()),
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[tokio::test]
    async fn batch_place_reports_successes_independently() {
        let mock: Arc<dyn Exchange> = Arc::new(MockExchange::new("BTCUSDT", dec!(100), metadata()));
        let ex = executor(mock);

        let reqs = vec![
            PlaceRequest {
                symbol: "BTCUSDT".into(),
                client_oid: "gmm-b-9800-1".into(),
                side: Side::Buy,
                price: dec!(98),
                quantity: dec!(0.3),
                reduce_only: false,
            },
            PlaceRequest {
                symbol: "BTCUSDT".into(),
                client_oid: "gmm-b-9600-2".into(),
                side: Side::Buy,
                price: dec!(96),
                quantity: dec!(0.3),
                reduce_only: false,
            },
        ];

        let result = ex.batch_place(reqs).await;
        assert_eq!(result.placed.len(), 2);
        assert!(!result.had_margin_error);
        assert!(result.reduce_only_rejects.is_empty());
    }

    #[tokio::test]
    async fn batch_place_classifies_reduce_only_reject() {
        let mock = MockExchange::new("BTCUSDT", dec!(100), metadata());
        mock.trap_reduce_only(dec!(152), Side::Sell);
        let exchange: Arc<dyn Exchange> = Arc::new(mock);
        let ex = executor(exchange);

        let reqs = vec![PlaceRequest {
            symbol: "BTCUSDT".into(),
            client_oid: "gmm-s-15200-1".into(),
            side: Side::Sell,
            price: dec!(152),
            quantity: dec!(0.3),
            reduce_only: true,
        }];

        let result = ex.batch_place(reqs).await;
        assert!(result.placed.is_empty());
        assert!(result.reduce_only_rejects.contains("gmm-s-15200-1"));
    }
}
