//! Price Monitor (C1, spec.md §4.1): one canonical price stream per symbol.
//! Hides reconnection, duplicate suppression, and staleness detection from
//! every subscriber (Position Manager, Safety, UI).

pub mod reconnect;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::warn;

use crate::exchange::Exchange;
use crate::monitoring::metrics::MetricsRegistry;
use reconnect::ReconnectStats;

/// Minimum gap between emitted ticks when the price hasn't changed — the
/// "heartbeat" requirement from spec.md §4.1.
const HEARTBEAT_INTERVAL_MS: i64 = 1_000;

/// If no price is received for this long, `Latest()` reports `ok = false`.
const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot returned by `Latest()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceState {
    pub price: Decimal,
    pub ts_millis: i64,
    pub ok: bool,
}

impl Default for PriceState {
    fn default() -> Self {
        Self {
            price: Decimal::ZERO,
            ts_millis: 0,
            ok: false,
        }
    }
}

pub struct PriceMonitor {
    symbol: String,
    tx: watch::Sender<PriceState>,
    rx: watch::Receiver<PriceState>,
    stats: Arc<ReconnectStats>,
    stale_timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl PriceMonitor {
    pub fn new(symbol: impl Into<String>, metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_stale_timeout(symbol, DEFAULT_STALE_TIMEOUT, metrics)
    }

    pub fn with_stale_timeout(
        symbol: impl Into<String>,
        stale_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (tx, rx) = watch::channel(PriceState::default());
        Self {
            symbol: symbol.into(),
            tx,
            rx,
            stats: Arc::new(ReconnectStats::default()),
            stale_timeout,
            metrics,
        }
    }

    /// `Subscribe(handler)` (spec.md §4.1): rather than invoking a
    /// caller-supplied closure (which would need to "return quickly or
    /// offload" per the spec — exactly what a channel already guarantees),
    /// subscribers get a cloned `watch::Receiver`. Awaiting `changed()` is
    /// the handler; a slow subscriber never blocks another because each
    /// holds its own receiver and `watch` coalesces to the newest value.
    pub fn subscribe(&self) -> watch::Receiver<PriceState> {
        self.rx.clone()
    }

    /// `Latest() -> (price, ts, ok)`.
    pub fn latest(&self) -> PriceState {
        *self.rx.borrow()
    }

    pub fn reconnect_stats(&self) -> (u64, u64) {
        (
            self.stats.attempts.load(Ordering::Relaxed),
            self.stats.consecutive_failures.load(Ordering::Relaxed),
        )
    }

    /// Runs forever: reconnect-wrapped ingestion, dedup, heartbeat, and
    /// stale detection. Returns when `exchange`'s stream closes for good
    /// (i.e. never, in practice) or the task is aborted by the owning
    /// `SymbolRuntime`.
    pub async fn run(self: Arc<Self>, exchange: Arc<dyn Exchange>) {
        let (raw_tx, mut raw_rx) = tokio::sync::mpsc::channel(256);
        let symbol = self.symbol.clone();
        let stats = self.stats.clone();
        let metrics = self.metrics.clone();
        let reconnector = tokio::spawn(reconnect::run_with_reconnect(
            exchange, symbol, raw_tx, stats, metrics,
        ));

        let mut last_emit: Option<PriceState> = None;
        let stale_timeout_ms = self.stale_timeout.as_millis() as i64;

        loop {
            let recv = tokio::time::timeout(self.stale_timeout, raw_rx.recv()).await;
            match recv {
                Ok(Some(tick)) => {
                    let should_emit = match last_emit {
                        None => true,
                        Some(prev) => {
                            tick.price != prev.price
                                || tick.ts_millis - prev.ts_millis > HEARTBEAT_INTERVAL_MS
                        }
                    };
                    if should_emit {
                        let state = PriceState {
                            price: tick.price,
                            ts_millis: tick.ts_millis,
                            ok: true,
                        };
                        last_emit = Some(state);
                        let _ = self.tx.send(state);
                        self.metrics.price_stream_stale.set(0);
                    }
                }
                Ok(None) => {
                    // Reconnector task ended (shutdown); stop.
                    break;
                }
                Err(_elapsed) => {
                    warn!(
                        symbol = %self.symbol,
                        stale_timeout_ms,
                        "no price update within stall_timeout, marking stale"
                    );
                    let mut stale = self.rx.borrow().clone();
                    stale.ok = false;
                    let _ = self.tx.send(stale);
                    self.metrics.price_stream_stale.set(1);
                }
            }
        }

        reconnector.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn latest_reflects_pushed_price() {
        let mock = MockExchange::new("BTCUSDT", dec!(100), metadata());
        let exchange: Arc<dyn Exchange> = Arc::new(mock.clone());
        let monitor = Arc::new(PriceMonitor::new("BTCUSDT", Arc::new(MetricsRegistry::new())));
        let handle = tokio::spawn(monitor.clone().run(exchange));

        // Give the subscribe task a moment to register.
        tokio::time::sleep(Duration::from_millis(20)).await;

        mock.set_price(dec!(101), 1_000).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let latest = monitor.latest();
        assert_eq!(latest.price, dec!(101));
        assert!(latest.ok);

        handle.abort();
    }

    #[test]
    fn default_state_is_not_ok() {
        let monitor = PriceMonitor::new("BTCUSDT", Arc::new(MetricsRegistry::new()));
        assert!(!monitor.latest().ok);
    }
}
