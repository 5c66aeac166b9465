//! Reconnect loop for the canonical price stream.
//!
//! `subscribe_price_stream` hands the adapter a channel and returns once
//! subscribed; a real adapter's background task closes that channel when
//! the underlying connection drops. This module detects that close and
//! re-subscribes with the teacher's exponential-backoff state machine
//! (`resilience::backoff`), forwarding every tick it receives onto a single
//! outer channel so callers see one continuous stream regardless of how
//! many times the adapter reconnected underneath.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::exchange::{Exchange, ExchangeError, PriceTick};
use crate::monitoring::metrics::MetricsRegistry;
use crate::resilience::{BackoffConfig, ExponentialBackoff};

/// Reconnect policy for the price stream (spec.md §4.1: start 1s, cap 30s,
/// jitter ±25%).
pub fn price_stream_backoff_config() -> BackoffConfig {
    BackoffConfig {
        initial_delay: std::time::Duration::from_secs(1),
        max_delay: std::time::Duration::from_secs(30),
        multiplier: 2.0,
        max_retries: None,
        jitter_factor: 0.25,
    }
}

/// After this many consecutive failed (re)connect attempts, a health alarm
/// is raised (spec.md §4.1); the loop keeps retrying regardless.
pub const MAX_CONSECUTIVE_FAILURES: u64 = 10;

#[derive(Debug, Default)]
pub struct ReconnectStats {
    pub attempts: AtomicU64,
    pub consecutive_failures: AtomicU64,
}

/// Drives the reconnect loop until `out_tx` is closed (the caller shut
/// down). Every tick received from the adapter is forwarded to `out_tx`
/// unchanged; reconnection is transparent to the consumer.
pub async fn run_with_reconnect(
    exchange: Arc<dyn Exchange>,
    symbol: String,
    out_tx: mpsc::Sender<PriceTick>,
    stats: Arc<ReconnectStats>,
    metrics: Arc<MetricsRegistry>,
) {
    let mut backoff = ExponentialBackoff::with_config(price_stream_backoff_config());
    let mut is_first_attempt = true;

    loop {
        if out_tx.is_closed() {
            return;
        }

        stats.attempts.fetch_add(1, Ordering::Relaxed);
        if !is_first_attempt {
            metrics.price_stream_reconnects_total.inc();
        }
        is_first_attempt = false;
        let (inner_tx, mut inner_rx) = mpsc::channel(256);

        match exchange.subscribe_price_stream(&symbol, inner_tx).await {
            Ok(()) => {
                backoff.reset();
                stats.consecutive_failures.store(0, Ordering::Relaxed);
                info!(symbol = %symbol, "price stream subscribed");

                // Forward until the adapter's side closes the channel.
                while let Some(tick) = inner_rx.recv().await {
                    if out_tx.send(tick).await.is_err() {
                        return; // consumer gone
                    }
                }
                warn!(symbol = %symbol, "price stream disconnected, reconnecting");
            }
            Err(ExchangeError { message }) => {
                let failures = stats.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == MAX_CONSECUTIVE_FAILURES {
                    error!(
                        symbol = %symbol,
                        failures,
                        %message,
                        "price stream health alarm: max consecutive failures reached"
                    );
                } else {
                    warn!(symbol = %symbol, %message, "price stream subscribe failed");
                }
            }
        }

        if let Some(delay) = backoff.next_delay() {
            tokio::time::sleep(delay).await;
        } else {
            // Unlimited retries configured; next_delay only returns None on
            // a bounded max_retries, which this config doesn't set.
            tokio::time::sleep(backoff.config().max_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_config_matches_spec_defaults() {
        let cfg = price_stream_backoff_config();
        assert_eq!(cfg.initial_delay, std::time::Duration::from_secs(1));
        assert_eq!(cfg.max_delay, std::time::Duration::from_secs(30));
        assert_eq!(cfg.jitter_factor, 0.25);
    }
}
