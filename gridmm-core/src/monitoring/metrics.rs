//! Prometheus metrics for the grid market-maker.
//!
//! Mirrors the teacher's registry-of-sub-registries layout (one struct per
//! concern, each registering its own metric families at construction) but
//! the metric families themselves are specific to the grid (orders, slots,
//! reconciliation, risk events) rather than tick-to-trade latency.

use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,

    pub orders_placed_total: IntCounter,
    pub orders_canceled_total: IntCounter,
    pub orders_rejected_total: IntCounter,
    pub rate_limited_total: IntCounter,
    pub rejections_by_reason: IntCounterVec,

    pub grid_slots_total: IntGauge,
    pub grid_slots_filled: IntGauge,
    pub open_position_qty: Gauge,
    pub realized_pnl: Gauge,

    pub risk_event_triggered: IntGauge,
    pub risk_events_total: IntCounterVec,

    pub reconciliation_runs_total: IntCounter,
    pub reconciliation_divergences_total: IntCounter,

    pub price_stream_stale: IntGauge,
    pub price_stream_reconnects_total: IntCounter,
}

impl MetricsRegistry {
    /// Panics if a metric family name collides; this only happens from a
    /// programming error (duplicate registration), so it is treated like the
    /// teacher treats it: a construction-time invariant, not a runtime error.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let orders_placed_total = IntCounter::with_opts(
            Opts::new("orders_placed_total", "Total orders successfully placed").namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(orders_placed_total.clone())).unwrap();

        let orders_canceled_total = IntCounter::with_opts(
            Opts::new("orders_canceled_total", "Total orders successfully canceled").namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(orders_canceled_total.clone())).unwrap();

        let orders_rejected_total = IntCounter::with_opts(
            Opts::new("orders_rejected_total", "Total order placements rejected by the exchange")
                .namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(orders_rejected_total.clone())).unwrap();

        let rate_limited_total = IntCounter::with_opts(
            Opts::new("rate_limited_total", "Total requests deferred by the local rate limiter")
                .namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(rate_limited_total.clone())).unwrap();

        let rejections_by_reason = IntCounterVec::new(
            Opts::new("rejections_by_reason_total", "Order rejections broken down by reason")
                .namespace("gridmm"),
            &["reason"],
        )
        .unwrap();
        registry.register(Box::new(rejections_by_reason.clone())).unwrap();

        let grid_slots_total =
            IntGauge::with_opts(Opts::new("grid_slots_total", "Number of slots currently tracked").namespace("gridmm"))
                .unwrap();
        registry.register(Box::new(grid_slots_total.clone())).unwrap();

        let grid_slots_filled = IntGauge::with_opts(
            Opts::new("grid_slots_filled", "Number of slots currently holding a filled position")
                .namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(grid_slots_filled.clone())).unwrap();

        let open_position_qty = Gauge::with_opts(
            Opts::new("open_position_qty", "Net base-asset quantity attributed to the grid").namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(open_position_qty.clone())).unwrap();

        let realized_pnl =
            Gauge::with_opts(Opts::new("realized_pnl", "Cumulative realized PnL in quote currency").namespace("gridmm"))
                .unwrap();
        registry.register(Box::new(realized_pnl.clone())).unwrap();

        let risk_event_triggered = IntGauge::with_opts(
            Opts::new("risk_event_triggered", "1 if the circuit breaker is currently tripped, else 0")
                .namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(risk_event_triggered.clone())).unwrap();

        let risk_events_total = IntCounterVec::new(
            Opts::new("risk_events_total", "Total circuit breaker trip/clear transitions").namespace("gridmm"),
            &["transition"],
        )
        .unwrap();
        registry.register(Box::new(risk_events_total.clone())).unwrap();

        let reconciliation_runs_total = IntCounter::with_opts(
            Opts::new("reconciliation_runs_total", "Total reconciliation passes completed").namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(reconciliation_runs_total.clone())).unwrap();

        let reconciliation_divergences_total = IntCounter::with_opts(
            Opts::new(
                "reconciliation_divergences_total",
                "Total local/exchange divergences repaired by the reconciler",
            )
            .namespace("gridmm"),
        )
        .unwrap();
        registry
            .register(Box::new(reconciliation_divergences_total.clone()))
            .unwrap();

        let price_stream_stale = IntGauge::with_opts(
            Opts::new("price_stream_stale", "1 if the canonical price stream is currently stale").namespace("gridmm"),
        )
        .unwrap();
        registry.register(Box::new(price_stream_stale.clone())).unwrap();

        let price_stream_reconnects_total = IntCounter::with_opts(
            Opts::new("price_stream_reconnects_total", "Total price stream reconnect attempts").namespace("gridmm"),
        )
        .unwrap();
        registry
            .register(Box::new(price_stream_reconnects_total.clone()))
            .unwrap();

        info!("metrics registry initialized");

        Self {
            registry,
            orders_placed_total,
            orders_canceled_total,
            orders_rejected_total,
            rate_limited_total,
            rejections_by_reason,
            grid_slots_total,
            grid_slots_filled,
            open_position_qty,
            realized_pnl,
            risk_event_triggered,
            risk_events_total,
            reconciliation_runs_total,
            reconciliation_divergences_total,
            price_stream_stale,
            price_stream_reconnects_total,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_gathers_all_families() {
        let m = MetricsRegistry::new();
        m.orders_placed_total.inc();
        m.rejections_by_reason.with_label_values(&["margin_insufficient"]).inc();
        m.grid_slots_total.set(6);
        m.risk_event_triggered.set(0);

        let families = m.registry().gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn default_matches_new() {
        let m = MetricsRegistry::default();
        assert_eq!(m.orders_placed_total.get(), 0);
    }
}
