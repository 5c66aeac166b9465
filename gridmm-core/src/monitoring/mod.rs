//! Observability: Prometheus metrics and the `/metrics` HTTP endpoint.

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::{MetricsServer, MetricsServerConfig};
