//! Shared resilience primitives used by the Price Monitor and Order Executor.
//!
//! Both components retry failure the same way: a bounded, jittered
//! exponential backoff. The state machine lives here once; the Price
//! Monitor's reconnect loop (`price_monitor::reconnect`) and the Order
//! Executor's retry loop each hold their own `ExponentialBackoff` instance.

pub mod backoff;

pub use backoff::{BackoffConfig, ExponentialBackoff};
