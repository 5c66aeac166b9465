//! Core types shared by every other module.
//!
//! Unlike an HFT tick-matching engine, this system's latency budget is
//! ~10-100ms (one fill event to one adjusted order), so these types favor
//! `Decimal` correctness over fixed-point tricks: every price, quantity,
//! and balance in the system is a `rust_decimal::Decimal`.

pub mod client_oid;
pub mod errors;
pub mod types;

pub use client_oid::ClientOid;
pub use errors::{ErrKind, GridError};
pub use types::{OrderEventStatus, Side};
