//! The abstract error taxonomy consumed by the core.
//!
//! Exchange adapters translate ~20 venues' worth of error codes into this
//! fixed set (spec.md §7); nothing above the adapter boundary ever matches
//! on a venue-specific string. `ErrKind` is the classification; `GridError`
//! pairs it with a human-readable message for logs.

use thiserror::Error;

/// Classification of a failure, independent of which venue produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrKind {
    /// Network blip, 5xx, or a server-side rate-limit code. Retried by the
    /// Order Executor with backoff.
    Transient,
    /// Bad price/param rejection. Not retried; the slot reverts to Free.
    PermanentReject,
    /// Account-level margin shortfall. Not retried; the manager shrinks its
    /// effective buy window for the current adjust cycle.
    MarginInsufficient,
    /// Exchange reports nothing to reduce on a close-only order. Feeds back
    /// into `force_clear` for the slot that thought it held inventory.
    ReduceOnlyNoPosition,
    /// Token bucket or server-side rate limit hit; retry after `retry_after`.
    RateLimited,
    /// Credential failure. Fatal for the owning symbol runtime.
    Auth,
    /// A stream frame could not be parsed. The frame is dropped, not fatal.
    DecodingError,
    /// The underlying stream connection dropped. The reader reconnects.
    StreamDisconnected,
}

impl ErrKind {
    /// Whether the Order Executor should retry a request classified as
    /// this kind (spec.md §7 "Propagation policy").
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrKind::Transient | ErrKind::RateLimited)
    }

    /// Whether this kind is fatal for the owning symbol runtime rather than
    /// something the system heals from on its own.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrKind::Auth)
    }
}

impl std::fmt::Display for ErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrKind::Transient => "transient",
            ErrKind::PermanentReject => "permanent_reject",
            ErrKind::MarginInsufficient => "margin_insufficient",
            ErrKind::ReduceOnlyNoPosition => "reduce_only_no_position",
            ErrKind::RateLimited => "rate_limited",
            ErrKind::Auth => "auth",
            ErrKind::DecodingError => "decoding_error",
            ErrKind::StreamDisconnected => "stream_disconnected",
        };
        write!(f, "{s}")
    }
}

/// A classified error with context, the type threaded through every
/// domain-level `Result` in `gridmm-core`. Runtime/binary-level code wraps
/// this (and everything else) in `anyhow::Error` at the boundary.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct GridError {
    pub kind: ErrKind,
    pub message: String,
}

impl GridError {
    pub fn new(kind: ErrKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrKind::Transient, message)
    }

    pub fn permanent_reject(message: impl Into<String>) -> Self {
        Self::new(ErrKind::PermanentReject, message)
    }

    pub fn margin_insufficient(message: impl Into<String>) -> Self {
        Self::new(ErrKind::MarginInsufficient, message)
    }

    pub fn reduce_only_no_position(message: impl Into<String>) -> Self {
        Self::new(ErrKind::ReduceOnlyNoPosition, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrKind::RateLimited, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrKind::Auth, message)
    }

    pub fn stream_disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrKind::StreamDisconnected, message)
    }

    /// Convenience constructor for a [`crate::core::ClientOid`] (or any
    /// other wire value) that failed to parse.
    pub fn decoding(raw: &str, reason: &str) -> Self {
        Self::new(
            ErrKind::DecodingError,
            format!("could not decode '{raw}': {reason}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrKind::Transient.is_retryable());
        assert!(ErrKind::RateLimited.is_retryable());
        assert!(!ErrKind::PermanentReject.is_retryable());
        assert!(!ErrKind::MarginInsufficient.is_retryable());
    }

    #[test]
    fn only_auth_is_fatal() {
        assert!(ErrKind::Auth.is_fatal());
        assert!(!ErrKind::Transient.is_fatal());
        assert!(!ErrKind::ReduceOnlyNoPosition.is_fatal());
    }

    #[test]
    fn display_includes_message() {
        let e = GridError::margin_insufficient("insufficient margin for 0.5 BTC");
        let s = e.to_string();
        assert!(s.contains("margin_insufficient"));
        assert!(s.contains("insufficient margin"));
    }
}
