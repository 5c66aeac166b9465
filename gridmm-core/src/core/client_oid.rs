//! Deterministic, parseable client order identifiers.
//!
//! Encoding `price` and `side` into the OID is load-bearing (spec.md §9,
//! "Client-order-id design"): it lets the Position Manager recover slot
//! context from any [`crate::core::types::OrderEventStatus`] event without
//! maintaining an external `client_oid -> slot` map that could drift across
//! restarts. The nonce only disambiguates repeated intents at the same
//! price/side (e.g. a cancel immediately followed by a re-place).

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::errors::GridError;
use crate::core::types::Side;

const PREFIX: &str = "gmm";

/// Monotonic per-process nonce. Seeded from the wall clock so nonces don't
/// collide with a previous process run on the same symbol.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_nonce() -> u64 {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let count = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    seed.wrapping_add(count)
}

/// A decoded client order id: `gmm-{b|s}-{priceScaled}-{nonce}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOid {
    pub side: Side,
    /// `round(price * 10^price_decimals)`, an integer so the OID never
    /// carries a decimal point.
    pub price_scaled: i64,
    pub nonce: u64,
}

impl ClientOid {
    /// Build a fresh OID for `side`/`price`, scaling the price with
    /// `price_decimals` (the grid's rounding policy, from symbol metadata).
    pub fn new(side: Side, price: Decimal, price_decimals: u32) -> Self {
        let scale = Decimal::from(10u64.pow(price_decimals));
        let price_scaled = (price * scale).round().mantissa() as i64;
        Self {
            side,
            price_scaled,
            nonce: next_nonce(),
        }
    }

    /// Recover the original `price` given the same `price_decimals` used to
    /// encode it. Grid and OID always share one `price_decimals` per
    /// symbol, so callers pass the grid's configured value.
    pub fn price(&self, price_decimals: u32) -> Decimal {
        Decimal::from(self.price_scaled) / Decimal::from(10u64.pow(price_decimals))
    }
}

impl fmt::Display for ClientOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}-{}-{}-{}",
            self.side.as_letter(),
            self.price_scaled,
            self.nonce
        )
    }
}

impl FromStr for ClientOid {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let prefix = parts.next().ok_or_else(|| GridError::decoding(s, "empty"))?;
        if prefix != PREFIX {
            return Err(GridError::decoding(s, "bad prefix"));
        }
        let side_part = parts.next().ok_or_else(|| GridError::decoding(s, "missing side"))?;
        let side = side_part
            .chars()
            .next()
            .and_then(Side::from_letter)
            .ok_or_else(|| GridError::decoding(s, "unrecognized side letter"))?;
        let price_scaled: i64 = parts
            .next()
            .ok_or_else(|| GridError::decoding(s, "missing price"))?
            .parse()
            .map_err(|_| GridError::decoding(s, "price not an integer"))?;
        let nonce: u64 = parts
            .next()
            .ok_or_else(|| GridError::decoding(s, "missing nonce"))?
            .parse()
            .map_err(|_| GridError::decoding(s, "nonce not an integer"))?;
        if parts.next().is_some() {
            return Err(GridError::decoding(s, "trailing segments"));
        }
        Ok(Self {
            side,
            price_scaled,
            nonce,
        })
    }
}
