//! Small shared enums used across the grid, executor, and position manager.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the book an order or slot intention is on.
///
/// The grid is long-only (see Non-goals): a `Buy` opens inventory in a
/// slot, a `Sell` closes it. There is no `Short`/cover pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Single-character tag used inside a [`crate::core::ClientOid`].
    pub fn as_letter(self) -> char {
        match self {
            Side::Buy => 'b',
            Side::Sell => 's',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'b' => Some(Side::Buy),
            's' => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Normalized status of an order-update event, as emitted by
/// [`crate::exchange::Exchange::subscribe_order_stream`].
///
/// This mirrors spec.md §3's `OrderEvent.status` set exactly; adapters are
/// responsible for mapping venue-specific enums onto this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEventStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl fmt::Display for OrderEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderEventStatus::New => "new",
            OrderEventStatus::PartiallyFilled => "partially_filled",
            OrderEventStatus::Filled => "filled",
            OrderEventStatus::Canceled => "canceled",
            OrderEventStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_letter_round_trips() {
        assert_eq!(Side::from_letter(Side::Buy.as_letter()), Some(Side::Buy));
        assert_eq!(Side::from_letter(Side::Sell.as_letter()), Some(Side::Sell));
        assert_eq!(Side::from_letter('x'), None);
    }
}
