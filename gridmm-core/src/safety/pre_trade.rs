//! Pre-trade checks, run once before a symbol's adjust loop starts
//! (spec.md §4.5.1). Unlike a per-order validator, these are startup
//! gates: most are advisory (log and proceed), two are fatal.

use rust_decimal::Decimal;
use tracing::warn;

/// Inputs a pre-trade check needs, gathered once from the exchange and the
/// resolved symbol config before `Initialize` runs.
#[derive(Debug, Clone)]
pub struct PreTradeInputs {
    pub available_balance: Decimal,
    pub min_balance: Decimal,
    pub current_leverage: Decimal,
    pub max_leverage: Decimal,
    /// `true` if the account holds a position on this symbol that the grid
    /// did not open (wrong side, or pre-existing from manual trading).
    pub has_unrelated_position: bool,
    pub order_quantity: Decimal,
    pub price_interval: Decimal,
    pub round_trip_fee: Decimal,
}

/// Outcome of running all pre-trade checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreTradeReport {
    pub warnings: Vec<String>,
    pub fatal: Option<String>,
}

impl PreTradeReport {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

/// Run the startup-only checks from spec.md §4.5.1. Fatal failures are
/// returned in `PreTradeReport::fatal`; everything else is logged at `warn`
/// and collected for the caller to surface (e.g. in a status endpoint).
pub fn run_pre_trade_checks(inputs: &PreTradeInputs) -> PreTradeReport {
    let mut warnings = Vec::new();
    let mut fatal = None;

    if inputs.available_balance < inputs.min_balance {
        let msg = format!(
            "available balance {} below configured minimum {}",
            inputs.available_balance, inputs.min_balance
        );
        warn!("{msg}");
        fatal = Some(msg);
    }

    if fatal.is_none() && inputs.current_leverage > inputs.max_leverage {
        let msg = format!(
            "leverage {} exceeds configured maximum {}",
            inputs.current_leverage, inputs.max_leverage
        );
        warn!("{msg}");
        fatal = Some(msg);
    }

    if inputs.has_unrelated_position {
        let msg = "account holds a pre-existing position unrelated to the grid; proceeding"
            .to_string();
        warn!("{msg}");
        warnings.push(msg);
    }

    // One round trip earns `grid_qty * price_interval`; compare against 2x
    // the round-trip fee (spec.md §4.5.1).
    let grid_qty = inputs.order_quantity / inputs.price_interval.max(Decimal::ONE);
    let expected_profit = grid_qty * inputs.price_interval;
    if expected_profit <= inputs.round_trip_fee * Decimal::from(2) {
        let msg = format!(
            "expected grid profit {} does not clear 2x round-trip fee {}",
            expected_profit, inputs.round_trip_fee
        );
        warn!("{msg}");
        warnings.push(msg);
    }

    PreTradeReport { warnings, fatal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_inputs() -> PreTradeInputs {
        PreTradeInputs {
            available_balance: dec!(1000),
            min_balance: dec!(100),
            current_leverage: dec!(2),
            max_leverage: dec!(5),
            has_unrelated_position: false,
            order_quantity: dec!(30),
            price_interval: dec!(2),
            round_trip_fee: dec!(0.05),
        }
    }

    #[test]
    fn healthy_account_passes_with_no_fatal() {
        let report = run_pre_trade_checks(&base_inputs());
        assert!(!report.is_fatal());
    }

    #[test]
    fn balance_below_minimum_is_fatal() {
        let mut inputs = base_inputs();
        inputs.available_balance = dec!(10);
        let report = run_pre_trade_checks(&inputs);
        assert!(report.is_fatal());
    }

    #[test]
    fn leverage_above_max_is_fatal() {
        let mut inputs = base_inputs();
        inputs.current_leverage = dec!(10);
        let report = run_pre_trade_checks(&inputs);
        assert!(report.is_fatal());
    }

    #[test]
    fn unrelated_position_warns_but_does_not_block() {
        let mut inputs = base_inputs();
        inputs.has_unrelated_position = true;
        let report = run_pre_trade_checks(&inputs);
        assert!(!report.is_fatal());
        assert!(report.warnings.iter().any(|w| w.contains("pre-existing")));
    }
}
