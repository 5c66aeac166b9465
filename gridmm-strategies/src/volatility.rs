//! Volatility-driven window strategy: widens the buy window in calm
//! markets and narrows it in turbulent ones. Grounded in
//! `gridmm_core::safety::circuit_breaker`'s volume-ratio/price-move reading
//! off closed candles, reused here as a continuous bias signal instead of a
//! binary trip/clear state machine.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;

use gridmm_core::exchange::Candle;
use gridmm_core::grid::GridParams;
use gridmm_core::strategy::{Strategy, StrategyDecision};

const VOLUME_WINDOW: usize = 20;

struct State {
    volume_history: VecDeque<f64>,
}

/// Widens the buy window by one level when a candle's volume and price
/// move both sit below `calm_volume_ratio`/`calm_price_move`, narrows it
/// when either exceeds `busy_volume_ratio`/`busy_price_move`, and skips
/// otherwise. The window-size arithmetic itself lives in the Position
/// Manager (spec.md §9); this strategy only ever emits `WidenWindow`,
/// `NarrowWindow`, or `Skip`.
pub struct VolatilityWindowStrategy {
    calm_volume_ratio: f64,
    calm_price_move: f64,
    busy_volume_ratio: f64,
    busy_price_move: f64,
    state: Mutex<State>,
}

impl VolatilityWindowStrategy {
    pub fn new(
        calm_volume_ratio: f64,
        calm_price_move: f64,
        busy_volume_ratio: f64,
        busy_price_move: f64,
    ) -> Self {
        Self {
            calm_volume_ratio,
            calm_price_move,
            busy_volume_ratio,
            busy_price_move,
            state: Mutex::new(State {
                volume_history: VecDeque::with_capacity(VOLUME_WINDOW),
            }),
        }
    }

    /// Reasonable defaults: calm below 0.5x average volume and under 0.3%
    /// move, busy above 3x average volume or over 1.5% move.
    pub fn with_defaults() -> Self {
        Self::new(0.5, 0.003, 3.0, 0.015)
    }
}

impl Strategy for VolatilityWindowStrategy {
    fn on_candle(&self, candle: &Candle, _grid: &GridParams) -> Option<StrategyDecision> {
        let volume = candle.volume.to_f64().unwrap_or(0.0);
        let open = candle.open.to_f64().unwrap_or(0.0);
        let close = candle.close.to_f64().unwrap_or(0.0);

        let mut state = self.state.lock();
        let sma = if state.volume_history.is_empty() {
            volume
        } else {
            state.volume_history.iter().sum::<f64>() / state.volume_history.len() as f64
        };
        if state.volume_history.len() == VOLUME_WINDOW {
            state.volume_history.pop_front();
        }
        state.volume_history.push_back(volume);
        drop(state);

        let vol_ratio = if sma > 0.0 { volume / sma } else { 0.0 };
        let price_move = if open != 0.0 { (close - open).abs() / open } else { 0.0 };

        if vol_ratio >= self.busy_volume_ratio || price_move >= self.busy_price_move {
            Some(StrategyDecision::narrow_window(format!(
                "vol_ratio={vol_ratio:.2} price_move={price_move:.4} above busy threshold"
            )))
        } else if vol_ratio <= self.calm_volume_ratio && price_move <= self.calm_price_move {
            Some(StrategyDecision::widen_window(format!(
                "vol_ratio={vol_ratio:.2} price_move={price_move:.4} below calm threshold"
            )))
        } else {
            None
        }
    }

    fn name(&self) -> &str {
        "volatility_window"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: rust_decimal::Decimal, close: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> Candle {
        Candle {
            open_ts_millis: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        }
    }

    fn grid() -> GridParams {
        GridParams {
            price_interval: dec!(2),
            order_quantity: dec!(30),
            buy_window_size: 3,
            sell_window_size: 3,
            price_decimals: 2,
            quantity_decimals: 6,
        }
    }

    #[test]
    fn sustained_calm_market_widens() {
        let strat = VolatilityWindowStrategy::with_defaults();
        for _ in 0..20 {
            strat.on_candle(&candle(dec!(100), dec!(100.05), dec!(10)), &grid());
        }
        let decision = strat
            .on_candle(&candle(dec!(100), dec!(100.01), dec!(2)), &grid())
            .unwrap();
        assert_eq!(decision.action, gridmm_core::strategy::StrategyAction::WidenWindow);
    }

    #[test]
    fn volume_spike_with_large_move_narrows() {
        let strat = VolatilityWindowStrategy::with_defaults();
        for _ in 0..20 {
            strat.on_candle(&candle(dec!(100), dec!(100.05), dec!(10)), &grid());
        }
        let decision = strat
            .on_candle(&candle(dec!(100), dec!(110), dec!(100)), &grid())
            .unwrap();
        assert_eq!(decision.action, gridmm_core::strategy::StrategyAction::NarrowWindow);
    }

    #[test]
    fn ordinary_candle_skips() {
        let strat = VolatilityWindowStrategy::with_defaults();
        for _ in 0..20 {
            strat.on_candle(&candle(dec!(100), dec!(100.5), dec!(10)), &grid());
        }
        let decision = strat.on_candle(&candle(dec!(100), dec!(100.5), dec!(10)), &grid());
        assert!(decision.is_none());
    }

    #[test]
    fn name_is_stable() {
        let strat = VolatilityWindowStrategy::with_defaults();
        assert_eq!(strat.name(), "volatility_window");
    }
}
