//! Drawdown-triggered entry strategy: proposes an extra buy below the
//! plain grid ladder when price has pulled back sharply from its recent
//! high. Grounded in the same candle-ratio arithmetic as
//! [`crate::volatility::VolatilityWindowStrategy`], applied to a rolling
//! high-water mark instead of a volume average.

use parking_lot::Mutex;
use rust_decimal::Decimal;

use gridmm_core::exchange::Candle;
use gridmm_core::grid::GridParams;
use gridmm_core::strategy::{Strategy, StrategyDecision};

struct State {
    recent_high: Option<Decimal>,
    /// Candles elapsed since the last `EnterBuy` decision, so a sustained
    /// drawdown doesn't fire on every single candle.
    cooldown_remaining: u32,
}

/// Tracks a rolling high-water mark off closed candles and proposes a buy
/// at `close * (1 - dip_fraction)` once the close has dropped more than
/// `dip_fraction` below that high, waiting `cooldown_candles` between
/// consecutive entries.
pub struct DipBuyStrategy {
    dip_fraction: Decimal,
    cooldown_candles: u32,
    state: Mutex<State>,
}

impl DipBuyStrategy {
    pub fn new(dip_fraction: Decimal, cooldown_candles: u32) -> Self {
        Self {
            dip_fraction,
            cooldown_candles,
            state: Mutex::new(State {
                recent_high: None,
                cooldown_remaining: 0,
            }),
        }
    }

    /// 5% pullback from the rolling high, waiting 10 candles between entries.
    pub fn with_defaults() -> Self {
        Self::new(Decimal::new(5, 2), 10)
    }
}

impl Strategy for DipBuyStrategy {
    fn on_candle(&self, candle: &Candle, _grid: &GridParams) -> Option<StrategyDecision> {
        let mut state = self.state.lock();

        let high = state.recent_high.get_or_insert(candle.close);
        if candle.close > *high {
            *high = candle.close;
        }
        let high = *high;

        if state.cooldown_remaining > 0 {
            state.cooldown_remaining -= 1;
            return None;
        }

        if high.is_zero() {
            return None;
        }
        let drawdown = (high - candle.close) / high;
        if drawdown >= self.dip_fraction {
            state.cooldown_remaining = self.cooldown_candles;
            let entry = candle.close * (Decimal::ONE - self.dip_fraction);
            return Some(StrategyDecision::enter_buy(
                entry,
                format!("drawdown={drawdown:.4} from recent high {high}"),
            ));
        }

        None
    }

    fn name(&self) -> &str {
        "dip_buy"
    }
}
