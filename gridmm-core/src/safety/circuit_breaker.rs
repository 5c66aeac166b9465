//! Active risk monitor / circuit breaker (spec.md §4.5.2). Shaped after the
//! teacher's `risk/circuit_breaker.rs`: an explicit two-state machine
//! (`Normal`/`Halted`) that a caller feeds one observation at a time and
//! polls for the current state, rather than something that owns its own
//! polling loop. The inputs here are volume-ratio/price-move off 1-minute
//! candles instead of the teacher's spread/liquidity/staleness checks,
//! since this system has no order book to read a spread from.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;

use crate::config::types::RiskConfig;
use crate::exchange::Candle;

const VOLUME_WINDOW: usize = 20;

/// Current state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Normal,
    Halted,
}

/// One transition report, emitted only when the state actually changes
/// (spec.md §4.5.2 "Emit `RiskEvent{triggered}`").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEvent {
    pub triggered: bool,
    pub vol_ratio: f64,
    pub price_move: f64,
}

/// Volume-ratio / price-move circuit breaker. One instance per symbol,
/// fed every closed 1-minute candle.
pub struct CircuitBreaker {
    config: RiskConfig,
    state: BreakerState,
    volume_history: VecDeque<f64>,
    /// Consecutive candles that have satisfied the clear condition while
    /// halted (spec.md §4.5.2 "Clear when for `recovery_window` candles").
    clear_streak: u32,
}

impl CircuitBreaker {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: BreakerState::Normal,
            volume_history: VecDeque::with_capacity(VOLUME_WINDOW),
            clear_streak: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn set_config(&mut self, config: RiskConfig) {
        self.config = config;
    }

    /// Feed one closed candle; returns `Some(RiskEvent)` only on a state
    /// transition (trip or clear), `None` if the state didn't change.
    pub fn on_candle(&mut self, candle: &Candle) -> Option<RiskEvent> {
        let volume = candle.volume.to_f64().unwrap_or(0.0);
        let open = candle.open.to_f64().unwrap_or(0.0);
        let close = candle.close.to_f64().unwrap_or(0.0);

        let sma = if self.volume_history.is_empty() {
            volume
        } else {
            self.volume_history.iter().sum::<f64>() / self.volume_history.len() as f64
        };
        if self.volume_history.len() == VOLUME_WINDOW {
            self.volume_history.pop_front();
        }
        self.volume_history.push_back(volume);

        let vol_ratio = if sma > 0.0 { volume / sma } else { 0.0 };
        let price_move = if open != 0.0 { (close - open).abs() / open } else { 0.0 };

        match self.state {
            BreakerState::Normal => {
                if vol_ratio >= self.config.volume_multiplier && price_move >= self.config.price_move_threshold {
                    self.state = BreakerState::Halted;
                    self.clear_streak = 0;
                    Some(RiskEvent {
                        triggered: true,
                        vol_ratio,
                        price_move,
                    })
                } else {
                    None
                }
            }
            BreakerState::Halted => {
                let calm = vol_ratio < self.config.volume_multiplier / 2.0
                    && price_move < self.config.price_move_threshold / 2.0;
                if calm {
                    self.clear_streak += 1;
                } else {
                    self.clear_streak = 0;
                }
                if self.clear_streak >= self.config.recovery_window {
                    self.state = BreakerState::Normal;
                    self.clear_streak = 0;
                    Some(RiskEvent {
                        triggered: false,
                        vol_ratio,
                        price_move,
                    })
                } else {
                    None
                }
            }
        }
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

    fn risk_config() -> RiskConfig {
        RiskConfig {
            volume_multiplier: 5.0,
            price_move_threshold: 0.02,
            recovery_window: 3,
        }
    }

    #[test]
    fn calm_market_never_trips() {
        let mut cb = CircuitBreaker::new(risk_config());
        for _ in 0..30 {
            let event = cb.on_candle(&candle(dec!(100), dec!(100.1), dec!(10)));
            assert!(event.is_none());
        }
        assert_eq!(cb.state(), BreakerState::Normal);
    }

    #[test]
    fn volume_spike_with_large_price_move_trips() {
        let mut cb = CircuitBreaker::new(risk_config());
        for _ in 0..20 {
            cb.on_candle(&candle(dec!(100), dec!(100.1), dec!(10)));
        }
        let event = cb.on_candle(&candle(dec!(100), dec!(110), dec!(100))).unwrap();
        assert!(event.triggered);
        assert_eq!(cb.state(), BreakerState::Halted);
    }

    #[test]
    fn volume_spike_without_price_move_does_not_trip() {
        let mut cb = CircuitBreaker::new(risk_config());
        for _ in 0..20 {
            cb.on_candle(&candle(dec!(100), dec!(100.1), dec!(10)));
        }
        let event = cb.on_candle(&candle(dec!(100), dec!(100.2), dec!(100)));
        assert!(event.is_none());
        assert_eq!(cb.state(), BreakerState::Normal);
    }

    #[test]
    fn clears_after_recovery_window_calm_candles() {
        let mut cb = CircuitBreaker::new(risk_config());
        for _ in 0..20 {
            cb.on_candle(&candle(dec!(100), dec!(100.1), dec!(10)));
        }
        cb.on_candle(&candle(dec!(100), dec!(110), dec!(100)));
        assert_eq!(cb.state(), BreakerState::Halted);

        assert!(cb.on_candle(&candle(dec!(110), dec!(110.05), dec!(10))).is_none());
        assert!(cb.on_candle(&candle(dec!(110), dec!(110.05), dec!(10))).is_none());
        let event = cb.on_candle(&candle(dec!(110), dec!(110.05), dec!(10))).unwrap();
        assert!(!event.triggered);
        assert_eq!(cb.state(), BreakerState::Normal);
    }

    #[test]
    fn single_calm_candle_does_not_clear_early() {
        let mut cb = CircuitBreaker::new(risk_config());
        for _ in 0..20 {
            cb.on_candle(&candle(dec!(100), dec!(100.1), dec!(10)));
        }
        cb.on_candle(&candle(dec!(100), dec!(110), dec!(100)));
        cb.on_candle(&candle(dec!(110), dec!(110.05), dec!(10)));
        assert_eq!(cb.state(), BreakerState::Halted);
    }
}
