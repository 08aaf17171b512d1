// src/agents/momentum.rs
//
// 20-day price momentum analyst.
//
// All signals are fully deterministic functions of the cached closes: no
// clocks, no RNG, no external data.

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, CoreAnalyst, Direction, Signal, TickerSignals};
use crate::errors::StrategyFailure;
use crate::math::indicators;

/// Momentum analyst.
///
/// Measures the trailing `lookback`-day return and maps it to a signal:
/// * r > +5%  →  strong bullish
/// * r > +2%  →  bullish
/// * r < −5%  →  strong bearish
/// * r < −2%  →  bearish
/// * otherwise neutral
///
/// Confidence scales with |r| and stays inside [50, 85].
pub struct MomentumAnalyst {
    pub lookback: usize,
}

impl MomentumAnalyst {
    pub fn new() -> Self {
        Self { lookback: 20 }
    }

    fn signal_for(&self, closes: &[f64]) -> Signal {
        let Some(momentum) = indicators::trailing_return(closes, self.lookback) else {
            return Signal::neutral(format!(
                "Insufficient price data for {}-day momentum",
                self.lookback
            ));
        };

        let pct = momentum * 100.0;
        if momentum > 0.05 {
            let confidence = (50.0 + momentum * 500.0).min(85.0) as u8;
            Signal::new(
                Direction::Bullish,
                confidence,
                format!("Strong positive momentum: {pct:.1}% over {} days", self.lookback),
            )
            .with_num("momentum", momentum)
        } else if momentum > 0.02 {
            let confidence = (50.0 + momentum * 400.0).min(70.0) as u8;
            Signal::new(
                Direction::Bullish,
                confidence,
                format!("Positive momentum: {pct:.1}% over {} days", self.lookback),
            )
            .with_num("momentum", momentum)
        } else if momentum < -0.05 {
            let confidence = (50.0 + momentum.abs() * 500.0).min(85.0) as u8;
            Signal::new(
                Direction::Bearish,
                confidence,
                format!("Strong negative momentum: {pct:.1}% over {} days", self.lookback),
            )
            .with_num("momentum", momentum)
        } else if momentum < -0.02 {
            let confidence = (50.0 + momentum.abs() * 400.0).min(70.0) as u8;
            Signal::new(
                Direction::Bearish,
                confidence,
                format!("Negative momentum: {pct:.1}% over {} days", self.lookback),
            )
            .with_num("momentum", momentum)
        } else {
            Signal::new(
                Direction::Neutral,
                50,
                format!("Neutral momentum: {pct:.1}% over {} days", self.lookback),
            )
            .with_num("momentum", momentum)
        }
    }
}

impl Default for MomentumAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreAnalyst for MomentumAnalyst {
    fn id(&self) -> AnalystId {
        AnalystId::Momentum
    }

    fn analyze(&self, ctx: &DayContext) -> Result<TickerSignals, StrategyFailure> {
        let mut out = TickerSignals::new();
        for ticker in ctx.tickers {
            let signal = match ctx.prices.closes(ticker, ctx.lookback_start, ctx.date) {
                Ok(closes) => self.signal_for(&closes),
                Err(_) => Signal::neutral("No price data available"),
            };
            out.insert(ticker.clone(), signal);
        }
        Ok(out)
    }
}
