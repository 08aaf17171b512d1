// src/agents/valuation.rs
//
// Standalone valuation analyst, reduced to the shared signal contract: a
// single-stage discounted-earnings estimate compared against market cap.
// With no fundamentals it reads the gap between price and its long moving
// averages instead.

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, CoreAnalyst, Direction, Signal, TickerSignals};
use crate::errors::StrategyFailure;
use crate::market_data::FundamentalSnapshot;
use crate::math::indicators;

const DISCOUNT_RATE: f64 = 0.10;
const MAX_GROWTH: f64 = 0.08;
const GAP_THRESHOLD: f64 = 0.15;

/// Valuation analyst (Portfolio Manager weight 0.20).
///
/// Bullish when the intrinsic estimate exceeds market cap by more than 15%,
/// bearish when it falls short by more than 15%.
pub struct ValuationAnalyst;

impl ValuationAnalyst {
    pub fn new() -> Self {
        Self
    }

    fn analyze_ticker(&self, ctx: &DayContext, ticker: &str) -> Signal {
        if let Some(f) = ctx.fundamentals.snapshot(ticker) {
            if let Some(signal) = intrinsic_gap_signal(&f) {
                return signal;
            }
        }
        let closes = ctx
            .prices
            .closes(ticker, ctx.lookback_start, ctx.date)
            .unwrap_or_default();
        trend_gap_signal(&closes)
    }
}

impl Default for ValuationAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreAnalyst for ValuationAnalyst {
    fn id(&self) -> AnalystId {
        AnalystId::Valuation
    }

    fn analyze(&self, ctx: &DayContext) -> Result<TickerSignals, StrategyFailure> {
        let mut out = TickerSignals::new();
        for ticker in ctx.tickers {
            out.insert(ticker.clone(), self.analyze_ticker(ctx, ticker));
        }
        Ok(out)
    }
}

/// Perpetuity value of current earnings grown at a capped historical rate,
/// discounted at 10%. None when earnings or market cap are unusable.
fn intrinsic_gap_signal(f: &FundamentalSnapshot) -> Option<Signal> {
    let market_cap = f.market_cap.filter(|m| *m > 0.0)?;
    let earnings = *f.net_income.last().filter(|e| **e > 0.0)?;

    let growth = FundamentalSnapshot::trailing_growth(&f.net_income)
        .map(|g| {
            let periods = (f.net_income.len() - 1).max(1) as f64;
            (g / periods).clamp(0.0, MAX_GROWTH)
        })
        .unwrap_or(0.0);

    let intrinsic = earnings * (1.0 + growth) / (DISCOUNT_RATE - growth);
    let gap = (intrinsic - market_cap) / market_cap;

    Some(gap_to_signal(
        gap,
        format!(
            "DCF gap {:.0}%: intrinsic ${intrinsic:.0} vs market cap ${market_cap:.0} (growth {:.1}%)",
            gap * 100.0,
            growth * 100.0
        ),
    ))
}

/// Price-only fallback: discount of price to the blended MA50/MA100 level.
fn trend_gap_signal(closes: &[f64]) -> Signal {
    if closes.len() < 50 {
        return Signal::neutral("Insufficient data for valuation analysis");
    }
    let current = *closes.last().expect("length checked");
    let ma50 = indicators::sma(closes, 50).unwrap_or(current);
    let ma100 = indicators::sma(closes, closes.len().min(100)).unwrap_or(ma50);
    let anchor = (ma50 + ma100) / 2.0;
    if anchor <= 0.0 {
        return Signal::neutral("Degenerate price history for valuation analysis");
    }
    let gap = (anchor - current) / anchor;
    gap_to_signal(
        gap,
        format!(
            "Trend-anchor gap {:.1}%: price {current:.2} vs anchor {anchor:.2} [price-proxy]",
            gap * 100.0
        ),
    )
}

fn gap_to_signal(gap: f64, reasoning: String) -> Signal {
    // Confidence grows with the size of the gap, capped at 80.
    let confidence = (50.0 + gap.abs() * 100.0).min(80.0) as u8;
    let signal = if gap > GAP_THRESHOLD {
        Signal::new(Direction::Bullish, confidence, reasoning)
    } else if gap < -GAP_THRESHOLD {
        Signal::new(Direction::Bearish, confidence, reasoning)
    } else {
        Signal::new(Direction::Neutral, 50, reasoning)
    };
    signal.with_num("valuation_gap", gap)
}
