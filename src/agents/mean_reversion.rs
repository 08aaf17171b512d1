// src/agents/mean_reversion.rs
//
// Contrarian analyst: flags statistically stretched prices as candidates to
// snap back. Complements the trend-following momentum lane.

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, CoreAnalyst, Direction, Signal, TickerSignals};
use crate::errors::StrategyFailure;
use crate::math::indicators;

const MIN_BARS: usize = 50;

/// Mean-reversion analyst.
///
/// Composite score over three components, each contributing ±1..±3 points:
/// * RSI(14): < 30 oversold (+3), < 40 (+1), > 70 overbought (−3), > 60 (−1)
/// * deviation vs MA20: beyond ∓5% (±2), beyond ∓2% (±1)
/// * deviation vs MA50: beyond ∓8% (±2), beyond ∓3% (±1)
///
/// Score ≥ +4 → bullish, ≤ −4 → bearish, else neutral.
/// Confidence = clamp(50 + 8·|score|, 0, 85).
pub struct MeanReversionAnalyst;

impl MeanReversionAnalyst {
    pub fn new() -> Self {
        Self
    }

    fn signal_for(&self, closes: &[f64]) -> Signal {
        if closes.len() < MIN_BARS {
            return Signal::neutral(
                "Insufficient price data for mean reversion analysis (need 50+ days)",
            );
        }

        let current = *closes.last().expect("non-empty checked above");
        let rsi = indicators::rsi(closes, 14);
        let ma20 = indicators::sma(closes, 20);
        let ma50 = indicators::sma(closes, 50);

        let mut score: i32 = 0;
        let mut reasons: Vec<String> = Vec::new();

        if let Some(rsi) = rsi {
            if rsi < 30.0 {
                score += 3;
                reasons.push(format!("RSI {rsi:.1} (oversold)"));
            } else if rsi < 40.0 {
                score += 1;
                reasons.push(format!("RSI {rsi:.1} (moderately oversold)"));
            } else if rsi > 70.0 {
                score -= 3;
                reasons.push(format!("RSI {rsi:.1} (overbought)"));
            } else if rsi > 60.0 {
                score -= 1;
                reasons.push(format!("RSI {rsi:.1} (moderately overbought)"));
            } else {
                reasons.push(format!("RSI {rsi:.1} (neutral)"));
            }
        }

        if let Some(ma20) = ma20 {
            if ma20 > 0.0 {
                let dev = (current - ma20) / ma20;
                let pct = dev * 100.0;
                if dev < -0.05 {
                    score += 2;
                    reasons.push(format!("Price {pct:.1}% below MA20"));
                } else if dev < -0.02 {
                    score += 1;
                    reasons.push(format!("Price {pct:.1}% below MA20"));
                } else if dev > 0.05 {
                    score -= 2;
                    reasons.push(format!("Price {pct:.1}% above MA20"));
                } else if dev > 0.02 {
                    score -= 1;
                    reasons.push(format!("Price {pct:.1}% above MA20"));
                }
            }
        }

        if let Some(ma50) = ma50 {
            if ma50 > 0.0 {
                let dev = (current - ma50) / ma50;
                let pct = dev * 100.0;
                if dev < -0.08 {
                    score += 2;
                    reasons.push(format!("Price {pct:.1}% below MA50"));
                } else if dev < -0.03 {
                    score += 1;
                    reasons.push(format!("Price {pct:.1}% below MA50"));
                } else if dev > 0.08 {
                    score -= 2;
                    reasons.push(format!("Price {pct:.1}% above MA50"));
                } else if dev > 0.03 {
                    score -= 1;
                    reasons.push(format!("Price {pct:.1}% above MA50"));
                }
            }
        }

        let detail = reasons.join(", ");
        let confidence = (50 + 8 * score.unsigned_abs() as i32).clamp(0, 85) as u8;
        if score >= 4 {
            Signal::new(
                Direction::Bullish,
                confidence,
                format!("Mean reversion bullish: {detail}"),
            )
            .with_num("score", score as f64)
        } else if score <= -4 {
            Signal::new(
                Direction::Bearish,
                confidence,
                format!("Mean reversion bearish: {detail}"),
            )
            .with_num("score", score as f64)
        } else {
            Signal::new(
                Direction::Neutral,
                50,
                format!("Mean reversion neutral: {detail}"),
            )
            .with_num("score", score as f64)
        }
    }
}

impl Default for MeanReversionAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreAnalyst for MeanReversionAnalyst {
    fn id(&self) -> AnalystId {
        AnalystId::MeanReversion
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_below_both_averages_is_bullish() {
        // 60 flat days at 100, then a fast slide to 80.
        let mut closes = vec![100.0; 55];
        for i in 0..5 {
            closes.push(96.0 - i as f64 * 4.0);
        }
        let s = MeanReversionAnalyst::new().signal_for(&closes);
        assert_eq!(s.direction, Direction::Bullish);
        assert!(s.confidence > 50);
        assert!(s.reasoning.contains("bullish"));
    }

    #[test]
    fn melt_up_above_both_averages_is_bearish() {
        let mut closes = vec![100.0; 55];
        for i in 0..5 {
            closes.push(104.0 + i as f64 * 4.0);
        }
        let s = MeanReversionAnalyst::new().signal_for(&closes);
        assert_eq!(s.direction, Direction::Bearish);
    }

    #[test]
    fn flat_series_is_neutral_50() {
        let closes = vec![100.0; 60];
        let s = MeanReversionAnalyst::new().signal_for(&closes);
        assert_eq!(s.direction, Direction::Neutral);
        assert_eq!(s.confidence, 50);
    }

    #[test]
    fn needs_fifty_bars() {
        let closes = vec![100.0; 49];
        let s = MeanReversionAnalyst::new().signal_for(&closes);
        assert_eq!(s.direction, Direction::Neutral);
        assert!(s.reasoning.contains("50+"));
    }

    #[test]
    fn confidence_tracks_score_magnitude() {
        let mut closes = vec![100.0; 55];
        for i in 0..5 {
            closes.push(90.0 - i as f64 * 3.0);
        }
        let s = MeanReversionAnalyst::new().signal_for(&closes);
        let score = s.num("score").unwrap();
        assert!(score >= 4.0);
        assert_eq!(s.confidence as i32, (50 + 8 * score as i32).min(85));
    }
}
