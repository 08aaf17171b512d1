// src/agents/growth_composite.rs
//
// Growth Composite analyst: growth-at-a-reasonable-price scoring over four
// weighted sub-factors. In deterministic mode (or with no snapshot) it falls
// back to a 60-day price-growth proxy with a volatility screen.

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, CoreAnalyst, Direction, Signal, TickerSignals};
use crate::errors::StrategyFailure;
use crate::market_data::FundamentalSnapshot;
use crate::math::indicators;

const WEIGHT_REVENUE_GROWTH: f64 = 0.30;
const WEIGHT_EARNINGS_GROWTH: f64 = 0.25;
const WEIGHT_VALUATION_SANITY: f64 = 0.25;
const WEIGHT_BUSINESS_SIMPLICITY: f64 = 0.20;

#[derive(Debug, Clone)]
struct FactorScore {
    score: f64,
    max_score: f64,
    details: String,
}

impl FactorScore {
    fn new(score: f64, max_score: f64, details: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, max_score),
            max_score,
            details: details.into(),
        }
    }

    fn ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            0.0
        }
    }
}

struct GrowthAnalysis {
    revenue_growth: FactorScore,
    earnings_growth: FactorScore,
    valuation_sanity: FactorScore,
    business_simplicity: FactorScore,
    peg_ratio: Option<f64>,
}

impl GrowthAnalysis {
    fn score_ratio(&self) -> f64 {
        let total = self.revenue_growth.score * WEIGHT_REVENUE_GROWTH
            + self.earnings_growth.score * WEIGHT_EARNINGS_GROWTH
            + self.valuation_sanity.score * WEIGHT_VALUATION_SANITY
            + self.business_simplicity.score * WEIGHT_BUSINESS_SIMPLICITY;
        let max = self.revenue_growth.max_score * WEIGHT_REVENUE_GROWTH
            + self.earnings_growth.max_score * WEIGHT_EARNINGS_GROWTH
            + self.valuation_sanity.max_score * WEIGHT_VALUATION_SANITY
            + self.business_simplicity.max_score * WEIGHT_BUSINESS_SIMPLICITY;
        if max > 0.0 {
            total / max
        } else {
            0.5
        }
    }

    fn factor_spread(&self) -> f64 {
        let ratio = self.score_ratio();
        let factors = [
            self.revenue_growth.ratio(),
            self.earnings_growth.ratio(),
            self.valuation_sanity.ratio(),
            self.business_simplicity.ratio(),
        ];
        (factors.iter().map(|f| (f - ratio).powi(2)).sum::<f64>() / factors.len() as f64).sqrt()
    }
}

/// Growth Composite analyst (Portfolio Manager weight 0.25).
///
/// Sub-factors: revenue growth 0.30, earnings growth 0.25, PEG-style
/// valuation sanity 0.25, business simplicity 0.20. Bullish at composite
/// ratio ≥ 0.7, bearish at ≤ 0.4.
pub struct GrowthCompositeAnalyst;

impl GrowthCompositeAnalyst {
    pub fn new() -> Self {
        Self
    }

    fn analyze_ticker(&self, ctx: &DayContext, ticker: &str) -> Signal {
        match ctx.fundamentals.snapshot(ticker) {
            Some(f) => fundamental_signal(&f),
            None => {
                let closes = ctx
                    .prices
                    .closes(ticker, ctx.lookback_start, ctx.date)
                    .unwrap_or_default();
                price_proxy_signal(&closes)
            }
        }
    }
}

impl Default for GrowthCompositeAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreAnalyst for GrowthCompositeAnalyst {
    fn id(&self) -> AnalystId {
        AnalystId::GrowthComposite
    }

    fn analyze(&self, ctx: &DayContext) -> Result<TickerSignals, StrategyFailure> {
        let mut out = TickerSignals::new();
        for ticker in ctx.tickers {
            out.insert(ticker.clone(), self.analyze_ticker(ctx, ticker));
        }
        Ok(out)
    }
}

fn fundamental_signal(f: &FundamentalSnapshot) -> Signal {
    let (valuation_sanity, peg_ratio) = score_valuation_sanity(f);
    let analysis = GrowthAnalysis {
        revenue_growth: score_revenue_growth(f),
        earnings_growth: score_earnings_growth(f),
        valuation_sanity,
        business_simplicity: score_business_simplicity(f),
        peg_ratio,
    };

    let ratio = analysis.score_ratio();
    let direction = if ratio >= 0.7 {
        Direction::Bullish
    } else if ratio <= 0.4 {
        Direction::Bearish
    } else {
        Direction::Neutral
    };

    let base_confidence = (50.0 + (ratio - 0.5) * 60.0).clamp(20.0, 85.0);
    let consistency_boost = (10.0 - analysis.factor_spread() * 20.0).max(0.0).floor();
    let confidence = (base_confidence + consistency_boost).min(90.0) as u8;

    let peg_str = analysis
        .peg_ratio
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "N/A".to_string());

    let mut signal = Signal::new(
        direction,
        confidence,
        format!(
            "Growth Composite: Score {:.0}%. PEG: {peg_str}, Rev Growth: {:.1}, Earnings Growth: {:.1}, Simplicity: {:.1}",
            ratio * 100.0,
            analysis.revenue_growth.score,
            analysis.earnings_growth.score,
            analysis.business_simplicity.score,
        ),
    )
    .with_num("score_ratio", ratio);
    if let Some(peg) = analysis.peg_ratio {
        signal = signal.with_num("peg_ratio", peg);
    }
    signal
}

/// Annualized CAGR of an oldest→newest series. None on short or
/// non-positive-endpoint series.
fn cagr(series: &[f64]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let oldest = *series.first()?;
    let latest = *series.last()?;
    if oldest <= 0.0 || latest <= 0.0 {
        return None;
    }
    let years = (series.len() - 1) as f64;
    Some((latest / oldest).powf(1.0 / years) - 1.0)
}

/// Fraction of periods with period-over-period growth.
fn growth_consistency(series: &[f64]) -> Option<f64> {
    if series.len() < 3 {
        return None;
    }
    let growing = series.windows(2).filter(|w| w[1] > w[0]).count();
    Some(growing as f64 / (series.len() - 1) as f64)
}

fn score_revenue_growth(f: &FundamentalSnapshot) -> FactorScore {
    if f.revenue.len() < 2 {
        return FactorScore::new(0.0, 10.0, "Insufficient data for revenue growth");
    }

    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(cagr) = cagr(&f.revenue) {
        let pct = cagr * 100.0;
        if cagr > 0.25 {
            score += 4.0;
            details.push(format!("Revenue CAGR: {pct:.1}% (exceptional)"));
        } else if cagr > 0.15 {
            score += 3.0;
            details.push(format!("Revenue CAGR: {pct:.1}% (strong)"));
        } else if cagr > 0.08 {
            score += 2.0;
            details.push(format!("Revenue CAGR: {pct:.1}% (moderate)"));
        } else if cagr > 0.03 {
            score += 1.0;
            details.push(format!("Revenue CAGR: {pct:.1}% (slow)"));
        } else {
            details.push(format!("Revenue CAGR: {pct:.1}% (stagnant)"));
        }
    }

    // Acceleration: most recent period-over-period growth vs the oldest.
    if f.revenue.len() >= 3 {
        let rates: Vec<f64> = f
            .revenue
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| (w[1] - w[0]) / w[0].abs())
            .collect();
        if rates.len() >= 2 {
            let recent = *rates.last().expect("len checked");
            let older = rates[0];
            if recent > older * 1.2 {
                score += 3.0;
                details.push(format!(
                    "Accelerating growth: {:.1}% vs {:.1}%",
                    recent * 100.0,
                    older * 100.0
                ));
            } else if recent > older {
                score += 2.0;
                details.push(format!(
                    "Improving growth: {:.1}% vs {:.1}%",
                    recent * 100.0,
                    older * 100.0
                ));
            }
        }
    }

    if let Some(consistency) = growth_consistency(&f.revenue) {
        let pct = consistency * 100.0;
        if consistency >= 0.8 {
            score += 3.0;
            details.push(format!("Growth consistency: {pct:.0}% (steady)"));
        } else if consistency >= 0.6 {
            score += 2.0;
            details.push(format!("Growth consistency: {pct:.0}% (mostly steady)"));
        } else if consistency >= 0.4 {
            score += 1.0;
            details.push(format!("Growth consistency: {pct:.0}% (inconsistent)"));
        }
    }

    if details.is_empty() {
        FactorScore::new(0.0, 10.0, "Limited revenue data")
    } else {
        FactorScore::new(score, 10.0, details.join("; "))
    }
}

fn score_earnings_growth(f: &FundamentalSnapshot) -> FactorScore {
    if f.eps.len() < 2 {
        return FactorScore::new(0.0, 10.0, "Insufficient data for earnings growth");
    }

    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(cagr) = cagr(&f.eps) {
        let pct = cagr * 100.0;
        if cagr > 0.25 {
            score += 4.0;
            details.push(format!("EPS CAGR: {pct:.1}% (exceptional)"));
        } else if cagr > 0.15 {
            score += 3.0;
            details.push(format!("EPS CAGR: {pct:.1}% (strong)"));
        } else if cagr > 0.08 {
            score += 2.0;
            details.push(format!("EPS CAGR: {pct:.1}% (moderate)"));
        } else if cagr > 0.03 {
            score += 1.0;
            details.push(format!("EPS CAGR: {pct:.1}% (slow)"));
        } else {
            details.push(format!("EPS CAGR: {pct:.1}% (stagnant)"));
        }
    }

    if let Some(consistency) = growth_consistency(&f.eps) {
        let pct = consistency * 100.0;
        if consistency >= 0.8 {
            score += 3.0;
            details.push(format!("EPS consistency: {pct:.0}% (quality)"));
        } else if consistency >= 0.6 {
            score += 2.0;
            details.push(format!("EPS consistency: {pct:.0}% (mostly consistent)"));
        } else if consistency >= 0.4 {
            score += 1.0;
            details.push(format!("EPS consistency: {pct:.0}% (inconsistent)"));
        }
    }

    // Average period growth should outpace inflation.
    if f.eps.len() >= 3 {
        let rates: Vec<f64> = f
            .eps
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| (w[1] - w[0]) / w[0].abs())
            .collect();
        if !rates.is_empty() {
            let avg = rates.iter().sum::<f64>() / (f.eps.len() - 1) as f64;
            if avg > 0.10 {
                score += 3.0;
                details.push(format!("EPS growth quality: {:.1}% avg (strong)", avg * 100.0));
            } else if avg > 0.05 {
                score += 2.0;
                details.push(format!("EPS growth quality: {:.1}% avg (moderate)", avg * 100.0));
            }
        }
    }

    FactorScore::new(score, 10.0, details.join("; "))
}

fn score_valuation_sanity(f: &FundamentalSnapshot) -> (FactorScore, Option<f64>) {
    let Some(market_cap) = f.market_cap.filter(|m| *m > 0.0) else {
        return (
            FactorScore::new(5.0, 10.0, "Insufficient data, neutral score"),
            None,
        );
    };

    let mut score = 5.0; // start neutral
    let mut details = Vec::new();

    let pe_ratio = f
        .net_income
        .last()
        .filter(|ni| **ni > 0.0)
        .map(|ni| market_cap / ni)
        .or_else(|| {
            // Per-share fallback when income isn't reported directly.
            match (f.eps.last(), f.outstanding_shares) {
                (Some(&eps), Some(shares)) if eps > 0.0 && shares > 0.0 => {
                    Some(market_cap / shares / eps)
                }
                _ => None,
            }
        });

    if let Some(pe) = pe_ratio {
        details.push(format!("P/E: {pe:.2}"));
        if pe < 15.0 {
            score += 3.0;
            details.push("P/E < 15 (very attractive)".to_string());
        } else if pe < 25.0 {
            score += 2.0;
            details.push("P/E < 25 (reasonable)".to_string());
        } else if pe < 35.0 {
            score += 1.0;
            details.push("P/E < 35 (moderate)".to_string());
        } else {
            score -= 1.0;
            details.push("P/E > 35 (expensive)".to_string());
        }
    }

    let mut peg_ratio = None;
    if let (Some(pe), Some(eps_growth)) = (pe_ratio, cagr(&f.eps)) {
        if eps_growth > 0.0 {
            // PEG = P/E divided by growth rate as a percentage.
            let peg = pe / (eps_growth * 100.0);
            peg_ratio = Some(peg);
            details.push(format!("PEG: {peg:.2} (growth: {:.1}%)", eps_growth * 100.0));
            if peg < 1.0 {
                score += 4.0;
                details.push("PEG < 1.0 (very attractive)".to_string());
            } else if peg < 2.0 {
                score += 3.0;
                details.push("PEG < 2.0 (fair)".to_string());
            } else if peg < 3.0 {
                score += 1.0;
                details.push("PEG < 3.0 (moderate)".to_string());
            } else {
                score -= 2.0;
                details.push("PEG > 3.0 (expensive)".to_string());
            }
        }
    }

    (FactorScore::new(score, 10.0, details.join("; ")), peg_ratio)
}

fn score_business_simplicity(f: &FundamentalSnapshot) -> FactorScore {
    let mut score = 5.0; // start neutral
    let mut details = Vec::new();

    if let Some(de) = f.leverage() {
        if de < 0.3 {
            score += 3.0;
            details.push(format!("Debt/Equity: {de:.2} (manageable)"));
        } else if de < 0.5 {
            score += 2.0;
            details.push(format!("Debt/Equity: {de:.2} (moderate)"));
        } else if de < 1.0 {
            score += 1.0;
            details.push(format!("Debt/Equity: {de:.2} (high)"));
        } else {
            score -= 2.0;
            details.push(format!("Debt/Equity: {de:.2} (very high)"));
        }
    }

    if let Some(fcf_yield) = f.free_cash_flow_yield {
        if fcf_yield > 0.0 {
            score += 2.0;
            details.push("Positive free cash flow (simple)".to_string());
        } else {
            score -= 1.0;
            details.push("Negative free cash flow (complex)".to_string());
        }
    }

    // Insider conviction and press tone feed the story check when available.
    if let Some(net_buys) = f.insider_net_buys {
        if net_buys > 0 {
            score += 1.0;
            details.push(format!("Net insider buying ({net_buys})"));
        } else if net_buys < 0 {
            score -= 1.0;
            details.push(format!("Net insider selling ({net_buys})"));
        }
    }
    if let Some(neg) = f.negative_headline_ratio {
        if neg > 0.5 {
            score -= 1.0;
            details.push(format!("Negative press tone ({:.0}%)", neg * 100.0));
        }
    }

    if details.is_empty() {
        FactorScore::new(5.0, 10.0, "Insufficient data, neutral score")
    } else {
        FactorScore::new(score, 10.0, details.join("; "))
    }
}

/// Deterministic-mode fallback: 60-day price growth with a volatility
/// screen stands in for business growth.
fn price_proxy_signal(closes: &[f64]) -> Signal {
    if closes.len() < 60 {
        return Signal::neutral("Insufficient price data for growth proxy in deterministic mode");
    }

    let current = *closes.last().expect("length checked");
    let then = closes[closes.len() - 60];
    let growth = if then > 0.0 { (current - then) / then } else { 0.0 };
    let volatility = indicators::annualized_volatility(closes, closes.len().min(60) - 1)
        .unwrap_or(0.40);

    let growth_pct = growth * 100.0;
    let vol_pct = volatility * 100.0;
    if growth > 0.15 && volatility < 0.40 {
        let confidence = (50.0 + growth * 200.0).min(75.0) as u8;
        Signal::new(
            Direction::Bullish,
            confidence,
            format!("Price-based growth proxy: {growth_pct:.1}% over 60 days, low volatility ({vol_pct:.0}%)"),
        )
        .with_num("price_growth", growth)
    } else if growth > 0.05 && volatility < 0.50 {
        let confidence = (50.0 + growth * 150.0).min(65.0) as u8;
        Signal::new(
            Direction::Bullish,
            confidence,
            format!("Price-based growth proxy: {growth_pct:.1}% over 60 days, moderate volatility"),
        )
        .with_num("price_growth", growth)
    } else if growth < -0.15 || volatility > 0.60 {
        let confidence = (50.0 + growth.abs() * 150.0).min(70.0) as u8;
        Signal::new(
            Direction::Bearish,
            confidence,
            format!("Price-based growth proxy: {growth_pct:.1}% over 60 days, high volatility ({vol_pct:.0}%)"),
        )
        .with_num("price_growth", growth)
    } else {
        Signal::new(
            Direction::Neutral,
            50,
            format!("Price-based growth proxy: {growth_pct:.1}% over 60 days, mixed signals"),
        )
        .with_num("price_growth", growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compounder() -> FundamentalSnapshot {
        FundamentalSnapshot {
            market_cap: Some(120_000.0),
            revenue: vec![50_000.0, 62_000.0, 78_000.0, 99_000.0],
            eps: vec![2.0, 2.6, 3.4, 4.5],
            net_income: vec![6_000.0, 7_500.0, 9_200.0, 12_000.0],
            debt_to_equity: Some(0.25),
            free_cash_flow_yield: Some(0.06),
            insider_net_buys: Some(3),
            ..Default::default()
        }
    }

    fn stagnating() -> FundamentalSnapshot {
        FundamentalSnapshot {
            market_cap: Some(900_000.0),
            revenue: vec![100_000.0, 98_000.0, 95_000.0, 92_000.0],
            eps: vec![3.0, 2.8, 2.5, 2.2],
            net_income: vec![9_000.0, 8_500.0, 7_500.0, 6_500.0],
            debt_to_equity: Some(1.8),
            free_cash_flow_yield: Some(-0.02),
            ..Default::default()
        }
    }

    #[test]
    fn compounder_scores_bullish() {
        let s = fundamental_signal(&compounder());
        assert_eq!(s.direction, Direction::Bullish);
        assert!(s.reasoning.contains("Growth Composite"));
        assert!(s.num("peg_ratio").is_some());
    }

    #[test]
    fn stagnating_business_scores_bearish() {
        let s = fundamental_signal(&stagnating());
        assert_eq!(s.direction, Direction::Bearish);
    }

    #[test]
    fn cagr_matches_hand_calc() {
        let g = cagr(&[100.0, 121.0]).unwrap();
        assert!((g - 0.21).abs() < 1e-12);
        let g = cagr(&[100.0, 110.0, 121.0]).unwrap();
        assert!((g - 0.10).abs() < 1e-9);
    }

    #[test]
    fn peg_banding_rewards_cheap_growth() {
        let (factor, peg) = score_valuation_sanity(&compounder());
        let peg = peg.unwrap();
        assert!(peg < 1.0, "peg {peg}");
        assert!(factor.score >= 9.0);
    }

    #[test]
    fn price_proxy_rally_is_bullish() {
        // Gentle 20% climb over 80 days: strong growth, muted volatility.
        let closes: Vec<f64> = (0..80).map(|i| 100.0 * (1.0 + 0.0025 * i as f64)).collect();
        let s = price_proxy_signal(&closes);
        assert_eq!(s.direction, Direction::Bullish);
        assert!(s.reasoning.contains("growth proxy"));
    }

    #[test]
    fn pe_falls_back_to_per_share_figures() {
        let f = FundamentalSnapshot {
            market_cap: Some(1_000_000.0),
            eps: vec![4.0, 5.0],
            outstanding_shares: Some(10_000.0),
            ..Default::default()
        };
        // Price/share 100 over EPS 5 → P/E 20, inside the reasonable band.
        let (factor, _) = score_valuation_sanity(&f);
        assert!(factor.details.contains("P/E: 20.00"));
    }

    #[test]
    fn price_proxy_needs_sixty_bars() {
        let closes = vec![100.0; 59];
        let s = price_proxy_signal(&closes);
        assert_eq!(s.direction, Direction::Neutral);
        assert!(s.reasoning.contains("Insufficient"));
    }
}
