// src/agents/value_composite.rs
//
// Value Composite analyst: five weighted sub-factors scored against
// fundamentals, anchored by an intrinsic-value margin of safety. When
// fundamentals are unavailable (deterministic mode, missing snapshot) the
// same composite machinery runs on price-derived proxies.

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, CoreAnalyst, Direction, Signal, TickerSignals};
use crate::errors::StrategyFailure;
use crate::market_data::FundamentalSnapshot;
use crate::math::indicators;

const WEIGHT_VALUATION_MARGIN: f64 = 0.30;
const WEIGHT_BUSINESS_QUALITY: f64 = 0.25;
const WEIGHT_BALANCE_SHEET: f64 = 0.20;
const WEIGHT_EARNINGS_QUALITY: f64 = 0.15;
const WEIGHT_CONSERVATIVE_GROWTH: f64 = 0.10;

const DISCOUNT_RATE: f64 = 0.10;
const PROJECTION_YEARS: u32 = 10;
const TERMINAL_MULTIPLE: f64 = 12.0;

/// One sub-factor's contribution: a bounded score plus the evidence.
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

    fn empty(detail: &str) -> Self {
        Self::new(0.0, 10.0, detail)
    }

    fn ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            0.0
        }
    }
}

struct CompositeAnalysis {
    valuation_margin: FactorScore,
    business_quality: FactorScore,
    balance_sheet: FactorScore,
    earnings_quality: FactorScore,
    conservative_growth: FactorScore,
    margin_of_safety: Option<f64>,
}

impl CompositeAnalysis {
    fn score_ratio(&self) -> f64 {
        let total = self.valuation_margin.score * WEIGHT_VALUATION_MARGIN
            + self.business_quality.score * WEIGHT_BUSINESS_QUALITY
            + self.balance_sheet.score * WEIGHT_BALANCE_SHEET
            + self.earnings_quality.score * WEIGHT_EARNINGS_QUALITY
            + self.conservative_growth.score * WEIGHT_CONSERVATIVE_GROWTH;
        let max = self.valuation_margin.max_score * WEIGHT_VALUATION_MARGIN
            + self.business_quality.max_score * WEIGHT_BUSINESS_QUALITY
            + self.balance_sheet.max_score * WEIGHT_BALANCE_SHEET
            + self.earnings_quality.max_score * WEIGHT_EARNINGS_QUALITY
            + self.conservative_growth.max_score * WEIGHT_CONSERVATIVE_GROWTH;
        if max > 0.0 {
            total / max
        } else {
            0.0
        }
    }

    /// Standard deviation of factor ratios around the composite ratio, a
    /// consistency read: tight factors earn a confidence boost.
    fn factor_spread(&self) -> f64 {
        let ratio = self.score_ratio();
        let factors = [
            self.valuation_margin.ratio(),
            self.business_quality.ratio(),
            self.balance_sheet.ratio(),
            self.earnings_quality.ratio(),
            self.conservative_growth.ratio(),
        ];
        (factors.iter().map(|f| (f - ratio).powi(2)).sum::<f64>() / factors.len() as f64).sqrt()
    }
}

/// Value Composite analyst (Portfolio Manager weight 0.30).
///
/// Bullish when the composite ratio clears 0.7 with a margin of safety
/// above 20%; bearish when the ratio falls under 0.4 or the margin is
/// worse than −20%; neutral in between.
pub struct ValueCompositeAnalyst;

impl ValueCompositeAnalyst {
    pub fn new() -> Self {
        Self
    }

    fn analyze_ticker(&self, ctx: &DayContext, ticker: &str) -> Signal {
        let closes = ctx
            .prices
            .closes(ticker, ctx.lookback_start, ctx.date)
            .unwrap_or_default();

        match ctx.fundamentals.snapshot(ticker) {
            Some(f) => {
                let analysis = analyze_fundamentals(&f);
                build_signal(&analysis, "")
            }
            None if closes.len() >= 50 => {
                let analysis = analyze_price_proxies(&closes);
                build_signal(&analysis, " [price-proxy]")
            }
            None => Signal::neutral("No fundamentals and insufficient price history for value analysis"),
        }
    }
}

impl Default for ValueCompositeAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreAnalyst for ValueCompositeAnalyst {
    fn id(&self) -> AnalystId {
        AnalystId::ValueComposite
    }

    fn analyze(&self, ctx: &DayContext) -> Result<TickerSignals, StrategyFailure> {
        let mut out = TickerSignals::new();
        for ticker in ctx.tickers {
            out.insert(ticker.clone(), self.analyze_ticker(ctx, ticker));
        }
        Ok(out)
    }
}

fn build_signal(analysis: &CompositeAnalysis, tag: &str) -> Signal {
    let ratio = analysis.score_ratio();

    let base_confidence = (50.0 + (ratio - 0.5) * 60.0).clamp(20.0, 85.0);
    let consistency_boost = (10.0 - analysis.factor_spread() * 20.0).max(0.0).floor();
    let confidence = (base_confidence + consistency_boost).min(90.0) as u8;

    let factors_line = format!(
        "Factors: Val {:.1}, Quality {:.1}, BS {:.1}, Earnings {:.1}, Growth {:.1}",
        analysis.valuation_margin.score,
        analysis.business_quality.score,
        analysis.balance_sheet.score,
        analysis.earnings_quality.score,
        analysis.conservative_growth.score,
    );

    let mut signal = match analysis.margin_of_safety {
        Some(margin) => {
            let margin_pct = margin * 100.0;
            if ratio > 0.7 && margin > 0.2 {
                Signal::new(
                    Direction::Bullish,
                    confidence,
                    format!(
                        "Value Composite: Strong (score {:.0}%, margin {margin_pct:.0}%){tag}. {factors_line}",
                        ratio * 100.0
                    ),
                )
            } else if ratio > 0.6 && margin > 0.0 {
                Signal::new(
                    Direction::Bullish,
                    confidence,
                    format!(
                        "Value Composite: Good (score {:.0}%, margin {margin_pct:.0}%){tag}. {factors_line}",
                        ratio * 100.0
                    ),
                )
            } else if ratio < 0.4 || margin < -0.2 {
                Signal::new(
                    Direction::Bearish,
                    confidence,
                    format!(
                        "Value Composite: Weak (score {:.0}%, margin {margin_pct:.0}%){tag}. Poor valuation/quality/balance sheet",
                        ratio * 100.0
                    ),
                )
            } else {
                Signal::new(
                    Direction::Neutral,
                    confidence,
                    format!(
                        "Value Composite: Mixed (score {:.0}%, margin {margin_pct:.0}%){tag}. Inconsistent factors",
                        ratio * 100.0
                    ),
                )
            }
        }
        None => {
            if ratio > 0.7 {
                Signal::new(
                    Direction::Bullish,
                    confidence,
                    format!(
                        "Value Composite: Strong fundamentals (score {:.0}%), valuation unknown{tag}. {factors_line}",
                        ratio * 100.0
                    ),
                )
            } else if ratio < 0.4 {
                Signal::new(
                    Direction::Bearish,
                    confidence,
                    format!(
                        "Value Composite: Weak fundamentals (score {:.0}%){tag}. Poor quality/balance sheet",
                        ratio * 100.0
                    ),
                )
            } else {
                Signal::new(
                    Direction::Neutral,
                    confidence,
                    format!(
                        "Value Composite: Moderate (score {:.0}%), insufficient valuation data{tag}",
                        ratio * 100.0
                    ),
                )
            }
        }
    };

    signal = signal.with_num("score_ratio", ratio);
    if let Some(margin) = analysis.margin_of_safety {
        signal = signal.with_num("margin_of_safety", margin);
    }
    signal
}

// ---------------------------------------------------------------------------
// Fundamentals path
// ---------------------------------------------------------------------------

fn analyze_fundamentals(f: &FundamentalSnapshot) -> CompositeAnalysis {
    let margin_of_safety = intrinsic_margin_of_safety(f);
    CompositeAnalysis {
        valuation_margin: score_valuation_margin(f, margin_of_safety),
        business_quality: score_business_quality(f),
        balance_sheet: score_balance_sheet(f),
        earnings_quality: score_earnings_quality(f),
        conservative_growth: score_conservative_growth(f),
        margin_of_safety,
    }
}

/// Owner earnings: reported income adjusted for non-cash depreciation,
/// the capex needed just to stand still, and working-capital swallowed by
/// growth. Falls back to reported net income when the cash-flow lines are
/// missing.
fn owner_earnings(f: &FundamentalSnapshot) -> Option<f64> {
    let net_income = *f.net_income.last()?;
    match (f.depreciation, f.capital_expenditure) {
        (Some(depreciation), Some(capex)) => {
            let maintenance_capex = estimate_maintenance_capex(capex);
            let working_capital = f.working_capital_change.unwrap_or(0.0);
            Some(net_income + depreciation - maintenance_capex - working_capital)
        }
        _ => Some(net_income),
    }
}

/// Maintenance share of capex. Without a revenue-linked breakdown, treat
/// 85% of reported capex as non-discretionary.
fn estimate_maintenance_capex(capital_expenditure: f64) -> f64 {
    capital_expenditure.abs() * 0.85
}

/// Conservative owner-earnings discounting: earnings grown at a haircut
/// historical rate for ten years at a 10% discount rate, plus a 12×
/// terminal multiple. Margin = (intrinsic − market cap) / market cap.
fn intrinsic_margin_of_safety(f: &FundamentalSnapshot) -> Option<f64> {
    let market_cap = f.market_cap.filter(|m| *m > 0.0)?;
    let earnings = owner_earnings(f).filter(|e| *e > 0.0)?;
    let growth = conservative_growth_rate(&f.net_income).unwrap_or(0.0);

    let mut intrinsic = 0.0;
    let mut projected = earnings;
    for year in 1..=PROJECTION_YEARS {
        projected *= 1.0 + growth;
        intrinsic += projected / (1.0 + DISCOUNT_RATE).powi(year as i32);
    }
    intrinsic += projected * TERMINAL_MULTIPLE / (1.0 + DISCOUNT_RATE).powi(PROJECTION_YEARS as i32);

    Some((intrinsic - market_cap) / market_cap)
}

/// Historical growth with a 30% haircut, capped between −5% and +15%.
fn conservative_growth_rate(series: &[f64]) -> Option<f64> {
    let raw = FundamentalSnapshot::trailing_growth(series)?;
    let periods = (series.len() - 1) as f64;
    let annualized = raw / periods;
    Some((annualized * 0.7).clamp(-0.05, 0.15))
}

fn score_valuation_margin(f: &FundamentalSnapshot, margin: Option<f64>) -> FactorScore {
    let Some(market_cap) = f.market_cap.filter(|m| *m > 0.0) else {
        return FactorScore::empty("Insufficient data for valuation margin");
    };

    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(margin) = margin {
        if margin > 0.3 {
            score += 4.0;
            details.push(format!("Deep discount to intrinsic value ({:.0}%)", margin * 100.0));
        } else if margin > 0.15 {
            score += 3.0;
            details.push(format!("Discount to intrinsic value ({:.0}%)", margin * 100.0));
        } else if margin > 0.0 {
            score += 2.0;
            details.push(format!("Slight discount to intrinsic value ({:.0}%)", margin * 100.0));
        } else {
            details.push(format!("Priced above intrinsic value ({:.0}%)", margin * 100.0));
        }
    }

    if let Some(&earnings) = f.net_income.last() {
        let earnings_yield = earnings / market_cap;
        if earnings_yield > 0.10 {
            score += 3.0;
            details.push(format!("Rich earnings yield {:.1}%", earnings_yield * 100.0));
        } else if earnings_yield > 0.06 {
            score += 2.0;
            details.push(format!("Solid earnings yield {:.1}%", earnings_yield * 100.0));
        } else if earnings_yield > 0.03 {
            score += 1.0;
            details.push(format!("Modest earnings yield {:.1}%", earnings_yield * 100.0));
        }
    }

    if let Some(fcf_yield) = f.free_cash_flow_yield {
        if fcf_yield > 0.08 {
            score += 3.0;
            details.push(format!("FCF yield {:.1}%", fcf_yield * 100.0));
        } else if fcf_yield > 0.05 {
            score += 2.0;
            details.push(format!("FCF yield {:.1}%", fcf_yield * 100.0));
        } else if fcf_yield > 0.02 {
            score += 1.0;
            details.push(format!("FCF yield {:.1}%", fcf_yield * 100.0));
        }
    }

    if details.is_empty() {
        FactorScore::empty("Limited valuation data")
    } else {
        FactorScore::new(score, 10.0, details.join("; "))
    }
}

fn score_business_quality(f: &FundamentalSnapshot) -> FactorScore {
    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(roe) = f.return_on_equity {
        if roe > 0.20 {
            score += 3.0;
            details.push(format!("Excellent ROE {:.1}%", roe * 100.0));
        } else if roe > 0.15 {
            score += 2.0;
            details.push(format!("Strong ROE {:.1}%", roe * 100.0));
        } else if roe > 0.10 {
            score += 1.0;
            details.push(format!("Decent ROE {:.1}%", roe * 100.0));
        } else {
            details.push(format!("Weak ROE {:.1}%", roe * 100.0));
        }
    }

    if let Some(margin) = f.operating_margin {
        if margin > 0.20 {
            score += 3.0;
            details.push(format!("Wide operating margin {:.1}%", margin * 100.0));
        } else if margin > 0.15 {
            score += 2.0;
            details.push(format!("Healthy operating margin {:.1}%", margin * 100.0));
        } else if margin > 0.10 {
            score += 1.0;
            details.push(format!("Thin operating margin {:.1}%", margin * 100.0));
        }
    }

    if f.net_income.len() >= 3 {
        let profitable = f.net_income.iter().filter(|e| **e > 0.0).count();
        if profitable == f.net_income.len() {
            score += 2.0;
            details.push("Profitable in every reported period".to_string());
        } else if profitable * 2 >= f.net_income.len() {
            score += 1.0;
            details.push("Profitable in most periods".to_string());
        }
    }

    // Moat persistence: returns that stay high across periods point to a
    // durable advantage rather than a good year.
    if f.return_on_equity_history.len() >= 3 {
        let high_periods = f
            .return_on_equity_history
            .iter()
            .filter(|roe| **roe > 0.15)
            .count();
        let total = f.return_on_equity_history.len();
        if high_periods * 10 >= total * 8 {
            score += 2.0;
            details.push(format!("Durable moat: ROE > 15% in {high_periods}/{total} periods"));
        } else if high_periods * 2 >= total {
            score += 1.0;
            details.push(format!("Partial moat: ROE > 15% in {high_periods}/{total} periods"));
        }
    }

    if let Some(growth) = FundamentalSnapshot::trailing_growth(&f.revenue) {
        if growth > 0.0 {
            score += 2.0;
            details.push(format!("Revenue expanding ({:.0}% total)", growth * 100.0));
        }
    }

    if details.is_empty() {
        FactorScore::empty("Insufficient data for quality analysis")
    } else {
        FactorScore::new(score, 10.0, details.join("; "))
    }
}

fn score_balance_sheet(f: &FundamentalSnapshot) -> FactorScore {
    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(de) = f.leverage() {
        if de < 0.3 {
            score += 4.0;
            details.push(format!("Very low debt-to-equity {de:.2}"));
        } else if de < 0.5 {
            score += 3.0;
            details.push(format!("Low debt-to-equity {de:.2}"));
        } else if de < 1.0 {
            score += 1.0;
            details.push(format!("Moderate debt-to-equity {de:.2}"));
        } else {
            details.push(format!("High debt-to-equity {de:.2}"));
        }
    }

    if let Some(cr) = f.current_ratio {
        if cr > 2.0 {
            score += 3.0;
            details.push(format!("Ample liquidity (current ratio {cr:.1})"));
        } else if cr > 1.5 {
            score += 2.0;
            details.push(format!("Good liquidity (current ratio {cr:.1})"));
        } else if cr > 1.0 {
            score += 1.0;
            details.push(format!("Adequate liquidity (current ratio {cr:.1})"));
        } else {
            details.push(format!("Tight liquidity (current ratio {cr:.1})"));
        }
    }

    if let Some(fcf_yield) = f.free_cash_flow_yield {
        if fcf_yield > 0.0 {
            score += 3.0;
            details.push("Positive free cash flow".to_string());
        }
    }

    if details.is_empty() {
        FactorScore::empty("Insufficient data for balance sheet analysis")
    } else {
        FactorScore::new(score, 10.0, details.join("; "))
    }
}

fn score_earnings_quality(f: &FundamentalSnapshot) -> FactorScore {
    if f.eps.len() < 2 {
        return FactorScore::empty("Insufficient data for earnings quality");
    }

    let mut score = 0.0;
    let mut details = Vec::new();

    let growing_periods = f.eps.windows(2).filter(|w| w[1] > w[0]).count();
    let total_periods = f.eps.len() - 1;
    if growing_periods == total_periods {
        score += 4.0;
        details.push("EPS grew in every period".to_string());
    } else if growing_periods * 2 >= total_periods {
        score += 2.0;
        details.push(format!("EPS grew in {growing_periods}/{total_periods} periods"));
    } else {
        details.push(format!("EPS erratic ({growing_periods}/{total_periods} growing periods)"));
    }

    if f.eps.last().map(|e| *e > 0.0).unwrap_or(false) {
        score += 3.0;
        details.push("Currently profitable per share".to_string());
    }

    if let (Some(fcf_yield), Some(market_cap), Some(&earnings)) =
        (f.free_cash_flow_yield, f.market_cap, f.net_income.last())
    {
        if market_cap > 0.0 && earnings > 0.0 {
            let earnings_yield = earnings / market_cap;
            // Cash conversion: FCF backing at least ~80% of reported earnings.
            if fcf_yield >= earnings_yield * 0.8 {
                score += 3.0;
                details.push("Earnings backed by free cash flow".to_string());
            }
        }
    }

    FactorScore::new(score, 10.0, details.join("; "))
}

fn score_conservative_growth(f: &FundamentalSnapshot) -> FactorScore {
    if f.revenue.len() < 2 && f.eps.len() < 2 {
        return FactorScore::new(5.0, 10.0, "Insufficient data, neutral score");
    }

    let mut score = 0.0;
    let mut details = Vec::new();

    if let Some(growth) = conservative_growth_rate(&f.revenue) {
        if growth > 0.10 {
            score += 4.0;
            details.push(format!("Haircut revenue growth {:.1}%/yr", growth * 100.0));
        } else if growth > 0.05 {
            score += 3.0;
            details.push(format!("Haircut revenue growth {:.1}%/yr", growth * 100.0));
        } else if growth > 0.0 {
            score += 2.0;
            details.push(format!("Haircut revenue growth {:.1}%/yr", growth * 100.0));
        } else {
            details.push(format!("Shrinking revenue ({:.1}%/yr)", growth * 100.0));
        }
    }

    if let Some(growth) = conservative_growth_rate(&f.eps) {
        if growth > 0.05 {
            score += 3.0;
            details.push(format!("Haircut EPS growth {:.1}%/yr", growth * 100.0));
        } else if growth > 0.0 {
            score += 2.0;
            details.push(format!("Haircut EPS growth {:.1}%/yr", growth * 100.0));
        }
    }

    FactorScore::new(score, 10.0, details.join("; "))
}

// ---------------------------------------------------------------------------
// Price-proxy path (deterministic mode / missing fundamentals)
// ---------------------------------------------------------------------------

fn analyze_price_proxies(closes: &[f64]) -> CompositeAnalysis {
    let current = *closes.last().expect("caller checked length");

    // Margin proxy: discount of the current price to its long moving
    // average stands in for discount to intrinsic value.
    let long_window = closes.len().min(100);
    let ma_long = indicators::sma(closes, long_window).unwrap_or(current);
    let margin = if ma_long > 0.0 {
        (ma_long - current) / ma_long
    } else {
        0.0
    };

    let valuation_margin = {
        let mut score = 0.0;
        if margin > 0.10 {
            score += 6.0;
        } else if margin > 0.03 {
            score += 4.0;
        } else if margin > -0.03 {
            score += 2.0;
        }
        FactorScore::new(
            score,
            10.0,
            format!("Price {:.1}% vs {}-day average", -margin * 100.0, long_window),
        )
    };

    let business_quality = {
        let vol = indicators::annualized_volatility(closes, 20).unwrap_or(0.40);
        let drift = indicators::trailing_return(closes, closes.len().min(60)).unwrap_or(0.0);
        let mut score = 0.0;
        if vol < 0.20 {
            score += 4.0;
        } else if vol < 0.35 {
            score += 2.0;
        }
        if drift > 0.0 {
            score += 3.0;
        }
        FactorScore::new(
            score,
            10.0,
            format!("Proxy quality: vol {:.0}%, 60d drift {:.1}%", vol * 100.0, drift * 100.0),
        )
    };

    let balance_sheet = {
        let drawdown = indicators::max_drawdown(closes);
        let score = if drawdown < 0.10 {
            7.0
        } else if drawdown < 0.20 {
            5.0
        } else if drawdown < 0.35 {
            3.0
        } else {
            1.0
        };
        FactorScore::new(
            score,
            10.0,
            format!("Proxy resilience: max drawdown {:.0}%", drawdown * 100.0),
        )
    };

    let earnings_quality = {
        let consistency = indicators::directional_consistency(closes, 20).unwrap_or(0.5);
        let score = if consistency > 0.65 { 6.0 } else if consistency > 0.55 { 4.0 } else { 2.0 };
        FactorScore::new(
            score,
            10.0,
            format!("Proxy stability: 20d consistency {:.0}%", consistency * 100.0),
        )
    };

    let conservative_growth = {
        let drift = indicators::trailing_return(closes, closes.len().min(100)).unwrap_or(0.0) * 0.7;
        let mut score = 0.0;
        if drift > 0.05 {
            score += 6.0;
        } else if drift > 0.0 {
            score += 4.0;
        }
        FactorScore::new(
            score,
            10.0,
            format!("Proxy growth: haircut trend {:.1}%", drift * 100.0),
        )
    };

    CompositeAnalysis {
        valuation_margin,
        business_quality,
        balance_sheet,
        earnings_quality,
        conservative_growth,
        margin_of_safety: Some(margin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_fundamentals() -> FundamentalSnapshot {
        FundamentalSnapshot {
            market_cap: Some(100_000.0),
            revenue: vec![80_000.0, 90_000.0, 100_000.0, 115_000.0],
            eps: vec![4.0, 4.5, 5.2, 6.0],
            net_income: vec![9_000.0, 10_000.0, 11_500.0, 13_000.0],
            return_on_equity: Some(0.25),
            operating_margin: Some(0.24),
            debt_to_equity: Some(0.2),
            current_ratio: Some(2.4),
            free_cash_flow_yield: Some(0.11),
            ..Default::default()
        }
    }

    fn weak_fundamentals() -> FundamentalSnapshot {
        FundamentalSnapshot {
            market_cap: Some(500_000.0),
            revenue: vec![100_000.0, 90_000.0, 75_000.0],
            eps: vec![2.0, 0.5, -1.0],
            net_income: vec![5_000.0, 1_000.0, -2_000.0],
            return_on_equity: Some(0.02),
            operating_margin: Some(0.04),
            debt_to_equity: Some(2.5),
            current_ratio: Some(0.8),
            free_cash_flow_yield: Some(-0.01),
            ..Default::default()
        }
    }

    #[test]
    fn strong_book_scores_bullish() {
        let analysis = analyze_fundamentals(&strong_fundamentals());
        assert!(analysis.score_ratio() > 0.7, "ratio {}", analysis.score_ratio());
        let margin = analysis.margin_of_safety.unwrap();
        assert!(margin > 0.2, "margin {margin}");
        let signal = build_signal(&analysis, "");
        assert_eq!(signal.direction, Direction::Bullish);
        assert!(signal.confidence >= 50);
        assert!(signal.reasoning.contains("Value Composite"));
    }

    #[test]
    fn deteriorating_book_scores_bearish() {
        let analysis = analyze_fundamentals(&weak_fundamentals());
        assert!(analysis.score_ratio() < 0.4, "ratio {}", analysis.score_ratio());
        let signal = build_signal(&analysis, "");
        assert_eq!(signal.direction, Direction::Bearish);
    }

    #[test]
    fn confidence_formula_tracks_ratio() {
        let analysis = analyze_fundamentals(&strong_fundamentals());
        let signal = build_signal(&analysis, "");
        let base = (50.0 + (analysis.score_ratio() - 0.5) * 60.0).clamp(20.0, 85.0);
        assert!(f64::from(signal.confidence) >= base);
        assert!(signal.confidence <= 90);
    }

    #[test]
    fn missing_margin_uses_score_only_branch() {
        let mut f = strong_fundamentals();
        f.market_cap = None;
        let analysis = analyze_fundamentals(&f);
        assert!(analysis.margin_of_safety.is_none());
        let signal = build_signal(&analysis, "");
        assert!(signal.reasoning.contains("valuation unknown") || signal.reasoning.contains("insufficient valuation"));
    }

    #[test]
    fn price_proxy_discount_leans_bullish() {
        // Long flat history at 100, recent dip to 88: cheap vs the average.
        let mut closes = vec![100.0; 95];
        for i in 0..5 {
            closes.push(96.0 - i as f64 * 2.0);
        }
        let analysis = analyze_price_proxies(&closes);
        assert!(analysis.margin_of_safety.unwrap() > 0.05);
        let signal = build_signal(&analysis, " [price-proxy]");
        assert!(signal.reasoning.contains("price-proxy"));
    }

    #[test]
    fn conservative_growth_is_haircut_and_capped() {
        let g = conservative_growth_rate(&[100.0, 200.0, 400.0]).unwrap();
        assert!(g <= 0.15);
        let g = conservative_growth_rate(&[100.0, 60.0]).unwrap();
        assert!(g >= -0.05);
    }

    #[test]
    fn owner_earnings_adjusts_for_cash_flow_lines() {
        let f = FundamentalSnapshot {
            net_income: vec![10_000.0],
            depreciation: Some(2_000.0),
            capital_expenditure: Some(-3_000.0),
            working_capital_change: Some(500.0),
            ..Default::default()
        };
        // 10_000 + 2_000 − 0.85·3_000 − 500 = 8_950.
        let oe = owner_earnings(&f).unwrap();
        assert!((oe - 8_950.0).abs() < 1e-9);

        // Missing cash-flow lines fall back to reported income.
        let bare = FundamentalSnapshot {
            net_income: vec![10_000.0],
            ..Default::default()
        };
        assert_eq!(owner_earnings(&bare), Some(10_000.0));
    }

    #[test]
    fn roe_persistence_strengthens_quality() {
        let mut with_moat = strong_fundamentals();
        with_moat.operating_margin = None; // leave headroom under the cap
        with_moat.return_on_equity_history = vec![0.18, 0.21, 0.19, 0.22];
        let moat_score = score_business_quality(&with_moat).score;

        let mut without = with_moat.clone();
        without.return_on_equity_history = vec![0.04, 0.06, 0.05, 0.03];
        let plain_score = score_business_quality(&without).score;

        assert!(moat_score > plain_score);
    }
}
