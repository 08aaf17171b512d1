// src/agents/market_regime.rs
//
// Advisory-only market regime classifier. Publishes per-ticker regime
// labels, recommended momentum/mean-reversion weight multipliers and a
// risk multiplier. Never writes to the analyst signal map.

use std::collections::BTreeMap;

use crate::agents::state::{DayContext, Regime, RegimeAssessment};
use crate::market_data::Bar;
use crate::math::indicators;

const MIN_BARS: usize = 50;
const VOLATILE_THRESHOLD: f64 = 0.15;
const CALM_THRESHOLD: f64 = 0.05;

/// Fixed advisory weight table per regime.
fn regime_profile(regime: Regime) -> (f64, f64, f64) {
    // (momentum weight, mean-reversion weight, risk multiplier)
    match regime {
        Regime::Trending => (1.5, 0.5, 1.0),
        Regime::MeanReverting => (0.5, 1.5, 0.9),
        Regime::Volatile => (0.7, 0.7, 0.8),
        Regime::Calm => (1.0, 1.0, 1.0),
    }
}

pub struct MarketRegimeClassifier;

impl MarketRegimeClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify every requested ticker. Tickers with too little data fall
    /// back to calm with normal weights.
    pub fn assess(&self, ctx: &DayContext) -> BTreeMap<String, RegimeAssessment> {
        let mut out = BTreeMap::new();
        for ticker in ctx.tickers {
            let assessment = match ctx.prices.range(ticker, ctx.lookback_start, ctx.date) {
                Ok(bars) if bars.len() >= MIN_BARS => classify(&bars),
                Ok(_) => fallback("Insufficient price data for regime analysis"),
                Err(_) => fallback("No price data available"),
            };
            out.insert(ticker.clone(), assessment);
        }
        out
    }
}

impl Default for MarketRegimeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback(reason: &str) -> RegimeAssessment {
    RegimeAssessment {
        reasoning: reason.to_string(),
        ..RegimeAssessment::default()
    }
}

/// Classification order: trending → volatile → mean-reverting → calm.
fn classify(bars: &[Bar]) -> RegimeAssessment {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let adx = indicators::adx(bars, 14);
    let volatility = indicators::annualized_volatility(&closes, 20).unwrap_or(0.0);
    let rsi_oscillation = indicators::rsi_oscillation(&closes, 14, 14).unwrap_or(0.0);
    let consistency = indicators::directional_consistency(&closes, 20).unwrap_or(0.5);

    let (regime, reason) = match adx {
        Some(adx) if adx > 25.0 && consistency > 0.6 => (
            Regime::Trending,
            format!("Strong trend (ADX={adx:.1}, consistency={:.0}%)", consistency * 100.0),
        ),
        _ if volatility > VOLATILE_THRESHOLD => (
            Regime::Volatile,
            format!("High volatility ({:.1}%)", volatility * 100.0),
        ),
        Some(adx) if adx < 20.0 && rsi_oscillation > 10.0 => (
            Regime::MeanReverting,
            format!("Weak trend, high RSI oscillation (ADX={adx:.1}, RSI_std={rsi_oscillation:.1})"),
        ),
        _ if volatility < CALM_THRESHOLD => (
            Regime::Calm,
            format!("Low volatility ({:.1}%)", volatility * 100.0),
        ),
        _ => (
            Regime::Calm,
            format!(
                "Moderate conditions (ADX={:.1}, vol={:.1}%)",
                adx.unwrap_or(0.0),
                volatility * 100.0
            ),
        ),
    };

    let (momentum_weight, mean_reversion_weight, risk_multiplier) = regime_profile(regime);
    RegimeAssessment {
        regime,
        momentum_weight,
        mean_reversion_weight,
        risk_multiplier,
        reasoning: reason,
    }
}
