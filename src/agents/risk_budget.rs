// src/agents/risk_budget.rs
//
// Risk Budget & position sizing: converts Portfolio Manager decisions into
// a per-ticker risk fraction of NAV, then caps decision quantities to that
// budget. Emits no trade direction of its own.

use std::collections::BTreeMap;

use crate::agents::state::{DayContext, RegimeAssessment, RiskBudget, TradeAction, TradeDecision};
use crate::math::indicators;

const BASE_RISK_PCT: f64 = 0.02;
const MIN_RISK_PCT: f64 = 0.005;
const MAX_RISK_PCT: f64 = 0.05;
const ATR_PERIOD: usize = 14;

pub struct RiskBudgeter;

impl RiskBudgeter {
    pub fn new() -> Self {
        Self
    }

    /// Compute budgets for every decided ticker and resize non-hold
    /// quantities to `floor(final_risk_pct · NAV / price)`.
    pub fn budget(
        &self,
        ctx: &DayContext,
        regimes: &BTreeMap<String, RegimeAssessment>,
        decisions: &mut BTreeMap<String, TradeDecision>,
    ) -> BTreeMap<String, RiskBudget> {
        let nav = ctx.nav().max(0.0);
        let mut budgets = BTreeMap::new();

        for (ticker, decision) in decisions.iter_mut() {
            if decision.action == TradeAction::Hold {
                budgets.insert(
                    ticker.clone(),
                    RiskBudget::zero("Hold action - no position sizing"),
                );
                continue;
            }

            let budget = self.compute(ctx, ticker, decision.confidence, regimes.get(ticker));

            if let Some(price) = ctx.price(ticker) {
                if price > 0.0 {
                    let cap = (budget.final_risk_pct * nav / price).floor() as u32;
                    if decision.quantity > cap {
                        decision.quantity = cap;
                    }
                }
            }

            budgets.insert(ticker.clone(), budget);
        }

        budgets
    }

    fn compute(
        &self,
        ctx: &DayContext,
        ticker: &str,
        confidence: u8,
        regime: Option<&RegimeAssessment>,
    ) -> RiskBudget {
        let confidence_factor = f64::from(confidence) / 100.0;
        let base_risk_pct = BASE_RISK_PCT * confidence_factor;

        let volatility_adjustment = match ctx.prices.range(ticker, ctx.lookback_start, ctx.date) {
            Ok(bars) if bars.len() >= 20 => {
                let price = bars.last().map(|b| b.close).unwrap_or(0.0);
                match indicators::atr(&bars, ATR_PERIOD) {
                    Some(atr) if price > 0.0 => volatility_adjustment(atr / price),
                    _ => 1.0,
                }
            }
            _ => 1.0,
        };

        let regime_multiplier = regime.map(|r| r.risk_multiplier).unwrap_or(1.0);
        let regime_name = regime.map(|r| r.regime.as_str()).unwrap_or("unknown");

        let final_risk_pct =
            (base_risk_pct * volatility_adjustment * regime_multiplier).clamp(MIN_RISK_PCT, MAX_RISK_PCT);

        let vol_desc = if volatility_adjustment < 0.8 {
            "high"
        } else if volatility_adjustment > 1.1 {
            "low"
        } else {
            "normal"
        };

        RiskBudget {
            base_risk_pct,
            volatility_adjustment,
            regime_multiplier,
            final_risk_pct,
            reasoning: format!(
                "Confidence {confidence}% → base {:.1}%, volatility {vol_desc} (adj {volatility_adjustment:.2}), regime {regime_name} (mult {regime_multiplier:.2}) → final risk {:.1}%",
                base_risk_pct * 100.0,
                final_risk_pct * 100.0
            ),
        }
    }
}

impl Default for RiskBudgeter {
    fn default() -> Self {
        Self::new()
    }
}

/// ATR as a fraction of price, mapped to a sizing adjustment:
/// above 3% shrinks toward 0.5, below 1% grows toward 1.25.
fn volatility_adjustment(atr_pct: f64) -> f64 {
    if atr_pct > 0.03 {
        (1.0 - (atr_pct - 0.03) * 5.0).max(0.5)
    } else if atr_pct < 0.01 {
        (1.0 + (0.01 - atr_pct) * 5.0).min(1.25)
    } else {
        1.0
    }
}
