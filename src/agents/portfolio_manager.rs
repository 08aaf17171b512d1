// src/agents/portfolio_manager.rs
//
// Portfolio Manager: fuses the core analysts' signals into one unsigned
// trade decision per ticker. Direction only; sizing is refined downstream
// by the Risk Budget agent and the allocator.

use std::collections::BTreeMap;

use crate::agents::state::{DayContext, RegimeAssessment, TradeAction, TradeDecision};
use crate::agents::{AnalystId, AnalystSignals, Direction};

/// Net weighted signal beyond which the manager acts.
const DECISION_BAND: f64 = 0.1;
/// Credibility floor: a discredited analyst is dampened, never zeroed.
const CREDIBILITY_FLOOR: f64 = 0.2;

/// Per-ticker action capacities, computed deterministically from portfolio
/// state before any signal is read.
#[derive(Debug, Clone, Copy, Default)]
struct AllowedActions {
    buy: u32,
    sell: u32,
    short: u32,
    cover: u32,
}

impl AllowedActions {
    fn trade_possible(&self) -> bool {
        self.buy > 0 || self.sell > 0 || self.short > 0 || self.cover > 0
    }
}

pub struct PortfolioManager {
    /// Per-ticker position limit as a fraction of NAV (mirrors the
    /// executor's cap so decisions are executable).
    max_position_pct: f64,
    /// Weight fusion by auditor credibility (floored, renormalized).
    use_credibility_weighting: bool,
}

impl PortfolioManager {
    pub fn new(max_position_pct: f64, use_credibility_weighting: bool) -> Self {
        Self {
            max_position_pct,
            use_credibility_weighting,
        }
    }

    pub fn decide(
        &self,
        ctx: &DayContext,
        signals: &AnalystSignals,
        regimes: &BTreeMap<String, RegimeAssessment>,
        credibility: &BTreeMap<AnalystId, f64>,
    ) -> BTreeMap<String, TradeDecision> {
        let nav = ctx.nav();
        let mut decisions = BTreeMap::new();

        for ticker in ctx.tickers {
            let Some(price) = ctx.price(ticker) else {
                decisions.insert(
                    ticker.clone(),
                    TradeDecision::hold(50, "No price available today"),
                );
                continue;
            };

            let allowed = self.allowed_actions(ctx, ticker, price, nav);
            if !allowed.trade_possible() {
                decisions.insert(
                    ticker.clone(),
                    TradeDecision::hold(100, "No valid trade available"),
                );
                continue;
            }

            let regime = regimes.get(ticker);
            let decision = self.fuse(ticker, signals, regime, credibility, allowed);
            decisions.insert(ticker.clone(), decision);
        }

        decisions
    }

    /// Capacity per action from cash, margin headroom, holdings and the
    /// per-ticker position limit.
    fn allowed_actions(
        &self,
        ctx: &DayContext,
        ticker: &str,
        price: f64,
        nav: f64,
    ) -> AllowedActions {
        let portfolio = ctx.portfolio;
        let pos = portfolio.position(ticker);
        let mut allowed = AllowedActions {
            sell: pos.long,
            cover: pos.short,
            ..Default::default()
        };
        if price <= 0.0 || nav <= 0.0 {
            return allowed;
        }

        // Remaining position-limit headroom in shares.
        let headroom = (self.max_position_pct * nav - portfolio.ticker_exposure(ticker, price))
            .max(0.0);
        let max_qty = (headroom / price).floor() as u32;

        let cash_capacity = (portfolio.cash.max(0.0) / price).floor() as u32;
        allowed.buy = max_qty.min(cash_capacity);

        allowed.short = if portfolio.margin_requirement <= 0.0 {
            max_qty
        } else {
            let available_margin =
                (nav / portfolio.margin_requirement - portfolio.margin_used).max(0.0);
            max_qty.min((available_margin / price).floor() as u32)
        };

        allowed
    }

    /// Weighted signal fusion for one ticker.
    fn fuse(
        &self,
        ticker: &str,
        signals: &AnalystSignals,
        regime: Option<&RegimeAssessment>,
        credibility: &BTreeMap<AnalystId, f64>,
        allowed: AllowedActions,
    ) -> TradeDecision {
        let mut bullish_weight = 0.0;
        let mut bearish_weight = 0.0;
        let mut total_weight = 0.0;
        let mut weighted_confidence = 0.0;
        let (mut bullish, mut bearish, mut neutral) = (0u32, 0u32, 0u32);

        // First pass establishes weights so credibility can renormalize.
        let mut contributions: Vec<(Direction, f64, f64)> = Vec::new();
        for (analyst, ticker_signals) in signals {
            let Some(signal) = ticker_signals.get(ticker) else {
                continue;
            };
            let mut weight = analyst.base_weight();
            if let Some(regime) = regime {
                weight *= regime.lane_weight(*analyst);
            }
            if self.use_credibility_weighting {
                let cred = credibility.get(analyst).copied().unwrap_or(0.5);
                weight *= cred.max(CREDIBILITY_FLOOR);
            }
            contributions.push((signal.direction, weight, f64::from(signal.confidence)));
        }

        let weight_sum: f64 = contributions.iter().map(|(_, w, _)| w).sum();
        if weight_sum > 0.0 {
            for (direction, weight, confidence) in &contributions {
                let w = weight / weight_sum;
                match direction {
                    Direction::Bullish => {
                        bullish_weight += w;
                        bullish += 1;
                    }
                    Direction::Bearish => {
                        bearish_weight += w;
                        bearish += 1;
                    }
                    Direction::Neutral => neutral += 1,
                }
                weighted_confidence += w * confidence;
                total_weight += w;
            }
        }

        let avg_confidence = if total_weight > 0.0 {
            (weighted_confidence / total_weight).round().clamp(0.0, 100.0) as u8
        } else {
            50
        };

        let regime_info = regime
            .map(|r| {
                format!(
                    " (regime-adjusted: Momentum×{:.1}, MR×{:.1})",
                    r.momentum_weight, r.mean_reversion_weight
                )
            })
            .unwrap_or_default();

        let net = bullish_weight - bearish_weight;

        if net > DECISION_BAND && bullish > 0 {
            if allowed.buy > 0 {
                TradeDecision {
                    action: TradeAction::Buy,
                    quantity: allowed.buy,
                    confidence: avg_confidence,
                    reasoning: format!(
                        "Bullish weighted signal (net: {net:.2}, {bullish}B/{bearish}S){regime_info}"
                    ),
                }
            } else {
                TradeDecision::hold(
                    avg_confidence,
                    format!("Bullish but no buy capacity{regime_info}"),
                )
            }
        } else if net < -DECISION_BAND && bearish > 0 {
            if allowed.sell > 0 {
                TradeDecision {
                    action: TradeAction::Sell,
                    quantity: allowed.sell,
                    confidence: avg_confidence,
                    reasoning: format!(
                        "Bearish consensus ({bearish} bearish, {bullish} bullish){regime_info}"
                    ),
                }
            } else if allowed.short > 0 {
                TradeDecision {
                    action: TradeAction::Short,
                    quantity: allowed.short,
                    confidence: avg_confidence,
                    reasoning: format!(
                        "Bearish consensus ({bearish} bearish, {bullish} bullish){regime_info}"
                    ),
                }
            } else {
                TradeDecision::hold(
                    avg_confidence,
                    format!("Bearish weighted signal but no sell/short capacity (net: {net:.2}){regime_info}"),
                )
            }
        } else {
            TradeDecision::hold(
                if contributions.is_empty() { 50 } else { avg_confidence },
                format!(
                    "Mixed/neutral signals (net: {net:.2}, {bullish}B/{bearish}S/{neutral}N){regime_info}"
                ),
            )
        }
    }
}

impl Default for PortfolioManager {
    fn default() -> Self {
        Self::new(0.20, true)
    }
}
