// Per-day graph state and the read-only context handed to every agent.
//
// The day loop owns the state exclusively. Analyst signals and advisory
// entries are created once per day and read-only after their producing
// agent exits; only credibility persists across days (inside the auditor).

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::agents::{AnalystId, AnalystSignals};
use crate::determinism::RunContext;
use crate::market_data::{FundamentalsSource, PriceCache};
use crate::portfolio::Portfolio;

/// Everything an agent may read while processing one day.
pub struct DayContext<'a> {
    /// The day being decided.
    pub date: NaiveDate,
    /// Start of the analysis lookback window.
    pub lookback_start: NaiveDate,
    pub tickers: &'a [String],
    pub prices: &'a PriceCache,
    pub fundamentals: &'a dyn FundamentalsSource,
    pub portfolio: &'a Portfolio,
    /// Close (or nearest previous close) per ticker for `date`. Tickers with
    /// no resolvable price are absent.
    pub current_prices: &'a BTreeMap<String, f64>,
    pub run: RunContext,
}

impl DayContext<'_> {
    pub fn price(&self, ticker: &str) -> Option<f64> {
        self.current_prices.get(ticker).copied()
    }

    /// NAV of the portfolio marked at today's prices.
    pub fn nav(&self) -> f64 {
        self.portfolio.nav(self.current_prices)
    }
}

/// Market regime label for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Trending,
    MeanReverting,
    Volatile,
    Calm,
}

impl Regime {
    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::MeanReverting => "mean_reverting",
            Regime::Volatile => "volatile",
            Regime::Calm => "calm",
        }
    }
}

/// Advisory output of the Market Regime classifier for one ticker.
#[derive(Debug, Clone)]
pub struct RegimeAssessment {
    pub regime: Regime,
    pub momentum_weight: f64,
    pub mean_reversion_weight: f64,
    pub risk_multiplier: f64,
    pub reasoning: String,
}

impl RegimeAssessment {
    /// Weight multiplier for one analyst lane (1.0 for lanes the regime
    /// does not adjust).
    pub fn lane_weight(&self, analyst: AnalystId) -> f64 {
        match analyst {
            AnalystId::Momentum => self.momentum_weight,
            AnalystId::MeanReversion => self.mean_reversion_weight,
            _ => 1.0,
        }
    }
}

impl Default for RegimeAssessment {
    fn default() -> Self {
        Self {
            regime: Regime::Calm,
            momentum_weight: 1.0,
            mean_reversion_weight: 1.0,
            risk_multiplier: 1.0,
            reasoning: "No regime assessment available".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
    Short,
    Cover,
    Hold,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Short => "short",
            TradeAction::Cover => "cover",
            TradeAction::Hold => "hold",
        }
    }

    /// Does this action open (or add to) a position?
    pub fn opens_position(self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Short)
    }
}

/// The Portfolio Manager's (and after adjustment, the allocator's) order
/// for one ticker. Quantities are unsigned; the action carries direction.
#[derive(Debug, Clone)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub quantity: u32,
    pub confidence: u8,
    pub reasoning: String,
}

impl TradeDecision {
    pub fn hold(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Hold,
            quantity: 0,
            confidence: confidence.min(100),
            reasoning: reasoning.into(),
        }
    }
}

/// Per-ticker risk budget emitted by the Risk Budget agent.
#[derive(Debug, Clone)]
pub struct RiskBudget {
    pub base_risk_pct: f64,
    pub volatility_adjustment: f64,
    pub regime_multiplier: f64,
    pub final_risk_pct: f64,
    pub reasoning: String,
}

impl RiskBudget {
    pub fn zero(reasoning: impl Into<String>) -> Self {
        Self {
            base_risk_pct: 0.0,
            volatility_adjustment: 1.0,
            regime_multiplier: 1.0,
            final_risk_pct: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Constraint-analysis block published by the allocator for reporting.
#[derive(Debug, Clone, Default)]
pub struct ConstraintReport {
    pub projected_gross: f64,
    pub gross_limit: f64,
    pub projected_net: f64,
    pub net_limit: f64,
    pub sector_exposures: BTreeMap<String, SectorExposure>,
    pub high_correlations: Vec<CorrelatedPair>,
}

#[derive(Debug, Clone, Default)]
pub struct SectorExposure {
    pub exposure: f64,
    pub exposure_pct: f64,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CorrelatedPair {
    pub first: String,
    pub second: String,
    pub correlation: f64,
}

/// Everything the graph produced for one day. Frozen once the execution
/// phase starts; discarded at day end apart from the auditor's ledger.
#[derive(Debug, Default)]
pub struct DayState {
    pub analyst_signals: AnalystSignals,
    pub market_regime: BTreeMap<String, RegimeAssessment>,
    pub agent_credibility: BTreeMap<AnalystId, f64>,
    pub decisions: BTreeMap<String, TradeDecision>,
    pub risk_budgets: BTreeMap<String, RiskBudget>,
    pub constraints: ConstraintReport,
}
