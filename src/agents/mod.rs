// The analyst graph: core analysts produce directional signals, advisory
// agents publish context (regime, credibility), system agents turn signals
// into sized, constraint-compliant orders.

pub mod graph;
pub mod growth_composite;
pub mod market_regime;
pub mod mean_reversion;
pub mod momentum;
pub mod performance_auditor;
pub mod portfolio_allocator;
pub mod portfolio_manager;
pub mod risk_budget;
pub mod state;
pub mod valuation;
pub mod value_composite;

use std::collections::BTreeMap;

use crate::errors::StrategyFailure;
use state::DayContext;

/// Trade direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

/// Analyst-specific metadata attached to a signal. Metadata never reaches
/// the Portfolio Manager's weighting; it exists for reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Num(f64),
    Text(String),
}

/// Direction + confidence + free-form reasoning, plus a metadata extension
/// map. Reasoning is for humans and is never parsed downstream.
#[derive(Debug, Clone)]
pub struct Signal {
    pub direction: Direction,
    pub confidence: u8,
    pub reasoning: String,
    pub extensions: BTreeMap<String, MetaValue>,
}

impl Signal {
    pub fn new(direction: Direction, confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            direction,
            confidence: confidence.min(100),
            reasoning: reasoning.into(),
            extensions: BTreeMap::new(),
        }
    }

    /// The shared data-gap fallback: neutral at confidence 50.
    pub fn neutral(reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Neutral, 50, reasoning)
    }

    pub fn with_num(mut self, key: &str, value: f64) -> Self {
        self.extensions.insert(key.to_string(), MetaValue::Num(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extensions
            .insert(key.to_string(), MetaValue::Text(value.into()));
        self
    }

    pub fn num(&self, key: &str) -> Option<f64> {
        match self.extensions.get(key) {
            Some(MetaValue::Num(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.extensions.get(key) {
            Some(MetaValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Schema check enforced at the graph boundary.
    pub fn is_valid(&self) -> bool {
        self.confidence <= 100 && !self.reasoning.trim().is_empty()
    }
}

/// The five core analysts, with their fixed Portfolio Manager weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalystId {
    ValueComposite,
    GrowthComposite,
    Valuation,
    Momentum,
    MeanReversion,
}

impl AnalystId {
    pub const ALL: [AnalystId; 5] = [
        AnalystId::ValueComposite,
        AnalystId::GrowthComposite,
        AnalystId::Valuation,
        AnalystId::Momentum,
        AnalystId::MeanReversion,
    ];

    /// Stable key used in maps and log lines.
    pub fn key(self) -> &'static str {
        match self {
            AnalystId::ValueComposite => "value_composite",
            AnalystId::GrowthComposite => "growth_composite",
            AnalystId::Valuation => "valuation",
            AnalystId::Momentum => "momentum",
            AnalystId::MeanReversion => "mean_reversion",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AnalystId::ValueComposite => "Value",
            AnalystId::GrowthComposite => "Growth",
            AnalystId::Valuation => "Valuation",
            AnalystId::Momentum => "Momentum",
            AnalystId::MeanReversion => "Mean Reversion",
        }
    }

    /// Fixed signal-fusion weight in the Portfolio Manager.
    pub fn base_weight(self) -> f64 {
        match self {
            AnalystId::ValueComposite => 0.30,
            AnalystId::GrowthComposite => 0.25,
            AnalystId::Valuation => 0.20,
            AnalystId::Momentum => 0.15,
            AnalystId::MeanReversion => 0.10,
        }
    }

    /// Momentum and Mean Reversion carry regime-adjusted weights.
    pub fn regime_adjusted(self) -> bool {
        matches!(self, AnalystId::Momentum | AnalystId::MeanReversion)
    }
}

impl std::fmt::Display for AnalystId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// ticker → Signal, as produced by one analyst for one day.
pub type TickerSignals = BTreeMap<String, Signal>;

/// analyst → ticker → Signal. Additive: each analyst owns exactly its own
/// key; cross-key writes are forbidden by construction.
pub type AnalystSignals = BTreeMap<AnalystId, TickerSignals>;

/// A core analyst: a pure function of its declared inputs producing one
/// Signal per requested ticker (falling back to neutral on data gaps).
pub trait CoreAnalyst: Send + Sync {
    fn id(&self) -> AnalystId;

    fn analyze(&self, ctx: &DayContext) -> Result<TickerSignals, StrategyFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = AnalystId::ALL.iter().map(|a| a.base_weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_clamped() {
        let s = Signal::new(Direction::Bullish, 250, "overflowing");
        assert_eq!(s.confidence, 100);
        assert!(s.is_valid());
    }

    #[test]
    fn empty_reasoning_is_invalid() {
        let s = Signal::new(Direction::Neutral, 50, "  ");
        assert!(!s.is_valid());
    }

    #[test]
    fn extensions_are_typed() {
        let s = Signal::neutral("n/a")
            .with_num("rank", 3.0)
            .with_text("regime", "calm");
        assert_eq!(s.num("rank"), Some(3.0));
        assert_eq!(s.text("regime"), Some("calm"));
        assert_eq!(s.num("regime"), None);
    }
}
