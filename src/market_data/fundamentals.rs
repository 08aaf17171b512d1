// Fundamentals/news source for the composite analysts.
//
// The engine treats fundamentals as an optional collaborator: a snapshot per
// ticker, loaded from the universe file. In deterministic mode the gate
// returns the canonical fallback (no snapshot) for every call, and analysts
// compute price-only signals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Point-in-time fundamentals for one instrument. Histories are ordered
/// oldest → newest. Every field is optional; scoring degrades gracefully.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub revenue: Vec<f64>,
    #[serde(default)]
    pub eps: Vec<f64>,
    #[serde(default)]
    pub net_income: Vec<f64>,
    pub return_on_equity: Option<f64>,
    /// ROE per reported period, for persistence checks.
    #[serde(default)]
    pub return_on_equity_history: Vec<f64>,
    pub operating_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub free_cash_flow_yield: Option<f64>,
    /// Latest-period cash flow components for owner-earnings work.
    pub depreciation: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub working_capital_change: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub total_debt: Option<f64>,
    pub outstanding_shares: Option<f64>,
    /// Net insider buys minus sells over the recent window.
    pub insider_net_buys: Option<i64>,
    /// Fraction of recent headlines classified negative, in [0, 1].
    pub negative_headline_ratio: Option<f64>,
}

impl FundamentalSnapshot {
    /// Trailing growth rate of a history series (latest vs. earliest,
    /// annual-ish periods). None when the series is too short or degenerate.
    pub fn trailing_growth(series: &[f64]) -> Option<f64> {
        if series.len() < 2 {
            return None;
        }
        let first = *series.first()?;
        let last = *series.last()?;
        if first.abs() < f64::EPSILON {
            return None;
        }
        Some((last - first) / first.abs())
    }

    /// Debt-to-equity, computed from the balance-sheet lines when the
    /// ratio itself was not reported.
    pub fn leverage(&self) -> Option<f64> {
        self.debt_to_equity.or_else(|| {
            match (self.total_debt, self.shareholders_equity) {
                (Some(debt), Some(equity)) if equity > 0.0 => Some(debt / equity),
                _ => None,
            }
        })
    }
}

pub trait FundamentalsSource: Send + Sync {
    /// Snapshot for the ticker, or None when the source has nothing;
    /// callers must fall back to price-derived proxies.
    fn snapshot(&self, ticker: &str) -> Option<FundamentalSnapshot>;
}

/// In-memory store, typically populated from the universe file.
#[derive(Default)]
pub struct StaticFundamentals {
    by_ticker: HashMap<String, FundamentalSnapshot>,
}

impl StaticFundamentals {
    pub fn new(by_ticker: HashMap<String, FundamentalSnapshot>) -> Self {
        let by_ticker = by_ticker
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        Self { by_ticker }
    }
}

impl FundamentalsSource for StaticFundamentals {
    fn snapshot(&self, ticker: &str) -> Option<FundamentalSnapshot> {
        self.by_ticker.get(&ticker.to_uppercase()).cloned()
    }
}

/// Module-boundary guard for excluded data sources. When the run is
/// deterministic, every call answers with the canonical fallback so analyst
/// output is a pure function of the price cache.
pub struct DeterministicGate<S> {
    inner: S,
    deterministic: bool,
}

impl<S: FundamentalsSource> DeterministicGate<S> {
    pub fn new(inner: S, deterministic: bool) -> Self {
        Self {
            inner,
            deterministic,
        }
    }
}

impl<S: FundamentalsSource> FundamentalsSource for DeterministicGate<S> {
    fn snapshot(&self, ticker: &str) -> Option<FundamentalSnapshot> {
        if self.deterministic {
            return None;
        }
        self.inner.snapshot(ticker)
    }
}
