// src/agents/graph.rs
//
// Tiered execution of the analyst DAG for one day:
//
//   core analysts (parallel fan-out, partitioned writes)
//     ≺ Market Regime (advisory)
//     ≺ Performance Auditor (advisory)
//     ≺ Portfolio Manager
//     ≺ Risk Budget
//     ≺ Portfolio Allocator
//
// A failing core analyst is a strategy failure: logged, slot left empty,
// the day continues. The system agents are infallible by construction.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::agents::growth_composite::GrowthCompositeAnalyst;
use crate::agents::market_regime::MarketRegimeClassifier;
use crate::agents::mean_reversion::MeanReversionAnalyst;
use crate::agents::momentum::MomentumAnalyst;
use crate::agents::performance_auditor::PerformanceAuditor;
use crate::agents::portfolio_allocator::PortfolioAllocator;
use crate::agents::portfolio_manager::PortfolioManager;
use crate::agents::risk_budget::RiskBudgeter;
use crate::agents::state::{DayContext, DayState};
use crate::agents::valuation::ValuationAnalyst;
use crate::agents::value_composite::ValueCompositeAnalyst;
use crate::agents::{CoreAnalyst, TickerSignals};
use crate::errors::StrategyFailure;

pub struct AnalystGraph {
    core: Vec<Box<dyn CoreAnalyst>>,
    regime: MarketRegimeClassifier,
    auditor: PerformanceAuditor,
    manager: PortfolioManager,
    risk: RiskBudgeter,
    allocator: PortfolioAllocator,
}

impl AnalystGraph {
    /// The standard five-analyst graph.
    pub fn standard(
        sectors: BTreeMap<String, String>,
        use_credibility_weighting: bool,
    ) -> Self {
        let core: Vec<Box<dyn CoreAnalyst>> = vec![
            Box::new(ValueCompositeAnalyst::new()),
            Box::new(GrowthCompositeAnalyst::new()),
            Box::new(ValuationAnalyst::new()),
            Box::new(MomentumAnalyst::new()),
            Box::new(MeanReversionAnalyst::new()),
        ];
        Self {
            core,
            regime: MarketRegimeClassifier::new(),
            auditor: PerformanceAuditor::new(),
            manager: PortfolioManager::new(0.20, use_credibility_weighting),
            risk: RiskBudgeter::new(),
            allocator: PortfolioAllocator::new(sectors),
        }
    }

    /// Run every tier for one day. Returns the frozen day state plus the
    /// strategy failures that occurred (already logged).
    pub fn run_day(&mut self, ctx: &DayContext) -> (DayState, Vec<StrategyFailure>) {
        let mut state = DayState::default();
        let mut failures = Vec::new();

        // Tier 1: core analysts in parallel. Each owns exactly one key of
        // the signal map; results are merged in analyst order, so scheduler
        // interleaving cannot influence the outcome.
        let results: Vec<_> = self
            .core
            .par_iter()
            .map(|analyst| (analyst.id(), analyst.analyze(ctx)))
            .collect();

        for (id, result) in results {
            match result.and_then(|signals| validate(id.key(), ctx, signals)) {
                Ok(signals) => {
                    state.analyst_signals.insert(id, signals);
                }
                Err(failure) => {
                    log::error!("strategy failure: {failure}");
                    failures.push(failure);
                }
            }
        }

        // Tier 2: advisory context.
        state.market_regime = self.regime.assess(ctx);
        state.agent_credibility = self.auditor.audit(ctx, &mut state.analyst_signals);

        // Tier 3: system agents, strictly ordered.
        state.decisions = self.manager.decide(
            ctx,
            &state.analyst_signals,
            &state.market_regime,
            &state.agent_credibility,
        );
        state.risk_budgets = self.risk.budget(ctx, &state.market_regime, &mut state.decisions);
        state.constraints = self.allocator.allocate(ctx, &mut state.decisions);

        (state, failures)
    }

    pub fn auditor(&self) -> &PerformanceAuditor {
        &self.auditor
    }
}

/// Schema gate at the graph boundary: one valid signal per requested
/// ticker, nothing else.
fn validate(
    analyst: &'static str,
    ctx: &DayContext,
    signals: TickerSignals,
) -> Result<TickerSignals, StrategyFailure> {
    for ticker in ctx.tickers {
        match signals.get(ticker) {
            None => {
                return Err(StrategyFailure::new(
                    analyst,
                    format!("missing signal for ticker {ticker}"),
                ))
            }
            Some(signal) if !signal.is_valid() => {
                return Err(StrategyFailure::new(
                    analyst,
                    format!("malformed signal for ticker {ticker}"),
                ))
            }
            Some(_) => {}
        }
    }
    if signals.len() != ctx.tickers.len() {
        return Err(StrategyFailure::new(analyst, "stray ticker entries in signal map"));
    }
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AnalystId;
    use crate::determinism::RunContext;
    use crate::market_data::{DeterministicGate, PriceCache, StaticFundamentals};
    use crate::portfolio::Portfolio;
    use chrono::NaiveDate;
    use std::io::Write;

    fn write_flat_series(dir: &std::path::Path, ticker: &str, days: u32) {
        let mut file = std::fs::File::create(dir.join(format!("{ticker}.csv"))).unwrap();
        writeln!(file, "date,open,high,low,close,volume").unwrap();
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut written = 0;
        while written < days {
            if crate::backtesting::calendar::is_business_day(day) {
                writeln!(file, "{day},100.0,100.5,99.5,100.0,1000").unwrap();
                written += 1;
            }
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn one_day_produces_exactly_the_invoked_analysts() {
        let dir = tempfile::tempdir().unwrap();
        write_flat_series(dir.path(), "XCORP", 80);
        let cache = PriceCache::new(dir.path());
        let fundamentals = DeterministicGate::new(StaticFundamentals::default(), true);
        let tickers = vec!["XCORP".to_string()];
        let portfolio = Portfolio::new(10_000.0, 0.0, &tickers);
        let date = NaiveDate::from_ymd_opt(2024, 4, 22).unwrap();
        let current_prices: std::collections::BTreeMap<String, f64> =
            [("XCORP".to_string(), 100.0)].into_iter().collect();

        let mut graph = AnalystGraph::standard(std::collections::BTreeMap::new(), true);
        let ctx = DayContext {
            date,
            lookback_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            tickers: &tickers,
            prices: &cache,
            fundamentals: &fundamentals,
            portfolio: &portfolio,
            current_prices: &current_prices,
            run: RunContext {
                seed: 42,
                deterministic: true,
            },
        };
        let (state, failures) = graph.run_day(&ctx);

        assert!(failures.is_empty());
        // Exactly the five invoked analysts, no dropped entries, no strays.
        let keys: Vec<AnalystId> = state.analyst_signals.keys().copied().collect();
        assert_eq!(keys, AnalystId::ALL.to_vec());
        for signals in state.analyst_signals.values() {
            assert_eq!(signals.len(), 1);
            assert!(signals["XCORP"].is_valid());
        }
        // Advisory slots populated, decision set complete.
        assert!(state.market_regime.contains_key("XCORP"));
        assert_eq!(state.agent_credibility.len(), 5);
        assert!(state.decisions.contains_key("XCORP"));
        assert!(state.risk_budgets.contains_key("XCORP"));
    }
}
