// The backtest driver: day-by-day replay of the analyst graph against the
// price cache.
//
// State machine: INIT → LOADING → RUNNING → {COMPLETE, LIQUIDATED,
// ENGINE_FAILED}. The loop walks an explicit index over business days,
// guards against reprocessing, writes exactly one invariant line per
// processed iteration to stderr, and always prints a summary even when
// an engine failure aborts the run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;

use crate::agents::graph::AnalystGraph;
use crate::agents::state::{DayContext, DayState, TradeAction};
use crate::agents::{AnalystId, Direction};
use crate::backtesting::calendar;
use crate::backtesting::metrics::{
    day_digest, output_hash, AgentContribution, DailyRow, ExecutedTrade, RowMetrics, Summary,
};
use crate::determinism::RunContext;
use crate::errors::EngineError;
use crate::market_data::PriceCache;
use crate::portfolio::executor::{TradeExecutor, TradingCosts};
use crate::portfolio::Portfolio;

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Liquidated,
    EngineFailed(String),
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub margin_requirement: f64,
    /// Calendar days of history handed to the analysts each day.
    pub lookback_days: u64,
    pub costs: TradingCosts,
    pub use_credibility_weighting: bool,
}

impl BacktestConfig {
    pub fn new(tickers: Vec<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            tickers,
            start_date,
            end_date,
            initial_capital: 100_000.0,
            margin_requirement: 0.0,
            lookback_days: 200,
            costs: TradingCosts::default(),
            use_credibility_weighting: true,
        }
    }
}

/// Everything a caller can inspect after the run. The summary has already
/// been printed by `run`.
#[derive(Debug)]
pub struct BacktestReport {
    pub outcome: RunOutcome,
    pub summary: Summary,
    pub daily: Vec<DailyRow>,
    pub output_hash: String,
    pub portfolio: Portfolio,
}

pub struct BacktestDriver {
    config: BacktestConfig,
    cache: PriceCache,
    graph: AnalystGraph,
    executor: TradeExecutor,
    run: RunContext,
    portfolio: Portfolio,
    processed_dates: BTreeSet<NaiveDate>,
    daily: Vec<DailyRow>,
    day_digests: Vec<String>,
    contributions: BTreeMap<AnalystId, AgentContribution>,
    running_peak: f64,
    last_good: Option<(usize, NaiveDate, f64)>,
    cancel: Arc<AtomicBool>,
}

impl BacktestDriver {
    pub fn new(
        config: BacktestConfig,
        cache: PriceCache,
        sectors: BTreeMap<String, String>,
        run: RunContext,
    ) -> Self {
        let portfolio = Portfolio::new(
            config.initial_capital,
            config.margin_requirement,
            &config.tickers,
        );
        let executor = TradeExecutor::new(config.costs.clone());
        let graph = AnalystGraph::standard(sectors, config.use_credibility_weighting);
        let contributions = AnalystId::ALL
            .iter()
            .map(|analyst| (*analyst, AgentContribution::default()))
            .collect();
        Self {
            config,
            cache,
            graph,
            executor,
            run,
            portfolio,
            processed_dates: BTreeSet::new(),
            daily: Vec::new(),
            day_digests: Vec::new(),
            contributions,
            running_peak: f64::NEG_INFINITY,
            last_good: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cooperative cancellation: checked between iterations only, so an
    /// iteration either completes and is recorded or never starts.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run to completion. The summary is always computed and printed, even
    /// on engine failure; the outcome reports what terminated the loop.
    pub fn run(&mut self, fundamentals: &dyn crate::market_data::FundamentalsSource) -> BacktestReport {
        // LOADING: fail fast on malformed files before the first iteration.
        if let Err(err) = self.cache.preload(&self.config.tickers) {
            let err = EngineError::from(err);
            eprintln!("FATAL: {err}");
            return self.finish(RunOutcome::EngineFailed(err.to_string()));
        }

        let dates = calendar::business_days(self.config.start_date, self.config.end_date);
        if dates.is_empty() {
            log::info!("no business days in range, nothing to do");
            return self.finish(RunOutcome::Complete);
        }
        log::info!(
            "running {} business days for {} tickers",
            dates.len(),
            self.config.tickers.len()
        );

        // RUNNING: explicit index, forward-only.
        let mut outcome = RunOutcome::Complete;
        for (index, &date) in dates.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                log::warn!("cancelled before iteration {index} ({date})");
                break;
            }
            match self.run_iteration(index, date, fundamentals) {
                Ok(IterationOutcome::Processed) => {}
                Ok(IterationOutcome::Skipped) => {}
                Ok(IterationOutcome::Liquidated) => {
                    outcome = RunOutcome::Liquidated;
                    break;
                }
                Err(err) => {
                    eprintln!("FATAL: {err}");
                    eprintln!("Last good state: {:?}", self.last_good);
                    outcome = RunOutcome::EngineFailed(err.to_string());
                    break;
                }
            }
        }

        self.finish(outcome)
    }

    /// One iteration. Skips the day when no ticker has a resolvable price;
    /// otherwise runs the graph, executes, snapshots and logs.
    fn run_iteration(
        &mut self,
        index: usize,
        date: NaiveDate,
        fundamentals: &dyn crate::market_data::FundamentalsSource,
    ) -> Result<IterationOutcome, EngineError> {
        if self.processed_dates.contains(&date) {
            return Err(EngineError::DuplicateDate { index, date });
        }
        let started = Instant::now();

        let current_prices = self.resolve_prices(date);
        if current_prices.is_empty() {
            log::warn!("[{index:4}] {date} skipped: no price data for any ticker");
            return Ok(IterationOutcome::Skipped);
        }

        let lookback_start = date
            .checked_sub_days(chrono::Days::new(self.config.lookback_days))
            .unwrap_or(date);

        // Graph phase. Strategy failures inside the graph are logged and
        // leave the offending slot empty; the iteration proceeds.
        let state = {
            let ctx = DayContext {
                date,
                lookback_start,
                tickers: &self.config.tickers,
                prices: &self.cache,
                fundamentals,
                portfolio: &self.portfolio,
                current_prices: &current_prices,
                run: self.run,
            };
            let (state, _failures) = self.graph.run_day(&ctx);
            state
        };
        self.validate_decisions(index, &state)?;

        // Execution phase: the allocator's adjusted decisions are the
        // authoritative order set, executed in deterministic ticker order.
        let mut executed = Vec::new();
        for (ticker, decision) in &state.decisions {
            if decision.action == TradeAction::Hold || decision.quantity == 0 {
                continue;
            }
            let Some(&price) = current_prices.get(ticker) else {
                continue;
            };
            let execution = self.executor.execute(
                ticker,
                decision.action,
                decision.quantity,
                price,
                &mut self.portfolio,
                &current_prices,
            )?;
            if execution.quantity == 0 {
                continue;
            }
            let contributors = contributing_analysts(&state, ticker);
            self.record_contribution(&contributors, decision.action, execution.realized_pnl);
            executed.push(ExecutedTrade {
                ticker: ticker.clone(),
                action: decision.action.as_str(),
                quantity: execution.quantity,
                price,
                costs: execution.costs,
                realized_pnl: execution.realized_pnl,
                contributors,
            });
        }

        // Valuation phase.
        let mut nav = self.portfolio.nav(&current_prices);
        let mut liquidated = false;
        if nav <= 0.0 {
            log::error!("[{index:4}] {date} NAV ${nav:.2}, forcing liquidation");
            let fills = self.executor.liquidate_all(&mut self.portfolio, &current_prices);
            for fill in &fills {
                log::warn!(
                    "liquidation: {} {} {} @ {:.2} (pnl {:.2})",
                    fill.action.as_str(),
                    fill.quantity,
                    fill.ticker,
                    fill.price,
                    fill.realized_pnl
                );
            }
            nav = self.portfolio.nav(&current_prices);
            liquidated = true;
        }

        // Snapshot phase.
        self.running_peak = self.running_peak.max(nav);
        self.day_digests.push(day_digest(date, nav, self.daily.len()));
        self.daily.push(DailyRow {
            date,
            portfolio_value: nav,
            cash: self.portfolio.cash,
            long_exposure: self.portfolio.long_exposure(&current_prices),
            short_exposure: self.portfolio.short_exposure(&current_prices),
            decisions: state.decisions.clone(),
            executed,
            metrics: RowMetrics::at(nav, self.config.initial_capital, self.running_peak),
        });
        self.processed_dates.insert(date);
        self.last_good = Some((index, date, nav));

        // The invariant line: exactly one per processed iteration, on
        // stderr, even when parts of the iteration failed.
        let elapsed = started.elapsed().as_secs_f64();
        eprintln!("[{index:4}] {date} | V=${nav:.2} | Δt={elapsed:.2}s");

        if liquidated {
            return Ok(IterationOutcome::Liquidated);
        }
        Ok(IterationOutcome::Processed)
    }

    /// Close (or nearest previous close) per ticker. Tickers with no bar on
    /// or before the date are absent.
    fn resolve_prices(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        let mut prices = BTreeMap::new();
        for ticker in &self.config.tickers {
            match self.cache.close_on_or_before(ticker, date) {
                Ok(price) if price > 0.0 => {
                    prices.insert(ticker.clone(), price);
                }
                Ok(_) => {}
                Err(err) => log::debug!("{ticker}: {err}"),
            }
        }
        prices
    }

    /// The allocator's output must cover exactly the requested tickers,
    /// with hold decisions carrying zero quantity. Anything else is a
    /// malformed order set: an engine failure, not a strategy failure.
    fn validate_decisions(&self, index: usize, state: &DayState) -> Result<(), EngineError> {
        for ticker in &self.config.tickers {
            let Some(decision) = state.decisions.get(ticker) else {
                return Err(EngineError::MalformedDecisions {
                    index,
                    detail: format!("missing decision for ticker {ticker}"),
                });
            };
            if decision.action == TradeAction::Hold && decision.quantity != 0 {
                return Err(EngineError::MalformedDecisions {
                    index,
                    detail: format!("hold decision for {ticker} carries quantity {}", decision.quantity),
                });
            }
        }
        if state.decisions.len() != self.config.tickers.len() {
            return Err(EngineError::MalformedDecisions {
                index,
                detail: "stray tickers in decision set".to_string(),
            });
        }
        Ok(())
    }

    fn record_contribution(&mut self, contributors: &[AnalystId], action: TradeAction, pnl: f64) {
        for analyst in contributors {
            let entry = self.contributions.entry(*analyst).or_default();
            if action.opens_position() {
                entry.trades += 1;
            } else {
                entry.pnl += pnl;
            }
        }
    }

    /// Terminal bookkeeping: compute the hash and summary from whatever was
    /// captured, print the summary, return the report.
    fn finish(&mut self, outcome: RunOutcome) -> BacktestReport {
        let hash = output_hash(&self.day_digests);
        let summary = Summary::compute(
            &self.daily,
            &self.portfolio,
            self.config.initial_capital,
            &self.contributions,
            self.run.seed,
            hash.clone(),
        );
        summary.print(
            self.config.start_date,
            self.config.end_date,
            &self.config.tickers,
            self.config.initial_capital,
        );

        debug_assert_eq!(self.processed_dates.len(), self.daily.len());

        BacktestReport {
            outcome,
            summary,
            daily: std::mem::take(&mut self.daily),
            output_hash: hash,
            portfolio: self.portfolio.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IterationOutcome {
    Processed,
    Skipped,
    Liquidated,
}

/// Core analysts with a directional (non-neutral) signal for the ticker.
fn contributing_analysts(state: &DayState, ticker: &str) -> Vec<AnalystId> {
    let mut contributors = Vec::new();
    for (analyst, signals) in &state.analyst_signals {
        if let Some(signal) = signals.get(ticker) {
            if signal.direction != Direction::Neutral {
                contributors.push(*analyst);
            }
        }
    }
    contributors
}
