// src/agents/performance_auditor.rs
//
// Advisory credibility tracker. Signals are enqueued on the day they are
// produced and graded once the replay clock has advanced five business
// days, against the forward price move over that window. The ledger is the
// only graph state that survives across days.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDate;

use crate::agents::state::DayContext;
use crate::agents::{AnalystId, AnalystSignals, Direction};
use crate::backtesting::calendar;

const INITIAL_CREDIBILITY: f64 = 0.5;
const CREDIBILITY_UPDATE_RATE: f64 = 0.1;
const CORRECT_SIGNAL_BOOST: f64 = 0.05;
const INCORRECT_SIGNAL_PENALTY: f64 = -0.05;
const PROFITABLE_SIGNAL_BOOST: f64 = 0.10;
const DRAWDOWN_SIGNAL_PENALTY: f64 = -0.10;
/// Minimum forward move (percent) for a directional signal to count.
const SIGNAL_THRESHOLD_PCT: f64 = 2.0;
/// Forward move (percent) past which the profit/drawdown adjustments fire.
const STRONG_MOVE_PCT: f64 = 5.0;
const LOOKBACK_BUSINESS_DAYS: u32 = 5;

/// Persistent per-analyst scorecard.
#[derive(Debug, Clone)]
pub struct CredibilityRecord {
    pub credibility: f64,
    pub correct_signals: u32,
    pub incorrect_signals: u32,
    pub neutral_signals: u32,
    pub total_evaluated: u32,
    pub last_updated: Option<NaiveDate>,
}

impl Default for CredibilityRecord {
    fn default() -> Self {
        Self {
            credibility: INITIAL_CREDIBILITY,
            correct_signals: 0,
            incorrect_signals: 0,
            neutral_signals: 0,
            total_evaluated: 0,
            last_updated: None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingEvaluation {
    analyst: AnalystId,
    ticker: String,
    direction: Direction,
    signal_date: NaiveDate,
    due: NaiveDate,
}

pub struct PerformanceAuditor {
    ledger: BTreeMap<AnalystId, CredibilityRecord>,
    pending: VecDeque<PendingEvaluation>,
}

impl PerformanceAuditor {
    pub fn new() -> Self {
        Self {
            ledger: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn ledger(&self) -> &BTreeMap<AnalystId, CredibilityRecord> {
        &self.ledger
    }

    /// Grade matured signals, enqueue today's, publish the credibility map
    /// and attach credibility metadata to each analyst's ticker entries.
    pub fn audit(
        &mut self,
        ctx: &DayContext,
        signals: &mut AnalystSignals,
    ) -> BTreeMap<AnalystId, f64> {
        // Any analyst seen for the first time starts at neutral credibility.
        for analyst in signals.keys() {
            self.ledger.entry(*analyst).or_default();
        }

        self.evaluate_due(ctx);
        self.enqueue(ctx, signals);

        let credibility: BTreeMap<AnalystId, f64> = self
            .ledger
            .iter()
            .map(|(analyst, record)| (*analyst, record.credibility))
            .collect();

        // Metadata only: downstream weighting reads the published map, not
        // the extension fields.
        for (analyst, ticker_signals) in signals.iter_mut() {
            let Some(record) = self.ledger.get(analyst) else {
                continue;
            };
            let note = describe(record);
            for signal in ticker_signals.values_mut() {
                *signal = signal
                    .clone()
                    .with_num("credibility", record.credibility)
                    .with_text("credibility_note", note.clone());
            }
        }

        credibility
    }

    fn evaluate_due(&mut self, ctx: &DayContext) {
        while let Some(front) = self.pending.front() {
            if front.due > ctx.date {
                break;
            }
            let entry = self.pending.pop_front().expect("front checked");
            let record = self.ledger.entry(entry.analyst).or_default();

            if entry.direction == Direction::Neutral {
                record.neutral_signals += 1;
                record.last_updated = Some(ctx.date);
                continue;
            }

            // Forward move from the signal date to the due date. Missing
            // forward data leaves credibility unchanged.
            let change_pct = match forward_change_pct(ctx, &entry) {
                Some(v) => v,
                None => continue,
            };

            let correct = match entry.direction {
                Direction::Bullish => change_pct >= SIGNAL_THRESHOLD_PCT,
                Direction::Bearish => change_pct <= -SIGNAL_THRESHOLD_PCT,
                Direction::Neutral => unreachable!("neutral handled above"),
            };
            let strong_move = change_pct.abs() >= STRONG_MOVE_PCT;

            record.credibility = update_credibility(
                record.credibility,
                Some(correct),
                correct && strong_move,
                !correct && strong_move,
            );
            if correct {
                record.correct_signals += 1;
            } else {
                record.incorrect_signals += 1;
            }
            record.total_evaluated += 1;
            record.last_updated = Some(ctx.date);
        }
    }

    fn enqueue(&mut self, ctx: &DayContext, signals: &AnalystSignals) {
        let due = calendar::add_business_days(ctx.date, LOOKBACK_BUSINESS_DAYS);
        for (analyst, ticker_signals) in signals {
            for (ticker, signal) in ticker_signals {
                self.pending.push_back(PendingEvaluation {
                    analyst: *analyst,
                    ticker: ticker.clone(),
                    direction: signal.direction,
                    signal_date: ctx.date,
                    due,
                });
            }
        }
    }
}

impl Default for PerformanceAuditor {
    fn default() -> Self {
        Self::new()
    }
}

fn forward_change_pct(ctx: &DayContext, entry: &PendingEvaluation) -> Option<f64> {
    let base = ctx
        .prices
        .close_on_or_before(&entry.ticker, entry.signal_date)
        .ok()?;
    let forward = ctx
        .prices
        .close_on_or_before(&entry.ticker, entry.due.min(ctx.date))
        .ok()?;
    if base <= 0.0 {
        return None;
    }
    Some((forward - base) / base * 100.0)
}

/// EWMA-style update: new = clamp(old + rate·Δadj, 0, 1) with
/// Δadj = ±0.05 for correctness and ±0.10 for strong outcomes.
pub fn update_credibility(
    current: f64,
    is_correct: Option<bool>,
    is_profitable: bool,
    caused_drawdown: bool,
) -> f64 {
    let mut adjustment = 0.0;
    match is_correct {
        Some(true) => adjustment += CORRECT_SIGNAL_BOOST,
        Some(false) => adjustment += INCORRECT_SIGNAL_PENALTY,
        None => {}
    }
    if is_profitable {
        adjustment += PROFITABLE_SIGNAL_BOOST;
    }
    if caused_drawdown {
        adjustment += DRAWDOWN_SIGNAL_PENALTY;
    }
    (current + adjustment * CREDIBILITY_UPDATE_RATE).clamp(0.0, 1.0)
}

fn describe(record: &CredibilityRecord) -> String {
    let pct = (record.credibility * 100.0) as i32;
    if record.total_evaluated > 0 {
        let accuracy =
            record.correct_signals as f64 / record.total_evaluated as f64 * 100.0;
        format!(
            "Credibility: {pct}% (Accuracy: {}/{} = {accuracy:.1}%)",
            record.correct_signals, record.total_evaluated
        )
    } else {
        format!("Credibility: {pct}% (initial score, no signals evaluated yet)")
    }
}
