// Performance metrics, daily rows and the determinism output hash.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use md5::{Digest, Md5};

use crate::agents::state::TradeDecision;
use crate::agents::AnalystId;
use crate::portfolio::Portfolio;

/// One executed (non-zero) trade, with the core analysts whose directional
/// signals agreed with it.
#[derive(Debug, Clone)]
pub struct ExecutedTrade {
    pub ticker: String,
    pub action: &'static str,
    pub quantity: u32,
    pub price: f64,
    pub costs: f64,
    pub realized_pnl: f64,
    pub contributors: Vec<AnalystId>,
}

/// Rolling performance numbers as of one day, frozen into the daily row.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMetrics {
    /// Total return since inception, percent.
    pub return_pct: f64,
    /// Drawdown from the running peak, percent (≥ 0).
    pub drawdown_pct: f64,
}

impl RowMetrics {
    pub fn at(value: f64, initial_capital: f64, running_peak: f64) -> Self {
        let return_pct = if initial_capital > 0.0 {
            (value / initial_capital - 1.0) * 100.0
        } else {
            0.0
        };
        let drawdown_pct = if running_peak > 0.0 && running_peak > value {
            (running_peak - value) / running_peak * 100.0
        } else {
            0.0
        };
        Self {
            return_pct,
            drawdown_pct,
        }
    }
}

/// Snapshot of one processed day.
#[derive(Debug, Clone)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub cash: f64,
    pub long_exposure: f64,
    pub short_exposure: f64,
    pub decisions: BTreeMap<String, TradeDecision>,
    pub executed: Vec<ExecutedTrade>,
    pub metrics: RowMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentContribution {
    pub pnl: f64,
    pub trades: u32,
}

/// Determinism witness for one day: MD5 of `"{date}:{value:.2}:{n}"` where
/// `n` is the number of daily rows recorded before this one.
pub fn day_digest(date: NaiveDate, value: f64, n: usize) -> String {
    let payload = format!("{date}:{value:.2}:{n}");
    format!("{:x}", Md5::digest(payload.as_bytes()))
}

/// MD5 of the concatenated per-day digests, in day order.
pub fn output_hash(digests: &[String]) -> String {
    let mut hasher = Md5::new();
    for digest in digests {
        hasher.update(digest.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub days: usize,
    pub final_value: f64,
    pub cumulative_pnl: f64,
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_date: Option<NaiveDate>,
    pub win_rate_pct: f64,
    pub total_trades: usize,
    pub agent_contributions: BTreeMap<AnalystId, AgentContribution>,
    pub seed: u64,
    pub output_hash: String,
}

impl Summary {
    /// Compute from whatever daily rows exist. Safe on an empty run.
    pub fn compute(
        daily: &[DailyRow],
        portfolio: &Portfolio,
        initial_capital: f64,
        contributions: &BTreeMap<AnalystId, AgentContribution>,
        seed: u64,
        output_hash: String,
    ) -> Self {
        let final_value = daily
            .last()
            .map(|row| row.portfolio_value)
            .unwrap_or(initial_capital);
        let cumulative_pnl = final_value - initial_capital;
        let total_return_pct = if initial_capital > 0.0 {
            (final_value / initial_capital - 1.0) * 100.0
        } else {
            0.0
        };

        let values: Vec<f64> = daily.iter().map(|row| row.portfolio_value).collect();
        let sharpe_ratio = sharpe(&values);
        let (max_drawdown_pct, max_drawdown_date) = drawdown(daily);

        // Win rate from realized gains: a ticker counts once it has closed
        // anything, and counts as a win if either side netted positive.
        let mut profitable = 0usize;
        let mut closed = 0usize;
        for gains in portfolio.realized_gains.values() {
            if gains.long != 0.0 || gains.short != 0.0 {
                closed += 1;
                if gains.long > 0.0 || gains.short > 0.0 {
                    profitable += 1;
                }
            }
        }
        let win_rate_pct = if closed > 0 {
            profitable as f64 / closed as f64 * 100.0
        } else {
            0.0
        };

        let total_trades = daily.iter().map(|row| row.executed.len()).sum();

        Self {
            days: daily.len(),
            final_value,
            cumulative_pnl,
            total_return_pct,
            sharpe_ratio,
            max_drawdown_pct,
            max_drawdown_date,
            win_rate_pct,
            total_trades,
            agent_contributions: contributions.clone(),
            seed,
            output_hash,
        }
    }

    /// Print the summary table to stdout. Always called, even after an
    /// engine failure, with whatever rows were captured.
    pub fn print(&self, start: NaiveDate, end: NaiveDate, tickers: &[String], initial_capital: f64) {
        println!("\n{}", "=".repeat(80));
        println!("DETERMINISTIC BACKTEST SUMMARY");
        println!("{}", "=".repeat(80));
        println!("\nPeriod: {start} to {end}");
        println!("Tickers: {}", tickers.join(", "));
        println!("Initial Capital: ${initial_capital:.2}");

        println!("\n{}", "-".repeat(80));
        println!("PERFORMANCE METRICS");
        println!("{}", "-".repeat(80));
        println!("Trading Days Processed: {}", self.days);
        println!("Final Portfolio Value: ${:.2}", self.final_value);
        println!("Cumulative PnL: ${:.2}", self.cumulative_pnl);
        println!("Total Return: {:.2}%", self.total_return_pct);
        println!("Max Drawdown: {:.2}%", self.max_drawdown_pct);
        if let Some(date) = self.max_drawdown_date {
            println!("Max Drawdown Date: {date}");
        }
        println!("Sharpe Ratio: {:.2}", self.sharpe_ratio);
        println!("Win Rate: {:.1}%", self.win_rate_pct);
        println!("Total Trades: {}", self.total_trades);

        println!("\n{}", "-".repeat(80));
        println!("AGENT CONTRIBUTIONS");
        println!("{}", "-".repeat(80));
        println!("{:<20} {:<15} {:<10}", "Agent", "PnL", "Trades");
        println!("{}", "-".repeat(80));
        for (analyst, contribution) in &self.agent_contributions {
            println!(
                "{:<20} ${:<14.2} {:<10}",
                analyst.display_name(),
                contribution.pnl,
                contribution.trades
            );
        }

        println!("\nDeterminism: seed={}, output_hash={}", self.seed, self.output_hash);
        println!("{}", "=".repeat(80));
    }
}

fn sharpe(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let returns: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        mean / std_dev * 252.0f64.sqrt()
    } else {
        0.0
    }
}

fn drawdown(daily: &[DailyRow]) -> (f64, Option<NaiveDate>) {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    let mut worst_date = None;
    for row in daily {
        peak = peak.max(row.portfolio_value);
        if peak > 0.0 {
            let dd = (peak - row.portfolio_value) / peak * 100.0;
            if dd > worst {
                worst = dd;
                worst_date = Some(row.date);
            }
        }
    }
    (worst, worst_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(d: u32, value: f64) -> DailyRow {
        DailyRow {
            date: date(d),
            portfolio_value: value,
            cash: value,
            long_exposure: 0.0,
            short_exposure: 0.0,
            decisions: BTreeMap::new(),
            executed: Vec::new(),
            metrics: RowMetrics::default(),
        }
    }

    #[test]
    fn digest_is_stable() {
        let a = day_digest(date(2), 10_000.0, 0);
        let b = day_digest(date(2), 10_000.0, 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, day_digest(date(3), 10_000.0, 0));
        assert_ne!(a, day_digest(date(2), 10_000.01, 0));
        assert_ne!(a, day_digest(date(2), 10_000.0, 1));
    }

    #[test]
    fn output_hash_depends_on_order() {
        let d1 = day_digest(date(2), 10_000.0, 0);
        let d2 = day_digest(date(3), 10_100.0, 1);
        let forward = output_hash(&[d1.clone(), d2.clone()]);
        let reversed = output_hash(&[d2, d1]);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn empty_run_yields_flat_summary() {
        let portfolio = Portfolio::new(10_000.0, 0.0, &[]);
        let summary = Summary::compute(
            &[],
            &portfolio,
            10_000.0,
            &BTreeMap::new(),
            42,
            output_hash(&[]),
        );
        assert_eq!(summary.days, 0);
        assert_eq!(summary.final_value, 10_000.0);
        assert_eq!(summary.cumulative_pnl, 0.0);
        assert_eq!(summary.total_trades, 0);
    }

    #[test]
    fn drawdown_tracks_trough_date() {
        let rows = vec![row(2, 100.0), row(3, 120.0), row(4, 90.0), row(5, 95.0)];
        let (dd, when) = drawdown(&rows);
        assert!((dd - 25.0).abs() < 1e-9);
        assert_eq!(when, Some(date(4)));
    }

    #[test]
    fn row_metrics_snapshot_tracks_peak() {
        let m = RowMetrics::at(9_000.0, 10_000.0, 11_000.0);
        assert!((m.return_pct + 10.0).abs() < 1e-9);
        assert!((m.drawdown_pct - (2_000.0 / 11_000.0 * 100.0)).abs() < 1e-9);

        let fresh = RowMetrics::at(10_500.0, 10_000.0, 10_500.0);
        assert_eq!(fresh.drawdown_pct, 0.0);
        assert!((fresh.return_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn win_rate_counts_tickers_with_closes() {
        let mut portfolio = Portfolio::new(10_000.0, 0.0, &["A".to_string(), "B".to_string()]);
        portfolio.gains_mut("A").long = 150.0;
        portfolio.gains_mut("B").short = -40.0;
        let summary = Summary::compute(
            &[row(2, 10_000.0)],
            &portfolio,
            10_000.0,
            &BTreeMap::new(),
            42,
            String::new(),
        );
        assert!((summary.win_rate_pct - 50.0).abs() < 1e-9);
    }
}
