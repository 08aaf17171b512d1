#![allow(dead_code)]
// Shared fixtures: throwaway price directories and driver plumbing.
// Each test crate pulls in the subset it needs.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use bluechip::backtesting::{BacktestConfig, BacktestDriver, BacktestReport};
use bluechip::determinism::RunContext;
use bluechip::market_data::{DeterministicGate, PriceCache, StaticFundamentals};

/// Write a {TICKER}.csv whose bars land on consecutive business days
/// ending at `last_day`, one bar per close, oldest first.
pub fn write_prices(dir: &Path, ticker: &str, last_day: NaiveDate, closes: &[f64]) {
    let mut days = Vec::new();
    let mut day = last_day;
    while days.len() < closes.len() {
        if !matches!(
            chrono::Datelike::weekday(&day),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        ) {
            days.push(day);
        }
        day = day.pred_opt().unwrap();
    }
    days.reverse();

    let mut file = std::fs::File::create(dir.join(format!("{ticker}.csv"))).unwrap();
    writeln!(file, "date,open,high,low,close,volume").unwrap();
    for (date, close) in days.iter().zip(closes.iter()) {
        writeln!(
            file,
            "{date},{:.4},{:.4},{:.4},{close:.4},100000",
            close,
            close * 1.005,
            close * 0.995,
        )
        .unwrap();
    }
}

/// `flat` bars at 100, then a linear climb producing the requested
/// trailing 20-day return on the final bar.
pub fn flat_then_trend(flat: usize, trend_return: f64) -> Vec<f64> {
    let mut closes = vec![100.0; flat];
    for i in 0..20 {
        closes.push(100.0 * (1.0 + trend_return * i as f64 / 19.0));
    }
    closes
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub tickers: Vec<String>,
}

impl Fixture {
    pub fn new(series: &[(&str, Vec<f64>)], last_day: NaiveDate) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut tickers = Vec::new();
        for (ticker, closes) in series {
            write_prices(dir.path(), ticker, last_day, closes);
            tickers.push(ticker.to_string());
        }
        Self { dir, tickers }
    }

    pub fn config(&self, start: NaiveDate, end: NaiveDate, initial_capital: f64) -> BacktestConfig {
        let mut config = BacktestConfig::new(self.tickers.clone(), start, end);
        config.initial_capital = initial_capital;
        config
    }

    /// Run a fully deterministic backtest with no fundamentals attached.
    pub fn run(&self, config: BacktestConfig) -> BacktestReport {
        let run = RunContext {
            seed: 42,
            deterministic: true,
        };
        let cache = PriceCache::new(self.dir.path());
        let fundamentals = DeterministicGate::new(StaticFundamentals::default(), true);
        let mut driver = BacktestDriver::new(config, cache, BTreeMap::new(), run);
        driver.run(&fundamentals)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
