// Backtest driver entry point.
//
// Exit codes: 0 for COMPLETE and LIQUIDATED (the summary tells the story),
// non-zero only for an engine failure. The per-day invariant log goes to
// stderr; the summary table goes to stdout.

use std::collections::BTreeMap;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;

use bluechip::backtesting::{BacktestConfig, BacktestDriver, RunOutcome};
use bluechip::config::UniverseConfig;
use bluechip::determinism::{RunContext, DEFAULT_SEED};
use bluechip::market_data::{DeterministicGate, PriceCache, StaticFundamentals};

/// Deterministic multi-analyst backtest runner.
#[derive(Debug, Parser)]
#[command(name = "bluechip", version, about)]
struct Cli {
    /// Comma-separated tickers (e.g. AAPL,MSFT,GOOGL)
    #[arg(long, required = true)]
    tickers: String,

    /// Start date YYYY-MM-DD
    #[arg(long)]
    start_date: NaiveDate,

    /// End date YYYY-MM-DD
    #[arg(long)]
    end_date: NaiveDate,

    /// Initial capital
    #[arg(long, default_value_t = 100_000.0)]
    initial_capital: f64,

    /// Margin requirement for shorting, in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    margin_requirement: f64,

    /// Directory holding {TICKER}.csv price files
    #[arg(long, default_value = "data/prices")]
    data_dir: String,

    /// Optional universe file (sectors, fundamentals)
    #[arg(long)]
    universe: Option<String>,

    /// Seed recorded in the determinism block
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Force the price-only data path regardless of DETERMINISTIC_MODE
    #[arg(long, default_value_t = false)]
    deterministic: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let tickers: Vec<String> = cli
        .tickers
        .split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        eprintln!("error: no tickers given");
        return ExitCode::from(2);
    }
    if cli.end_date < cli.start_date {
        eprintln!("error: end date {} precedes start date {}", cli.end_date, cli.start_date);
        return ExitCode::from(2);
    }

    let run = RunContext::initialize(cli.seed, cli.deterministic);
    log::info!(
        "run context: seed={}, deterministic={}",
        run.seed,
        run.deterministic
    );

    let (sectors, fundamentals) = match cli.universe.as_deref() {
        Some(path) => match UniverseConfig::load_from_file(path) {
            Ok(universe) => (
                universe.sector_map(),
                StaticFundamentals::new(universe.fundamentals_map()),
            ),
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::from(2);
            }
        },
        None => (BTreeMap::new(), StaticFundamentals::default()),
    };
    let fundamentals = DeterministicGate::new(fundamentals, run.deterministic);

    let mut config = BacktestConfig::new(tickers, cli.start_date, cli.end_date);
    config.initial_capital = cli.initial_capital;
    config.margin_requirement = cli.margin_requirement;

    let cache = PriceCache::new(&cli.data_dir);
    let mut driver = BacktestDriver::new(config, cache, sectors, run);
    let report = driver.run(&fundamentals);

    match report.outcome {
        RunOutcome::Complete => ExitCode::SUCCESS,
        RunOutcome::Liquidated => {
            log::warn!("run terminated by forced liquidation");
            ExitCode::SUCCESS
        }
        RunOutcome::EngineFailed(message) => {
            log::error!("{message}");
            ExitCode::FAILURE
        }
    }
}
