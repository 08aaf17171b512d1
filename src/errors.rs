// Failure taxonomy for the decision engine.
//
// Three kinds of failure, handled differently:
// * DataError: price-file problems. Load-time validation failures are
//                   hard errors; per-lookup gaps (`Unavailable`) are recovered
//                   locally by whoever asked.
// * StrategyFailure: an analyst misbehaved (returned an error or a malformed
//                   signal set). Logged with the offending analyst, its slot
//                   is left empty, the iteration continues.
// * EngineError: an invariant was violated. Aborts the run after the
//                   partial summary is emitted.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to open price file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse price file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("price file {path} is missing required column `{column}`")]
    MissingColumn { path: String, column: &'static str },

    #[error("price file {path} row {row}: {detail}")]
    BadRow {
        path: String,
        row: usize,
        detail: String,
    },

    #[error("price file {path} row {row}: timestamps not strictly increasing ({detail})")]
    NonMonotonic {
        path: String,
        row: usize,
        detail: String,
    },

    #[error("price file {path} contains no bars")]
    Empty { path: String },

    #[error("no price bar for {ticker} on or before {date}")]
    Unavailable { ticker: String, date: NaiveDate },

    #[error("failed to load universe file {path}: {detail}")]
    Universe { path: String, detail: String },
}

/// A per-analyst failure inside one iteration. Never fatal.
#[derive(Debug, Error)]
#[error("analyst {analyst} failed: {detail}")]
pub struct StrategyFailure {
    pub analyst: &'static str,
    pub detail: String,
}

impl StrategyFailure {
    pub fn new(analyst: &'static str, detail: impl Into<String>) -> Self {
        Self {
            analyst,
            detail: detail.into(),
        }
    }
}

/// Invariant violations that abort the run. Every message is tagged so the
/// operator can grep stderr for `ENGINE FAILURE`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ENGINE FAILURE: date {date} already processed (iteration {index})")]
    DuplicateDate { index: usize, date: NaiveDate },

    #[error("ENGINE FAILURE: NAV went negative (${nav:.2}) after {action} {ticker}")]
    NegativeNav {
        ticker: String,
        action: &'static str,
        nav: f64,
    },

    #[error("ENGINE FAILURE: malformed decision set at iteration {index}: {detail}")]
    MalformedDecisions { index: usize, detail: String },

    #[error("ENGINE FAILURE: {0}")]
    Data(#[from] DataError),
}
