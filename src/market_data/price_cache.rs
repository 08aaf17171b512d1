// File-backed OHLCV cache.
//
// One CSV per ticker at {data_dir}/{TICKER}.csv with header
// `date,open,high,low,close,volume`, one row per bar. Rows must carry
// strictly increasing timestamps; anything else fails the load.
// Bars load lazily on first access and are immutable afterwards; the cache
// is safe for concurrent reads from the analyst fan-out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::DataError;
use crate::market_data::bar::Bar;

const REQUIRED_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct PriceCache {
    data_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<Bar>>>>,
}

impl PriceCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load every ticker up front so malformed files fail the run before the
    /// first iteration instead of midway through it.
    pub fn preload(&self, tickers: &[String]) -> Result<(), DataError> {
        for ticker in tickers {
            self.bars(ticker)?;
        }
        Ok(())
    }

    /// The bar on the exact date, or the nearest previous bar (weekends,
    /// holidays). `Unavailable` only when no bar on or before `date` exists.
    /// For intraday data this returns the last bar of the nearest session.
    pub fn bar_on_or_before(&self, ticker: &str, date: NaiveDate) -> Result<Bar, DataError> {
        let bars = self.bars(ticker)?;
        bars.iter()
            .rev()
            .find(|b| b.date() <= date)
            .copied()
            .ok_or_else(|| DataError::Unavailable {
                ticker: ticker.to_string(),
                date,
            })
    }

    /// Closing price on or before `date`.
    pub fn close_on_or_before(&self, ticker: &str, date: NaiveDate) -> Result<f64, DataError> {
        self.bar_on_or_before(ticker, date).map(|b| b.close)
    }

    /// All bars with `start ≤ timestamp ≤ end`, in order. Date boundaries
    /// include whole sessions, so a midnight end boundary covers every
    /// intraday bar of that day.
    pub fn range(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        let bars = self.bars(ticker)?;
        Ok(bars
            .iter()
            .filter(|b| b.date() >= start && b.date() <= end)
            .copied()
            .collect())
    }

    /// Closing prices for the range, convenience for indicator code.
    pub fn closes(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<f64>, DataError> {
        Ok(self.range(ticker, start, end)?.iter().map(|b| b.close).collect())
    }

    fn bars(&self, ticker: &str) -> Result<Arc<Vec<Bar>>, DataError> {
        let key = ticker.to_uppercase();
        if let Some(bars) = self.cache.read().expect("price cache lock poisoned").get(&key) {
            return Ok(Arc::clone(bars));
        }

        let loaded = Arc::new(load_ticker_csv(&self.data_dir, &key)?);
        let mut guard = self.cache.write().expect("price cache lock poisoned");
        // A parallel reader may have raced us here; first load wins, and both
        // loads are identical because the file is immutable for the run.
        let entry = guard.entry(key).or_insert_with(|| Arc::clone(&loaded));
        Ok(Arc::clone(entry))
    }
}

fn load_ticker_csv(data_dir: &Path, ticker: &str) -> Result<Vec<Bar>, DataError> {
    let path = data_dir.join(format!("{ticker}.csv"));
    let path_str = path.display().to_string();

    let file = std::fs::File::open(&path).map_err(|source| DataError::Io {
        path: path_str.clone(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .has_headers(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| DataError::Csv {
            path: path_str.clone(),
            source,
        })?
        .clone();
    let mut column_index = [0usize; 6];
    for (slot, &column) in REQUIRED_COLUMNS.iter().enumerate() {
        match headers.iter().position(|h| h.eq_ignore_ascii_case(column)) {
            Some(idx) => column_index[slot] = idx,
            None => {
                return Err(DataError::MissingColumn {
                    path: path_str,
                    column,
                })
            }
        }
    }

    let mut bars: Vec<Bar> = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let row = row_idx + 2; // 1-based, after the header
        let record = record.map_err(|source| DataError::Csv {
            path: path_str.clone(),
            source,
        })?;

        let field = |slot: usize| record.get(column_index[slot]).unwrap_or("");

        let timestamp = parse_timestamp(field(0)).ok_or_else(|| DataError::BadRow {
            path: path_str.clone(),
            row,
            detail: format!("unparsable date `{}`", field(0)),
        })?;

        let mut numbers = [0.0f64; 5];
        for (i, name) in ["open", "high", "low", "close", "volume"].iter().enumerate() {
            numbers[i] = field(i + 1).parse().map_err(|_| DataError::BadRow {
                path: path_str.clone(),
                row,
                detail: format!("unparsable {name} `{}`", field(i + 1)),
            })?;
        }

        let bar = Bar {
            timestamp,
            open: numbers[0],
            high: numbers[1],
            low: numbers[2],
            close: numbers[3],
            volume: numbers[4],
        };

        if let Some(detail) = bar.violation() {
            return Err(DataError::BadRow {
                path: path_str.clone(),
                row,
                detail,
            });
        }

        if let Some(last) = bars.last() {
            if bar.timestamp <= last.timestamp {
                return Err(DataError::NonMonotonic {
                    path: path_str.clone(),
                    row,
                    detail: format!("{} follows {}", bar.timestamp, last.timestamp),
                });
            }
        }

        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(DataError::Empty { path: path_str });
    }

    log::debug!("loaded {} bars for {ticker}", bars.len());
    Ok(bars)
}

/// ISO-8601 date or datetime; intraday rows carry the time component.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, ticker: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(format!("{ticker}.csv"))).unwrap();
        writeln!(f, "date,open,high,low,close,volume").unwrap();
        write!(f, "{body}").unwrap();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exact_and_nearest_previous_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "XYZ",
            "2024-01-02,100,101,99,100.5,1000\n2024-01-03,100.5,102,100,101.5,1100\n",
        );
        let cache = PriceCache::new(dir.path());

        let exact = cache.bar_on_or_before("XYZ", date(2024, 1, 3)).unwrap();
        assert_eq!(exact.close, 101.5);

        // Saturday resolves to Friday... here, the 6th resolves to the 3rd.
        let nearest = cache.bar_on_or_before("xyz", date(2024, 1, 6)).unwrap();
        assert_eq!(nearest.close, 101.5);

        let miss = cache.bar_on_or_before("XYZ", date(2024, 1, 1));
        assert!(matches!(miss, Err(DataError::Unavailable { .. })));
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "XYZ",
            "2024-01-02,100,101,99,100,1000\n2024-01-03,100,101,99,101,1000\n2024-01-04,101,102,100,102,1000\n",
        );
        let cache = PriceCache::new(dir.path());
        let bars = cache.range("XYZ", date(2024, 1, 3), date(2024, 1, 4)).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn intraday_midnight_boundary_includes_whole_day() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "XYZ",
            "2024-01-02 09:30:00,100,101,99,100,500\n2024-01-02 16:00:00,100,101,99,100.8,700\n2024-01-03 09:30:00,100.8,102,100,101,600\n",
        );
        let cache = PriceCache::new(dir.path());
        let bars = cache.range("XYZ", date(2024, 1, 2), date(2024, 1, 2)).unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn ohlc_violation_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "BAD", "2024-01-02,100,99.5,99,100.5,1000\n");
        let cache = PriceCache::new(dir.path());
        assert!(matches!(
            cache.bar_on_or_before("BAD", date(2024, 1, 2)),
            Err(DataError::BadRow { .. })
        ));
    }

    #[test]
    fn duplicate_or_backwards_dates_are_hard_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "DUP",
            "2024-01-02,100,101,99,100,1000\n2024-01-02,100,101,99,100,1000\n",
        );
        let cache = PriceCache::new(dir.path());
        assert!(matches!(
            cache.preload(&["DUP".to_string()]),
            Err(DataError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn missing_column_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("NOCOL.csv")).unwrap();
        writeln!(f, "date,open,high,low,close").unwrap();
        writeln!(f, "2024-01-02,100,101,99,100").unwrap();
        let cache = PriceCache::new(dir.path());
        assert!(matches!(
            cache.preload(&["NOCOL".to_string()]),
            Err(DataError::MissingColumn { column: "volume", .. })
        ));
    }

    #[test]
    fn negative_volume_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "NEGV", "2024-01-02,100,101,99,100,-10\n");
        let cache = PriceCache::new(dir.path());
        assert!(cache.preload(&["NEGV".to_string()]).is_err());
    }
}
