// A single OHLCV bar. Daily bars carry a midnight timestamp; intraday bars
// carry the full timestamp.

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Check the OHLC invariants. Returns a human-readable violation, or
    /// None when the bar is well-formed.
    ///
    /// Invariants: high ≥ max(open, close, low); low ≤ min(open, close, high);
    /// all prices positive; volume non-negative; everything finite.
    pub fn violation(&self) -> Option<String> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Some(format!("{name} is not finite"));
            }
            if value <= 0.0 {
                return Some(format!("{name} must be positive, got {value}"));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some(format!("volume must be non-negative, got {}", self.volume));
        }
        if self.high < self.open || self.high < self.close || self.high < self.low {
            return Some(format!(
                "high {} below open/close/low ({}/{}/{})",
                self.high, self.open, self.close, self.low
            ));
        }
        if self.low > self.open || self.low > self.close {
            return Some(format!(
                "low {} above open/close ({}/{})",
                self.low, self.open, self.close
            ));
        }
        None
    }
}
