// Portfolio accounting: cash, margin, per-ticker long/short positions with
// weighted-average cost bases, and realized gains per side.

pub mod executor;

use std::collections::BTreeMap;

/// One ticker's holdings. When a side is flat its cost basis is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub long: u32,
    pub long_cost_basis: f64,
    pub short: u32,
    pub short_cost_basis: f64,
    pub short_margin_used: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.long == 0 && self.short == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RealizedGains {
    pub long: f64,
    pub short: f64,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    /// Margin requirement for shorting, in [0, 1].
    pub margin_requirement: f64,
    pub margin_used: f64,
    pub positions: BTreeMap<String, Position>,
    pub realized_gains: BTreeMap<String, RealizedGains>,
    pub initial_capital: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64, margin_requirement: f64, tickers: &[String]) -> Self {
        let positions = tickers
            .iter()
            .map(|t| (t.clone(), Position::default()))
            .collect();
        let realized_gains = tickers
            .iter()
            .map(|t| (t.clone(), RealizedGains::default()))
            .collect();
        Self {
            cash: initial_capital,
            margin_requirement: margin_requirement.clamp(0.0, 1.0),
            margin_used: 0.0,
            positions,
            realized_gains,
            initial_capital,
        }
    }

    pub fn position(&self, ticker: &str) -> Position {
        self.positions.get(ticker).copied().unwrap_or_default()
    }

    pub fn position_mut(&mut self, ticker: &str) -> &mut Position {
        self.positions.entry(ticker.to_string()).or_default()
    }

    pub fn gains_mut(&mut self, ticker: &str) -> &mut RealizedGains {
        self.realized_gains.entry(ticker.to_string()).or_default()
    }

    /// NAV = cash + margin collateral + marked-to-market long value
    /// − marked-to-market short liability. Short proceeds sit in cash from
    /// entry, so the liability is simply shares × current price.
    pub fn nav(&self, prices: &BTreeMap<String, f64>) -> f64 {
        let mut total = self.cash + self.margin_used;
        for (ticker, pos) in &self.positions {
            let Some(&price) = prices.get(ticker) else {
                continue;
            };
            if pos.long > 0 {
                total += pos.long as f64 * price;
            }
            if pos.short > 0 {
                total -= pos.short as f64 * price;
            }
        }
        total
    }

    pub fn long_exposure(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .filter_map(|(t, p)| prices.get(t).map(|px| p.long as f64 * px))
            .sum()
    }

    pub fn short_exposure(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .filter_map(|(t, p)| prices.get(t).map(|px| p.short as f64 * px))
            .sum()
    }

    /// Sum of absolute long and short notionals.
    pub fn gross_exposure(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.long_exposure(prices) + self.short_exposure(prices)
    }

    /// Absolute notional held in one ticker.
    pub fn ticker_exposure(&self, ticker: &str, price: f64) -> f64 {
        let pos = self.position(ticker);
        (pos.long as f64 + pos.short as f64) * price
    }
}
