use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::errors::DataError;
use crate::market_data::FundamentalSnapshot;

/// One instrument in the trading universe. The sector label feeds the
/// allocator's concentration cap; the optional fundamentals snapshot feeds
/// the composite analysts outside deterministic mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub sector: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub notes: Option<String>,
    pub fundamentals: Option<FundamentalSnapshot>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseConfig {
    pub instruments: Vec<InstrumentConfig>,
}

impl UniverseConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path_str = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(&path).map_err(|e| DataError::Universe {
            path: path_str.clone(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| DataError::Universe {
            path: path_str,
            detail: e.to_string(),
        })
    }

    pub fn enabled_symbols(&self) -> Vec<String> {
        self.instruments
            .iter()
            .filter(|i| i.enabled)
            .map(|i| i.symbol.to_uppercase())
            .collect()
    }

    /// Ticker → sector for the allocator. Instruments without a label fall
    /// into "Unknown" downstream.
    pub fn sector_map(&self) -> BTreeMap<String, String> {
        self.instruments
            .iter()
            .filter(|i| i.enabled)
            .filter_map(|i| {
                i.sector
                    .as_ref()
                    .map(|s| (i.symbol.to_uppercase(), s.clone()))
            })
            .collect()
    }

    pub fn fundamentals_map(&self) -> HashMap<String, FundamentalSnapshot> {
        self.instruments
            .iter()
            .filter(|i| i.enabled)
            .filter_map(|i| {
                i.fundamentals
                    .as_ref()
                    .map(|f| (i.symbol.to_uppercase(), f.clone()))
            })
            .collect()
    }
}
