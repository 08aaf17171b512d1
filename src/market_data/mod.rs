// Market data layer: file-backed OHLCV cache plus the optional
// fundamentals/news source behind the deterministic gate.

pub mod bar;
pub mod fundamentals;
pub mod price_cache;

pub use bar::Bar;
pub use fundamentals::{DeterministicGate, FundamentalSnapshot, FundamentalsSource, StaticFundamentals};
pub use price_cache::PriceCache;
