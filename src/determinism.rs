// Per-run determinism context.
//
// All global knobs (seed, deterministic flag) are resolved exactly once by
// the driver and handed to components by value. Components never read the
// environment themselves.

/// Environment variable that forces the price-only data path.
pub const DETERMINISTIC_MODE_ENV: &str = "DETERMINISTIC_MODE";

/// Default seed recorded in the summary's determinism block.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    /// Fixed seed for any stochastic component. The core pipeline is fully
    /// rule-based; the seed is carried so the determinism block in the
    /// summary identifies the run configuration.
    pub seed: u64,
    /// When set, every excluded data source returns its canonical fallback
    /// and analysts must produce price-only signals.
    pub deterministic: bool,
}

impl RunContext {
    /// Resolve the context once, at driver start. The deterministic flag
    /// comes from `DETERMINISTIC_MODE` unless the caller already decided.
    pub fn initialize(seed: u64, force_deterministic: bool) -> Self {
        Self {
            seed,
            deterministic: force_deterministic || deterministic_mode_from_env(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            deterministic: true,
        }
    }
}

/// Truthy values: "1", "true", "yes" (case-insensitive).
pub fn deterministic_mode_from_env() -> bool {
    match std::env::var(DETERMINISTIC_MODE_ENV) {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes"
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_flag_wins_over_env() {
        let ctx = RunContext::initialize(7, true);
        assert!(ctx.deterministic);
        assert_eq!(ctx.seed, 7);
    }

    #[test]
    fn default_context_is_deterministic() {
        let ctx = RunContext::default();
        assert!(ctx.deterministic);
        assert_eq!(ctx.seed, DEFAULT_SEED);
    }
}
