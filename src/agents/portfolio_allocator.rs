// src/agents/portfolio_allocator.rs
//
// Portfolio-level constraint enforcement over the Portfolio Manager's
// decisions, in fixed order: gross/net exposure → sector caps → pairwise
// correlation. Projected exposures are recomputed between stages. The
// adjusted decisions become the authoritative order set.

use std::collections::BTreeMap;

use crate::agents::state::{
    ConstraintReport, CorrelatedPair, DayContext, SectorExposure, TradeAction, TradeDecision,
};
use crate::math::indicators;
use crate::portfolio::Portfolio;

const MAX_GROSS_EXPOSURE_PCT: f64 = 2.0;
const MAX_NET_EXPOSURE_PCT: f64 = 0.5;
const MAX_SECTOR_EXPOSURE_PCT: f64 = 0.30;
const MAX_CORRELATION: f64 = 0.70;

/// Projected per-ticker exposure after applying a decision to the current
/// position.
#[derive(Debug, Clone, Copy, Default)]
struct TickerExposure {
    long: f64,
    short: f64,
}

impl TickerExposure {
    fn net(&self) -> f64 {
        self.long - self.short
    }
}

#[derive(Debug, Default)]
struct ProjectedExposures {
    gross: f64,
    net: f64,
    by_ticker: BTreeMap<String, TickerExposure>,
}

pub struct PortfolioAllocator {
    sectors: BTreeMap<String, String>,
}

impl PortfolioAllocator {
    pub fn new(sectors: BTreeMap<String, String>) -> Self {
        Self { sectors }
    }

    /// Apply all three constraint stages in place and publish the
    /// constraint analysis.
    pub fn allocate(
        &self,
        ctx: &DayContext,
        decisions: &mut BTreeMap<String, TradeDecision>,
    ) -> ConstraintReport {
        let nav = ctx.nav().max(0.0);

        let initial = project(ctx.portfolio, decisions, ctx.current_prices);
        self.enforce_exposure_limits(nav, &initial, decisions);

        let after_exposure = project(ctx.portfolio, decisions, ctx.current_prices);
        let sector_exposures = self.sector_exposures(nav, &after_exposure);
        self.enforce_sector_limits(nav, &sector_exposures, decisions);

        let after_sector = project(ctx.portfolio, decisions, ctx.current_prices);
        let high_correlations = self.high_correlation_pairs(ctx, &after_sector);
        enforce_correlation_limits(&high_correlations, &after_sector, decisions);

        ConstraintReport {
            projected_gross: initial.gross,
            gross_limit: nav * MAX_GROSS_EXPOSURE_PCT,
            projected_net: initial.net,
            net_limit: nav * MAX_NET_EXPOSURE_PCT,
            sector_exposures,
            high_correlations,
        }
    }

    /// Stage 1: gross cap scales every non-hold decision; the net cap then
    /// trims only the excess side.
    fn enforce_exposure_limits(
        &self,
        nav: f64,
        projected: &ProjectedExposures,
        decisions: &mut BTreeMap<String, TradeDecision>,
    ) {
        let max_gross = nav * MAX_GROSS_EXPOSURE_PCT;
        if projected.gross > max_gross && projected.gross > 0.0 {
            let scale = max_gross / projected.gross;
            for decision in decisions.values_mut() {
                if decision.action != TradeAction::Hold {
                    decision.quantity = scale_quantity(decision.quantity, scale);
                    decision.reasoning.push_str(&format!(
                        " [Adjusted: gross exposure {:.0} > {max_gross:.0}]",
                        projected.gross
                    ));
                }
            }
        }

        let max_net = nav * MAX_NET_EXPOSURE_PCT;
        if projected.net.abs() > max_net && projected.net != 0.0 {
            let scale = max_net / projected.net.abs();
            // Positive excess trims the long side, negative the short side.
            let trimmed_action = if projected.net > 0.0 {
                TradeAction::Buy
            } else {
                TradeAction::Short
            };
            for decision in decisions.values_mut() {
                if decision.action == trimmed_action {
                    decision.quantity = scale_quantity(decision.quantity, scale);
                    decision.reasoning.push_str(&format!(
                        " [Adjusted: net exposure {:.0} > {max_net:.0}]",
                        projected.net
                    ));
                }
            }
        }
    }

    fn sector_exposures(
        &self,
        nav: f64,
        projected: &ProjectedExposures,
    ) -> BTreeMap<String, SectorExposure> {
        let mut sectors: BTreeMap<String, SectorExposure> = BTreeMap::new();
        for (ticker, exposure) in &projected.by_ticker {
            let sector = self
                .sectors
                .get(ticker)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            let entry = sectors.entry(sector).or_default();
            entry.exposure += exposure.net().abs();
            entry.tickers.push(ticker.clone());
        }
        for entry in sectors.values_mut() {
            entry.exposure_pct = if nav > 0.0 { entry.exposure / nav } else { 0.0 };
        }
        sectors
    }

    /// Stage 2: scale down every non-hold decision inside an over-cap sector.
    fn enforce_sector_limits(
        &self,
        nav: f64,
        sector_exposures: &BTreeMap<String, SectorExposure>,
        decisions: &mut BTreeMap<String, TradeDecision>,
    ) {
        let max_sector = nav * MAX_SECTOR_EXPOSURE_PCT;
        for (sector, data) in sector_exposures {
            if data.exposure_pct <= MAX_SECTOR_EXPOSURE_PCT || data.exposure <= 0.0 {
                continue;
            }
            let scale = max_sector / data.exposure;
            for ticker in &data.tickers {
                if let Some(decision) = decisions.get_mut(ticker) {
                    if decision.action != TradeAction::Hold {
                        decision.quantity = scale_quantity(decision.quantity, scale);
                        decision.reasoning.push_str(&format!(
                            " [Adjusted: sector {sector} {:.1}% > {:.1}%]",
                            data.exposure_pct * 100.0,
                            MAX_SECTOR_EXPOSURE_PCT * 100.0
                        ));
                    }
                }
            }
        }
    }

    /// Pairs of exposed tickers whose daily-return correlation over the
    /// lookback window breaches the cap.
    fn high_correlation_pairs(
        &self,
        ctx: &DayContext,
        projected: &ProjectedExposures,
    ) -> Vec<CorrelatedPair> {
        let mut returns_by_ticker: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for ticker in ctx.tickers {
            if let Ok(closes) = ctx.prices.closes(ticker, ctx.lookback_start, ctx.date) {
                let returns = indicators::daily_returns(&closes);
                if !returns.is_empty() {
                    returns_by_ticker.insert(ticker.clone(), returns);
                }
            }
        }

        let tickers: Vec<&String> = returns_by_ticker.keys().collect();
        let mut pairs = Vec::new();
        for i in 0..tickers.len() {
            for j in (i + 1)..tickers.len() {
                let (a, b) = (tickers[i], tickers[j]);
                let exposed = |t: &String| {
                    projected
                        .by_ticker
                        .get(t)
                        .map(|e| e.net().abs() > 0.0)
                        .unwrap_or(false)
                };
                if !exposed(a) || !exposed(b) {
                    continue;
                }
                if let Some(rho) =
                    indicators::correlation(&returns_by_ticker[a], &returns_by_ticker[b])
                {
                    if rho.abs() > MAX_CORRELATION {
                        pairs.push(CorrelatedPair {
                            first: a.clone(),
                            second: b.clone(),
                            correlation: rho,
                        });
                    }
                }
            }
        }
        pairs
    }
}

/// Stage 3: halve the smaller-exposure member of each flagged pair.
fn enforce_correlation_limits(
    pairs: &[CorrelatedPair],
    projected: &ProjectedExposures,
    decisions: &mut BTreeMap<String, TradeDecision>,
) {
    for pair in pairs {
        let exp_a = projected
            .by_ticker
            .get(&pair.first)
            .map(|e| e.net().abs())
            .unwrap_or(0.0);
        let exp_b = projected
            .by_ticker
            .get(&pair.second)
            .map(|e| e.net().abs())
            .unwrap_or(0.0);
        if exp_a <= 0.0 || exp_b <= 0.0 {
            continue;
        }

        let (trim, other) = if exp_a <= exp_b {
            (&pair.first, &pair.second)
        } else {
            (&pair.second, &pair.first)
        };
        if let Some(decision) = decisions.get_mut(trim) {
            if decision.action != TradeAction::Hold {
                decision.quantity = scale_quantity(decision.quantity, 0.5);
                decision.reasoning.push_str(&format!(
                    " [Adjusted: high correlation {:.2} with {other}]",
                    pair.correlation
                ));
            }
        }
    }
}

/// Project exposures after applying the decisions to current holdings.
fn project(
    portfolio: &Portfolio,
    decisions: &BTreeMap<String, TradeDecision>,
    prices: &BTreeMap<String, f64>,
) -> ProjectedExposures {
    let mut out = ProjectedExposures::default();
    for (ticker, &price) in prices {
        if price <= 0.0 {
            continue;
        }
        let pos = portfolio.position(ticker);
        let mut long = pos.long;
        let mut short = pos.short;
        if let Some(decision) = decisions.get(ticker) {
            match decision.action {
                TradeAction::Buy => long += decision.quantity,
                TradeAction::Sell => long = long.saturating_sub(decision.quantity),
                TradeAction::Short => short += decision.quantity,
                TradeAction::Cover => short = short.saturating_sub(decision.quantity),
                TradeAction::Hold => {}
            }
        }
        let exposure = TickerExposure {
            long: long as f64 * price,
            short: short as f64 * price,
        };
        out.gross += exposure.long + exposure.short;
        out.net += exposure.net();
        out.by_ticker.insert(ticker.clone(), exposure);
    }
    out
}

fn scale_quantity(quantity: u32, scale: f64) -> u32 {
    (quantity as f64 * scale.clamp(0.0, 1.0)).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: TradeAction, quantity: u32) -> TradeDecision {
        TradeDecision {
            action,
            quantity,
            confidence: 60,
            reasoning: "test".to_string(),
        }
    }

    fn prices(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn projection_applies_decisions_to_holdings() {
        let mut portfolio = Portfolio::new(10_000.0, 0.5, &["A".to_string(), "B".to_string()]);
        portfolio.position_mut("A").long = 10;
        let mut decisions = BTreeMap::new();
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 5));
        decisions.insert("B".to_string(), decision(TradeAction::Short, 20));
        let px = prices(&[("A", 100.0), ("B", 50.0)]);

        let projected = project(&portfolio, &decisions, &px);
        assert_eq!(projected.by_ticker["A"].long, 1_500.0);
        assert_eq!(projected.by_ticker["B"].short, 1_000.0);
        assert_eq!(projected.gross, 2_500.0);
        assert_eq!(projected.net, 500.0);
    }

    #[test]
    fn gross_cap_scales_all_non_hold_decisions() {
        let allocator = PortfolioAllocator::new(BTreeMap::new());
        let portfolio = Portfolio::new(1_000.0, 0.0, &["A".to_string(), "B".to_string()]);
        let px = prices(&[("A", 100.0), ("B", 100.0)]);
        let mut decisions = BTreeMap::new();
        // Projected gross 4_000 vs limit 2·NAV = 2_000 → halve everything.
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 20));
        decisions.insert("B".to_string(), decision(TradeAction::Short, 20));

        let ctx_nav = portfolio.nav(&px);
        let projected = project(&portfolio, &decisions, &px);
        allocator.enforce_exposure_limits(ctx_nav, &projected, &mut decisions);

        assert_eq!(decisions["A"].quantity, 10);
        assert!(decisions["A"].reasoning.contains("gross exposure"));
        // Net was 0, so no second-stage trim.
        assert_eq!(decisions["B"].quantity, 10);
    }

    #[test]
    fn net_cap_trims_only_the_excess_side() {
        let allocator = PortfolioAllocator::new(BTreeMap::new());
        let portfolio = Portfolio::new(10_000.0, 0.0, &["A".to_string(), "B".to_string()]);
        let px = prices(&[("A", 100.0), ("B", 100.0)]);
        let mut decisions = BTreeMap::new();
        // Long 80, short 10 → net 7_000 > 0.5·NAV = 5_000. Gross 9_000 is fine.
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 80));
        decisions.insert("B".to_string(), decision(TradeAction::Short, 10));

        let projected = project(&portfolio, &decisions, &px);
        allocator.enforce_exposure_limits(portfolio.nav(&px), &projected, &mut decisions);

        assert!(decisions["A"].quantity < 80);
        assert!(decisions["A"].reasoning.contains("net exposure"));
        assert_eq!(decisions["B"].quantity, 10, "short side untouched for positive excess");
    }

    #[test]
    fn sector_cap_scales_the_crowded_sector() {
        let mut sectors = BTreeMap::new();
        sectors.insert("A".to_string(), "Technology".to_string());
        sectors.insert("B".to_string(), "Technology".to_string());
        sectors.insert("C".to_string(), "Energy".to_string());
        let allocator = PortfolioAllocator::new(sectors);

        let tickers = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let portfolio = Portfolio::new(10_000.0, 0.0, &tickers);
        let px = prices(&[("A", 100.0), ("B", 100.0), ("C", 100.0)]);
        let mut decisions = BTreeMap::new();
        // Technology projected at 4_000 = 40% of NAV > 30% cap.
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 20));
        decisions.insert("B".to_string(), decision(TradeAction::Buy, 20));
        decisions.insert("C".to_string(), decision(TradeAction::Buy, 10));

        let projected = project(&portfolio, &decisions, &px);
        let nav = portfolio.nav(&px);
        let sector_exposures = allocator.sector_exposures(nav, &projected);
        assert!(sector_exposures["Technology"].exposure_pct > MAX_SECTOR_EXPOSURE_PCT);

        allocator.enforce_sector_limits(nav, &sector_exposures, &mut decisions);
        assert_eq!(decisions["A"].quantity, 15);
        assert_eq!(decisions["B"].quantity, 15);
        assert!(decisions["A"].reasoning.contains("sector Technology"));
        assert_eq!(decisions["C"].quantity, 10, "other sector untouched");
    }

    #[test]
    fn correlation_halves_the_smaller_side() {
        let portfolio = Portfolio::new(10_000.0, 0.0, &["A".to_string(), "B".to_string()]);
        let px = prices(&[("A", 100.0), ("B", 100.0)]);
        let mut decisions = BTreeMap::new();
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 10));
        decisions.insert("B".to_string(), decision(TradeAction::Buy, 8));
        let projected = project(&portfolio, &decisions, &px);

        let pairs = vec![CorrelatedPair {
            first: "A".to_string(),
            second: "B".to_string(),
            correlation: 0.85,
        }];
        enforce_correlation_limits(&pairs, &projected, &mut decisions);

        assert_eq!(decisions["A"].quantity, 10);
        assert_eq!(decisions["B"].quantity, 4);
        assert!(decisions["B"].reasoning.contains("0.85"));
        assert!(decisions["B"].reasoning.contains("with A"));
    }

    #[test]
    fn within_limits_nothing_changes() {
        let allocator = PortfolioAllocator::new(BTreeMap::new());
        let portfolio = Portfolio::new(10_000.0, 0.0, &["A".to_string()]);
        let px = prices(&[("A", 100.0)]);
        let mut decisions = BTreeMap::new();
        decisions.insert("A".to_string(), decision(TradeAction::Buy, 10));

        let projected = project(&portfolio, &decisions, &px);
        allocator.enforce_exposure_limits(portfolio.nav(&px), &projected, &mut decisions);
        assert_eq!(decisions["A"].quantity, 10);
        assert_eq!(decisions["A"].reasoning, "test");
    }
}
