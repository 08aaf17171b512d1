// End-to-end scenarios: graph → sizing → constraints → execution → summary.

mod helpers;

use helpers::{date, flat_then_trend, Fixture};

use bluechip::agents::state::TradeAction;
use bluechip::backtesting::RunOutcome;

/// A single day, a single ticker, no usable signals: everything holds and
/// NAV is untouched.
#[test]
fn single_day_single_ticker_hold() {
    // 2024-02-01 is a Thursday.
    let d0 = date(2024, 2, 1);
    let fixture = Fixture::new(&[("XCORP", vec![100.0])], d0);
    let report = fixture.run(fixture.config(d0, d0, 10_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.daily.len(), 1);
    let row = &report.daily[0];
    assert_eq!(row.date, d0);
    assert_eq!(row.portfolio_value, 10_000.0);
    assert!(row.executed.is_empty());
    let decision = &row.decisions["XCORP"];
    assert_eq!(decision.action, TradeAction::Hold);
    assert_eq!(decision.quantity, 0);
    assert_eq!(report.summary.final_value, 10_000.0);
    assert_eq!(report.summary.total_trades, 0);
}

/// Momentum is the only analyst with enough history: +6% over 20 days
/// drives a buy sized by the risk budget, and NAV moves only by the
/// transaction costs.
#[test]
fn momentum_bullish_runs_the_full_pipeline() {
    let d0 = date(2024, 2, 1);
    // 5 flat bars + 20 climbing bars: momentum fires, everyone else
    // lacks the 50-bar window and stays neutral.
    let closes = flat_then_trend(5, 0.06);
    let fixture = Fixture::new(&[("XCORP", closes)], d0);
    let report = fixture.run(fixture.config(d0, d0, 10_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.daily.len(), 1);
    let row = &report.daily[0];

    let decision = &row.decisions["XCORP"];
    assert_eq!(decision.action, TradeAction::Buy);
    // Weighted confidence: momentum 80 at weight 0.15, four neutrals at 50.
    assert!((54..=56).contains(&decision.confidence), "confidence {}", decision.confidence);

    assert_eq!(row.executed.len(), 1);
    let trade = &row.executed[0];
    assert_eq!(trade.action, "buy");
    // Risk budget ≈ 1.1% of 10_000 at ~106/share → 1 share.
    assert_eq!(trade.quantity, 1);
    assert!(trade.costs > 0.0);

    // NAV change is exactly the friction paid.
    let expected = 10_000.0 - trade.costs;
    assert!(
        (row.portfolio_value - expected).abs() < 1e-6,
        "value {} vs expected {expected}",
        row.portfolio_value
    );
}

/// Two perfectly correlated names both go long: the allocator halves the
/// smaller exposure and says why.
#[test]
fn correlation_cap_halves_the_smaller_leg() {
    let d0 = date(2024, 2, 1);
    // Same shape as the momentum scenario, scaled to $10.6/share so the
    // risk budget sizes each leg at 10 shares.
    let closes: Vec<f64> = flat_then_trend(5, 0.06).iter().map(|c| c / 10.0).collect();
    let fixture = Fixture::new(&[("AAA", closes.clone()), ("BBB", closes)], d0);
    let report = fixture.run(fixture.config(d0, d0, 10_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    let row = &report.daily[0];

    let a = &row.decisions["AAA"];
    let b = &row.decisions["BBB"];
    assert_eq!(a.action, TradeAction::Buy);
    assert_eq!(b.action, TradeAction::Buy);
    // Equal exposures: the tie goes to the first name, which gets halved.
    assert_eq!(a.quantity * 2, b.quantity);
    assert!(
        a.reasoning.contains("high correlation"),
        "reasoning: {}",
        a.reasoning
    );
    assert!(a.reasoning.contains("with BBB"));
}

/// Business-day generation: a weekend-only range terminates cleanly with
/// an empty summary.
#[test]
fn weekend_only_range_is_a_clean_empty_run() {
    let fixture = Fixture::new(&[("XCORP", vec![100.0])], date(2024, 2, 2));
    // 2024-02-03/04 is a weekend.
    let report = fixture.run(fixture.config(date(2024, 2, 3), date(2024, 2, 4), 10_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert!(report.daily.is_empty());
    assert_eq!(report.summary.days, 0);
    assert_eq!(report.summary.final_value, 10_000.0);
}

/// Days before the first bar exists are skipped without a daily row; the
/// run picks up once data appears.
#[test]
fn days_without_any_price_are_skipped() {
    let last = date(2024, 2, 8);
    // Three bars: Feb 6, 7, 8.
    let fixture = Fixture::new(&[("XCORP", vec![100.0, 100.0, 100.0])], last);
    // Ask for Feb 1..8: the 1st, 2nd and 5th have no bar on or before them.
    let report = fixture.run(fixture.config(date(2024, 2, 1), last, 10_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.daily.len(), 3);
    assert_eq!(report.daily[0].date, date(2024, 2, 6));
}

/// A portfolio too small to buy a single share pre-fills the hold with
/// full confidence.
#[test]
fn no_capacity_prefills_a_confident_hold() {
    let d0 = date(2024, 2, 1);
    let fixture = Fixture::new(&[("XCORP", vec![100.0])], d0);
    // $50 of capital against a $100 share: no action has any capacity.
    let report = fixture.run(fixture.config(d0, d0, 50.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    let decision = &report.daily[0].decisions["XCORP"];
    assert_eq!(decision.action, TradeAction::Hold);
    assert_eq!(decision.confidence, 100);
    assert!(decision.reasoning.contains("No valid trade available"));
}

/// Every daily row keeps a full decision set and the analyst pipeline
/// never invents non-hold quantities for hold decisions.
#[test]
fn decision_sets_stay_well_formed_over_a_long_run() {
    let d0 = date(2024, 3, 1);
    let closes: Vec<f64> = (0..120)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 4.0 + i as f64 * 0.05)
        .collect();
    let fixture = Fixture::new(&[("AAA", closes.clone()), ("BBB", closes)], d0);
    let report = fixture.run(fixture.config(date(2024, 2, 1), d0, 50_000.0));

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert!(!report.daily.is_empty());
    for row in &report.daily {
        assert_eq!(row.decisions.len(), 2);
        for decision in row.decisions.values() {
            if decision.action == TradeAction::Hold {
                assert_eq!(decision.quantity, 0);
            }
            assert!(!decision.reasoning.is_empty());
            assert!(decision.confidence <= 100);
        }
    }
}
