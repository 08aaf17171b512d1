// Trade execution against the portfolio, under strict capital and leverage
// constraints. The executor is the only writer of portfolio state.
//
// Pre-trade gates, in order:
//   1. NAV must be positive.
//   2. NAV ≤ 50% of initial capital blocks opening a new position (a
//      buy/short whose side is currently flat); adds and closes still pass.
//   3. Post-trade gross exposure must stay within 100% of NAV.
//   4. Post-trade single-ticker exposure must stay within 20% of NAV.
// A gated trade executes with quantity 0. Anything that would leave NAV
// negative must have been rejected here; if it slips through, the post-trade
// check raises an engine failure.

use std::collections::BTreeMap;

use crate::agents::state::TradeAction;
use crate::errors::EngineError;
use crate::portfolio::Portfolio;

/// Per-trade friction applied to cash on both open and close. Costs are
/// excluded from cost basis; they reach realized P&L through the cash leg.
#[derive(Debug, Clone)]
pub struct TradingCosts {
    /// Flat commission per share, both sides.
    pub commission_per_share: f64,
    /// Slippage in basis points of trade value.
    pub slippage_bps: f64,
    /// Half-spread in basis points of trade value.
    pub spread_bps: f64,
}

impl Default for TradingCosts {
    fn default() -> Self {
        Self {
            commission_per_share: 0.01,
            slippage_bps: 5.0,
            spread_bps: 3.0,
        }
    }
}

impl TradingCosts {
    pub fn zero() -> Self {
        Self {
            commission_per_share: 0.0,
            slippage_bps: 0.0,
            spread_bps: 0.0,
        }
    }

    /// Total friction for `quantity` shares at `price`.
    pub fn total(&self, quantity: u32, price: f64) -> f64 {
        let value = quantity as f64 * price;
        quantity as f64 * self.commission_per_share
            + value * (self.slippage_bps + self.spread_bps) / 10_000.0
    }

    /// Cash needed per share to buy, friction included.
    fn per_share_buy_cost(&self, price: f64) -> f64 {
        price * (1.0 + (self.slippage_bps + self.spread_bps) / 10_000.0) + self.commission_per_share
    }
}

/// Outcome of one execution. `quantity` is what actually filled (0 when a
/// gate rejected the trade).
#[derive(Debug, Clone, Copy, Default)]
pub struct Execution {
    pub quantity: u32,
    pub realized_pnl: f64,
    pub costs: f64,
}

/// One forced-liquidation fill, for the terminal log.
#[derive(Debug, Clone)]
pub struct LiquidationFill {
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: u32,
    pub price: f64,
    pub realized_pnl: f64,
}

pub struct TradeExecutor {
    costs: TradingCosts,
    max_gross_pct: f64,
    max_position_pct: f64,
    min_capital_pct: f64,
}

impl Default for TradeExecutor {
    fn default() -> Self {
        Self::new(TradingCosts::default())
    }
}

impl TradeExecutor {
    pub fn new(costs: TradingCosts) -> Self {
        Self {
            costs,
            max_gross_pct: 1.0,
            max_position_pct: 0.20,
            min_capital_pct: 0.5,
        }
    }

    /// Execute one order. Returns the filled quantity (possibly clamped,
    /// possibly zero). Errors only on a broken invariant.
    pub fn execute(
        &self,
        ticker: &str,
        action: TradeAction,
        requested: u32,
        price: f64,
        portfolio: &mut Portfolio,
        prices: &BTreeMap<String, f64>,
    ) -> Result<Execution, EngineError> {
        if requested == 0 || price <= 0.0 || matches!(action, TradeAction::Hold) {
            return Ok(Execution::default());
        }

        let nav = portfolio.nav(prices);
        if nav <= 0.0 {
            log::warn!("{ticker}: trade rejected, NAV ${nav:.2} requires liquidation");
            return Ok(Execution::default());
        }
        // A buy/short only counts as a new position when that side of the
        // ticker is currently flat; adding to an existing side passes.
        let opens_new_position = match action {
            TradeAction::Buy => portfolio.position(ticker).long == 0,
            TradeAction::Short => portfolio.position(ticker).short == 0,
            _ => false,
        };
        if opens_new_position && nav <= self.min_capital_pct * portfolio.initial_capital {
            log::warn!(
                "{ticker}: new {} position rejected, NAV ${nav:.2} at or below {:.0}% of initial capital",
                action.as_str(),
                self.min_capital_pct * 100.0
            );
            return Ok(Execution::default());
        }

        let quantity = self.clamp_to_capacity(action, requested, price, ticker, portfolio);
        if quantity == 0 {
            return Ok(Execution::default());
        }

        let trade_value = quantity as f64 * price;
        let costs = self.costs.total(quantity, price);

        // Post-trade estimates assume no same-instant price move: only the
        // friction leaves NAV.
        let post_nav = nav - costs;
        if post_nav <= 0.0 {
            return Ok(Execution::default());
        }
        let current_gross = portfolio.gross_exposure(prices);
        let post_gross = if action.opens_position() {
            current_gross + trade_value
        } else {
            (current_gross - trade_value).max(0.0)
        };
        if action.opens_position() && post_gross > self.max_gross_pct * post_nav {
            log::warn!(
                "{ticker}: {} rejected, projected gross ${post_gross:.0} exceeds {:.0}% of NAV",
                action.as_str(),
                self.max_gross_pct * 100.0
            );
            return Ok(Execution::default());
        }
        if action.opens_position() {
            let post_position = portfolio.ticker_exposure(ticker, price) + trade_value;
            if post_position > self.max_position_pct * post_nav {
                log::warn!(
                    "{ticker}: {} rejected, projected position ${post_position:.0} exceeds {:.0}% of NAV",
                    action.as_str(),
                    self.max_position_pct * 100.0
                );
                return Ok(Execution::default());
            }
        }

        let realized_pnl = self.apply(ticker, action, quantity, price, costs, portfolio);

        let nav_after = portfolio.nav(prices);
        if nav_after < 0.0 {
            return Err(EngineError::NegativeNav {
                ticker: ticker.to_string(),
                action: action.as_str(),
                nav: nav_after,
            });
        }

        Ok(Execution {
            quantity,
            realized_pnl,
            costs,
        })
    }

    /// Close every open position at market, bypassing the constraint gates.
    /// Only called when NAV ≤ 0 forces the run to terminate.
    pub fn liquidate_all(
        &self,
        portfolio: &mut Portfolio,
        prices: &BTreeMap<String, f64>,
    ) -> Vec<LiquidationFill> {
        let tickers: Vec<String> = portfolio.positions.keys().cloned().collect();
        let mut fills = Vec::new();

        for ticker in tickers {
            let Some(&price) = prices.get(&ticker) else {
                continue;
            };
            let pos = portfolio.position(&ticker);

            if pos.long > 0 {
                let quantity = pos.long;
                let costs = self.costs.total(quantity, price);
                let realized_pnl = self.apply(&ticker, TradeAction::Sell, quantity, price, costs, portfolio);
                fills.push(LiquidationFill {
                    ticker: ticker.clone(),
                    action: TradeAction::Sell,
                    quantity,
                    price,
                    realized_pnl,
                });
            }
            let pos = portfolio.position(&ticker);
            if pos.short > 0 {
                let quantity = pos.short;
                let costs = self.costs.total(quantity, price);
                let realized_pnl = self.apply(&ticker, TradeAction::Cover, quantity, price, costs, portfolio);
                fills.push(LiquidationFill {
                    ticker: ticker.clone(),
                    action: TradeAction::Cover,
                    quantity,
                    price,
                    realized_pnl,
                });
            }
        }

        fills
    }

    /// Largest quantity the portfolio can actually carry for this action.
    fn clamp_to_capacity(
        &self,
        action: TradeAction,
        requested: u32,
        price: f64,
        ticker: &str,
        portfolio: &Portfolio,
    ) -> u32 {
        let pos = portfolio.position(ticker);
        match action {
            TradeAction::Buy => {
                let per_share = self.costs.per_share_buy_cost(price);
                let affordable = (portfolio.cash / per_share).floor().max(0.0) as u32;
                requested.min(affordable)
            }
            TradeAction::Sell => requested.min(pos.long),
            TradeAction::Short => {
                if portfolio.margin_requirement <= 0.0 {
                    return requested;
                }
                // Margin plus friction must be covered by cash up front; the
                // sale proceeds arrive in the same breath but collateral is
                // reserved from what we already hold.
                let per_share = price * portfolio.margin_requirement
                    + price * (self.costs.slippage_bps + self.costs.spread_bps) / 10_000.0
                    + self.costs.commission_per_share;
                let affordable = (portfolio.cash / per_share).floor().max(0.0) as u32;
                requested.min(affordable)
            }
            TradeAction::Cover => {
                let quantity = requested.min(pos.short);
                if quantity == 0 {
                    return 0;
                }
                let margin_per_share = if pos.short > 0 {
                    pos.short_margin_used / pos.short as f64
                } else {
                    0.0
                };
                let per_share_net = self.costs.per_share_buy_cost(price) - margin_per_share;
                if per_share_net <= 0.0 {
                    quantity
                } else {
                    quantity.min((portfolio.cash / per_share_net).floor().max(0.0) as u32)
                }
            }
            TradeAction::Hold => 0,
        }
    }

    /// Mutate the portfolio for an already-gated trade. Returns realized P&L
    /// (zero for opens).
    fn apply(
        &self,
        ticker: &str,
        action: TradeAction,
        quantity: u32,
        price: f64,
        costs: f64,
        portfolio: &mut Portfolio,
    ) -> f64 {
        let trade_value = quantity as f64 * price;
        match action {
            TradeAction::Buy => {
                let pos = portfolio.position_mut(ticker);
                let old_value = pos.long_cost_basis * pos.long as f64;
                pos.long += quantity;
                pos.long_cost_basis = (old_value + trade_value) / pos.long as f64;
                portfolio.cash -= trade_value + costs;
                0.0
            }
            TradeAction::Sell => {
                let pos = portfolio.position_mut(ticker);
                let pnl = (price - pos.long_cost_basis) * quantity as f64;
                pos.long -= quantity;
                if pos.long == 0 {
                    pos.long_cost_basis = 0.0;
                }
                portfolio.cash += trade_value - costs;
                portfolio.gains_mut(ticker).long += pnl;
                pnl
            }
            TradeAction::Short => {
                let margin = trade_value * portfolio.margin_requirement;
                let pos = portfolio.position_mut(ticker);
                let old_value = pos.short_cost_basis * pos.short as f64;
                pos.short += quantity;
                pos.short_cost_basis = (old_value + trade_value) / pos.short as f64;
                pos.short_margin_used += margin;
                portfolio.cash += trade_value - margin - costs;
                portfolio.margin_used += margin;
                0.0
            }
            TradeAction::Cover => {
                let pos = portfolio.position_mut(ticker);
                let pnl = (pos.short_cost_basis - price) * quantity as f64;
                let margin_returned = if pos.short > 0 {
                    pos.short_margin_used / pos.short as f64 * quantity as f64
                } else {
                    0.0
                };
                pos.short -= quantity;
                pos.short_margin_used -= margin_returned;
                if pos.short == 0 {
                    pos.short_cost_basis = 0.0;
                    pos.short_margin_used = 0.0;
                }
                portfolio.cash += margin_returned - trade_value - costs;
                portfolio.margin_used -= margin_returned;
                portfolio.gains_mut(ticker).short += pnl;
                pnl
            }
            TradeAction::Hold => 0.0,
        }
    }
}
