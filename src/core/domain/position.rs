//! Positions: net exposure per market per environment. Overwritten wholesale
//! by reconciliation; updated incrementally by fill events in between runs.

use super::environment::Environment;
use super::id::MarketTicker;

#[derive(Debug, Clone)]
pub struct Position {
    market_ticker: MarketTicker,
    environment: Environment,
    yes_count: i64,
    no_count: i64,
    average_yes_price: u8,
    average_no_price: u8,
    realized_pnl_cents: i64,
    unrealized_pnl_cents: i64,
    last_updated_ms: i64,
}

impl Position {
    #[must_use]
    pub const fn new(market_ticker: MarketTicker, environment: Environment, now_ms: i64) -> Self {
        Self {
            market_ticker,
            environment,
            yes_count: 0,
            no_count: 0,
            average_yes_price: 0,
            average_no_price: 0,
            realized_pnl_cents: 0,
            unrealized_pnl_cents: 0,
            last_updated_ms: now_ms,
        }
    }

    #[must_use]
    pub const fn market_ticker(&self) -> &MarketTicker {
        &self.market_ticker
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub const fn yes_count(&self) -> i64 {
        self.yes_count
    }

    #[must_use]
    pub const fn no_count(&self) -> i64 {
        self.no_count
    }

    #[must_use]
    pub const fn average_yes_price(&self) -> u8 {
        self.average_yes_price
    }

    #[must_use]
    pub const fn average_no_price(&self) -> u8 {
        self.average_no_price
    }

    #[must_use]
    pub const fn realized_pnl_cents(&self) -> i64 {
        self.realized_pnl_cents
    }

    #[must_use]
    pub const fn unrealized_pnl_cents(&self) -> i64 {
        self.unrealized_pnl_cents
    }

    #[must_use]
    pub const fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    /// Overwrite every field wholesale, as reconciliation does after
    /// fetching `/portfolio/positions`.
    #[allow(clippy::too_many_arguments)]
    pub fn overwrite(
        &mut self,
        yes_count: i64,
        no_count: i64,
        average_yes_price: u8,
        average_no_price: u8,
        realized_pnl_cents: i64,
        unrealized_pnl_cents: i64,
        now_ms: i64,
    ) {
        self.yes_count = yes_count;
        self.no_count = no_count;
        self.average_yes_price = average_yes_price;
        self.average_no_price = average_no_price;
        self.realized_pnl_cents = realized_pnl_cents;
        self.unrealized_pnl_cents = unrealized_pnl_cents;
        self.last_updated_ms = now_ms;
    }

    /// Incrementally fold a fill into this position between reconciliation
    /// runs: updates the relevant side's count and volume-weighted average
    /// price.
    pub fn apply_fill(&mut self, side_is_yes: bool, delta_count: i64, price: u8, now_ms: i64) {
        let (count, avg) = if side_is_yes {
            (&mut self.yes_count, &mut self.average_yes_price)
        } else {
            (&mut self.no_count, &mut self.average_no_price)
        };
        let prior = *count;
        let new_total = prior + delta_count;
        if new_total > 0 && delta_count > 0 {
            let weighted =
                (prior.max(0) as i128) * i128::from(*avg) + i128::from(delta_count) * i128::from(price);
            *avg = (weighted / i128::from(new_total)).clamp(0, 100) as u8;
        }
        *count = new_total;
        self.last_updated_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_fill_updates_weighted_average_price() {
        let mut p = Position::new(MarketTicker::from("BTC-X"), Environment::Demo, 0);
        p.apply_fill(true, 2, 40, 10);
        p.apply_fill(true, 2, 60, 20);
        assert_eq!(p.yes_count(), 4);
        assert_eq!(p.average_yes_price(), 50);
    }

    #[test]
    fn overwrite_replaces_every_field() {
        let mut p = Position::new(MarketTicker::from("BTC-X"), Environment::Demo, 0);
        p.apply_fill(true, 1, 40, 10);
        p.overwrite(5, 3, 42, 58, 100, -20, 99);
        assert_eq!(p.yes_count(), 5);
        assert_eq!(p.no_count(), 3);
        assert_eq!(p.realized_pnl_cents(), 100);
        assert_eq!(p.last_updated_ms(), 99);
    }
}
