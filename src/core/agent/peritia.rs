//! AgentPeritia: BTC 15-minute orderbook-imbalance specialist. Scans every
//! open market whose ticker, series or event identifies it as a recurring
//! BTC 15-minute contract, computes `(yes_depth - no_depth) / total_depth`
//! from the resting book (falling back to top-of-book size when no book
//! has been seen yet), and buys into whichever side is heavier once the
//! imbalance clears 15%. A 5-second per-market cooldown keeps it from
//! re-firing on every tick of a fast-moving book. Carried from
//! `agents/peritia.py`, not reworked.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::agent::{AgentContext, Strategy};
use crate::core::domain::{Action, MarketState, MarketStatus, OrderType, Side, TradeIntent};

const IMBALANCE_THRESHOLD: f64 = 0.15;
const DEFAULT_COUNT: u32 = 1;
const COOLDOWN_MS: i64 = 5_000;

const BTC_KEYWORDS: [&str; 2] = ["BTC", "BITCOIN"];
const FREQ_KEYWORDS: [&str; 3] = ["15", "15MIN", "15M"];

fn is_btc_15min(state: &MarketState) -> bool {
    let ticker = state.market_ticker().as_str().to_uppercase();
    let series = state.series_ticker().as_str().to_uppercase();
    let event = state.event_ticker().as_str().to_uppercase();

    let has_btc = BTC_KEYWORDS
        .iter()
        .any(|kw| ticker.contains(kw) || series.contains(kw) || event.contains(kw));
    let has_15m = FREQ_KEYWORDS
        .iter()
        .any(|kw| ticker.contains(kw) || series.contains(kw) || event.contains(kw));
    has_btc && has_15m
}

fn compute_imbalance(state: &MarketState) -> Option<f64> {
    let (yes_depth, no_depth) = match state.orderbook() {
        Some(book) => {
            let yes: u64 = book.yes.levels().map(|(_, qty)| u64::from(qty)).sum();
            let no: u64 = book.no.levels().map(|(_, qty)| u64::from(qty)).sum();
            (yes, no)
        }
        None => (u64::from(state.yes_bid()), u64::from(state.no_bid())),
    };
    let total = yes_depth + no_depth;
    if total == 0 {
        return None;
    }
    Some((yes_depth as f64 - no_depth as f64) / total as f64)
}

fn clamp_price(bid: u8) -> u8 {
    let raised = if bid < 98 { bid + 1 } else { bid };
    raised.clamp(1, 99)
}

/// BTC 15-min orderbook imbalance specialist. The cooldown map is keyed by
/// ticker string rather than `MarketTicker` to avoid pulling the domain
/// type into a `Mutex<HashMap>` key position for no benefit.
pub struct AgentPeritia {
    last_order_ms: Mutex<HashMap<String, i64>>,
}

impl AgentPeritia {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_order_ms: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for AgentPeritia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for AgentPeritia {
    async fn on_market_update(&self, ctx: &AgentContext) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        for state in ctx.cache.get_all() {
            if state.status() != MarketStatus::Open {
                continue;
            }
            if !is_btc_15min(&state) {
                continue;
            }
            self.evaluate_market(ctx, &state, now_ms).await;
        }
    }
}

impl AgentPeritia {
    async fn evaluate_market(&self, ctx: &AgentContext, state: &MarketState, now_ms: i64) {
        let ticker = state.market_ticker().as_str().to_string();
        {
            let guard = self.last_order_ms.lock();
            let last = *guard.get(&ticker).unwrap_or(&0);
            if now_ms - last < COOLDOWN_MS {
                return;
            }
        }

        let Some(imbalance) = compute_imbalance(state) else {
            return;
        };
        let abs_imbalance = imbalance.abs();
        if abs_imbalance < IMBALANCE_THRESHOLD {
            return;
        }
        let confidence = abs_imbalance.min(1.0);

        let (side, price) = if imbalance > 0.0 {
            (Side::Yes, clamp_price(state.yes_bid()))
        } else {
            (Side::No, clamp_price(state.no_bid()))
        };

        self.last_order_ms.lock().insert(ticker, now_ms);

        let side_label = if side == Side::Yes { "yes" } else { "no" };
        ctx.broadcast_decision(state.market_ticker(), side_label, price, confidence);

        let intent = TradeIntent::new(
            ctx.agent_id,
            state.market_ticker().clone(),
            Action::Buy,
            side,
            OrderType::Limit,
            price,
            DEFAULT_COUNT,
            confidence,
            now_ms,
        );
        ctx.submit(intent).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{EventTicker, MarketTicker, SeriesTicker};

    fn market(ticker: &str, series: &str, event: &str) -> MarketState {
        MarketState::new(
            MarketTicker::from(ticker),
            EventTicker::from(event),
            SeriesTicker::from(series),
            MarketStatus::Open,
            0,
        )
    }

    #[test]
    fn identifies_btc_15min_markets_by_ticker_or_series() {
        assert!(is_btc_15min(&market("KXBTC15M-24DEC31", "", "")));
        assert!(is_btc_15min(&market("X", "BTC-15MIN-SERIES", "")));
        assert!(!is_btc_15min(&market("KXETH15M", "", "")));
        assert!(!is_btc_15min(&market("KXBTC-1H", "", "")));
    }

    #[test]
    fn imbalance_falls_back_to_top_of_book_without_a_full_orderbook() {
        let mut state = market("KXBTC15M", "", "");
        state.apply_ticker_update(70, 30, 70, 0, 0, 0);
        let imbalance = compute_imbalance(&state).expect("some imbalance");
        assert!(imbalance > 0.0);
    }

    #[test]
    fn no_depth_at_all_yields_no_signal() {
        let state = market("KXBTC15M", "", "");
        assert_eq!(compute_imbalance(&state), None);
    }

    #[test]
    fn clamp_price_stays_in_bounds() {
        assert_eq!(clamp_price(99), 99);
        assert_eq!(clamp_price(97), 98);
    }
}
