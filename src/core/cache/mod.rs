//! The local market cache: single source of truth for every subscribed
//! market's state. Written exclusively by the WebSocket dispatcher;
//! agents and the Control API facade only read from it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::core::domain::{
    EventTicker, MarketOrderbook, MarketState, MarketStatus, MarketTicker, OrderbookLevel,
    RecentTrade, SeriesTicker,
};
use crate::core::kalshi::messages::{OrderbookDeltaMsg, TickerMsg, TradeMsg};

/// Thread-safe in-memory cache of [`MarketState`], keyed by ticker.
///
/// `notify` is woken on every write. A single long-lived waiter (each
/// agent's loop) calls `notified()`, wakes, and reads a full snapshot;
/// any updates that land between the wake-up and the next `notified()`
/// call coalesce into that same pass rather than queuing separately —
/// this is intentional, not a missed-wakeup bug.
pub struct MarketCache {
    inner: RwLock<HashMap<String, MarketState>>,
    notify: Notify,
}

impl MarketCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn as_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ── Reads ────────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, ticker: &str) -> Option<MarketState> {
        self.inner.read().get(ticker).cloned()
    }

    #[must_use]
    pub fn get_all(&self) -> Vec<MarketState> {
        self.inner.read().values().cloned().collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.read().len()
    }

    /// Wait for the next write. Resolves immediately if a write happened
    /// since the last call to `notified` that was polled to completion.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    fn wake(&self) {
        self.notify.notify_one();
    }

    // ── Writes (WebSocket dispatcher only) ──────────────────────────

    pub fn upsert_from_ticker(&self, msg: &TickerMsg) {
        let mut guard = self.inner.write();
        match guard.get_mut(&msg.market_ticker) {
            Some(state) => {
                state.apply_ticker_update(
                    msg.yes_bid,
                    msg.no_bid,
                    msg.price,
                    msg.volume,
                    msg.open_interest,
                    msg.ts,
                );
            }
            None => {
                let mut state = MarketState::new(
                    MarketTicker::from(msg.market_ticker.as_str()),
                    EventTicker::from(""),
                    SeriesTicker::from(""),
                    MarketStatus::Open,
                    msg.ts,
                );
                state.apply_ticker_update(
                    msg.yes_bid,
                    msg.no_bid,
                    msg.price,
                    msg.volume,
                    msg.open_interest,
                    msg.ts,
                );
                guard.insert(msg.market_ticker.clone(), state);
            }
        }
        drop(guard);
        self.wake();
    }

    /// Create or refresh metadata from a `/markets` discovery row. Never
    /// overwrites live price fields that a WS update already set.
    pub fn upsert_from_discovery(
        &self,
        ticker: &str,
        event_ticker: &str,
        series_ticker: &str,
        status: MarketStatus,
        now_ms: i64,
    ) {
        let mut guard = self.inner.write();
        match guard.get_mut(ticker) {
            Some(state) => state.refresh_metadata(
                EventTicker::from(event_ticker),
                SeriesTicker::from(series_ticker),
                status,
                now_ms,
            ),
            None => {
                let state = MarketState::new(
                    MarketTicker::from(ticker),
                    EventTicker::from(event_ticker),
                    SeriesTicker::from(series_ticker),
                    status,
                    now_ms,
                );
                guard.insert(ticker.to_string(), state);
            }
        }
    }

    /// Apply an orderbook snapshot or incremental delta. The caller has
    /// already performed sequence-gap detection; `is_snapshot` tells this
    /// method whether to replace the book wholesale or patch it.
    pub fn apply_orderbook_delta(&self, msg: &OrderbookDeltaMsg, is_snapshot: bool, now_ms: i64) {
        let mut guard = self.inner.write();
        let Some(state) = guard.get_mut(&msg.market_ticker) else {
            return;
        };
        let yes: Vec<OrderbookLevel> = msg.yes.iter().map(|l| OrderbookLevel::new(l.0, l.1)).collect();
        let no: Vec<OrderbookLevel> = msg.no.iter().map(|l| OrderbookLevel::new(l.0, l.1)).collect();
        if is_snapshot {
            state.apply_orderbook_snapshot(yes, no, msg.seq, now_ms);
        } else {
            state.apply_orderbook_patch(yes, no, msg.seq, now_ms);
        }
        drop(guard);
        self.wake();
    }

    pub fn append_trade(&self, msg: &TradeMsg) {
        let mut guard = self.inner.write();
        let Some(state) = guard.get_mut(&msg.market_ticker) else {
            return;
        };
        let trade = RecentTrade {
            price: msg.yes_price,
            count: msg.count,
            taker_side_yes: msg.taker_side == "yes",
            timestamp_ms: msg.ts,
        };
        state.append_trade(trade, msg.ts);
        drop(guard);
        self.wake();
    }

    pub fn update_status(&self, ticker: &str, status: MarketStatus, now_ms: i64) {
        let mut guard = self.inner.write();
        if let Some(state) = guard.get_mut(ticker) {
            state.update_status(status, now_ms);
        }
        drop(guard);
        self.wake();
    }

    #[must_use]
    pub fn orderbook(&self, ticker: &str) -> Option<MarketOrderbook> {
        self.inner.read().get(ticker).and_then(|s| s.orderbook().cloned())
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker_msg(ticker: &str, yes_bid: u8, no_bid: u8) -> TickerMsg {
        TickerMsg {
            market_ticker: ticker.to_string(),
            yes_bid,
            no_bid,
            price: yes_bid,
            volume: 0,
            open_interest: 0,
            ts: 1,
        }
    }

    #[test]
    fn upsert_from_ticker_creates_a_new_entry_on_first_sight() {
        let cache = MarketCache::new();
        cache.upsert_from_ticker(&ticker_msg("BTC-X", 40, 55));
        let state = cache.get("BTC-X").expect("entry created");
        assert_eq!(state.yes_bid(), 40);
        assert_eq!(state.no_bid(), 55);
    }

    #[test]
    fn discovery_never_overwrites_ws_price_fields() {
        let cache = MarketCache::new();
        cache.upsert_from_ticker(&ticker_msg("BTC-X", 40, 55));
        cache.upsert_from_discovery("BTC-X", "EV", "SR", MarketStatus::Open, 2);
        let state = cache.get("BTC-X").expect("entry exists");
        assert_eq!(state.yes_bid(), 40);
        assert_eq!(state.event_ticker().as_str(), "EV");
    }

    #[test]
    fn size_tracks_distinct_tickers() {
        let cache = MarketCache::new();
        cache.upsert_from_ticker(&ticker_msg("A", 1, 1));
        cache.upsert_from_ticker(&ticker_msg("B", 1, 1));
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test]
    async fn notified_wakes_after_a_write() {
        let cache = Arc::new(MarketCache::new());
        let waiter = cache.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
        });
        tokio::task::yield_now().await;
        cache.upsert_from_ticker(&ticker_msg("BTC-X", 10, 10));
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("notified within timeout")
            .expect("task did not panic");
    }
}
