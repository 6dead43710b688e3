//! Market state: one entry per subscribed ticker, owned exclusively by the
//! ingest pipeline (dispatcher writes; discovery writes metadata only).

use std::collections::{BTreeMap, VecDeque};

use super::id::{EventTicker, MarketTicker, SeriesTicker};

const RECENT_TRADES_CAPACITY: usize = 100;

/// Exchange-reported lifecycle status of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Settled,
    Halted,
}

/// A single resting level in one side of an orderbook: `qty == 0` deletes
/// the level when applied as a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderbookLevel {
    pub price: u8,
    pub qty: u32,
}

impl OrderbookLevel {
    #[must_use]
    pub const fn new(price: u8, qty: u32) -> Self {
        Self { price, qty }
    }
}

/// One side (yes or no) of a market's resting orderbook: price in cents to
/// resting quantity. A `BTreeMap` keeps best price (`max_key`) a cheap
/// lookup without a secondary index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderbookSide(BTreeMap<u8, u32>);

impl OrderbookSide {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single level update: `qty == 0` deletes the level.
    pub fn apply(&mut self, level: OrderbookLevel) {
        if level.qty == 0 {
            self.0.remove(&level.price);
        } else {
            self.0.insert(level.price, level.qty);
        }
    }

    /// Best (highest) resting price on this side, if any.
    #[must_use]
    pub fn best(&self) -> Option<u8> {
        self.0.keys().next_back().copied()
    }

    #[must_use]
    pub fn levels(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.0.iter().map(|(&p, &q)| (p, q))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A market's full resting orderbook plus the exchange-assigned sequence
/// counter used to detect dropped messages.
#[derive(Debug, Clone, Default)]
pub struct MarketOrderbook {
    pub yes: OrderbookSide,
    pub no: OrderbookSide,
    pub seq: u64,
}

/// A single public trade, retained in a bounded per-market FIFO.
#[derive(Debug, Clone, Copy)]
pub struct RecentTrade {
    pub price: u8,
    pub count: u32,
    pub taker_side_yes: bool,
    pub timestamp_ms: i64,
}

/// Derived fields recomputed atomically with their inputs on every write.
#[derive(Debug, Clone, Copy, Default)]
struct Derived {
    yes_ask: u8,
    no_ask: u8,
    spread: i16,
    midpoint: f64,
    implied_probability: f64,
}

impl Derived {
    fn compute(yes_bid: u8, no_bid: u8) -> Self {
        let yes_ask = 100u16.saturating_sub(u16::from(no_bid)) as u8;
        let no_ask = 100u16.saturating_sub(u16::from(yes_bid)) as u8;
        Self {
            yes_ask,
            no_ask,
            spread: i16::from(yes_ask) - i16::from(yes_bid),
            midpoint: (f64::from(yes_bid) + f64::from(yes_ask)) / 2.0,
            implied_probability: f64::from(yes_bid) / 100.0,
        }
    }
}

/// One subscribed market's current state. Price fields are exclusively
/// mutated by the WebSocket ingest pipeline; `upsert_from_discovery` may
/// only touch metadata.
#[derive(Debug, Clone)]
pub struct MarketState {
    market_ticker: MarketTicker,
    event_ticker: EventTicker,
    series_ticker: SeriesTicker,
    status: MarketStatus,
    yes_bid: u8,
    no_bid: u8,
    last_price: u8,
    volume: u64,
    open_interest: u64,
    last_updated_ms: i64,
    orderbook: Option<MarketOrderbook>,
    recent_trades: VecDeque<RecentTrade>,
    derived: Derived,
}

impl MarketState {
    #[must_use]
    pub fn new(
        market_ticker: MarketTicker,
        event_ticker: EventTicker,
        series_ticker: SeriesTicker,
        status: MarketStatus,
        now_ms: i64,
    ) -> Self {
        Self {
            market_ticker,
            event_ticker,
            series_ticker,
            status,
            yes_bid: 0,
            no_bid: 0,
            last_price: 0,
            volume: 0,
            open_interest: 0,
            last_updated_ms: now_ms,
            orderbook: None,
            recent_trades: VecDeque::with_capacity(RECENT_TRADES_CAPACITY),
            derived: Derived::compute(0, 0),
        }
    }

    #[must_use]
    pub const fn market_ticker(&self) -> &MarketTicker {
        &self.market_ticker
    }

    #[must_use]
    pub const fn event_ticker(&self) -> &EventTicker {
        &self.event_ticker
    }

    #[must_use]
    pub const fn series_ticker(&self) -> &SeriesTicker {
        &self.series_ticker
    }

    #[must_use]
    pub const fn status(&self) -> MarketStatus {
        self.status
    }

    #[must_use]
    pub const fn yes_bid(&self) -> u8 {
        self.yes_bid
    }

    #[must_use]
    pub const fn no_bid(&self) -> u8 {
        self.no_bid
    }

    #[must_use]
    pub const fn yes_ask(&self) -> u8 {
        self.derived.yes_ask
    }

    #[must_use]
    pub const fn no_ask(&self) -> u8 {
        self.derived.no_ask
    }

    #[must_use]
    pub const fn spread(&self) -> i16 {
        self.derived.spread
    }

    #[must_use]
    pub const fn midpoint(&self) -> f64 {
        self.derived.midpoint
    }

    #[must_use]
    pub const fn implied_probability(&self) -> f64 {
        self.derived.implied_probability
    }

    #[must_use]
    pub const fn last_price(&self) -> u8 {
        self.last_price
    }

    #[must_use]
    pub const fn volume(&self) -> u64 {
        self.volume
    }

    #[must_use]
    pub const fn open_interest(&self) -> u64 {
        self.open_interest
    }

    #[must_use]
    pub const fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    #[must_use]
    pub const fn orderbook(&self) -> Option<&MarketOrderbook> {
        self.orderbook.as_ref()
    }

    #[must_use]
    pub fn recent_trades(&self) -> impl Iterator<Item = &RecentTrade> {
        self.recent_trades.iter()
    }

    /// Apply a `ticker` channel update: top-of-book quotes, last price and
    /// volume/open-interest. Recomputes derived fields under the enforced
    /// invariant `yes_ask = 100 - no_bid`, `no_ask = 100 - yes_bid`.
    pub fn apply_ticker_update(
        &mut self,
        yes_bid: u8,
        no_bid: u8,
        last_price: u8,
        volume: u64,
        open_interest: u64,
        now_ms: i64,
    ) {
        self.yes_bid = yes_bid;
        self.no_bid = no_bid;
        self.last_price = last_price;
        self.volume = volume;
        self.open_interest = open_interest;
        self.derived = Derived::compute(yes_bid, no_bid);
        self.last_updated_ms = now_ms;
    }

    /// Apply an orderbook snapshot: replaces both sides and the sequence
    /// counter wholesale, then re-derives best-bid-driven fields.
    pub fn apply_orderbook_snapshot(
        &mut self,
        yes: Vec<OrderbookLevel>,
        no: Vec<OrderbookLevel>,
        seq: u64,
        now_ms: i64,
    ) {
        let mut book = MarketOrderbook { seq, ..Default::default() };
        for level in yes {
            book.yes.apply(level);
        }
        for level in no {
            book.no.apply(level);
        }
        self.orderbook = Some(book);
        self.recompute_from_book();
        self.last_updated_ms = now_ms;
    }

    /// Apply an incremental orderbook patch. Caller is responsible for
    /// sequence-gap detection (the WebSocket client owns that); this method
    /// assumes the gap check already passed.
    pub fn apply_orderbook_patch(
        &mut self,
        yes: Vec<OrderbookLevel>,
        no: Vec<OrderbookLevel>,
        seq: u64,
        now_ms: i64,
    ) {
        let book = self.orderbook.get_or_insert_with(MarketOrderbook::default);
        for level in yes {
            book.yes.apply(level);
        }
        for level in no {
            book.no.apply(level);
        }
        book.seq = seq;
        self.recompute_from_book();
        self.last_updated_ms = now_ms;
    }

    fn recompute_from_book(&mut self) {
        if let Some(book) = &self.orderbook {
            let best_yes = book.yes.best().unwrap_or(self.yes_bid);
            let best_no = book.no.best().unwrap_or(self.no_bid);
            self.yes_bid = best_yes;
            self.no_bid = best_no;
            self.derived = Derived::compute(best_yes, best_no);
        }
    }

    /// Append a public trade to the bounded FIFO, evicting the oldest entry
    /// once capacity is exceeded.
    pub fn append_trade(&mut self, trade: RecentTrade, now_ms: i64) {
        if self.recent_trades.len() == RECENT_TRADES_CAPACITY {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back(trade);
        self.last_updated_ms = now_ms;
    }

    /// Apply a `market_lifecycle` status change. Does not touch the
    /// orderbook or trade history.
    pub fn update_status(&mut self, status: MarketStatus, now_ms: i64) {
        self.status = status;
        self.last_updated_ms = now_ms;
    }

    /// Refresh discovery-sourced metadata only (status, event/series
    /// tickers). Never touches price fields, which remain under
    /// WebSocket authority.
    pub fn refresh_metadata(
        &mut self,
        event_ticker: EventTicker,
        series_ticker: SeriesTicker,
        status: MarketStatus,
        now_ms: i64,
    ) {
        self.event_ticker = event_ticker;
        self.series_ticker = series_ticker;
        self.status = status;
        self.last_updated_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> MarketState {
        MarketState::new(
            MarketTicker::from("BTC-X"),
            EventTicker::from("BTC-EVENT"),
            SeriesTicker::from("BTC-SERIES"),
            MarketStatus::Open,
            1_000,
        )
    }

    #[test]
    fn ticker_update_enforces_complement_invariant() {
        let mut m = market();
        m.apply_ticker_update(40, 55, 40, 1000, 50, 2000);
        assert_eq!(m.yes_ask(), 45);
        assert_eq!(m.no_ask(), 60);
        assert_eq!(m.spread(), 5);
        assert!((m.midpoint() - 42.5).abs() < f64::EPSILON);
        assert!((m.implied_probability() - 0.40).abs() < f64::EPSILON);
    }

    #[test]
    fn orderbook_snapshot_replaces_wholesale() {
        let mut m = market();
        m.apply_orderbook_snapshot(
            vec![OrderbookLevel::new(40, 100), OrderbookLevel::new(35, 50)],
            vec![OrderbookLevel::new(55, 80)],
            1,
            10,
        );
        let book = m.orderbook().unwrap();
        assert_eq!(book.seq, 1);
        assert_eq!(book.yes.best(), Some(40));
        assert_eq!(book.no.best(), Some(55));
        assert_eq!(m.yes_bid(), 40);
        assert_eq!(m.no_bid(), 55);
        assert_eq!(m.yes_ask(), 45);
    }

    #[test]
    fn orderbook_patch_deletes_on_zero_qty() {
        let mut m = market();
        m.apply_orderbook_snapshot(vec![OrderbookLevel::new(40, 100)], vec![], 1, 10);
        m.apply_orderbook_patch(vec![OrderbookLevel::new(40, 0)], vec![], 2, 20);
        assert!(m.orderbook().unwrap().yes.is_empty());
    }

    #[test]
    fn append_trade_bounds_at_capacity() {
        let mut m = market();
        for i in 0..150 {
            m.append_trade(
                RecentTrade {
                    price: 50,
                    count: 1,
                    taker_side_yes: true,
                    timestamp_ms: i,
                },
                i,
            );
        }
        assert_eq!(m.recent_trades().count(), RECENT_TRADES_CAPACITY);
    }

    #[test]
    fn status_update_preserves_orderbook_and_trades() {
        let mut m = market();
        m.apply_orderbook_snapshot(vec![OrderbookLevel::new(40, 100)], vec![], 1, 10);
        m.append_trade(
            RecentTrade {
                price: 40,
                count: 1,
                taker_side_yes: true,
                timestamp_ms: 10,
            },
            10,
        );
        m.update_status(MarketStatus::Closed, 20);
        assert_eq!(m.status(), MarketStatus::Closed);
        assert!(m.orderbook().is_some());
        assert_eq!(m.recent_trades().count(), 1);
    }

    #[test]
    fn refresh_metadata_never_touches_price_fields() {
        let mut m = market();
        m.apply_ticker_update(40, 55, 40, 1000, 50, 2000);
        m.refresh_metadata(EventTicker::from("EV"), SeriesTicker::from("SR"), MarketStatus::Halted, 3000);
        assert_eq!(m.yes_bid(), 40);
        assert_eq!(m.status(), MarketStatus::Halted);
        assert_eq!(m.event_ticker().as_str(), "EV");
        assert_eq!(m.series_ticker().as_str(), "SR");
    }
}
