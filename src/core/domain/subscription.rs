//! WebSocket subscription keys: durable across reconnects, not across
//! process restarts (the desired set lives in the WS client's memory and is
//! rebuilt by discovery on startup).

use super::id::MarketTicker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ticker,
    OrderbookDelta,
    Trade,
    MarketLifecycle,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::OrderbookDelta => "orderbook_delta",
            Self::Trade => "trade",
            Self::MarketLifecycle => "market_lifecycle",
        }
    }

    /// The four channels discovery subscribes an ACTIVE/WATCHLIST market to.
    #[must_use]
    pub const fn discovery_default() -> [Self; 4] {
        [
            Self::Ticker,
            Self::OrderbookDelta,
            Self::Trade,
            Self::MarketLifecycle,
        ]
    }
}

/// A single `(channel, market_ticker)` pair: the unit the WebSocket client
/// tracks subscribe/unsubscribe state for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub channel: Channel,
    pub market_ticker: MarketTicker,
}

impl Subscription {
    #[must_use]
    pub const fn new(channel: Channel, market_ticker: MarketTicker) -> Self {
        Self {
            channel,
            market_ticker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_default_covers_four_channels() {
        assert_eq!(Channel::discovery_default().len(), 4);
    }

    #[test]
    fn subscriptions_with_same_fields_are_equal() {
        let a = Subscription::new(Channel::Ticker, MarketTicker::from("BTC-X"));
        let b = Subscription::new(Channel::Ticker, MarketTicker::from("BTC-X"));
        assert_eq!(a, b);
    }
}
