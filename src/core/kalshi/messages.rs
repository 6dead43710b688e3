//! Inbound WebSocket message shapes. Modeled as tagged variants keyed on
//! `type` with explicit optional fields rather than freeform maps, per the
//! duck-typed-message design note.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TickerMsg {
    pub market_ticker: String,
    pub yes_bid: u8,
    pub no_bid: u8,
    #[serde(default)]
    pub price: u8,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub open_interest: u64,
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderbookLevelWire(pub u8, pub u32);

#[derive(Debug, Deserialize)]
pub struct OrderbookDeltaMsg {
    pub market_ticker: String,
    pub seq: u64,
    #[serde(default)]
    pub yes: Vec<OrderbookLevelWire>,
    #[serde(default)]
    pub no: Vec<OrderbookLevelWire>,
}

#[derive(Debug, Deserialize)]
pub struct TradeMsg {
    pub market_ticker: String,
    pub yes_price: u8,
    pub count: u32,
    #[serde(default)]
    pub taker_side: String,
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Deserialize)]
pub struct MarketLifecycleMsg {
    pub market_ticker: String,
    pub status: String,
}

/// A `user:fill` event: one execution against one of our own resting orders.
#[derive(Debug, Clone, Deserialize)]
pub struct UserFillMsg {
    pub fill_id: String,
    pub order_id: String,
    pub market_ticker: String,
    pub side: String,
    pub action: String,
    pub price: u8,
    pub count: u32,
    #[serde(default)]
    pub is_taker: bool,
    #[serde(default)]
    pub ts: i64,
}

/// A `user:order` event: a lifecycle change on one of our own orders.
#[derive(Debug, Clone, Deserialize)]
pub struct UserOrderMsg {
    pub order_id: String,
    pub client_order_id: String,
    pub status: String,
    #[serde(default)]
    pub remaining_count: u32,
}

/// One tagged inbound event. Control frames (`subscribed`, `unsubscribed`,
/// `ok`, `pong`) are consumed internally by the WebSocket client and never
/// reach the dispatcher.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    #[serde(rename = "ticker")]
    Ticker { msg: TickerMsg },
    #[serde(rename = "orderbook_delta")]
    OrderbookDelta { msg: OrderbookDeltaMsg },
    #[serde(rename = "trade")]
    Trade { msg: TradeMsg },
    #[serde(rename = "market_lifecycle")]
    MarketLifecycle { msg: MarketLifecycleMsg },
    #[serde(rename = "user:fill")]
    UserFill { msg: UserFillMsg },
    #[serde(rename = "user:order")]
    UserOrder { msg: UserOrderMsg },
    #[serde(rename = "user:position")]
    UserPosition { msg: serde_json::Value },
    #[serde(rename = "subscribed")]
    Subscribed,
    #[serde(rename = "unsubscribed")]
    Unsubscribed,
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "pong")]
    Pong,
}

impl WsEvent {
    /// Control frames are consumed by the WebSocket client itself and never
    /// forwarded to the dispatcher's inbound queue.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Subscribed | Self::Unsubscribed | Self::Ok | Self::Pong
        )
    }
}

/// A dispatcher-bound message with its originating environment injected.
#[derive(Debug)]
pub struct InboundMessage {
    pub environment: crate::core::domain::Environment,
    pub event: WsEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_event_parses_from_json() {
        let raw = r#"{"type":"ticker","msg":{"market_ticker":"BTC-X","yes_bid":40,"no_bid":55,"price":40,"volume":1000,"open_interest":50}}"#;
        let event: WsEvent = serde_json::from_str(raw).unwrap();
        match event {
            WsEvent::Ticker { msg } => assert_eq!(msg.market_ticker, "BTC-X"),
            _ => panic!("expected ticker"),
        }
    }

    #[test]
    fn pong_is_a_control_frame() {
        let raw = r#"{"type":"pong"}"#;
        let event: WsEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_control());
    }

    #[test]
    fn orderbook_delta_parses_level_pairs() {
        let raw = r#"{"type":"orderbook_delta","msg":{"market_ticker":"BTC-X","seq":2,"yes":[[40,100]],"no":[]}}"#;
        let event: WsEvent = serde_json::from_str(raw).unwrap();
        match event {
            WsEvent::OrderbookDelta { msg } => {
                assert_eq!(msg.seq, 2);
                assert_eq!(msg.yes.len(), 1);
                assert_eq!(msg.yes[0].0, 40);
                assert_eq!(msg.yes[0].1, 100);
            }
            _ => panic!("expected orderbook_delta"),
        }
    }
}
