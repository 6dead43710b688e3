//! Message dispatcher: the single consumer of the inbound WebSocket queue.
//! Every environment's [`KalshiWebSocketClient`](crate::core::kalshi::KalshiWebSocketClient)
//! feeds its parsed frames into one shared `mpsc` channel; this module
//! drains it and routes each frame to the market cache, to the execution
//! engine for the frame's environment, or straight to the event broadcaster
//! for observer-only traffic. One misbehaving message never stops the loop:
//! each branch is infallible by construction, and any lookup that comes up
//! empty (unregistered environment, unknown market) is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::broadcast::{Event, EventBroadcaster};
use crate::core::cache::MarketCache;
use crate::core::domain::{Environment, MarketStatus, MarketTicker};
use crate::core::execution::ExecutionEngine;
use crate::core::kalshi::messages::{InboundMessage, WsEvent};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn market_status_from_wire(s: &str) -> Option<MarketStatus> {
    match s {
        "open" | "active" => Some(MarketStatus::Open),
        "closed" => Some(MarketStatus::Closed),
        "settled" | "finalized" => Some(MarketStatus::Settled),
        "halted" => Some(MarketStatus::Halted),
        _ => None,
    }
}

/// Routes inbound WebSocket frames to the market cache and per-environment
/// execution engines. Owns no transport of its own; `run` just drains
/// whatever `mpsc::Receiver` the caller hands it.
pub struct MessageDispatcher {
    cache: Arc<MarketCache>,
    broadcaster: EventBroadcaster,
    execution_engines: HashMap<Environment, Arc<ExecutionEngine>>,
}

impl MessageDispatcher {
    #[must_use]
    pub fn new(
        cache: Arc<MarketCache>,
        broadcaster: EventBroadcaster,
        execution_engines: HashMap<Environment, Arc<ExecutionEngine>>,
    ) -> Self {
        Self {
            cache,
            broadcaster,
            execution_engines,
        }
    }

    /// Drain the queue until the sending side is dropped (all WebSocket
    /// clients have stopped). Each message is dispatched in turn; there is
    /// no internal buffering or reordering.
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = queue.recv().await {
            self.dispatch(message).await;
        }
    }

    async fn dispatch(&self, message: InboundMessage) {
        let environment = message.environment;
        match message.event {
            WsEvent::Ticker { msg } => self.cache.upsert_from_ticker(&msg),
            WsEvent::OrderbookDelta { msg } => {
                let is_snapshot = msg.seq <= 1;
                self.cache.apply_orderbook_delta(&msg, is_snapshot, now_ms());
            }
            WsEvent::Trade { msg } => {
                let market_ticker = MarketTicker::from(msg.market_ticker.as_str());
                let price = msg.yes_price;
                let count = msg.count;
                let taker_side_yes = msg.taker_side == "yes";
                self.cache.append_trade(&msg);
                self.broadcaster.broadcast(Event::Trade {
                    market_ticker,
                    price,
                    count,
                    taker_side_yes,
                });
            }
            WsEvent::MarketLifecycle { msg } => {
                let Some(status) = market_status_from_wire(&msg.status) else {
                    warn!(status = %msg.status, "unrecognized market_lifecycle status, ignoring");
                    return;
                };
                self.cache.update_status(&msg.market_ticker, status, now_ms());
            }
            WsEvent::UserFill { msg } => {
                let Some(engine) = self.execution_engines.get(&environment) else {
                    warn!(%environment, "user:fill for an environment with no execution engine");
                    return;
                };
                engine.handle_fill(&msg).await;
            }
            WsEvent::UserOrder { msg } => {
                let Some(engine) = self.execution_engines.get(&environment) else {
                    warn!(%environment, "user:order for an environment with no execution engine");
                    return;
                };
                engine.handle_order_update(&msg).await;
            }
            WsEvent::UserPosition { msg } => {
                let market_ticker = msg
                    .get("market_ticker")
                    .and_then(|v| v.as_str())
                    .map_or_else(|| MarketTicker::from(""), MarketTicker::from);
                self.broadcaster.broadcast(Event::PositionUpdate {
                    environment,
                    market_ticker,
                });
            }
            WsEvent::Subscribed | WsEvent::Unsubscribed | WsEvent::Ok | WsEvent::Pong => {
                // Control frames are consumed by the WebSocket client and
                // never reach the queue; reaching this arm would be a bug
                // upstream, not a reason to stop the loop.
                warn!("control frame reached the dispatcher, dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::MarketTicker as Ticker;
    use crate::core::kalshi::messages::{MarketLifecycleMsg, TickerMsg};
    use crate::core::persistence::NullStore;
    use crate::core::kalshi::RestClient;

    fn dispatcher() -> (Arc<MessageDispatcher>, Arc<MarketCache>) {
        let cache = MarketCache::as_shared();
        let broadcaster = EventBroadcaster::new();
        let mut engines = HashMap::new();
        engines.insert(
            Environment::Demo,
            Arc::new(ExecutionEngine::new(
                Arc::new(RestClient::new(Environment::Demo)),
                Arc::new(NullStore::new()),
                broadcaster.clone(),
                Environment::Demo,
            )),
        );
        let dispatcher = Arc::new(MessageDispatcher::new(cache.clone(), broadcaster, engines));
        (dispatcher, cache)
    }

    #[tokio::test]
    async fn ticker_frame_updates_the_cache() {
        let (dispatcher, cache) = dispatcher();
        dispatcher
            .dispatch(InboundMessage {
                environment: Environment::Demo,
                event: WsEvent::Ticker {
                    msg: TickerMsg {
                        market_ticker: "BTC-X".into(),
                        yes_bid: 40,
                        no_bid: 55,
                        price: 40,
                        volume: 10,
                        open_interest: 5,
                        ts: 1,
                    },
                },
            })
            .await;
        assert_eq!(cache.get("BTC-X").unwrap().yes_bid(), 40);
    }

    #[tokio::test]
    async fn market_lifecycle_updates_status() {
        let (dispatcher, cache) = dispatcher();
        dispatcher
            .dispatch(InboundMessage {
                environment: Environment::Demo,
                event: WsEvent::Ticker {
                    msg: TickerMsg {
                        market_ticker: "BTC-X".into(),
                        yes_bid: 40,
                        no_bid: 55,
                        price: 40,
                        volume: 0,
                        open_interest: 0,
                        ts: 1,
                    },
                },
            })
            .await;
        dispatcher
            .dispatch(InboundMessage {
                environment: Environment::Demo,
                event: WsEvent::MarketLifecycle {
                    msg: MarketLifecycleMsg {
                        market_ticker: "BTC-X".into(),
                        status: "halted".into(),
                    },
                },
            })
            .await;
        assert_eq!(cache.get("BTC-X").unwrap().status(), MarketStatus::Halted);
    }

    #[tokio::test]
    async fn fill_for_unknown_environment_is_logged_and_dropped() {
        let (dispatcher, _cache) = dispatcher();
        dispatcher
            .dispatch(InboundMessage {
                environment: Environment::Live,
                event: WsEvent::UserFill {
                    msg: crate::core::kalshi::messages::UserFillMsg {
                        fill_id: "F1".into(),
                        order_id: "O1".into(),
                        market_ticker: "BTC-X".into(),
                        side: "yes".into(),
                        action: "buy".into(),
                        price: 40,
                        count: 1,
                        is_taker: true,
                        ts: 1,
                    },
                },
            })
            .await;
    }

    #[test]
    fn wire_status_mapping_covers_all_known_values() {
        assert_eq!(market_status_from_wire("open"), Some(MarketStatus::Open));
        assert_eq!(market_status_from_wire("active"), Some(MarketStatus::Open));
        assert_eq!(market_status_from_wire("closed"), Some(MarketStatus::Closed));
        assert_eq!(market_status_from_wire("settled"), Some(MarketStatus::Settled));
        assert_eq!(market_status_from_wire("finalized"), Some(MarketStatus::Settled));
        assert_eq!(market_status_from_wire("halted"), Some(MarketStatus::Halted));
        assert_eq!(market_status_from_wire("bogus"), None);
        let _ = Ticker::from("unused");
    }
}
