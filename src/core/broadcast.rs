//! Internal event fan-out: the seam the (out-of-scope) local HTTP/SSE
//! control surface would sit on top of. Every lifecycle, trade, and
//! reconciliation event in the system is broadcast through here so that
//! surface can be added later without touching any producer.
//!
//! Broadcasting is fire-and-forget: a producer with no subscribers never
//! blocks, and a slow or absent consumer never holds up the trading path.

use tokio::sync::broadcast;

use crate::core::domain::{AgentId, AgentLifecycleState, ClientOrderId, Environment, MarketTicker, OrderId};

const CHANNEL_CAPACITY: usize = 1024;

/// One system event, as it would be serialized onto the control API's SSE
/// feed. Grouped by the subsystem that produces it.
#[derive(Debug, Clone)]
pub enum Event {
    AgentStateChanged {
        agent_id: AgentId,
        agent_name: String,
        lifecycle_state: AgentLifecycleState,
    },
    AgentDecision {
        agent_id: AgentId,
        agent_name: String,
        market_ticker: MarketTicker,
        side: &'static str,
        price: u8,
        confidence: f64,
    },
    OrderSubmitted {
        order_id: OrderId,
        market_ticker: MarketTicker,
        environment: Environment,
    },
    OrderFailed {
        client_order_id: ClientOrderId,
        market_ticker: MarketTicker,
        environment: Environment,
    },
    OrderFilled {
        order_id: OrderId,
        market_ticker: MarketTicker,
        environment: Environment,
    },
    OrderCancelled {
        order_id: OrderId,
        environment: Environment,
    },
    ReconciliationComplete {
        environment: Environment,
        discrepancies: usize,
    },
    Trade {
        market_ticker: MarketTicker,
        price: u8,
        count: u32,
        taker_side_yes: bool,
    },
    PositionUpdate {
        environment: Environment,
        market_ticker: MarketTicker,
    },
    SystemStatus {
        message: String,
    },
}

/// A `tokio::sync::broadcast` wrapper every producer holds a clone of.
/// Cloning is cheap (it's just the sender handle); each subscriber gets its
/// own lagging-tolerant receiver.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event. Silently dropped if nobody is listening.
    pub fn broadcast(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_broadcast_events() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(Event::SystemStatus {
            message: "booted".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::SystemStatus { .. }));
    }

    #[test]
    fn broadcast_with_no_subscribers_does_not_panic() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(Event::SystemStatus {
            message: "no one home".into(),
        });
    }
}
