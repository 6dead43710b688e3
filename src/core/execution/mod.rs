//! Execution engine: the only component allowed to submit orders to
//! Kalshi. Owns the idempotency guard, the in-memory open-orders/positions
//! maps, and the retry-then-fail path the submit loop follows.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::core::broadcast::{Event, EventBroadcaster};
use crate::core::domain::{
    ClientOrderId, Environment, Fill, MarketTicker, Order, OrderId, OrderStatus, TradeIntent,
};
use crate::core::kalshi::{client::order_body, messages::{UserFillMsg, UserOrderMsg}, RestClient};
use crate::core::persistence::PersistenceStore;
use crate::error::{Error, Result};

const MAX_ATTEMPTS: u32 = 5;
const RETRY_BASE_SECS: f64 = 0.1;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Submits orders and tracks their lifecycle for one environment.
pub struct ExecutionEngine {
    rest: Arc<RestClient>,
    store: Arc<dyn PersistenceStore>,
    broadcaster: EventBroadcaster,
    environment: Environment,
    submitted_ids: DashSet<ClientOrderId>,
    open_orders: RwLock<HashMap<String, Order>>,
    positions: RwLock<HashMap<String, crate::core::domain::Position>>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(
        rest: Arc<RestClient>,
        store: Arc<dyn PersistenceStore>,
        broadcaster: EventBroadcaster,
        environment: Environment,
    ) -> Self {
        Self {
            rest,
            store,
            broadcaster,
            environment,
            submitted_ids: DashSet::new(),
            open_orders: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Warm-start in-memory state from the persisted open orders and
    /// positions for this environment.
    pub async fn load_state_from_db(&self) -> Result<()> {
        let orders = self.store.get_open_orders(self.environment).await?;
        let mut open = self.open_orders.write();
        for order in orders {
            self.submitted_ids.insert(order.client_order_id());
            open.insert(order.order_id().as_str().to_string(), order);
        }
        drop(open);

        let positions = self.store.get_positions(self.environment).await?;
        let mut pos = self.positions.write();
        for position in positions {
            pos.insert(position.market_ticker().as_str().to_string(), position);
        }
        drop(pos);

        info!(
            environment = %self.environment,
            open_orders = self.open_orders.read().len(),
            positions = self.positions.read().len(),
            "execution engine loaded state from db"
        );
        Ok(())
    }

    #[must_use]
    pub fn get_open_orders(&self) -> Vec<Order> {
        self.open_orders.read().values().cloned().collect()
    }

    #[must_use]
    pub fn get_positions(&self) -> Vec<crate::core::domain::Position> {
        self.positions.read().values().cloned().collect()
    }

    /// Validate, deduplicate, and submit a `TradeIntent`. Every failure
    /// mode short-circuits silently or logs and returns — agents never see
    /// the outcome of their own submissions.
    pub async fn execute(&self, intent: TradeIntent) {
        if !intent.is_valid() {
            warn!(
                ticker = %intent.market_ticker(),
                price = intent.price(),
                count = intent.count(),
                "rejecting invalid trade intent"
            );
            return;
        }

        if !self.submitted_ids.insert(intent.client_order_id()) {
            debug!(client_order_id = %intent.client_order_id(), "duplicate client_order_id, skipping");
            return;
        }

        self.submit_with_retry(intent).await;
    }

    async fn submit_with_retry(&self, intent: TradeIntent) {
        let body = order_body(
            intent.market_ticker().as_str(),
            &intent.client_order_id().to_string(),
            order_type_str(intent.order_type()),
            action_str(intent.action()),
            side_str(intent.side()),
            intent.count(),
            intent.price(),
        );

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            match self.rest.create_order(body.clone()).await {
                Ok(resp) => {
                    self.on_order_success(resp, &intent).await;
                    return;
                }
                Err(Error::Unauthorized) => {
                    error!(ticker = %intent.market_ticker(), "order rejected with 401, halting further execution");
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    let wait = RETRY_BASE_SECS * 2f64.powi(attempt as i32);
                    warn!(
                        attempt = attempt + 1,
                        ticker = %intent.market_ticker(),
                        error = %last_error,
                        "order submission failed"
                    );
                    sleep(Duration::from_secs_f64(wait)).await;
                }
            }
        }

        error!(
            client_order_id = %intent.client_order_id(),
            ticker = %intent.market_ticker(),
            error = %last_error,
            "order permanently failed after retries"
        );
        self.on_order_failed(&intent).await;
    }

    async fn on_order_success(&self, resp: serde_json::Value, intent: &TradeIntent) {
        let order_obj = resp.get("order").cloned().unwrap_or(resp);
        let order_id_str = order_obj
            .get("order_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let status = order_obj
            .get("status")
            .and_then(|v| v.as_str())
            .map_or(OrderStatus::Resting, status_from_wire);

        info!(order_id = %order_id_str, ticker = %intent.market_ticker(), environment = %self.environment, "order submitted successfully");

        let order = Order::new(
            OrderId::new(order_id_str.clone()),
            intent.client_order_id(),
            intent.agent_id(),
            intent.market_ticker().clone(),
            intent.action(),
            intent.side(),
            intent.price(),
            intent.count(),
            status,
            self.environment,
        );
        self.open_orders.write().insert(order_id_str.clone(), order.clone());

        let store = self.store.clone();
        let now = now_ms();
        tokio::spawn(async move {
            if let Err(e) = store.insert_order(&order, now).await {
                warn!(error = %e, "failed to persist submitted order");
            }
        });

        self.broadcaster.broadcast(Event::OrderSubmitted {
            order_id: OrderId::new(order_id_str),
            market_ticker: intent.market_ticker().clone(),
            environment: self.environment,
        });
    }

    async fn on_order_failed(&self, intent: &TradeIntent) {
        self.broadcaster.broadcast(Event::OrderFailed {
            client_order_id: intent.client_order_id(),
            market_ticker: intent.market_ticker().clone(),
            environment: self.environment,
        });
    }

    /// Process a `user:fill` WebSocket event: decrements the tracked
    /// order's remaining count, removes it once exhausted, persists the
    /// fill (deduplicated by `fill_id`), and broadcasts.
    pub async fn handle_fill(&self, msg: &UserFillMsg) {
        let mut removed = false;
        {
            let mut open = self.open_orders.write();
            if let Some(order) = open.get_mut(&msg.order_id) {
                order.apply_fill(msg.count);
                if order.status().is_terminal() {
                    removed = true;
                }
            }
        }
        if removed {
            self.open_orders.write().remove(&msg.order_id);
            let store = self.store.clone();
            let order_id = OrderId::new(msg.order_id.clone());
            tokio::spawn(async move {
                if let Err(e) = store
                    .update_order_status(&order_id, OrderStatus::Filled, 0, now_ms())
                    .await
                {
                    warn!(error = %e, "failed to persist order status after fill");
                }
            });
        }

        let fill = Fill::new(
            crate::core::domain::FillId::new(msg.fill_id.clone()),
            OrderId::new(msg.order_id.clone()),
            msg.price,
            msg.count,
            side_from_wire(&msg.side),
            action_from_wire(&msg.action),
            msg.is_taker,
            if msg.ts > 0 { msg.ts } else { now_ms() },
            self.environment,
        );
        let market_ticker = MarketTicker::from(msg.market_ticker.as_str());
        let store = self.store.clone();
        let fill_id = crate::core::domain::FillId::new(msg.fill_id.clone());
        tokio::spawn(async move {
            match store.fill_exists(&fill_id).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = store.insert_fill(&fill, &market_ticker).await {
                        warn!(error = %e, "failed to persist fill");
                    }
                }
                Err(e) => warn!(error = %e, "failed to check fill existence"),
            }
        });

        self.broadcaster.broadcast(Event::OrderFilled {
            order_id: OrderId::new(msg.order_id.clone()),
            market_ticker: MarketTicker::from(msg.market_ticker.as_str()),
            environment: self.environment,
        });
    }

    /// Process a `user:order` WebSocket event. Only terminal status
    /// transitions (cancelled, filled, expired) mutate local state; others
    /// are no-ops for this engine.
    pub async fn handle_order_update(&self, msg: &UserOrderMsg) {
        let status = status_from_wire(&msg.status);
        if !status.is_terminal() {
            return;
        }

        self.open_orders.write().remove(&msg.order_id);

        let store = self.store.clone();
        let order_id = OrderId::new(msg.order_id.clone());
        let remaining = msg.remaining_count;
        tokio::spawn(async move {
            if let Err(e) = store
                .update_order_status(&order_id, status, remaining, now_ms())
                .await
            {
                warn!(error = %e, "failed to persist order status update");
            }
        });

        if status == OrderStatus::Cancelled {
            self.broadcaster.broadcast(Event::OrderCancelled {
                order_id: OrderId::new(msg.order_id.clone()),
                environment: self.environment,
            });
        } else {
            self.broadcaster.broadcast(Event::OrderFilled {
                order_id: OrderId::new(msg.order_id.clone()),
                market_ticker: MarketTicker::from(""),
                environment: self.environment,
            });
        }
    }
}

fn order_type_str(ot: crate::core::domain::OrderType) -> &'static str {
    match ot {
        crate::core::domain::OrderType::Limit => "limit",
        crate::core::domain::OrderType::Market => "market",
    }
}

fn action_str(action: crate::core::domain::Action) -> &'static str {
    match action {
        crate::core::domain::Action::Buy => "buy",
        crate::core::domain::Action::Sell => "sell",
    }
}

fn side_str(side: crate::core::domain::Side) -> &'static str {
    match side {
        crate::core::domain::Side::Yes => "yes",
        crate::core::domain::Side::No => "no",
    }
}

fn side_from_wire(s: &str) -> crate::core::domain::Side {
    if s == "no" {
        crate::core::domain::Side::No
    } else {
        crate::core::domain::Side::Yes
    }
}

fn action_from_wire(s: &str) -> crate::core::domain::Action {
    if s == "sell" {
        crate::core::domain::Action::Sell
    } else {
        crate::core::domain::Action::Buy
    }
}

fn status_from_wire(s: &str) -> OrderStatus {
    match s {
        "resting" => OrderStatus::Resting,
        "filled" => OrderStatus::Filled,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "cancelled" => OrderStatus::Cancelled,
        "expired" => OrderStatus::Expired,
        "failed" => OrderStatus::Failed,
        _ => OrderStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Action, AgentId, MarketTicker, OrderType, Side};
    use crate::core::persistence::NullStore;

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(
            Arc::new(RestClient::new(Environment::Demo)),
            Arc::new(NullStore::new()),
            EventBroadcaster::new(),
            Environment::Demo,
        )
    }

    fn intent() -> TradeIntent {
        TradeIntent::new(
            AgentId::generate(),
            MarketTicker::from("BTC-X"),
            Action::Buy,
            Side::Yes,
            OrderType::Limit,
            50,
            1,
            0.8,
            0,
        )
    }

    #[tokio::test]
    async fn invalid_intent_is_rejected_before_touching_the_idempotency_guard() {
        let engine = engine();
        let mut bad = intent();
        // price 0 is invalid; is_valid() catches it before execute() inserts
        // into submitted_ids, so a corrected resubmission with the same
        // client_order_id would still be considered fresh.
        assert!(!TradeIntent::new(
            bad.agent_id(),
            bad.market_ticker().clone(),
            bad.action(),
            bad.side(),
            bad.order_type(),
            0,
            bad.count(),
            bad.confidence(),
            bad.generated_at_ms(),
        )
        .is_valid());
        bad = intent();
        engine.execute(bad).await;
    }

    #[tokio::test]
    async fn duplicate_client_order_id_is_not_resubmitted() {
        let engine = engine();
        let client_order_id = ClientOrderId::generate();
        assert!(engine.submitted_ids.insert(client_order_id));
        assert!(!engine.submitted_ids.insert(client_order_id));
    }

    #[tokio::test]
    async fn handle_order_update_ignores_non_terminal_status() {
        let engine = engine();
        engine
            .handle_order_update(&UserOrderMsg {
                order_id: "O1".into(),
                client_order_id: "c1".into(),
                status: "resting".into(),
                remaining_count: 5,
            })
            .await;
        assert!(engine.get_open_orders().is_empty());
    }
}
