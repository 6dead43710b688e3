//! Orders and fills, mutated exclusively by the execution engine.

use super::environment::Environment;
use super::id::{AgentId, ClientOrderId, FillId, MarketTicker, OrderId};
use super::trade_intent::{Action, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Resting,
    Filled,
    PartiallyFilled,
    Cancelled,
    Expired,
    Failed,
}

impl OrderStatus {
    /// Terminal statuses stop the engine from tracking the order further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Expired | Self::Failed
        )
    }
}

/// A submitted order, identified by the exchange-assigned `order_id` once
/// known. Created on successful REST submit; only mutated afterward by
/// WebSocket user-order/user-fill events or reconciliation.
#[derive(Debug, Clone)]
pub struct Order {
    order_id: OrderId,
    client_order_id: ClientOrderId,
    agent_id: AgentId,
    market_ticker: MarketTicker,
    action: Action,
    side: Side,
    price: u8,
    count: u32,
    remaining_count: u32,
    status: OrderStatus,
    environment: Environment,
}

impl Order {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        client_order_id: ClientOrderId,
        agent_id: AgentId,
        market_ticker: MarketTicker,
        action: Action,
        side: Side,
        price: u8,
        count: u32,
        status: OrderStatus,
        environment: Environment,
    ) -> Self {
        Self {
            order_id,
            client_order_id,
            agent_id,
            market_ticker,
            action,
            side,
            price,
            count,
            remaining_count: count,
            status,
            environment,
        }
    }

    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    #[must_use]
    pub const fn client_order_id(&self) -> ClientOrderId {
        self.client_order_id
    }

    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    #[must_use]
    pub const fn market_ticker(&self) -> &MarketTicker {
        &self.market_ticker
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn price(&self) -> u8 {
        self.price
    }

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub const fn remaining_count(&self) -> u32 {
        self.remaining_count
    }

    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Decrement remaining count by a fill; transitions to `Filled` once
    /// exhausted, `PartiallyFilled` otherwise.
    pub fn apply_fill(&mut self, count: u32) {
        self.remaining_count = self.remaining_count.saturating_sub(count);
        self.status = if self.remaining_count == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

/// A partial or complete execution of an order. Append-only, deduplicated
/// by `fill_id`.
#[derive(Debug, Clone)]
pub struct Fill {
    fill_id: FillId,
    order_id: OrderId,
    price: u8,
    count: u32,
    side: Side,
    action: Action,
    is_taker: bool,
    filled_at_ms: i64,
    environment: Environment,
}

impl Fill {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fill_id: FillId,
        order_id: OrderId,
        price: u8,
        count: u32,
        side: Side,
        action: Action,
        is_taker: bool,
        filled_at_ms: i64,
        environment: Environment,
    ) -> Self {
        Self {
            fill_id,
            order_id,
            price,
            count,
            side,
            action,
            is_taker,
            filled_at_ms,
            environment,
        }
    }

    #[must_use]
    pub const fn fill_id(&self) -> &FillId {
        &self.fill_id
    }

    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    #[must_use]
    pub const fn price(&self) -> u8 {
        self.price
    }

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub const fn is_taker(&self) -> bool {
        self.is_taker
    }

    #[must_use]
    pub const fn filled_at_ms(&self) -> i64 {
        self.filled_at_ms
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }
}
