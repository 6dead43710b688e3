//! Trade intents: the sole message an agent is permitted to emit.

use super::id::{AgentId, ClientOrderId, MarketTicker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// An agent's request to trade, immutable once constructed. `client_order_id`
/// is the identity the execution engine deduplicates on.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    agent_id: AgentId,
    client_order_id: ClientOrderId,
    market_ticker: MarketTicker,
    action: Action,
    side: Side,
    order_type: OrderType,
    price: u8,
    count: u32,
    confidence: f64,
    generated_at_ms: i64,
}

impl TradeIntent {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: AgentId,
        market_ticker: MarketTicker,
        action: Action,
        side: Side,
        order_type: OrderType,
        price: u8,
        count: u32,
        confidence: f64,
        generated_at_ms: i64,
    ) -> Self {
        Self {
            agent_id,
            client_order_id: ClientOrderId::generate(),
            market_ticker,
            action,
            side,
            order_type,
            price,
            count,
            confidence,
            generated_at_ms,
        }
    }

    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    #[must_use]
    pub const fn client_order_id(&self) -> ClientOrderId {
        self.client_order_id
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
    pub const fn order_type(&self) -> OrderType {
        self.order_type
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
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    #[must_use]
    pub const fn generated_at_ms(&self) -> i64 {
        self.generated_at_ms
    }

    /// `1 <= price <= 99`, `count > 0`, non-empty ticker. Action/side/type
    /// are statically valid by construction (closed enums); this only
    /// checks what a caller could otherwise get wrong.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (1..=99).contains(&self.price) && self.count > 0 && !self.market_ticker.as_str().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(price: u8, count: u32) -> TradeIntent {
        TradeIntent::new(
            AgentId::generate(),
            MarketTicker::from("BTC-X"),
            Action::Buy,
            Side::Yes,
            OrderType::Limit,
            price,
            count,
            0.8,
            0,
        )
    }

    #[test]
    fn price_boundaries_accept_1_and_99() {
        assert!(intent(1, 1).is_valid());
        assert!(intent(99, 1).is_valid());
    }

    #[test]
    fn price_boundaries_reject_0_and_100() {
        assert!(!intent(0, 1).is_valid());
        assert!(!intent(100, 1).is_valid());
    }

    #[test]
    fn zero_count_is_invalid() {
        assert!(!intent(50, 0).is_valid());
    }

    #[test]
    fn each_intent_gets_a_unique_client_order_id() {
        let a = intent(50, 1);
        let b = intent(50, 1);
        assert_ne!(a.client_order_id(), b.client_order_id());
    }
}
