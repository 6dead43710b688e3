//! No-op store used when `DATABASE_PATH` is not configured. Every write is
//! discarded and every read returns empty — the rest of the system runs
//! identically, just without a warm start across restarts.

use async_trait::async_trait;

use super::{MarketRecord, PersistenceStore};
use crate::core::domain::{
    AgentRecord, ClientOrderId, Environment, Fill, FillId, MarketTicker, Order, OrderId,
    OrderStatus, Position,
};
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PersistenceStore for NullStore {
    async fn upsert_market(&self, _record: &MarketRecord) -> Result<()> {
        Ok(())
    }

    async fn insert_order(&self, _order: &Order, _now_ms: i64) -> Result<()> {
        Ok(())
    }

    async fn update_order_status(
        &self,
        _order_id: &OrderId,
        _status: OrderStatus,
        _remaining_count: u32,
        _now_ms: i64,
    ) -> Result<()> {
        Ok(())
    }

    async fn get_open_orders(&self, _environment: Environment) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }

    async fn get_order_by_client_id(
        &self,
        _client_order_id: ClientOrderId,
    ) -> Result<Option<Order>> {
        Ok(None)
    }

    async fn insert_fill(&self, _fill: &Fill, _market_ticker: &MarketTicker) -> Result<()> {
        Ok(())
    }

    async fn fill_exists(&self, _fill_id: &FillId) -> Result<bool> {
        Ok(false)
    }

    async fn upsert_position(&self, _position: &Position) -> Result<()> {
        Ok(())
    }

    async fn get_positions(&self, _environment: Environment) -> Result<Vec<Position>> {
        Ok(Vec::new())
    }

    async fn load_agent_states(&self) -> Result<Vec<AgentRecord>> {
        Ok(Vec::new())
    }

    async fn upsert_agent_state(&self, _record: &AgentRecord, _now_ms: i64) -> Result<()> {
        Ok(())
    }

    async fn get_config(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set_config(&self, _key: &str, _value: &str, _now_ms: i64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_read_is_empty_and_every_write_succeeds() {
        let store = NullStore::new();
        assert!(store
            .get_open_orders(Environment::Demo)
            .await
            .unwrap()
            .is_empty());
        assert!(!store.fill_exists(&FillId::new("F1")).await.unwrap());
        assert!(store.get_config("k").await.unwrap().is_none());
    }
}
