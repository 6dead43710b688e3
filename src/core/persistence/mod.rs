//! Durable storage facade. Everything above this layer (discovery, the
//! execution engine, the agent runtime) talks to a `dyn PersistenceStore`
//! and never touches Diesel directly — mirroring the teacher's
//! `RelationStore`/`ClusterStore` split between trait and backend.
//!
//! A missing `DATABASE_PATH` is not fatal: [`NullStore`] satisfies the same
//! trait with no-ops, so the rest of the system runs identically without a
//! database, just without a warm start across restarts.

pub mod models;
mod null;
pub mod schema;
mod sqlite;

use async_trait::async_trait;

use crate::core::domain::{
    AgentRecord, ClientOrderId, Environment, EventTicker, FillId, MarketStatus, MarketTicker,
    Order, OrderId, OrderStatus, Position, SeriesTicker,
};
use crate::error::Result;

pub use null::NullStore;
pub use sqlite::{create_pool, DbPool, SqliteStore};

/// A discovery-sourced market row, persisted independently of the
/// in-memory [`crate::core::cache::MarketCache`].
#[derive(Debug, Clone)]
pub struct MarketRecord {
    pub market_ticker: MarketTicker,
    pub event_ticker: EventTicker,
    pub series_ticker: SeriesTicker,
    pub title: String,
    pub subtitle: String,
    pub status: MarketStatus,
    /// One of `ACTIVE`, `WATCHLIST`, `INACTIVE`, `IGNORED` — discovery's
    /// internal classification, independent of the exchange's own status.
    pub internal_state: String,
    pub discovery_time_ms: i64,
    pub last_sync_time_ms: i64,
}

/// Storage operations the rest of the system depends on. Object-safe via
/// `async_trait` so the orchestrator can hold a single `Arc<dyn
/// PersistenceStore>` chosen at startup between [`SqliteStore`] and
/// [`NullStore`].
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn upsert_market(&self, record: &MarketRecord) -> Result<()>;

    async fn insert_order(&self, order: &Order, now_ms: i64) -> Result<()>;

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        remaining_count: u32,
        now_ms: i64,
    ) -> Result<()>;

    async fn get_open_orders(&self, environment: Environment) -> Result<Vec<Order>>;

    async fn get_order_by_client_id(
        &self,
        client_order_id: ClientOrderId,
    ) -> Result<Option<Order>>;

    async fn insert_fill(&self, fill: &crate::core::domain::Fill, market_ticker: &MarketTicker) -> Result<()>;

    async fn fill_exists(&self, fill_id: &FillId) -> Result<bool>;

    async fn upsert_position(&self, position: &Position) -> Result<()>;

    async fn get_positions(&self, environment: Environment) -> Result<Vec<Position>>;

    async fn load_agent_states(&self) -> Result<Vec<AgentRecord>>;

    async fn upsert_agent_state(&self, record: &AgentRecord, now_ms: i64) -> Result<()>;

    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    async fn set_config(&self, key: &str, value: &str, now_ms: i64) -> Result<()>;
}
