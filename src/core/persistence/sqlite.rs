//! SQLite-backed implementation of [`PersistenceStore`] using Diesel, in
//! the same shape as the teacher's `core::db` + `core::store::sqlite`
//! pair: an r2d2 connection pool plus one row-mapping module per table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use super::models::{AgentStateRow, FillRow, MarketRow, OrderRow, PositionRow, SystemConfigRow};
use super::schema::{agent_state, fills, markets, orders, positions, system_config};
use super::{MarketRecord, PersistenceStore};
use crate::core::domain::{
    Action, AgentLifecycleState, AgentMode, AgentRecord, ClientOrderId, Environment, EventTicker,
    Fill, FillId, MarketStatus, MarketTicker, Order, OrderId, OrderStatus, Position, SeriesTicker,
    Side,
};
use crate::error::{Error, Result};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Create a connection pool for the given database file (or `:memory:`)
/// and run any pending migrations against it.
///
/// # Errors
/// Returns an error if the pool cannot be created or migrations fail.
pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .map_err(|e| Error::Connection(e.to_string()))?;
    let mut conn = pool.get().map_err(|e| Error::Connection(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Database(e.to_string()))?;
    Ok(pool)
}

fn ms_to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339()
}

fn rfc3339_to_ms(s: &str) -> i64 {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

fn status_to_str(status: MarketStatus) -> &'static str {
    match status {
        MarketStatus::Open => "open",
        MarketStatus::Closed => "closed",
        MarketStatus::Settled => "settled",
        MarketStatus::Halted => "halted",
    }
}

fn status_from_str(s: &str) -> MarketStatus {
    match s {
        "closed" => MarketStatus::Closed,
        "settled" => MarketStatus::Settled,
        "halted" => MarketStatus::Halted,
        _ => MarketStatus::Open,
    }
}

fn order_status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Resting => "resting",
        OrderStatus::Filled => "filled",
        OrderStatus::PartiallyFilled => "partially_filled",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Expired => "expired",
        OrderStatus::Failed => "failed",
    }
}

fn order_status_from_str(s: &str) -> OrderStatus {
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

fn action_to_str(action: Action) -> &'static str {
    match action {
        Action::Buy => "buy",
        Action::Sell => "sell",
    }
}

fn action_from_str(s: &str) -> Action {
    if s == "sell" {
        Action::Sell
    } else {
        Action::Buy
    }
}

fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::Yes => "yes",
        Side::No => "no",
    }
}

fn side_from_str(s: &str) -> Side {
    if s == "no" {
        Side::No
    } else {
        Side::Yes
    }
}

fn mode_to_str(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Auto => "Auto",
        AgentMode::SemiAuto => "SemiAuto",
        AgentMode::FullStop => "FullStop",
    }
}

fn mode_from_str(s: &str) -> AgentMode {
    match s {
        "Auto" => AgentMode::Auto,
        "SemiAuto" => AgentMode::SemiAuto,
        _ => AgentMode::FullStop,
    }
}

fn lifecycle_to_str(state: AgentLifecycleState) -> &'static str {
    match state {
        AgentLifecycleState::Initializing => "INITIALIZING",
        AgentLifecycleState::Active => "ACTIVE",
        AgentLifecycleState::Idle => "IDLE",
        AgentLifecycleState::Paused => "PAUSED",
        AgentLifecycleState::Error => "ERROR",
        AgentLifecycleState::Stopped => "STOPPED",
    }
}

fn lifecycle_from_str(s: &str) -> AgentLifecycleState {
    match s {
        "ACTIVE" => AgentLifecycleState::Active,
        "IDLE" => AgentLifecycleState::Idle,
        "PAUSED" => AgentLifecycleState::Paused,
        "ERROR" => AgentLifecycleState::Error,
        "STOPPED" => AgentLifecycleState::Stopped,
        _ => AgentLifecycleState::Initializing,
    }
}

fn order_from_row(row: OrderRow) -> Result<Order> {
    let client_order_id = row
        .client_order_id
        .parse::<uuid::Uuid>()
        .map(ClientOrderId::new)
        .map_err(|e| Error::Database(e.to_string()))?;
    let agent_id = row
        .agent_id
        .parse::<uuid::Uuid>()
        .map(crate::core::domain::AgentId::new)
        .map_err(|e| Error::Database(e.to_string()))?;
    let environment = row
        .environment
        .parse::<Environment>()
        .map_err(Error::Database)?;
    let mut order = Order::new(
        OrderId::new(row.order_id),
        client_order_id,
        agent_id,
        MarketTicker::from(row.market_ticker.as_str()),
        action_from_str(&row.action),
        side_from_str(&row.side),
        row.price as u8,
        row.count as u32,
        order_status_from_str(&row.status),
        environment,
    );
    let filled = (row.count - row.remaining_count).max(0) as u32;
    if filled > 0 {
        order.apply_fill(filled);
    }
    order.set_status(order_status_from_str(&row.status));
    Ok(order)
}

/// SQLite-backed [`PersistenceStore`].
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn upsert_market(&self, record: &MarketRecord) -> Result<()> {
        let row = MarketRow {
            market_ticker: record.market_ticker.as_str().to_string(),
            event_ticker: record.event_ticker.as_str().to_string(),
            series_ticker: record.series_ticker.as_str().to_string(),
            title: record.title.clone(),
            subtitle: record.subtitle.clone(),
            market_status: status_to_str(record.status).to_string(),
            open_time: None,
            close_time: None,
            settlement_price: None,
            internal_state: record.internal_state.clone(),
            discovery_time: ms_to_rfc3339(record.discovery_time_ms),
            last_sync_time: ms_to_rfc3339(record.last_sync_time_ms),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::replace_into(markets::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order, now_ms: i64) -> Result<()> {
        let row = OrderRow {
            order_id: order.order_id().as_str().to_string(),
            client_order_id: order.client_order_id().to_string(),
            agent_id: order.agent_id().to_string(),
            market_ticker: order.market_ticker().as_str().to_string(),
            action: action_to_str(order.action()).to_string(),
            side: side_to_str(order.side()).to_string(),
            order_type: "limit".to_string(),
            price: i32::from(order.price()),
            count: order.count() as i32,
            remaining_count: order.remaining_count() as i32,
            status: order_status_to_str(order.status()).to_string(),
            environment: order.environment().as_str().to_string(),
            created_at: ms_to_rfc3339(now_ms),
            updated_at: ms_to_rfc3339(now_ms),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::replace_into(orders::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        remaining_count: u32,
        now_ms: i64,
    ) -> Result<()> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::update(orders::table.find(order_id.as_str()))
            .set((
                orders::status.eq(order_status_to_str(status)),
                orders::remaining_count.eq(remaining_count as i32),
                orders::updated_at.eq(ms_to_rfc3339(now_ms)),
            ))
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_open_orders(&self, environment: Environment) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let rows: Vec<OrderRow> = orders::table
            .filter(orders::environment.eq(environment.as_str()))
            .filter(
                orders::status
                    .eq("pending")
                    .or(orders::status.eq("resting"))
                    .or(orders::status.eq("partially_filled")),
            )
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.into_iter().map(order_from_row).collect()
    }

    async fn get_order_by_client_id(
        &self,
        client_order_id: ClientOrderId,
    ) -> Result<Option<Order>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let row: Option<OrderRow> = orders::table
            .filter(orders::client_order_id.eq(client_order_id.to_string()))
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        row.map(order_from_row).transpose()
    }

    async fn insert_fill(&self, fill: &Fill, market_ticker: &MarketTicker) -> Result<()> {
        let row = FillRow {
            fill_id: fill.fill_id().as_str().to_string(),
            order_id: fill.order_id().as_str().to_string(),
            market_ticker: market_ticker.as_str().to_string(),
            action: action_to_str(fill.action()).to_string(),
            side: side_to_str(fill.side()).to_string(),
            price: i32::from(fill.price()),
            count: fill.count() as i32,
            is_taker: fill.is_taker(),
            environment: fill.environment().as_str().to_string(),
            filled_at: ms_to_rfc3339(fill.filled_at_ms()),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::insert_or_ignore_into(fills::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn fill_exists(&self, fill_id: &FillId) -> Result<bool> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let row: Option<String> = fills::table
            .find(fill_id.as_str())
            .select(fills::fill_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let row = PositionRow {
            market_ticker: position.market_ticker().as_str().to_string(),
            environment: position.environment().as_str().to_string(),
            yes_count: position.yes_count(),
            no_count: position.no_count(),
            average_yes_price: i32::from(position.average_yes_price()),
            average_no_price: i32::from(position.average_no_price()),
            realized_pnl_cents: position.realized_pnl_cents(),
            unrealized_pnl_cents: position.unrealized_pnl_cents(),
            last_updated_at: ms_to_rfc3339(position.last_updated_ms()),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::replace_into(positions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_positions(&self, environment: Environment) -> Result<Vec<Position>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let rows: Vec<PositionRow> = positions::table
            .filter(positions::environment.eq(environment.as_str()))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut position = Position::new(
                    MarketTicker::from(row.market_ticker.as_str()),
                    environment,
                    rfc3339_to_ms(&row.last_updated_at),
                );
                position.overwrite(
                    row.yes_count,
                    row.no_count,
                    row.average_yes_price as u8,
                    row.average_no_price as u8,
                    row.realized_pnl_cents,
                    row.unrealized_pnl_cents,
                    rfc3339_to_ms(&row.last_updated_at),
                );
                position
            })
            .collect())
    }

    async fn load_agent_states(&self) -> Result<Vec<AgentRecord>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let rows: Vec<AgentStateRow> = agent_state::table
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let agent_id = row
                    .agent_id
                    .parse::<uuid::Uuid>()
                    .map(crate::core::domain::AgentId::new)
                    .map_err(|e| Error::Database(e.to_string()))?;
                let mut record = AgentRecord::new(
                    agent_id,
                    row.agent_name,
                    row.enabled,
                    mode_from_str(&row.mode),
                );
                record.set_lifecycle_state(lifecycle_from_str(&row.lifecycle_state));
                Ok(record)
            })
            .collect()
    }

    async fn upsert_agent_state(&self, record: &AgentRecord, now_ms: i64) -> Result<()> {
        let row = AgentStateRow {
            agent_id: record.agent_id().to_string(),
            agent_name: record.name().to_string(),
            enabled: record.enabled(),
            mode: mode_to_str(record.mode()).to_string(),
            lifecycle_state: lifecycle_to_str(record.lifecycle_state()).to_string(),
            last_decision_at: None,
            internal_state_blob: None,
            created_at: ms_to_rfc3339(now_ms),
            updated_at: ms_to_rfc3339(now_ms),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::replace_into(agent_state::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let row: Option<SystemConfigRow> = system_config::table
            .find(key)
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.map(|r| r.config_value))
    }

    async fn set_config(&self, key: &str, value: &str, now_ms: i64) -> Result<()> {
        let row = SystemConfigRow {
            config_key: key.to_string(),
            config_value: value.to_string(),
            updated_at: ms_to_rfc3339(now_ms),
        };
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        diesel::replace_into(system_config::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
