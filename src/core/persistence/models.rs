//! Diesel row types. Translated 1:1 from the original system's schema
//! definitions, with `environment` carried as a column rather than a
//! Postgres schema.

use diesel::prelude::*;

use super::schema::{agent_state, fills, markets, orders, positions, system_config};

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = markets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketRow {
    pub market_ticker: String,
    pub event_ticker: String,
    pub series_ticker: String,
    pub title: String,
    pub subtitle: String,
    pub market_status: String,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub settlement_price: Option<i32>,
    pub internal_state: String,
    pub discovery_time: String,
    pub last_sync_time: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrderRow {
    pub order_id: String,
    pub client_order_id: String,
    pub agent_id: String,
    pub market_ticker: String,
    pub action: String,
    pub side: String,
    pub order_type: String,
    pub price: i32,
    pub count: i32,
    pub remaining_count: i32,
    pub status: String,
    pub environment: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = fills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FillRow {
    pub fill_id: String,
    pub order_id: String,
    pub market_ticker: String,
    pub action: String,
    pub side: String,
    pub price: i32,
    pub count: i32,
    pub is_taker: bool,
    pub environment: String,
    pub filled_at: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = positions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PositionRow {
    pub market_ticker: String,
    pub environment: String,
    pub yes_count: i64,
    pub no_count: i64,
    pub average_yes_price: i32,
    pub average_no_price: i32,
    pub realized_pnl_cents: i64,
    pub unrealized_pnl_cents: i64,
    pub last_updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = agent_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AgentStateRow {
    pub agent_id: String,
    pub agent_name: String,
    pub enabled: bool,
    pub mode: String,
    pub lifecycle_state: String,
    pub last_decision_at: Option<String>,
    pub internal_state_blob: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = system_config)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SystemConfigRow {
    pub config_key: String,
    pub config_value: String,
    pub updated_at: String,
}
