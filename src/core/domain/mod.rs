//! Core domain types.
//!
//! ## Market types
//! - [`market::MarketState`] — one per subscribed ticker, derived-field
//!   invariants enforced on every write.
//! - [`market::MarketOrderbook`], [`market::OrderbookLevel`] — resting book.
//!
//! ## Trading types
//! - [`trade_intent::TradeIntent`] — the only message an agent may emit.
//! - [`order::Order`], [`order::Fill`] — execution-engine-owned state.
//! - [`position::Position`] — net exposure per market per environment.
//!
//! ## Agent types
//! - [`agent::AgentRecord`], [`agent::AgentMode`], [`agent::AgentLifecycleState`].
//!
//! ## Identifiers
//! - [`id`] — newtype wrappers for every identity in the system.

pub mod agent;
pub mod environment;
pub mod id;
pub mod market;
pub mod order;
pub mod position;
pub mod subscription;
pub mod trade_intent;

pub use agent::{AgentLifecycleState, AgentMode, AgentRecord};
pub use environment::Environment;
pub use id::{AgentId, ClientOrderId, EventTicker, FillId, MarketTicker, OrderId, SeriesTicker};
pub use market::{MarketOrderbook, MarketState, MarketStatus, OrderbookLevel, RecentTrade};
pub use order::{Fill, Order, OrderStatus};
pub use position::Position;
pub use subscription::{Channel, Subscription};
pub use trade_intent::{Action, OrderType, Side, TradeIntent};
