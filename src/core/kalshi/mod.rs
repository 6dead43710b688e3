//! Kalshi exchange protocol adapter: signed REST client, rate limiting,
//! and the persistent authenticated WebSocket feed.

pub mod client;
pub mod messages;
pub mod rate_limit;
pub mod rest;
pub mod ws;

pub use client::{order_body, MarketsPage};
pub use messages::{InboundMessage, WsEvent};
pub use rate_limit::RateLimiter;
pub use rest::{Credentials, RestClient};
pub use ws::KalshiWebSocketClient;
