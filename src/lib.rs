//! kalshid - An automated trading backend for the Kalshi prediction market
//! exchange.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/             # Reusable library components
//! │   ├── domain/       # Pure domain types (markets, orders, fills, agents)
//! │   ├── kalshi/       # REST + WebSocket clients, request signing
//! │   ├── agent/        # Strategy trait, agent runtime, supervisor
//! │   ├── persistence/  # PersistenceStore trait, SQLite + null backends
//! │   └── (cache, discovery, dispatcher, execution, permission,
//! │        reconciliation, broadcast)
//! ├── app/              # Application orchestration (boot/shutdown)
//! ├── config.rs         # TOML + env-var configuration
//! └── cli.rs            # `run` / `status` subcommands
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
