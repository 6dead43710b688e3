//! Reusable library components: the exchange protocol, the domain model,
//! and the trading loop built on top of them. Everything under `core` is
//! exchange/runtime plumbing; `app` wires it together into a process.

pub mod agent;
pub mod auth;
pub mod broadcast;
pub mod cache;
pub mod discovery;
pub mod dispatcher;
pub mod domain;
pub mod execution;
pub mod kalshi;
pub mod permission;
pub mod persistence;
pub mod reconciliation;
