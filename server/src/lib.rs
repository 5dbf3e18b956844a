//! tasksync server - authoritative task store with live notifications.
//!
//! This crate provides the server side of tasksync, responsible for:
//! - Holding the ordered task list in memory
//! - Applying create and complete requests
//! - Broadcasting every applied change to subscribed WebSocket clients
//!
//! # Architecture
//!
//! Mutations and their broadcasts happen under one write lock, so every
//! subscriber sees changes in the order the store applied them. Nothing is
//! persisted; the list lives as long as the process.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;
pub mod types;

pub use broadcast::EventBroadcaster;
pub use config::{Config, ConfigError};
pub use error::ServerError;
pub use routes::{create_router, serve, AppState, HealthResponse};
pub use store::TaskStore;
