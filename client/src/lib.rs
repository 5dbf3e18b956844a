//! tasksync client - shared task list kept in sync with a remote store.
//!
//! Several clients edit one ordered task list held by an authoritative store.
//! Each client keeps a local copy, applies its own changes optimistically once
//! the store has accepted them, and applies everybody else's changes as they
//! arrive on a push notification channel.
//!
//! # Overview
//!
//! Because the store broadcasts every change to every subscriber, a client
//! also receives the changes it made itself. The [`echo`] filter recognizes
//! those echoes so each change lands in the local list exactly once.
//!
//! # Modules
//!
//! - [`types`]: Task items, wire bodies and notifications
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for client operations
//! - [`list`]: Local ordered task list
//! - [`echo`]: Origin-echo filter, single-slot or correlated
//! - [`store`]: HTTP client for the task store
//! - [`listener`]: WebSocket notification listener with reconnect
//! - [`engine`]: Sync engine that serializes every event touching local state

pub mod config;
pub mod echo;
pub mod engine;
pub mod error;
pub mod list;
pub mod listener;
pub mod store;
pub mod types;

pub use config::{CompletionFailurePolicy, Config, ConfigError, EchoMode};
pub use echo::{Decision, EchoFilter};
pub use engine::{
    start, Command, EngineOptions, Notifier, RunningClient, SyncEngine, SyncHandle, SyncState,
};
pub use error::{ChannelError, ListError, RemoteError, Result, SyncError, ValidationError};
pub use list::TaskList;
pub use listener::{decode_frame, Backoff, ChannelEvent, NotificationListener};
pub use store::StoreClient;
pub use types::{Notification, NotificationKind, TaskItem, View};
