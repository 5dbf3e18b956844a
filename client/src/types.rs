//! Wire and domain types shared by the store client, the notification
//! listener and the sync engine.
//!
//! All JSON uses camelCase field names. Correlation tokens are optional
//! everywhere so the client stays compatible with stores that never echo them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification event name for a newly created task.
pub const EVENT_ITEM_CREATED: &str = "items";

/// Notification event name for a completed task.
pub const EVENT_ITEM_COMPLETED: &str = "complete";

/// Event name sent to join a channel.
pub const EVENT_SUBSCRIBE: &str = "subscribe";

/// Event name the store answers a subscribe with.
pub const EVENT_SUBSCRIBED: &str = "subscription_succeeded";

/// A single entry in the task list.
///
/// A task is addressed by its index in the list, which never changes once
/// assigned. Stores that assign ids send them along; when both sides know a
/// task's id it takes precedence over the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl TaskItem {
    /// Creates an incomplete task with the given text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Option<Uuid>) -> Self {
        self.id = id;
        self
    }
}

/// Body of `GET /items`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsResponse {
    /// A missing or `null` list is treated as empty.
    #[serde(default)]
    pub tasks: Option<Vec<TaskItem>>,
}

impl ItemsResponse {
    /// Consumes the response, returning the tasks (empty when absent).
    #[must_use]
    pub fn into_tasks(self) -> Vec<TaskItem> {
        self.tasks.unwrap_or_default()
    }
}

/// Body of `POST /items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Body of `POST /items/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Response body shared by both mutation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Id the store assigned to a created task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// Payload of an `items` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreatedPayload {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Payload of a `complete` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCompletedPayload {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Which mutation a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Created,
    Completed,
}

impl NotificationKind {
    /// The event name used on the notification channel.
    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Created => EVENT_ITEM_CREATED,
            Self::Completed => EVENT_ITEM_COMPLETED,
        }
    }
}

/// A decoded mutation event from the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A task was appended to the store. Applied at the receiver's tail.
    ItemCreated {
        item: TaskItem,
        token: Option<Uuid>,
    },
    /// The task at `index` (or with `id`, when known) was marked complete.
    ItemCompleted {
        index: usize,
        id: Option<Uuid>,
        token: Option<Uuid>,
    },
}

impl Notification {
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::ItemCreated { .. } => NotificationKind::Created,
            Self::ItemCompleted { .. } => NotificationKind::Completed,
        }
    }

    /// The correlation token echoed by the store, if any.
    #[must_use]
    pub fn token(&self) -> Option<Uuid> {
        match self {
            Self::ItemCreated { token, .. } | Self::ItemCompleted { token, .. } => *token,
        }
    }
}

impl From<ItemCreatedPayload> for Notification {
    fn from(payload: ItemCreatedPayload) -> Self {
        Self::ItemCreated {
            item: TaskItem {
                text: payload.text,
                completed: payload.completed,
                id: payload.id,
            },
            token: payload.client_token,
        }
    }
}

impl From<ItemCompletedPayload> for Notification {
    fn from(payload: ItemCompletedPayload) -> Self {
        Self::ItemCompleted {
            index: payload.index,
            id: payload.id,
            token: payload.client_token,
        }
    }
}

/// Outer envelope of every WebSocket text frame on the notification channel.
///
/// `data` is either the payload object itself or a string holding the
/// JSON-encoded payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    /// Builds the frame a client sends to join `channel`.
    #[must_use]
    pub fn subscribe(channel: &str) -> Self {
        Self {
            event: EVENT_SUBSCRIBE.to_string(),
            channel: Some(channel.to_string()),
            data: serde_json::Value::Null,
        }
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    /// Ordered task list.
    pub tasks: Vec<TaskItem>,
    /// Current contents of the input buffer.
    pub input: String,
    /// True while a self-originated echo is expected.
    pub awaiting_echo: bool,
    /// True once the startup fetch has succeeded.
    pub hydrated: bool,
}
