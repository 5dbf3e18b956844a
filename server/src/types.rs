//! Wire types for the tasksync server.
//!
//! JSON field names are camelCase. `clientToken` is optional on every request
//! and, when present, is copied verbatim into the resulting broadcast so that
//! the originating client can recognize its own echo.
//!
//! Every task carries an `id` assigned by the store. Completions may address
//! a task by `id`; the `index` is still sent for clients that predate ids.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event name broadcast when a task is appended.
pub const EVENT_ITEM_CREATED: &str = "items";

/// Event name broadcast when a task is completed.
pub const EVENT_ITEM_COMPLETED: &str = "complete";

/// Event name clients send to join a channel.
pub const EVENT_SUBSCRIBE: &str = "subscribe";

/// Event name sent back once a subscription is active.
pub const EVENT_SUBSCRIBED: &str = "subscription_succeeded";

/// One entry of the task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub text: String,
    pub completed: bool,
    pub id: Uuid,
}

impl TaskItem {
    /// An incomplete task with a fresh id.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            id: Uuid::new_v4(),
        }
    }
}

/// Body of `GET /items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub tasks: Vec<TaskItem>,
}

/// Body of `POST /items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Body of `POST /items/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteItemRequest {
    pub index: usize,
    /// Takes precedence over `index` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}

/// Response of both mutation endpoints, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Id of the task a create appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl MutationResponse {
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            status: true,
            message: None,
            id: None,
        }
    }

    #[must_use]
    pub fn created(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::accepted()
        }
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            id: None,
        }
    }
}

/// A mutation that has been applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ItemCreated {
        item: TaskItem,
        client_token: Option<Uuid>,
    },
    ItemCompleted {
        index: usize,
        id: Uuid,
        client_token: Option<Uuid>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemCreatedData<'a> {
    text: &'a str,
    completed: bool,
    id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemCompletedData {
    index: usize,
    id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<Uuid>,
}

impl Notification {
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ItemCreated { .. } => EVENT_ITEM_CREATED,
            Self::ItemCompleted { .. } => EVENT_ITEM_COMPLETED,
        }
    }

    /// Wraps the notification in the envelope sent on `channel`.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the payload cannot be encoded.
    pub fn to_frame(&self, channel: &str) -> Result<Frame, serde_json::Error> {
        let data = match self {
            Self::ItemCreated { item, client_token } => serde_json::to_value(ItemCreatedData {
                text: &item.text,
                completed: item.completed,
                id: item.id,
                client_token: *client_token,
            })?,
            Self::ItemCompleted {
                index,
                id,
                client_token,
            } => serde_json::to_value(ItemCompletedData {
                index: *index,
                id: *id,
                client_token: *client_token,
            })?,
        };

        Ok(Frame {
            event: self.event_name().to_string(),
            channel: Some(channel.to_string()),
            data,
        })
    }
}

/// Envelope of every WebSocket text frame, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    /// The acknowledgement sent after a successful subscribe.
    #[must_use]
    pub fn subscribed(channel: &str) -> Self {
        Self {
            event: EVENT_SUBSCRIBED.to_string(),
            channel: Some(channel.to_string()),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Returns the requested channel if this is a subscribe frame.
    #[must_use]
    pub fn subscribe_channel(&self) -> Option<&str> {
        if self.event == EVENT_SUBSCRIBE {
            self.channel.as_deref()
        } else {
            None
        }
    }
}
