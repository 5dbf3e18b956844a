//! In-memory authoritative task list.
//!
//! Appends and completions take the write lock and broadcast while still
//! holding it, so subscribers observe notifications in exactly the order the
//! mutations were applied.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::broadcast::EventBroadcaster;
use crate::error::ServerError;
use crate::types::{Notification, TaskItem};

/// Shared task list plus the channel its changes are announced on.
#[derive(Debug, Clone)]
pub struct TaskStore {
    items: Arc<RwLock<Vec<TaskItem>>>,
    broadcaster: EventBroadcaster,
}

impl TaskStore {
    #[must_use]
    pub fn new(broadcaster: EventBroadcaster) -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            broadcaster,
        }
    }

    #[must_use]
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Returns a copy of the list in order.
    pub async fn list(&self) -> Vec<TaskItem> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Appends a task and announces it. Returns the id it was given.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::EmptyTitle` if `title` is blank.
    pub async fn create(
        &self,
        title: String,
        client_token: Option<Uuid>,
    ) -> Result<Uuid, ServerError> {
        if title.trim().is_empty() {
            return Err(ServerError::EmptyTitle);
        }

        let mut items = self.items.write().await;
        let item = TaskItem::new(title);
        let id = item.id;
        items.push(item.clone());
        let index = items.len() - 1;

        let receivers = self.broadcaster.broadcast(Notification::ItemCreated {
            item,
            client_token,
        });
        info!(index, %id, receivers, "Task created");
        Ok(id)
    }

    /// Marks a task completed and announces it.
    ///
    /// The task is looked up by `id` when one is given, otherwise by `index`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownId`, `NoSuchTask` or `AlreadyCompleted`.
    pub async fn complete(
        &self,
        index: usize,
        id: Option<Uuid>,
        client_token: Option<Uuid>,
    ) -> Result<(), ServerError> {
        let mut items = self.items.write().await;
        let index = match id {
            Some(id) => items
                .iter()
                .position(|item| item.id == id)
                .ok_or(ServerError::UnknownId { id })?,
            None => index,
        };
        let item = items
            .get_mut(index)
            .ok_or(ServerError::NoSuchTask { index })?;
        if item.completed {
            return Err(ServerError::AlreadyCompleted { index });
        }
        item.completed = true;
        let id = item.id;

        let receivers = self.broadcaster.broadcast(Notification::ItemCompleted {
            index,
            id,
            client_token,
        });
        info!(index, %id, receivers, "Task completed");
        Ok(())
    }
}
