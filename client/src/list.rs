//! Local mirror of the authoritative task list.
//!
//! Tasks are addressed by position. There is no removal or reordering, so an
//! index stays valid for as long as the list lives (until the next
//! [`TaskList::replace_all`]).

use uuid::Uuid;

use crate::error::ListError;
use crate::types::TaskItem;

/// Ordered in-memory task list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    items: Vec<TaskItem>,
}

impl TaskList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` at the tail and returns its index.
    pub fn append(&mut self, item: TaskItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Marks the task at `index` completed.
    ///
    /// Returns `Ok(true)` if the task changed and `Ok(false)` if it was
    /// already completed. Nothing but the `completed` flag is touched.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::IndexOutOfRange`] if `index` addresses no task.
    pub fn mark_completed(&mut self, index: usize) -> Result<bool, ListError> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(index)
            .ok_or(ListError::IndexOutOfRange { index, len })?;

        if item.completed {
            return Ok(false);
        }
        item.completed = true;
        Ok(true)
    }

    /// Returns a copy of the tasks in display order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TaskItem> {
        self.items.clone()
    }

    /// Replaces the whole list, e.g. with the result of the startup fetch.
    pub fn replace_all(&mut self, items: Vec<TaskItem>) {
        self.items = items;
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TaskItem> {
        self.items.get(index)
    }

    /// Index of the task carrying `id`.
    #[must_use]
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == Some(id))
    }

    /// Resolves a task reference: by `id` when it names a local task,
    /// otherwise by `index`.
    #[must_use]
    pub fn resolve(&self, index: usize, id: Option<Uuid>) -> usize {
        id.and_then(|id| self.position(id)).unwrap_or(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
