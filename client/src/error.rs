//! Error types for the tasksync client.
//!
//! Errors are split by where they are detected:
//!
//! - [`ValidationError`] - local precondition failures; never reach the network
//! - [`RemoteError`] - the store rejected a request or could not be reached
//! - [`ChannelError`] - the notification channel failed or sent garbage
//! - [`ListError`] - an index did not address a task in the local list
//!
//! [`SyncError`] wraps all of them for callers that don't care which.
//! The `Display` text of [`ValidationError`] and [`RemoteError`] is what the
//! user sees through the notifier.

use thiserror::Error;

use crate::config::ConfigError;

/// Minimum task text length (exclusive), counted after trimming.
pub const MIN_TASK_TEXT_LEN: usize = 5;

/// Checks that task text is long enough to be sent.
///
/// # Errors
///
/// Returns `ValidationError::TooShort` if the trimmed text has
/// [`MIN_TASK_TEXT_LEN`] characters or fewer.
pub fn validate_task_text(text: &str) -> std::result::Result<(), ValidationError> {
    let length = text.trim().chars().count();
    if length <= MIN_TASK_TEXT_LEN {
        return Err(ValidationError::TooShort { length });
    }
    Ok(())
}

/// A local precondition was not met.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Task text is 5 characters or fewer after trimming.
    #[error("Todo item cannot be less than 5 characters")]
    TooShort { length: usize },

    /// The index does not address a task.
    #[error("no task at index {index}")]
    NoSuchTask { index: usize },

    /// The task is already completed.
    #[error("task {index} is already completed")]
    AlreadyCompleted { index: usize },
}

/// The authoritative store did not accept a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store answered 2xx with `status: false`.
    #[error("{message}")]
    Rejected { message: String },

    /// The store answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request never produced a usable response (connect failure,
    /// timeout, malformed body).
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// The notification channel failed.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Connecting, subscribing or reading the WebSocket failed.
    #[error("notification channel error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame or payload could not be decoded.
    #[error("malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The server closed the stream.
    #[error("notification stream closed by server")]
    Closed,
}

/// An index did not address a task in the local list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("index {index} is out of range for a list of {len} tasks")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Any error produced by the client.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    List(#[from] ListError),

    /// The engine task has exited and no longer accepts commands.
    #[error("sync engine is not running")]
    EngineStopped,
}

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
