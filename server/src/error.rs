//! Error types for the tasksync server.
//!
//! Every [`ServerError`] becomes a JSON `{"status": false, "message": ...}`
//! response, so clients show the same text whatever went wrong.

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::types::MutationResponse;

/// A request the store refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// `POST /items` with a blank title.
    EmptyTitle,

    /// No task at the requested index.
    NoSuchTask { index: usize },

    /// No task with the requested id.
    UnknownId { id: Uuid },

    /// The task is already completed.
    AlreadyCompleted { index: usize },

    /// The request body could not be decoded.
    BadRequest(String),
}

impl ServerError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyTitle => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoSuchTask { .. } | Self::UnknownId { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyCompleted { .. } => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title cannot be empty"),
            Self::NoSuchTask { index } => write!(f, "no task at index {index}"),
            Self::UnknownId { id } => write!(f, "no task with id {id}"),
            Self::AlreadyCompleted { index } => write!(f, "task {index} is already completed"),
            Self::BadRequest(msg) => write!(f, "invalid request body: {msg}"),
        }
    }
}

impl Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(MutationResponse::rejected(self.to_string()))).into_response()
    }
}
