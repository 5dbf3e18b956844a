//! HTTP client for the authoritative task store.
//!
//! Three endpoints are used:
//!
//! - `GET /items` - startup hydration
//! - `POST /items` - create a task
//! - `POST /items/complete` - complete a task by index
//!
//! Requests are never retried. A failed mutation is reported once and the
//! user decides whether to try again.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RemoteError;
use crate::types::{CompleteRequest, CreateRequest, ItemsResponse, MutationResponse, TaskItem};

/// Message shown when the store rejects a create without saying why.
pub const CREATE_REJECTED_MESSAGE: &str = "Could not add TODO item";

/// Message shown when the store rejects a completion without saying why.
pub const COMPLETE_REJECTED_MESSAGE: &str = "Could not complete TODO item";

/// Client for the task store's HTTP API.
#[derive(Debug, Clone)]
pub struct StoreClient {
    base_url: String,
    client: Client,
}

impl StoreClient {
    /// Creates a client for the store at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Store base URL, e.g. `http://localhost:5200`
    /// * `timeout` - Applied to every request
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the full task list.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure, non-2xx status or an
    /// undecodable body.
    pub async fn fetch_items(&self) -> Result<Vec<TaskItem>, RemoteError> {
        let url = format!("{}/items", self.base_url);
        debug!(url = %url, "Fetching task list");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let body: ItemsResponse = response.json().await?;
        let tasks = body.into_tasks();
        info!(tasks = tasks.len(), "Task list fetched");
        Ok(tasks)
    }

    /// Asks the store to create a task. Returns the id the store assigned,
    /// if it assigns ids.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Rejected` if the store answers `status: false`,
    /// otherwise see [`fetch_items`](Self::fetch_items).
    pub async fn create_item(&self, request: &CreateRequest) -> Result<Option<Uuid>, RemoteError> {
        self.post_mutation("/items", request, CREATE_REJECTED_MESSAGE)
            .await
    }

    /// Asks the store to mark the task at `request.index` complete.
    ///
    /// # Errors
    ///
    /// Same as [`create_item`](Self::create_item).
    pub async fn complete_item(&self, request: &CompleteRequest) -> Result<(), RemoteError> {
        self.post_mutation("/items/complete", request, COMPLETE_REJECTED_MESSAGE)
            .await
            .map(|_| ())
    }

    async fn post_mutation<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        rejected_message: &str,
    ) -> Result<Option<Uuid>, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Sending mutation");

        let response = match self.client.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Mutation request failed");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err = status_error(status, response).await;
            warn!(url = %url, status = status.as_u16(), error = %err, "Store returned error status");
            return Err(err);
        }

        let body: MutationResponse = response.json().await?;
        if body.status {
            debug!(url = %url, id = ?body.id, "Mutation accepted");
            Ok(body.id)
        } else {
            let message = body
                .message
                .unwrap_or_else(|| rejected_message.to_string());
            warn!(url = %url, message = %message, "Mutation rejected by store");
            Err(RemoteError::Rejected { message })
        }
    }
}

/// Error bodies only need a `message`; `status` may be absent.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Builds the error for a non-2xx response, preferring the store's message.
async fn status_error(status: StatusCode, response: Response) -> RemoteError {
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

    RemoteError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = StoreClient::new("http://localhost:5200/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5200");
    }

    #[tokio::test]
    async fn unreachable_store_is_a_transport_error() {
        // Grab a free port, then close it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            StoreClient::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();
        let err = client
            .create_item(&CreateRequest {
                title: "Buy milk".to_string(),
                client_token: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
