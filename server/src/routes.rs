//! HTTP route handlers for the tasksync server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /items` - Full task list
//! - `POST /items` - Append a task
//! - `POST /items/complete` - Complete a task by id or index
//! - `GET /ws` - WebSocket notification channel
//! - `GET /health` - Health check endpoint
//!
//! # WebSocket Protocol
//!
//! A client sends `{"event": "subscribe", "channel": "todo"}`. Once the
//! channel matches the server's, the server answers with a
//! `subscription_succeeded` frame and from then on forwards every
//! notification as `{"event", "channel", "data"}` text frames.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket},
        DefaultBodyLimit, State, WebSocketUpgrade,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::error::ServerError;
use crate::store::TaskStore;
use crate::types::{
    CompleteItemRequest, CreateItemRequest, Frame, ItemsResponse, MutationResponse, Notification,
};

/// Maximum request body size (64 KB).
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// The authoritative task list.
    pub store: TaskStore,

    /// Broadcaster the store announces changes on.
    pub broadcaster: EventBroadcaster,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates state with an empty store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_store(config, TaskStore::new(EventBroadcaster::new()))
    }

    /// Creates state around an existing store.
    #[must_use]
    pub fn with_store(config: Config, store: TaskStore) -> Self {
        Self {
            config: Arc::new(config),
            broadcaster: store.broadcaster().clone(),
            store,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("broadcaster", &self.broadcaster)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/items", get(get_items).post(post_item))
        .route("/items/complete", post(post_complete))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Task list endpoints
// ============================================================================

async fn get_items(State(state): State<AppState>) -> Json<ItemsResponse> {
    Json(ItemsResponse {
        tasks: state.store.list().await,
    })
}

async fn post_item(
    State(state): State<AppState>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, ServerError> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let id = state
        .store
        .create(request.title, request.client_token)
        .await
        .inspect_err(|e| debug!(error = %e, "Create rejected"))?;
    Ok(Json(MutationResponse::created(id)))
}

async fn post_complete(
    State(state): State<AppState>,
    payload: Result<Json<CompleteItemRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, ServerError> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    state
        .store
        .complete(request.index, request.id, request.client_token)
        .await
        .inspect_err(|e| debug!(error = %e, "Completion rejected"))?;
    Ok(Json(MutationResponse::accepted()))
}

// ============================================================================
// GET /ws - Notification channel
// ============================================================================

async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    debug!("WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handles an established WebSocket connection.
///
/// Notifications are only forwarded after the client subscribes to the
/// server's channel.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let mut sender = Some(sender);
    let mut forward_task = None;

    info!("WebSocket client connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Frame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(error = %err, "Ignoring undecodable client frame");
                        continue;
                    }
                };

                match frame.subscribe_channel() {
                    Some(channel) if channel == state.config.channel => {
                        if let Some(sink) = sender.take() {
                            let notifications = state.broadcaster.subscribe();
                            let channel = state.config.channel.clone();
                            info!(channel = %channel, "WebSocket client subscribed");
                            forward_task =
                                Some(tokio::spawn(forward(sink, notifications, channel)));
                        }
                    }
                    Some(channel) => debug!(channel, "Subscribe to unknown channel ignored"),
                    None => trace!(event = %frame.event, "Ignoring client frame"),
                }
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket client sent close frame");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    if let Some(task) = forward_task {
        task.abort();
    }
    info!("WebSocket client disconnected");
}

/// Acknowledges the subscription, then forwards notifications until the
/// client goes away.
async fn forward(
    mut sink: SplitSink<WebSocket, Message>,
    mut notifications: Receiver<Notification>,
    channel: String,
) {
    if send_frame(&mut sink, &Frame::subscribed(&channel)).await.is_err() {
        return;
    }

    loop {
        match notifications.recv().await {
            Ok(notification) => {
                let frame = match notification.to_frame(&channel) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(error = %err, "Failed to encode notification");
                        continue;
                    }
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(count)) => {
                warn!(skipped = count, "WebSocket client lagged, skipped notifications");
            }
            Err(RecvError::Closed) => {
                debug!("Event broadcaster closed");
                break;
            }
        }
    }
}

async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|err| {
        error!(error = %err, "Failed to serialize frame");
    })?;
    sink.send(Message::Text(json.into())).await.map_err(|err| {
        debug!(error = %err, "Failed to send frame to WebSocket client");
    })
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of subscribed WebSocket clients.
    pub connections: usize,

    /// Number of tasks in the store.
    pub tasks: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.subscriber_count(),
        tasks: state.store.len().await,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok_status() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
        assert_eq!(health.tasks, 0);
    }

    #[tokio::test]
    async fn health_reports_subscribers_and_tasks() {
        let state = AppState::new(Config::default());
        let _subscriber = state.broadcaster.subscribe();
        state.store.create("Buy milk".into(), None).await.unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.connections, 1);
        assert_eq!(health.tasks, 1);
    }

    #[tokio::test]
    async fn get_items_returns_list_in_order() {
        let state = AppState::new(Config::default());
        state.store.create("Buy milk".into(), None).await.unwrap();
        state.store.create("Walk the dog".into(), None).await.unwrap();
        state.store.complete(1, None, None).await.unwrap();
        let expected = state.store.list().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/items").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let items: ItemsResponse = body_json(response).await;
        assert_eq!(items.tasks, expected);
        let summary: Vec<_> = items
            .tasks
            .iter()
            .map(|task| (task.text.as_str(), task.completed))
            .collect();
        assert_eq!(summary, vec![("Buy milk", false), ("Walk the dog", true)]);
    }

    #[tokio::test]
    async fn post_item_appends_and_broadcasts_token() {
        let state = AppState::new(Config::default());
        let mut rx = state.broadcaster.subscribe();
        let store = state.store.clone();
        let app = create_router(state);
        let token = Uuid::new_v4();

        let response = app
            .oneshot(json_request(
                "/items",
                serde_json::json!({ "title": "Buy milk", "clientToken": token }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: MutationResponse = body_json(response).await;
        assert!(body.status);
        let id = body.id.unwrap();
        assert_eq!(store.len().await, 1);

        match rx.recv().await.unwrap() {
            Notification::ItemCreated { item, client_token } => {
                assert_eq!(item.text, "Buy milk");
                assert_eq!(item.id, id);
                assert_eq!(client_token, Some(token));
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_item_rejects_blank_title() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(json_request("/items", serde_json::json!({ "title": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: MutationResponse = body_json(response).await;
        assert_eq!(body, MutationResponse::rejected("title cannot be empty"));
    }

    #[tokio::test]
    async fn post_item_rejects_invalid_json() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: MutationResponse = body_json(response).await;
        assert!(!body.status);
        assert!(body.message.is_some());
    }

    #[tokio::test]
    async fn post_complete_marks_task() {
        let state = AppState::new(Config::default());
        state.store.create("Buy milk".into(), None).await.unwrap();
        let store = state.store.clone();
        let app = create_router(state);

        let response = app
            .oneshot(json_request("/items/complete", serde_json::json!({ "index": 0 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: MutationResponse = body_json(response).await;
        assert_eq!(body, MutationResponse::accepted());
        assert!(store.list().await[0].completed);
    }

    #[tokio::test]
    async fn post_complete_prefers_id() {
        let state = AppState::new(Config::default());
        state.store.create("Buy milk".into(), None).await.unwrap();
        let id = state.store.create("Walk the dog".into(), None).await.unwrap();
        let store = state.store.clone();
        let app = create_router(state);

        let response = app
            .oneshot(json_request(
                "/items/complete",
                serde_json::json!({ "index": 0, "id": id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let list = store.list().await;
        assert!(!list[0].completed);
        assert!(list[1].completed);
    }

    #[tokio::test]
    async fn post_complete_unknown_index_is_not_found() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(json_request("/items/complete", serde_json::json!({ "index": 3 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: MutationResponse = body_json(response).await;
        assert_eq!(body, MutationResponse::rejected("no task at index 3"));
    }

    #[tokio::test]
    async fn post_complete_twice_conflicts() {
        let state = AppState::new(Config::default());
        state.store.create("Buy milk".into(), None).await.unwrap();
        state.store.complete(0, None, None).await.unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(json_request("/items/complete", serde_json::json!({ "index": 0 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: MutationResponse = body_json(response).await;
        assert_eq!(body, MutationResponse::rejected("task 0 is already completed"));
    }

    #[test]
    fn app_state_debug_impl() {
        let state = AppState::new(Config::default());
        let debug = format!("{state:?}");
        assert!(debug.contains("AppState"));
        assert!(debug.contains("broadcaster"));
    }
}
