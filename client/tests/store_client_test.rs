//! HTTP contract tests for the store client.

use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tasksync_client::error::RemoteError;
use tasksync_client::store::StoreClient;
use tasksync_client::types::{CompleteRequest, CreateRequest, TaskItem};

fn client_for(server: &MockServer) -> StoreClient {
    StoreClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

fn create(title: &str) -> CreateRequest {
    CreateRequest {
        title: title.to_string(),
        client_token: None,
    }
}

#[tokio::test]
async fn fetch_items_returns_tasks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [
                { "text": "Buy milk", "completed": false },
                { "text": "Walk the dog", "completed": true },
            ]
        })))
        .mount(&server)
        .await;

    let tasks = client_for(&server).fetch_items().await.unwrap();

    assert_eq!(
        tasks,
        vec![
            TaskItem::new("Buy milk"),
            TaskItem {
                text: "Walk the dog".to_string(),
                completed: true,
                id: None,
            },
        ]
    );
}

#[tokio::test]
async fn fetch_items_without_tasks_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let tasks = client_for(&server).fetch_items().await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn create_posts_title() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_json(json!({ "title": "Buy milk" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true })))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(client_for(&server).create_item(&create("Buy milk")).await);
}

#[tokio::test]
async fn create_sends_client_token_when_set() {
    let server = MockServer::start().await;
    let token = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_json(json!({ "title": "Buy milk", "clientToken": token })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CreateRequest {
        title: "Buy milk".to_string(),
        client_token: Some(token),
    };
    assert_ok!(client_for(&server).create_item(&request).await);
}

#[tokio::test]
async fn create_returns_assigned_id() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true, "id": id })))
        .mount(&server)
        .await;

    let assigned = client_for(&server).create_item(&create("Buy milk")).await.unwrap();
    assert_eq!(assigned, Some(id));
}

#[tokio::test]
async fn complete_sends_known_id() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/items/complete"))
        .and(body_json(json!({ "index": 1, "id": id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompleteRequest {
        index: 1,
        id: Some(id),
        client_token: None,
    };
    assert_ok!(client_for(&server).complete_item(&request).await);
}

#[tokio::test]
async fn create_rejected_without_message_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": false })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_item(&create("Buy milk"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Rejected {
            message: "Could not add TODO item".to_string(),
        }
    );
}

#[tokio::test]
async fn complete_rejected_uses_store_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items/complete"))
        .and(body_json(json!({ "index": 2 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": false, "message": "list is locked" })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .complete_item(&CompleteRequest {
            index: 2,
            id: None,
            client_token: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "list is locked");
}

#[tokio::test]
async fn complete_rejected_without_message_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items/complete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": false })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .complete_item(&CompleteRequest {
            index: 0,
            id: None,
            client_token: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Could not complete TODO item");
}

#[tokio::test]
async fn error_status_prefers_body_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({ "status": false, "message": "title cannot be empty" })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_item(&create("      "))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Status {
            status: 422,
            message: "title cannot be empty".to_string(),
        }
    );
}

#[tokio::test]
async fn error_status_without_body_names_the_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_item(&create("Buy milk"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Request failed with status code 500");
}

#[tokio::test]
async fn fetch_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_items().await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 503, .. }));
}

#[tokio::test]
async fn slow_store_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri(), Duration::from_millis(200)).unwrap();
    let err = client.create_item(&create("Buy milk")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
}

#[tokio::test]
async fn undecodable_success_body_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_item(&create("Buy milk"))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
}
