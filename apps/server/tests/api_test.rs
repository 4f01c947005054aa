//! HTTP surface tests driven through the router with `oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use synapse_orchestrator::{Orchestrator, OrchestratorConfig};
use synapse_server::{AppState, ServerConfig, router};
use synapse_training::DenseRuntime;
use tower::ServiceExt;

fn app_with(orchestrator: Arc<Orchestrator>) -> Router {
    router(AppState::new(orchestrator), &ServerConfig::default().server.allowed_origins)
}

fn orchestrator(local_dir: &std::path::Path) -> Arc<Orchestrator> {
    let mut config = ServerConfig::default();
    config.datasets.local_dir = local_dir.to_path_buf();
    Arc::new(Orchestrator::new(
        OrchestratorConfig::default(),
        config.dataset_loader(),
        Arc::new(DenseRuntime),
    ))
}

fn iris_body(epochs: u32) -> String {
    json!({
        "dataset_id": "iris",
        "model_type": "classification",
        "num_layers": 2,
        "num_neurons": 8,
        "learning_rate": 0.01,
        "regularization_rate": 0.0,
        "train_test_split": 0.8,
        "regularizer": "none",
        "optimizer": "adam",
        "activation": "relu",
        "epochs": epochs,
        "batch_size": 16
    })
    .to_string()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let response = app
        .clone()
        .oneshot(request.body(body.map_or_else(Body::empty, Body::from)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn test_root_and_health() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = app_with(orchestrator(dir.path()));

    let (status, body) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_sessions"], 0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_start_session_returns_shapes_and_summary() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = app_with(orchestrator(dir.path()));

    let (status, body) = send(&app, Method::POST, "/api/train/start", Some(iris_body(5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Training session initialized successfully");
    assert_eq!(body["input_shape"], json!([120, 4]));
    assert_eq!(body["output_shape"], json!([3]));
    assert_eq!(body["class_count"], 3);
    assert!(body["model_summary"].as_str().unwrap().contains("Total params"));

    let id = body["session_id"].as_str().unwrap();
    let (status, body) = send(&app, Method::GET, &format!("/api/train/{id}/status"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "initialized");
    assert_eq!(body["history"], json!([]));

    let (_, list) = send(&app, Method::GET, "/api/train", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_creation_failures_map_to_status_codes() {
    let dir = tempfile::TempDir::new().unwrap();
    let app = app_with(orchestrator(dir.path()));

    let missing = iris_body(5).replace("\"iris\"", "\"no-such-dataset\"");
    let (status, body) = send(&app, Method::POST, "/api/train/start", Some(missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("no-such-dataset"));

    let bad_layers = iris_body(5).replace("\"num_layers\":2", "\"num_layers\":0");
    let (status, _) = send(&app, Method::POST, "/api/train/start", Some(bad_layers)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown_field = iris_body(5).replace("\"epochs\"", "\"epochz\"");
    let (status, _) = send(&app, Method::POST, "/api/train/start", Some(unknown_field)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&app, Method::GET, "/api/train", None).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_local_csv_dataset_is_served() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut csv = String::from("x1,x2,y\n");
    for i in 0_i32..40 {
        csv.push_str(&format!("{},{},{}\n", i, i * 2, i * 3 + 1));
    }
    std::fs::write(dir.path().join("linear.csv"), csv).unwrap();
    let app = app_with(orchestrator(dir.path()));

    let body = iris_body(2).replace("\"iris\"", "\"linear\"");
    let (status, body) = send(&app, Method::POST, "/api/train/start", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["class_count"], 1);
    assert_eq!(body["output_shape"], json!([1]));
}

#[tokio::test]
async fn test_predict_and_delete_lifecycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let orchestrator = orchestrator(dir.path());
    let app = app_with(Arc::clone(&orchestrator));

    let (_, created) = send(&app, Method::POST, "/api/train/start", Some(iris_body(3))).await;
    let id = created["session_id"].as_str().unwrap().to_string();
    let rows = json!([[5.1, 3.5, 1.4, 0.2]]).to_string();

    let (status, body) =
        send(&app, Method::POST, &format!("/api/train/{id}/predict"), Some(rows.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("not trained"));

    let session_id = synapse_orchestrator::SessionId::from(id.as_str());
    orchestrator.start_training(&session_id).await.unwrap();
    orchestrator.wait_for_completion(&session_id).await.unwrap();

    let (status, body) =
        send(&app, Method::POST, &format!("/api/train/{id}/predict"), Some(rows)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"][0].as_array().unwrap().len(), 3);

    let (status, body) =
        send(&app, Method::POST, &format!("/api/train/{id}/predict"), Some("{}".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, body) = send(&app, Method::DELETE, &format!("/api/train/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], format!("Session {id} deleted successfully"));

    let (status, _) = send(&app, Method::GET, &format!("/api/train/{id}/status"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &format!("/api/train/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
