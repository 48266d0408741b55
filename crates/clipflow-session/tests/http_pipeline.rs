//! End-to-end runs of the orchestrator against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use clipflow_client::{ClientConfig, SessionClient};
use clipflow_models::{ProcessingSession, PipelineParams, SessionStatus};
use clipflow_session::{SessionConfig, SessionOrchestrator};
use clipflow_store::{FileStore, KeyValueStore, LocalState, SessionStore};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> SessionConfig {
    SessionConfig {
        fast_interval: Duration::from_millis(20),
        slow_interval: Duration::from_millis(40),
        fast_ticks: 5,
        tick_cap: 200,
        error_cap: 5,
        recovery_ceiling: 3,
        keepalive_period: Duration::from_millis(25),
        event_capacity: 64,
    }
}

async fn mount_json(server: &MockServer, verb: &str, route: &str, body: serde_json::Value, times: Option<u64>) {
    let mut mock = Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    if let Some(n) = times {
        mock = mock.up_to_n_times(n);
    }
    mock.mount(server).await;
}

async fn wait_for_terminal(rx: &mut broadcast::Receiver<ProcessingSession>) -> ProcessingSession {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(session) if session.is_terminal() => return session,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("state channel closed"),
            }
        }
    })
    .await
    .expect("session reached a terminal status")
}

fn orchestrator(server: &MockServer, kv: Arc<dyn KeyValueStore>) -> SessionOrchestrator {
    let client = SessionClient::new(ClientConfig::with_api_url(format!("{}/api", server.uri()))).unwrap();
    SessionOrchestrator::new(Arc::new(client), kv, fast_config())
}

#[tokio::test]
async fn test_pipeline_completes_and_persists() {
    let server = MockServer::start().await;
    mount_json(&server, "POST", "/api/session/create", json!({"status": "success", "session_id": "abc"}), None).await;
    mount_json(&server, "POST", "/api/session/process", json!({"status": "processing", "session_id": "abc"}), None).await;
    mount_json(
        &server,
        "GET",
        "/api/session/status/abc",
        json!({"status": "processing", "progress": 50, "partial_results": [{"video": "a.mp4"}]}),
        Some(1),
    )
    .await;
    mount_json(
        &server,
        "GET",
        "/api/session/status/abc",
        json!({
            "status": "completed",
            "progress": 100,
            "partial_results": [],
            "outputs": [{"video": "a.mp4"}, {"video": "b.mp4", "hashtags": "#fyp, #clips"}],
        }),
        None,
    )
    .await;
    mount_json(&server, "GET", "/api/session/keepalive", json!({}), None).await;

    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&state_file).await);
    let orchestrator = orchestrator(&server, kv);
    let mut states = orchestrator.subscribe_state();

    assert!(orchestrator.start_pipeline(PipelineParams::new("shroud")).await);
    let session = wait_for_terminal(&mut states).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.results.len(), 2);
    assert_eq!(session.results[1].hashtags, vec!["#fyp", "#clips"]);
    assert_eq!(orchestrator.local_state().await.saved_results().await.len(), 2);

    // A fresh process sees the remembered id and the saved results.
    let reopened: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&state_file).await);
    let stored = SessionStore::new(Arc::clone(&reopened)).current().await.unwrap();
    assert_eq!(stored.map(|id| id.to_string()).as_deref(), Some("abc"));
    let local = LocalState::new(reopened);
    assert_eq!(local.saved_results().await.len(), 2);
    assert!(!local.log_lines().await.is_empty());
}

#[tokio::test]
async fn test_lost_session_is_replaced() {
    let server = MockServer::start().await;
    mount_json(&server, "POST", "/api/session/create", json!({"status": "success", "session_id": "abc"}), Some(1)).await;
    mount_json(&server, "POST", "/api/session/create", json!({"status": "success", "session_id": "xyz"}), None).await;
    mount_json(&server, "POST", "/api/session/process", json!({"status": "processing"}), None).await;
    Mock::given(method("GET"))
        .and(path("/api/session/status/abc"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Session not found"})))
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/api/session/keepalive", json!({}), None).await;

    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path().join("state.json")).await);
    let orchestrator = orchestrator(&server, Arc::clone(&kv));
    let mut states = orchestrator.subscribe_state();

    assert!(orchestrator.start_pipeline(PipelineParams::new("shroud")).await);
    let session = wait_for_terminal(&mut states).await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.session_id.as_str(), "xyz");
    orchestrator.local_state().await;
    let stored = SessionStore::new(kv).current().await.unwrap();
    assert_eq!(stored.map(|id| id.to_string()).as_deref(), Some("xyz"));
}
