//! Scripted in-memory `SessionApi` for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clipflow_client::{ClientError, ClientResult, SessionApi};
use clipflow_models::{
    PipelineParams, ProcessAck, SessionId, SessionSummary, StatusResponse,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;

/// One scripted reply to a status request.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(StatusResponse),
    NotFound,
    Transport,
    Malformed,
}

impl Reply {
    /// Build a status reply from a JSON body.
    pub fn status(body: Value) -> Self {
        Reply::Status(serde_json::from_value(body).expect("valid status body"))
    }

    pub fn processing(progress: u8, videos: &[&str]) -> Self {
        Self::status(json!({
            "status": "processing",
            "progress": progress,
            "partial_results": videos.iter().map(|v| json!({"video": v})).collect::<Vec<_>>(),
        }))
    }

    pub fn completed(videos: &[&str]) -> Self {
        Self::status(json!({
            "status": "completed",
            "progress": 100,
            "partial_results": videos.iter().map(|v| json!({"video": v})).collect::<Vec<_>>(),
        }))
    }
}

#[derive(Default)]
struct Recorded {
    status_calls: Vec<(SessionId, Instant)>,
    start_calls: Vec<SessionId>,
    cancel_calls: Vec<SessionId>,
    cleanup_calls: Vec<SessionId>,
    keepalives: usize,
}

/// Fake API answering from scripts.
///
/// Status replies are consumed in order; once the script is exhausted the
/// fallback reply is repeated.
pub struct ScriptedApi {
    created_ids: Mutex<VecDeque<String>>,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Reply>,
    start_ack: Mutex<Value>,
    cancel_ok: Mutex<bool>,
    keepalive_ok: Mutex<bool>,
    status_gate: Mutex<Option<Arc<Notify>>>,
    recorded: Mutex<Recorded>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created_ids: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Reply::processing(0, &[])),
            start_ack: Mutex::new(json!({"status": "processing"})),
            cancel_ok: Mutex::new(true),
            keepalive_ok: Mutex::new(true),
            status_gate: Mutex::new(None),
            recorded: Mutex::new(Recorded::default()),
        })
    }

    /// Ids handed out by `create_session`, in order. When exhausted,
    /// `create_session` fails with a transport error.
    pub fn with_created_ids(self: Arc<Self>, ids: &[&str]) -> Arc<Self> {
        self.created_ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_replies(self: Arc<Self>, replies: Vec<Reply>) -> Arc<Self> {
        self.replies.lock().unwrap().extend(replies);
        self
    }

    pub fn with_fallback(self: Arc<Self>, reply: Reply) -> Arc<Self> {
        *self.fallback.lock().unwrap() = reply;
        self
    }

    pub fn with_start_ack(self: Arc<Self>, ack: Value) -> Arc<Self> {
        *self.start_ack.lock().unwrap() = ack;
        self
    }

    pub fn with_cancel_failing(self: Arc<Self>) -> Arc<Self> {
        *self.cancel_ok.lock().unwrap() = false;
        self
    }

    /// Make every heartbeat fail with a transport error. Attempts are still
    /// counted by `keepalives`.
    pub fn with_keepalive_failing(self: Arc<Self>) -> Arc<Self> {
        *self.keepalive_ok.lock().unwrap() = false;
        self
    }

    /// Make every status request wait for a `notify_one` on the returned
    /// handle before answering.
    pub fn gate_status(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.status_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn status_ids(&self) -> Vec<String> {
        self.recorded
            .lock()
            .unwrap()
            .status_calls
            .iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }

    pub fn status_times(&self) -> Vec<Instant> {
        self.recorded
            .lock()
            .unwrap()
            .status_calls
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn start_calls(&self) -> Vec<SessionId> {
        self.recorded.lock().unwrap().start_calls.clone()
    }

    pub fn cancel_calls(&self) -> Vec<SessionId> {
        self.recorded.lock().unwrap().cancel_calls.clone()
    }

    pub fn cleanup_calls(&self) -> Vec<SessionId> {
        self.recorded.lock().unwrap().cleanup_calls.clone()
    }

    pub fn keepalives(&self) -> usize {
        self.recorded.lock().unwrap().keepalives
    }

    fn next_reply(&self) -> Reply {
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

fn transport_error() -> ClientError {
    ClientError::Timeout("scripted transport failure".to_string())
}

#[async_trait]
impl SessionApi for ScriptedApi {
    async fn create_session(&self) -> ClientResult<SessionId> {
        let next = self.created_ids.lock().unwrap().pop_front();
        next.map(SessionId::from).ok_or_else(transport_error)
    }

    async fn session_status(&self, session_id: &SessionId) -> ClientResult<StatusResponse> {
        self.recorded
            .lock()
            .unwrap()
            .status_calls
            .push((session_id.clone(), Instant::now()));

        let gate = self.status_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.next_reply() {
            Reply::Status(mut response) => {
                response.session_id.get_or_insert_with(|| session_id.clone());
                Ok(response)
            }
            Reply::NotFound => Err(ClientError::SessionNotFound(session_id.clone())),
            Reply::Transport => Err(transport_error()),
            Reply::Malformed => Err(ClientError::invalid_response("expected value at line 1")),
        }
    }

    async fn start_processing(
        &self,
        session_id: &SessionId,
        _params: &PipelineParams,
    ) -> ClientResult<ProcessAck> {
        self.recorded.lock().unwrap().start_calls.push(session_id.clone());
        let ack = self.start_ack.lock().unwrap().clone();
        serde_json::from_value(ack).map_err(|e| ClientError::invalid_response(e.to_string()))
    }

    async fn cancel_processing(&self, session_id: &SessionId) -> ClientResult<()> {
        self.recorded.lock().unwrap().cancel_calls.push(session_id.clone());
        if *self.cancel_ok.lock().unwrap() {
            Ok(())
        } else {
            Err(ClientError::Http {
                status: 500,
                body: "cancel failed".to_string(),
            })
        }
    }

    async fn keepalive(&self) -> ClientResult<()> {
        self.recorded.lock().unwrap().keepalives += 1;
        if *self.keepalive_ok.lock().unwrap() {
            Ok(())
        } else {
            Err(transport_error())
        }
    }

    async fn list_sessions(&self) -> ClientResult<Vec<SessionSummary>> {
        let body = json!([
            {"session_id": "abc", "status": "completed", "results_count": 3},
        ]);
        serde_json::from_value(body).map_err(|e| ClientError::invalid_response(e.to_string()))
    }

    async fn cleanup_session(&self, session_id: &SessionId) -> ClientResult<()> {
        self.recorded.lock().unwrap().cleanup_calls.push(session_id.clone());
        Ok(())
    }
}
