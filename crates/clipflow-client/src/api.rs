//! The session API seam.

use async_trait::async_trait;
use clipflow_models::{PipelineParams, ProcessAck, SessionId, SessionSummary, StatusResponse};

use crate::error::ClientResult;

/// Operations of the remote session API used by the orchestration engine.
///
/// `SessionClient` is the HTTP implementation; tests script their own.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `POST /session/create`: allocate a new server-side session.
    async fn create_session(&self) -> ClientResult<SessionId>;

    /// `GET /session/status/{id}`. A 404 yields `ClientError::SessionNotFound`.
    async fn session_status(&self, session_id: &SessionId) -> ClientResult<StatusResponse>;

    /// `POST /session/process` with the job parameters as form fields.
    async fn start_processing(
        &self,
        session_id: &SessionId,
        params: &PipelineParams,
    ) -> ClientResult<ProcessAck>;

    /// `DELETE /session/cancel/{id}`.
    async fn cancel_processing(&self, session_id: &SessionId) -> ClientResult<()>;

    /// `GET /session/keepalive`. Only the HTTP status matters.
    async fn keepalive(&self) -> ClientResult<()>;

    /// `GET /session/list`.
    async fn list_sessions(&self) -> ClientResult<Vec<SessionSummary>>;

    /// `DELETE /session/cleanup/{id}`: drop the session and its files server-side.
    async fn cleanup_session(&self, session_id: &SessionId) -> ClientResult<()>;
}
