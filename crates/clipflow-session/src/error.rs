//! Engine error types.
//!
//! The session lifecycle itself never returns these: failures during a run
//! are reported through the published `ProcessingSession`. They surface from
//! the auxiliary operations (listing and cleaning up remote sessions) and
//! from internal steps before they are folded into session state.

use clipflow_client::ClientError;
use clipflow_store::StoreError;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] validator::ValidationErrors),

    #[error("Server did not start processing: {0}")]
    Rejected(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
