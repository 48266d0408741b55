//! Client error types.

use clipflow_models::SessionId;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse classification used by the engine to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout or connection failure
    Transport,
    /// The server does not know the session
    NotFound,
    /// Non-success HTTP status other than 404
    Status,
    /// Unexpected or undecodable response body
    Protocol,
    /// Local failure (filesystem, configuration)
    Local,
}

/// Errors that can occur while talking to the session API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an error from a non-success HTTP status.
    ///
    /// 404 on a session-scoped call means the session lineage is gone.
    pub fn from_http_status(status: u16, session_id: Option<&SessionId>, body: impl Into<String>) -> Self {
        match (status, session_id) {
            (404, Some(id)) => Self::SessionNotFound(id.clone()),
            _ => Self::Http {
                status,
                body: body.into(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::SessionNotFound(_) => ErrorKind::NotFound,
            ClientError::Http { .. } => ErrorKind::Status,
            ClientError::Timeout(_) | ClientError::Network(_) => ErrorKind::Transport,
            ClientError::InvalidResponse(_) => ErrorKind::Protocol,
            ClientError::Config(_) | ClientError::Io(_) => ErrorKind::Local,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// HTTP status associated with this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::SessionNotFound(_) => Some(404),
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
