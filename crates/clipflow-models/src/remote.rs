//! Wire shapes of the remote session API.
//!
//! These mirror the JSON bodies returned by the processing server. Fields
//! the client does not depend on are optional so that older or newer
//! servers still decode.

use serde::{Deserialize, Serialize};

use crate::{ClipResult, SessionId, SessionStatus};

/// Status string reported by the server.
///
/// Unknown strings are kept verbatim in `Unrecognized` instead of failing
/// to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum RemoteStatus {
    /// Session exists but no job is running
    Active,
    #[default]
    Processing,
    Completed,
    Error,
    Cancelled,
    Unrecognized(String),
}

impl RemoteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RemoteStatus::Active => "active",
            RemoteStatus::Processing => "processing",
            RemoteStatus::Completed => "completed",
            RemoteStatus::Error => "error",
            RemoteStatus::Cancelled => "cancelled",
            RemoteStatus::Unrecognized(s) => s,
        }
    }

    /// Whether the server will not produce further updates for this job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Completed | RemoteStatus::Error | RemoteStatus::Cancelled
        )
    }

    /// Map to the local lifecycle status.
    ///
    /// Unrecognized values map to `Processing`, which keeps polling going
    /// when the server introduces a new status string.
    pub fn to_session_status(&self) -> SessionStatus {
        match self {
            RemoteStatus::Active => SessionStatus::Idle,
            RemoteStatus::Processing => SessionStatus::Processing,
            RemoteStatus::Completed => SessionStatus::Completed,
            RemoteStatus::Error => SessionStatus::Error,
            RemoteStatus::Cancelled => SessionStatus::Cancelled,
            RemoteStatus::Unrecognized(_) => SessionStatus::Processing,
        }
    }
}

impl From<String> for RemoteStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => RemoteStatus::Active,
            "processing" => RemoteStatus::Processing,
            "completed" => RemoteStatus::Completed,
            "error" => RemoteStatus::Error,
            "cancelled" => RemoteStatus::Cancelled,
            _ => RemoteStatus::Unrecognized(s),
        }
    }
}

impl From<RemoteStatus> for String {
    fn from(status: RemoteStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response of `POST /session/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST /session/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAck {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProcessAck {
    /// Whether the server acknowledged that processing started.
    pub fn is_processing(&self) -> bool {
        self.status == "processing"
    }
}

/// Response of `GET /session/status/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub status: RemoteStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub partial_results: Option<Vec<ClipResult>>,
    #[serde(default)]
    pub outputs: Option<Vec<ClipResult>>,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub created_at: Option<f64>,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub last_activity: Option<f64>,
}

impl StatusResponse {
    /// Progress as a 0-100 integer.
    pub fn progress_percent(&self) -> u8 {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(0)
    }

    /// Results carried by this response.
    ///
    /// `partial_results` is preferred while it has entries; `outputs` is the
    /// fallback. Results missing a session back-reference are attributed to
    /// `session_id`.
    pub fn results(&self, session_id: &SessionId) -> Vec<ClipResult> {
        let partial = self.partial_results.as_ref().filter(|r| !r.is_empty());
        let chosen = partial.or(self.outputs.as_ref()).or(self.partial_results.as_ref());

        chosen
            .map(|results| {
                results
                    .iter()
                    .cloned()
                    .map(|r| r.with_default_session(session_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the response explicitly lists results (even an empty set).
    pub fn has_results_field(&self) -> bool {
        self.partial_results.is_some() || self.outputs.is_some()
    }
}

/// One entry of `GET /session/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: RemoteStatus,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub results_count: u64,
}

/// Response of `GET /session/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}
