//! Processing session state.
//!
//! A [`ProcessingSession`] is the client's view of one remote job lineage.
//! It is always replaced as a whole value; partial mutation only happens
//! through the methods below, which keep `status` and `error` consistent.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ClipResult;

/// Server-issued identifier of a session lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a local placeholder id.
    ///
    /// Only used when the server is unreachable and the client still needs a
    /// non-null session to report the failure on. Never persisted.
    pub fn offline() -> Self {
        Self(format!("offline-{}", Uuid::new_v4()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was minted locally by [`SessionId::offline`].
    pub fn is_offline(&self) -> bool {
        self.0.starts_with("offline-")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local lifecycle status of a processing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No job running
    #[default]
    Idle,
    /// Start request issued, not yet acknowledged
    Starting,
    /// Job running on the server
    Processing,
    /// Job finished successfully
    Completed,
    /// Job or client failed
    Error,
    /// Job cancelled by the user
    Cancelled,
}

impl SessionStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a job is in flight (the poller keeps running in these states).
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Processing)
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The client's canonical view of one remote processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingSession {
    /// Session lineage identifier
    pub session_id: SessionId,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// Observed results, in arrival order
    #[serde(default)]
    pub results: Vec<ClipResult>,
    /// Failure description, only present alongside `SessionStatus::Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server-reported progress (0-100)
    #[serde(default)]
    pub progress: u8,
    /// Server-reported activity label
    #[serde(default)]
    pub current_step: String,
    /// When this session value was first constructed
    pub created_at: DateTime<Utc>,
}

impl ProcessingSession {
    /// Create an empty session in the given status.
    pub fn new(session_id: impl Into<SessionId>, status: SessionStatus) -> Self {
        Self {
            session_id: session_id.into(),
            status,
            results: Vec::new(),
            error: None,
            progress: 0,
            current_step: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a session that is already failed.
    pub fn failed(session_id: impl Into<SessionId>, error: impl Into<String>) -> Self {
        let mut session = Self::new(session_id, SessionStatus::Idle);
        session.fail(error);
        session
    }

    /// Update the status. Leaving `Error` clears the error message.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status != SessionStatus::Error {
            self.error = None;
        }
    }

    /// Mark the session as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.error = Some(error.into());
    }

    /// Update progress, clamped to 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    /// Merge incoming results into `results`.
    ///
    /// A result whose key is already present replaces the existing entry in
    /// place; anything else is appended. Returns the appended results, in
    /// arrival order. Existing entries are never removed or reordered.
    pub fn merge_results(&mut self, incoming: Vec<ClipResult>) -> Vec<ClipResult> {
        let mut added = Vec::new();

        for result in incoming {
            let key = result.key();
            match self.results.iter_mut().find(|existing| existing.key() == key) {
                Some(existing) => *existing = result,
                None => {
                    self.results.push(result.clone());
                    added.push(result);
                }
            }
        }

        added
    }

    /// Build the replacement value used when the lineage is re-established
    /// under a new id. Observed results are carried forward.
    pub fn replaced_with_id(&self, session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            status: self.status,
            results: self.results.clone(),
            error: self.error.clone(),
            progress: self.progress,
            current_step: self.current_step.clone(),
            created_at: Utc::now(),
        }
    }

    /// Check if the session is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(session: &str, video: &str) -> ClipResult {
        ClipResult::new(session, video)
    }

    #[test]
    fn test_session_creation() {
        let session = ProcessingSession::new("abc", SessionStatus::Starting);
        assert_eq!(session.session_id.as_str(), "abc");
        assert_eq!(session.status, SessionStatus::Starting);
        assert!(session.results.is_empty());
        assert!(session.error.is_none());
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_status_classification() {
        assert!(SessionStatus::Starting.is_active());
        assert!(SessionStatus::Processing.is_active());
        assert!(!SessionStatus::Idle.is_active());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_error_only_alongside_error_status() {
        let mut session = ProcessingSession::new("abc", SessionStatus::Processing);
        session.fail("boom");
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.error.as_deref(), Some("boom"));

        session.set_status(SessionStatus::Processing);
        assert!(session.error.is_none());
    }

    #[test]
    fn test_merge_appends_new_in_order() {
        let mut session = ProcessingSession::new("abc", SessionStatus::Processing);

        let added = session.merge_results(vec![clip("abc", "a.mp4"), clip("abc", "b.mp4")]);
        assert_eq!(added.len(), 2);

        let added = session.merge_results(vec![
            clip("abc", "a.mp4"),
            clip("abc", "b.mp4"),
            clip("abc", "c.mp4"),
        ]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].video, "c.mp4");

        let videos: Vec<_> = session.results.iter().map(|r| r.video.as_str()).collect();
        assert_eq!(videos, vec!["a.mp4", "b.mp4", "c.mp4"]);
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let mut session = ProcessingSession::new("abc", SessionStatus::Processing);
        session.merge_results(vec![clip("abc", "a.mp4"), clip("abc", "b.mp4")]);

        let mut updated = clip("abc", "a.mp4");
        updated.description = "better caption".into();
        let added = session.merge_results(vec![updated]);

        assert!(added.is_empty());
        assert_eq!(session.results.len(), 2);
        assert_eq!(session.results[0].description, "better caption");
    }

    #[test]
    fn test_merge_empty_keeps_existing() {
        let mut session = ProcessingSession::new("abc", SessionStatus::Processing);
        session.merge_results(vec![clip("abc", "a.mp4")]);
        assert!(session.merge_results(Vec::new()).is_empty());
        assert_eq!(session.results.len(), 1);
    }

    #[test]
    fn test_replacement_carries_results() {
        let mut session = ProcessingSession::new("abc", SessionStatus::Processing);
        session.merge_results(vec![clip("abc", "a.mp4")]);
        session.set_progress(40);

        let replacement = session.replaced_with_id("xyz");
        assert_eq!(replacement.session_id.as_str(), "xyz");
        assert_eq!(replacement.results, session.results);
        assert_eq!(replacement.progress, 40);
    }

    #[test]
    fn test_offline_id() {
        let id = SessionId::offline();
        assert!(id.is_offline());
        assert!(!SessionId::from("abc").is_offline());
    }
}
