//! Structured session logging.
//!
//! Gives every component of one activation the same `session_id` and
//! `component` fields.

use clipflow_models::SessionId;
use tracing::{debug, error, info, warn, Span};

/// Logger bound to one session and engine component.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    component: &'static str,
}

impl SessionLogger {
    /// # Arguments
    /// * `session_id` - The session the log lines refer to
    /// * `component` - Emitting component (e.g. "poller", "keepalive")
    pub fn new(session_id: &SessionId, component: &'static str) -> Self {
        Self {
            session_id: session_id.to_string(),
            component,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            component = self.component,
            "Started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        debug!(
            session_id = %self.session_id,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_stop(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            component = self.component,
            "Stopped: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn component(&self) -> &str {
        self.component
    }

    /// Span to instrument a component's task with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            component = self.component
        )
    }
}
