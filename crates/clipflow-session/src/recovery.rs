//! Lost-session recovery.
//!
//! When the server no longer knows the current id, a fresh session is
//! created and persisted, and the current session is replaced by one under
//! the new id that keeps every result observed so far. The replacement is
//! left in the error state: the job that was running is gone, and the user
//! has to start again under the new id.
//!
//! The new id is queued for the session store and written once the state
//! lock is released.

use std::sync::Arc;

use clipflow_models::SessionId;

use crate::logging::SessionLogger;
use crate::orchestrator::{Activation, LocalWrite, Shared};

pub(crate) const RECOVERED_MESSAGE: &str =
    "The server lost this session; a new session was created. Progress may have been lost, start again to continue.";

pub(crate) struct RecoveryCoordinator {
    shared: Arc<Shared>,
    logger: SessionLogger,
}

impl RecoveryCoordinator {
    pub fn new(shared: Arc<Shared>, logger: SessionLogger) -> Self {
        Self { shared, logger }
    }

    pub async fn recover(&self, activation: &Activation, lost_id: &SessionId) {
        let created = self.shared.api.create_session().await;

        let mut state = self.shared.state.lock().await;
        if !state.is_current(activation) {
            self.logger.log_progress("Activation ended during recovery");
            return;
        }
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if &session.session_id != lost_id {
            return;
        }

        match created {
            Ok(new_id) => {
                self.shared.queue(LocalWrite::SessionId(new_id.clone()));

                let mut replacement = session.replaced_with_id(new_id.clone());
                replacement.fail(RECOVERED_MESSAGE);
                self.logger.log_warning(&format!(
                    "Recovered as session {} ({} result(s) kept)",
                    new_id,
                    replacement.results.len()
                ));

                self.shared.publish(&replacement, "recovered");
                *session = replacement;
            }
            Err(e) => {
                let message = format!("Session recovery failed: {}", e);
                self.logger.log_error(&message);
                session.fail(message);
                self.shared.publish(session, "recovery failed");
            }
        }
    }
}
