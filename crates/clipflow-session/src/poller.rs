//! Status poller.
//!
//! Polls `GET /session/status/{id}` on a fast interval, then on a slow one
//! after `fast_ticks` polls. Stops on a terminal remote status, when the
//! activation ends, or when either hard cap is reached:
//! - `tick_cap` polls issued: the session fails with a timeout message
//! - `error_cap` consecutive failed polls: the session fails with a
//!   connection-lost message
//!
//! A remote `active` status means the server holds the session but runs no
//! job for it; seen while polling, the job has ended without an outcome and
//! the session fails.
//!
//! Stopping cancels the activation token, which also stops the heartbeat.

use std::sync::Arc;
use std::time::Duration;

use clipflow_client::{ClientResult, ErrorKind};
use clipflow_models::{SessionId, StatusResponse};

use crate::logging::SessionLogger;
use crate::orchestrator::{apply_remote_status, Activation, Shared};
use crate::recovery::RecoveryCoordinator;

pub(crate) const CONNECTION_LOST_MESSAGE: &str = "Lost connection to the processing server";

pub(crate) const NO_JOB_MESSAGE: &str = "The server reports no job running for this session";

pub(crate) fn timeout_message(tick_cap: u32) -> String {
    format!("Processing timed out after {} status checks", tick_cap)
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Poller {
    shared: Arc<Shared>,
    activation: Activation,
    logger: SessionLogger,
    ticks: u32,
    consecutive_errors: u32,
    interval: Duration,
}

impl Poller {
    pub fn new(shared: Arc<Shared>, activation: Activation, logger: SessionLogger) -> Self {
        let interval = shared.config.fast_interval;
        Self {
            shared,
            activation,
            logger,
            ticks: 0,
            consecutive_errors: 0,
            interval,
        }
    }

    pub async fn run(mut self) {
        self.logger.log_start(&format!(
            "polling every {:?} (switching to {:?} after {} checks)",
            self.interval, self.shared.config.slow_interval, self.shared.config.fast_ticks
        ));

        loop {
            tokio::select! {
                _ = self.activation.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let next = self.check_liveness().await;
            self.shared.persist().await;
            let Some(session_id) = next else {
                break;
            };

            self.ticks += 1;
            if self.ticks == self.shared.config.fast_ticks {
                self.interval = self.shared.config.slow_interval;
                self.logger.log_progress(&format!(
                    "Switching to slow polling ({:?})",
                    self.interval
                ));
            }

            let response = tokio::select! {
                _ = self.activation.token.cancelled() => break,
                response = self.shared.api.session_status(&session_id) => response,
            };

            let flow = self.handle_response(&session_id, response).await;
            self.shared.persist().await;
            if let Flow::Stop = flow {
                break;
            }
        }

        self.shared.state.lock().await.release(&self.activation);
        self.shared.persist().await;
        self.logger.log_stop(&format!(
            "after {} status checks",
            self.ticks
        ));
    }

    /// Decide whether to issue the next poll.
    ///
    /// Returns the id to poll, or `None` to stop. Hitting a cap fails the
    /// session; every other stop is silent because whoever ended the
    /// activation already recorded the outcome.
    async fn check_liveness(&self) -> Option<SessionId> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock().await;
        if !state.is_current(&self.activation) {
            return None;
        }

        let session = state.session.as_mut()?;
        if !session.status.is_active() {
            return None;
        }

        let cap_message = if self.ticks >= config.tick_cap {
            Some(timeout_message(config.tick_cap))
        } else if self.consecutive_errors >= config.error_cap {
            Some(CONNECTION_LOST_MESSAGE.to_string())
        } else {
            None
        };

        match cap_message {
            Some(message) => {
                self.logger.log_error(&message);
                session.fail(message);
                self.shared.publish(session, "stopped");
                None
            }
            None => Some(session.session_id.clone()),
        }
    }

    async fn handle_response(
        &mut self,
        session_id: &SessionId,
        response: ClientResult<StatusResponse>,
    ) -> Flow {
        let error = match response {
            Ok(response) => return self.apply(response).await,
            Err(e) => e,
        };

        if !self.shared.state.lock().await.is_current(&self.activation) {
            return Flow::Stop;
        }

        match error.kind() {
            ErrorKind::NotFound => {
                self.consecutive_errors += 1;
                if self.consecutive_errors < self.shared.config.recovery_ceiling {
                    self.logger.log_warning("Session not found on the server, recovering");
                    RecoveryCoordinator::new(Arc::clone(&self.shared), self.logger.clone())
                        .recover(&self.activation, session_id)
                        .await;
                } else {
                    self.logger.log_warning(&format!(
                        "Session not found ({} consecutive errors), not recovering again",
                        self.consecutive_errors
                    ));
                }
                Flow::Continue
            }
            ErrorKind::Transport | ErrorKind::Status => {
                self.consecutive_errors += 1;
                self.logger.log_warning(&format!(
                    "Status check failed ({}/{}): {}",
                    self.consecutive_errors, self.shared.config.error_cap, error
                ));
                Flow::Continue
            }
            ErrorKind::Protocol | ErrorKind::Local => {
                let mut state = self.shared.state.lock().await;
                if !state.is_current(&self.activation) {
                    return Flow::Stop;
                }
                if let Some(session) = state.session.as_mut() {
                    let message = format!("Invalid response from server: {}", error);
                    self.logger.log_error(&message);
                    session.fail(message);
                    self.shared.publish(session, "stopped");
                }
                Flow::Stop
            }
        }
    }

    async fn apply(&mut self, response: StatusResponse) -> Flow {
        let mut state = self.shared.state.lock().await;
        if !state.is_current(&self.activation) {
            self.logger.log_progress("Discarding status for a stopped activation");
            return Flow::Stop;
        }
        let Some(session) = state.session.as_mut() else {
            return Flow::Stop;
        };

        self.consecutive_errors = 0;

        let added = apply_remote_status(session, &response);
        if !added.is_empty() {
            self.logger
                .log_progress(&format!("{} new result(s)", added.len()));
        }
        self.shared.publish_results(session, added);

        if !session.status.is_active() && !session.status.is_terminal() {
            self.logger.log_error(NO_JOB_MESSAGE);
            session.fail(NO_JOB_MESSAGE);
            self.shared.publish(session, "stopped");
            return Flow::Stop;
        }

        let note = if session.current_step.is_empty() {
            format!("{}%", session.progress)
        } else {
            format!("{}% {}", session.progress, session.current_step)
        };
        self.shared.publish(session, &note);

        if response.status.is_terminal() {
            self.logger.log_stop(&format!(
                "remote status {} with {} result(s)",
                response.status,
                session.results.len()
            ));
            return Flow::Stop;
        }

        Flow::Continue
    }
}
