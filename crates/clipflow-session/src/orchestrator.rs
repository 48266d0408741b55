//! Session orchestrator.
//!
//! Owns the single current `ProcessingSession`. Every read and write goes
//! through one async mutex, and every publish happens while holding it, so
//! observers see transitions in the order they were applied.
//!
//! Local persistence (log lines, saved results, the stored session id) is
//! queued while the lock is held and written by `Shared::persist` once it
//! has been released, in queue order.
//!
//! Each start or restore opens an *activation*: a generation number plus a
//! cancellation token shared by the poller and the heartbeat of that run.
//! Stopping an activation cancels the token and bumps the generation; a
//! background task whose network call resolves afterwards re-checks both
//! under the lock and drops its result.

use std::sync::{Arc, PoisonError};

use chrono::Utc;
use clipflow_client::{ArtifactDownloader, SessionApi};
use clipflow_models::{
    ClipResult, PipelineParams, ProcessingSession, RemoteStatus, SessionId, SessionStatus,
    SessionSummary, StatusResponse,
};
use clipflow_store::{KeyValueStore, LocalState, SessionStore};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use validator::Validate;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventBus, ResultBatch};
use crate::keepalive::KeepAliveSender;
use crate::logging::SessionLogger;
use crate::poller::Poller;

/// Identity of one polling run.
#[derive(Debug, Clone)]
pub(crate) struct Activation {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Mutable engine state, guarded by `Shared::state`.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub session: Option<ProcessingSession>,
    pub activation: Option<Activation>,
    generation: u64,
}

impl EngineState {
    /// Whether `activation` is still the live one.
    pub fn is_current(&self, activation: &Activation) -> bool {
        !activation.token.is_cancelled()
            && self
                .activation
                .as_ref()
                .is_some_and(|a| a.generation == activation.generation)
    }

    fn begin(&mut self) -> Activation {
        self.end();
        self.generation += 1;
        let activation = Activation {
            generation: self.generation,
            token: CancellationToken::new(),
        };
        self.activation = Some(activation.clone());
        activation
    }

    /// Called by a background task that stops on its own.
    pub fn release(&mut self, activation: &Activation) {
        activation.token.cancel();
        if self
            .activation
            .as_ref()
            .is_some_and(|a| a.generation == activation.generation)
        {
            self.activation = None;
        }
    }

    /// Stop the live activation, if any. Returns the new generation.
    fn end(&mut self) -> u64 {
        if let Some(activation) = self.activation.take() {
            activation.token.cancel();
            self.generation += 1;
        }
        self.generation
    }
}

/// State shared between the orchestrator and its background tasks.
pub(crate) struct Shared {
    pub api: Arc<dyn SessionApi>,
    pub store: SessionStore,
    pub local: LocalState,
    pub config: SessionConfig,
    pub events: EventBus,
    pub state: Mutex<EngineState>,
    pending: std::sync::Mutex<Vec<LocalWrite>>,
    persist_lock: Mutex<()>,
}

/// A local write deferred until the state lock is released.
#[derive(Debug)]
pub(crate) enum LocalWrite {
    Log(String),
    Results(Vec<ClipResult>),
    SessionId(SessionId),
}

impl Shared {
    /// Publish the current session and queue a line for the saved log.
    ///
    /// Must be called with the state lock held.
    pub fn publish(&self, session: &ProcessingSession, note: &str) {
        self.events.publish_state(session);

        let line = match &session.error {
            Some(error) => format!(
                "[{}] {}: {}",
                Utc::now().format("%H:%M:%S"),
                session.status,
                error
            ),
            None => format!("[{}] {}: {}", Utc::now().format("%H:%M:%S"), session.status, note),
        };
        self.queue(LocalWrite::Log(line));
    }

    /// Publish newly observed results and queue the full list for saving.
    ///
    /// Must be called with the state lock held.
    pub fn publish_results(&self, session: &ProcessingSession, added: Vec<ClipResult>) {
        if added.is_empty() {
            return;
        }

        self.queue(LocalWrite::Results(session.results.clone()));
        self.events.publish_results(&session.session_id, added);
    }

    pub fn queue(&self, write: LocalWrite) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(write);
    }

    /// Write queued local state.
    ///
    /// Must be called without the state lock held. Log lines are appended
    /// in one write and only the newest result list and session id are
    /// saved.
    pub async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let pending = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        if pending.is_empty() {
            return;
        }

        let mut lines = Vec::new();
        let mut results = None;
        let mut session_id = None;
        for write in pending {
            match write {
                LocalWrite::Log(line) => lines.push(line),
                LocalWrite::Results(list) => results = Some(list),
                LocalWrite::SessionId(id) => session_id = Some(id),
            }
        }

        if let Some(id) = session_id {
            if let Err(e) = self.store.save(&id).await {
                warn!(session_id = %id, "Failed to persist session id: {}", e);
            }
        }
        if let Some(results) = results {
            if let Err(e) = self.local.save_results(&results).await {
                warn!("Failed to save results: {}", e);
            }
        }
        if let Err(e) = self.local.append_logs(lines).await {
            warn!("Failed to save log lines: {}", e);
        }
    }

    /// Fail the activation and publish the error.
    ///
    /// Without an existing session the failure is recorded against
    /// `fallback_id`, or an offline id when none is given.
    pub async fn fail_activation(
        &self,
        activation: &Activation,
        fallback_id: Option<SessionId>,
        message: String,
    ) {
        {
            let mut state = self.state.lock().await;
            if !state.is_current(activation) {
                return;
            }
            state.end();

            let session = match (state.session.take(), fallback_id) {
                (_, Some(id)) => ProcessingSession::failed(id, message),
                (Some(mut session), None) => {
                    session.fail(message);
                    session
                }
                (None, None) => ProcessingSession::failed(SessionId::offline(), message),
            };

            SessionLogger::new(&session.session_id, "orchestrator")
                .log_error(session.error.as_deref().unwrap_or_default());
            self.publish(&session, "failed");
            state.session = Some(session);
        }
        self.persist().await;
    }

    /// Spawn the poller and heartbeat of an activation.
    pub fn spawn_workers(self: &Arc<Self>, activation: Activation, session_id: &SessionId) {
        let logger = SessionLogger::new(session_id, "poller");
        let poller = Poller::new(Arc::clone(self), activation.clone(), logger.clone());
        tokio::spawn(poller.run().instrument(logger.create_span()));

        let logger = SessionLogger::new(session_id, "keepalive");
        let keepalive = KeepAliveSender::new(
            Arc::clone(&self.api),
            self.config.keepalive_period,
            activation.token,
            logger.clone(),
        );
        tokio::spawn(keepalive.run().instrument(logger.create_span()));
    }
}

/// Copy a status response into the session.
///
/// Returns the results that were not seen before. A server-reported error
/// is surfaced verbatim.
pub(crate) fn apply_remote_status(
    session: &mut ProcessingSession,
    response: &StatusResponse,
) -> Vec<ClipResult> {
    session.set_progress(response.progress_percent());
    if let Some(step) = &response.current_step {
        session.current_step = step.clone();
    }

    let added = if response.has_results_field() {
        let incoming = response.results(&session.session_id);
        session.merge_results(incoming)
    } else {
        Vec::new()
    };

    match &response.status {
        RemoteStatus::Error => session.fail(
            response
                .error
                .clone()
                .unwrap_or_else(|| "Processing failed on the server".to_string()),
        ),
        other => {
            if let RemoteStatus::Unrecognized(raw) = other {
                warn!(session_id = %session.session_id, status = %raw, "Unrecognized remote status, treating as processing");
            }
            session.set_status(other.to_session_status());
        }
    }

    added
}

/// Client-side owner of one processing session.
///
/// Public operations never return errors for the session lifecycle: start,
/// cancel and restore report `false` and publish a session in the `error`
/// state instead.
pub struct SessionOrchestrator {
    shared: Arc<Shared>,
    downloader: Option<ArtifactDownloader>,
}

impl SessionOrchestrator {
    pub fn new(api: Arc<dyn SessionApi>, kv: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        let events = EventBus::new(config.event_capacity);

        Self {
            shared: Arc::new(Shared {
                api,
                store: SessionStore::new(Arc::clone(&kv)),
                local: LocalState::new(kv),
                config,
                events,
                state: Mutex::new(EngineState::default()),
                pending: std::sync::Mutex::new(Vec::new()),
                persist_lock: Mutex::new(()),
            }),
            downloader: None,
        }
    }

    /// Attach a downloader for the session's artifacts.
    pub fn with_downloader(mut self, downloader: ArtifactDownloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn downloader(&self) -> Option<&ArtifactDownloader> {
        self.downloader.as_ref()
    }

    /// Locally saved results, logs and filter tags.
    ///
    /// Writes queued by earlier transitions are flushed first.
    pub async fn local_state(&self) -> &LocalState {
        self.shared.persist().await;
        &self.shared.local
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ProcessingSession> {
        self.shared.events.subscribe_state()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<ResultBatch> {
        self.shared.events.subscribe_results()
    }

    /// Snapshot of the current session.
    pub async fn current_session(&self) -> Option<ProcessingSession> {
        self.shared.state.lock().await.session.clone()
    }

    /// Restore the session remembered from a previous run.
    ///
    /// If the server still knows the stored id, the session is rebuilt from
    /// its status and polling resumes when a job is in progress. An
    /// unreachable server leaves no current session. Returns whether a
    /// session was restored.
    pub async fn initialize(&self) -> bool {
        let stored = match self.shared.store.current().await {
            Ok(Some(id)) if !id.is_offline() => id,
            Ok(_) => return false,
            Err(e) => {
                warn!("Failed to read stored session id: {}", e);
                return false;
            }
        };

        let logger = SessionLogger::new(&stored, "orchestrator");
        let response = match self.shared.api.session_status(&stored).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_not_found() {
                    logger.log_warning("Stored session no longer exists on the server");
                    if let Err(e) = self.shared.store.clear().await {
                        warn!("Failed to clear stored session id: {}", e);
                    }
                } else {
                    logger.log_warning(&format!("Could not restore session: {}", e));
                }
                return false;
            }
        };

        {
            let mut state = self.shared.state.lock().await;
            let activation = state.begin();

            let mut session = ProcessingSession::new(stored.clone(), SessionStatus::Idle);
            let added = apply_remote_status(&mut session, &response);
            self.shared.publish_results(&session, added);
            self.shared.publish(&session, "restored");

            let resume = session.status.is_active();
            state.session = Some(session);

            if resume {
                logger.log_start("Resuming polling of restored session");
                self.shared.spawn_workers(activation, &stored);
            } else {
                state.end();
                info!(session_id = %stored, "Restored session");
            }
        }
        self.shared.persist().await;

        true
    }

    /// Start a processing job.
    ///
    /// Stops any running activation, obtains a session id, and sends the
    /// start request. Returns `true` once the server acknowledged that
    /// processing began and polling is running.
    pub async fn start_pipeline(&self, params: PipelineParams) -> bool {
        let activation = self.shared.state.lock().await.begin();

        if let Err(e) = params.validate() {
            let message = SessionError::from(e).to_string();
            self.shared.fail_activation(&activation, None, message).await;
            return false;
        }

        let session_id = match self.acquire_session_id().await {
            Ok(id) => id,
            Err(e) => {
                let message = format!("Cannot reach the processing server: {}", e);
                self.shared
                    .fail_activation(&activation, Some(SessionId::offline()), message)
                    .await;
                return false;
            }
        };
        let logger = SessionLogger::new(&session_id, "orchestrator");

        {
            let mut state = self.shared.state.lock().await;
            if !state.is_current(&activation) {
                return false;
            }

            let mut session = ProcessingSession::new(session_id.clone(), SessionStatus::Starting);
            session.current_step = format!("Starting pipeline for {}", params.source);
            self.shared.queue(LocalWrite::Results(Vec::new()));
            self.shared.publish(&session, &session.current_step);
            state.session = Some(session);
        }
        self.shared.persist().await;

        let ack = match self.shared.api.start_processing(&session_id, &params).await {
            Ok(ack) if ack.is_processing() => ack,
            Ok(ack) => {
                let reason = ack
                    .message
                    .unwrap_or_else(|| format!("unexpected status '{}'", ack.status));
                let message = SessionError::Rejected(reason).to_string();
                self.shared.fail_activation(&activation, None, message).await;
                return false;
            }
            Err(e) => {
                let message = format!("Failed to start processing: {}", e);
                self.shared.fail_activation(&activation, None, message).await;
                return false;
            }
        };

        let mut state = self.shared.state.lock().await;
        if !state.is_current(&activation) {
            return false;
        }
        let Some(session) = state.session.as_mut() else {
            return false;
        };

        if let Some(id) = ack.session_id.filter(|id| *id != session_id) {
            logger.log_warning(&format!("Server acknowledged a different session id {}", id));
        }
        session.set_status(SessionStatus::Processing);
        session.current_step = "Processing started".to_string();
        self.shared.publish(session, "processing started");

        logger.log_start(&format!("Processing {}", params.source));
        self.shared.spawn_workers(activation, &session_id);
        drop(state);

        self.shared.persist().await;
        true
    }

    /// Cancel the running job.
    ///
    /// Local polling and heartbeats stop before the cancel request is sent,
    /// so a late poll response can no longer overwrite the result. Returns
    /// whether the server accepted the cancellation. When it did not, the job
    /// is still running remotely: polling and heartbeats restart for the
    /// same session and the failure is published in `current_step`.
    pub async fn cancel_processing(&self) -> bool {
        let (session_id, generation) = {
            let mut state = self.shared.state.lock().await;
            let Some(session_id) = state.session.as_ref().map(|s| s.session_id.clone()) else {
                return false;
            };
            (session_id, state.end())
        };
        let logger = SessionLogger::new(&session_id, "orchestrator");

        if let Err(e) = self.shared.api.cancel_processing(&session_id).await {
            logger.log_warning(&format!("Cancel request failed: {}", e));
            self.rearm_after_failed_cancel(&session_id, generation, &e.to_string())
                .await;
            return false;
        }

        {
            let mut state = self.shared.state.lock().await;
            if state.generation != generation {
                debug!(session_id = %session_id, "Session changed while cancelling");
                return true;
            }
            if let Some(session) = state.session.as_mut() {
                session.set_status(SessionStatus::Cancelled);
                session.current_step = "Cancelled".to_string();
                self.shared.publish(session, "cancelled by user");
            }
        }
        self.shared.persist().await;

        logger.log_stop("Processing cancelled");
        true
    }

    /// Resume tracking a job whose cancellation the server refused.
    async fn rearm_after_failed_cancel(&self, session_id: &SessionId, generation: u64, reason: &str) {
        {
            let mut state = self.shared.state.lock().await;
            if state.generation != generation {
                return;
            }
            let still_running = state
                .session
                .as_ref()
                .is_some_and(|s| &s.session_id == session_id && s.status.is_active());
            if !still_running {
                return;
            }

            let activation = state.begin();
            if let Some(session) = state.session.as_mut() {
                session.current_step = format!("Cancel failed: {}", reason);
                self.shared.publish(session, "cancel failed, still processing");
            }
            self.shared.spawn_workers(activation, session_id);
        }
        self.shared.persist().await;
    }

    /// Stop polling and heartbeats without contacting the server.
    pub async fn shutdown(&self) {
        self.shared.state.lock().await.end();
        self.shared.persist().await;
        debug!("Session orchestrator shut down");
    }

    /// Sessions the server currently holds.
    pub async fn list_remote_sessions(&self) -> SessionResult<Vec<SessionSummary>> {
        Ok(self.shared.api.list_sessions().await?)
    }

    /// Delete a session and its files on the server.
    ///
    /// When it targets the current session, local timers stop first and the
    /// current session and stored id are cleared on success.
    pub async fn cleanup_session(&self, session_id: &SessionId) -> SessionResult<()> {
        let is_current = {
            let mut state = self.shared.state.lock().await;
            let is_current = state
                .session
                .as_ref()
                .is_some_and(|s| &s.session_id == session_id);
            if is_current {
                state.end();
            }
            is_current
        };

        self.shared.api.cleanup_session(session_id).await?;

        if self.shared.store.current().await?.as_ref() == Some(session_id) {
            self.shared.store.clear().await?;
        }
        if is_current {
            let mut state = self.shared.state.lock().await;
            if state
                .session
                .as_ref()
                .is_some_and(|s| &s.session_id == session_id)
            {
                state.session = None;
            }
        }

        info!(session_id = %session_id, "Session cleaned up");
        Ok(())
    }

    /// Reuse the stored id if the server still knows it, else create one.
    async fn acquire_session_id(&self) -> SessionResult<SessionId> {
        let stored = self.shared.store.current().await.unwrap_or_else(|e| {
            warn!("Failed to read stored session id: {}", e);
            None
        });

        if let Some(id) = stored.filter(|id| !id.is_offline()) {
            match self.shared.api.session_status(&id).await {
                Ok(_) => {
                    debug!(session_id = %id, "Reusing stored session");
                    return Ok(id);
                }
                Err(e) => {
                    info!(session_id = %id, "Stored session is not usable: {}", e);
                }
            }
        }

        let id = self.shared.api.create_session().await?;
        if let Err(e) = self.shared.store.save(&id).await {
            warn!(session_id = %id, "Failed to persist session id: {}", e);
        }
        info!(session_id = %id, "Created new session");
        Ok(id)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.try_lock() {
            state.end();
        }
    }
}
