//! Event channels for session observers.
//!
//! Two independent broadcast channels: full state snapshots and result
//! batches. Neither keeps history, so a subscriber only sees events
//! published after it subscribed. A subscriber that falls behind by more
//! than the channel capacity loses the oldest events (`RecvError::Lagged`).

use clipflow_models::{ClipResult, ProcessingSession, SessionId};
use tokio::sync::broadcast;
use tracing::trace;

/// Newly observed results of one poll, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    pub session_id: SessionId,
    pub results: Vec<ClipResult>,
}

/// Publisher side of the session event channels.
#[derive(Debug, Clone)]
pub struct EventBus {
    state_tx: broadcast::Sender<ProcessingSession>,
    results_tx: broadcast::Sender<ResultBatch>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (state_tx, _) = broadcast::channel(capacity);
        let (results_tx, _) = broadcast::channel(capacity);
        Self {
            state_tx,
            results_tx,
        }
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ProcessingSession> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<ResultBatch> {
        self.results_tx.subscribe()
    }

    /// Publish a state snapshot. Returns silently when nobody listens.
    pub fn publish_state(&self, session: &ProcessingSession) {
        if self.state_tx.send(session.clone()).is_err() {
            trace!(session_id = %session.session_id, "No state subscribers");
        }
    }

    /// Publish a non-empty result batch.
    pub fn publish_results(&self, session_id: &SessionId, results: Vec<ClipResult>) {
        if results.is_empty() {
            return;
        }

        let batch = ResultBatch {
            session_id: session_id.clone(),
            results,
        };
        if self.results_tx.send(batch).is_err() {
            trace!(session_id = %session_id, "No result subscribers");
        }
    }
}
