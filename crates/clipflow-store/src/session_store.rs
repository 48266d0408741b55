//! Persistence of the current session id.

use std::sync::Arc;

use clipflow_models::SessionId;
use tracing::debug;

use crate::error::StoreResult;
use crate::kv::KeyValueStore;

const CURRENT_SESSION_KEY: &str = "current_session_id";

/// Remembers exactly one "current session" id across process restarts.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The stored session id, if any. Blank values count as absent.
    pub async fn current(&self) -> StoreResult<Option<SessionId>> {
        Ok(self
            .kv
            .get(CURRENT_SESSION_KEY)
            .await?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SessionId::from))
    }

    /// Replace the stored session id.
    pub async fn save(&self, session_id: &SessionId) -> StoreResult<()> {
        debug!(session_id = %session_id, "Persisting current session id");
        self.kv.set(CURRENT_SESSION_KEY, session_id.as_str()).await
    }

    /// Forget the stored session id.
    pub async fn clear(&self) -> StoreResult<()> {
        self.kv.remove(CURRENT_SESSION_KEY).await
    }
}
