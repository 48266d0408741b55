//! Processing-session orchestration engine.
//!
//! Starts a remote processing job, tracks it through status polling and
//! heartbeats, recovers from server-side session loss, and publishes state
//! snapshots and result batches to subscribers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;

mod keepalive;
mod poller;
mod recovery;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use events::{EventBus, ResultBatch};
pub use logging::SessionLogger;
pub use orchestrator::SessionOrchestrator;
