//! Shared data models for the ClipFlow session client.
//!
//! This crate provides Serde-serializable types for:
//! - Processing sessions and their lifecycle status
//! - Clip results produced by a remote processing job
//! - Pipeline (job) parameters
//! - Wire shapes of the remote session API
//! - Derived artifact URLs

pub mod clip;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod urls;

// Re-export common types
pub use clip::{ClipKey, ClipResult};
pub use pipeline::{PipelineParams, TimeWindow};
pub use remote::{
    CreateSessionResponse, ProcessAck, RemoteStatus, SessionListResponse,
    SessionSummary, StatusResponse,
};
pub use session::{ProcessingSession, SessionId, SessionStatus};
pub use urls::{OutputUrls, UrlError};
