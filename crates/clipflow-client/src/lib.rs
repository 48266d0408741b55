//! HTTP client for the remote session API.
//!
//! This crate provides:
//! - The `SessionApi` trait the orchestration engine is written against
//! - `SessionClient`, its reqwest implementation with per-request timeouts
//! - `ArtifactDownloader` for streamed file and archive downloads
//! - Request metrics and tracing spans

pub mod api;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod metrics;


pub use api::SessionApi;
pub use client::SessionClient;
pub use config::ClientConfig;
pub use download::{ArtifactDownloader, DownloadProgress, ProgressSender};
pub use error::{ClientError, ClientResult, ErrorKind};
