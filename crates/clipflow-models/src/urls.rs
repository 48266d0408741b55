//! Artifact URL derivation.
//!
//! URLs are always rebuilt from `{base, session_id, filename}`; nothing
//! stores a full URL.

use thiserror::Error;
use url::Url;

use crate::{ClipResult, SessionId};

/// Errors raised while building artifact URLs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Invalid base URL: {0}")]
    InvalidBase(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Builds URLs for session artifacts under an API base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUrls {
    base: String,
}

impl OutputUrls {
    /// Parse and validate a base address such as `http://localhost:8000/api`.
    pub fn parse(base: &str) -> Result<Self, UrlError> {
        let parsed = Url::parse(base.trim()).map_err(|e| UrlError::InvalidBase(e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(UrlError::UnsupportedScheme(other.to_string())),
        }

        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// The normalized base address (no trailing slash).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// URL of an API path, e.g. `endpoint("/session/create")`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Inline stream of a session file (`/session/output/{id}/{filename}`).
    pub fn output(&self, session_id: &SessionId, filename: &str) -> String {
        self.file_url("output", session_id, filename)
    }

    /// Attachment download of a session file (`/session/download/{id}/{filename}`).
    pub fn download(&self, session_id: &SessionId, filename: &str) -> String {
        self.file_url("download", session_id, filename)
    }

    /// Zip archive of a whole session (`/session/download_session/{id}`).
    pub fn archive(&self, session_id: &SessionId) -> String {
        format!(
            "{}/session/download_session/{}",
            self.base,
            urlencoding::encode(session_id.as_str())
        )
    }

    /// Playback URL of a result's video.
    pub fn video(&self, clip: &ClipResult) -> String {
        self.output(&clip.session_id, &clip.video)
    }

    /// URL of a result's thumbnail, if it has one.
    pub fn thumbnail(&self, clip: &ClipResult) -> Option<String> {
        if clip.thumbnail.is_empty() {
            None
        } else {
            Some(self.output(&clip.session_id, &clip.thumbnail))
        }
    }

    fn file_url(&self, kind: &str, session_id: &SessionId, filename: &str) -> String {
        format!(
            "{}/session/{}/{}/{}",
            self.base,
            kind,
            urlencoding::encode(session_id.as_str()),
            urlencoding::encode(filename)
        )
    }
}
