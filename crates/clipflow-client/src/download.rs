//! Streamed artifact downloads.
//!
//! Bodies are written to disk chunk by chunk as they arrive. Only the
//! connect phase and each individual chunk read are time-bounded, so a large
//! archive on a slow link is fine as long as bytes keep flowing.

use std::path::Path;
use std::time::Instant;

use clipflow_models::{OutputUrls, SessionId};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics::{record_download, record_request};

/// Progress notification for a download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadProgress {
    /// Fraction of the body written so far, in `[0, 1]`.
    /// Only sent when the server announced a content length.
    Fraction(f64),
    /// The body was fully written.
    Complete { bytes: u64 },
}

pub type ProgressSender = mpsc::UnboundedSender<DownloadProgress>;

/// Downloads session artifacts to local files.
#[derive(Clone)]
pub struct ArtifactDownloader {
    http: Client,
    urls: OutputUrls,
    read_timeout: std::time::Duration,
}

impl ArtifactDownloader {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let urls = config.urls()?;

        // No total timeout here; chunk reads are bounded individually.
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("clipflow-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self {
            http,
            urls,
            read_timeout: config.download_read_timeout,
        })
    }

    pub fn urls(&self) -> &OutputUrls {
        &self.urls
    }

    /// Download one session file (`/session/download/{id}/{filename}`) to `dest`.
    ///
    /// Returns the number of bytes written. A partially written file is left
    /// in place on failure.
    pub async fn download_artifact(
        &self,
        session_id: &SessionId,
        filename: &str,
        dest: impl AsRef<Path>,
        progress: Option<&ProgressSender>,
    ) -> ClientResult<u64> {
        let url = self.urls.download(session_id, filename);
        let span = info_span!("download", kind = "artifact", session_id = %session_id, filename = %filename);

        self.download_to(&url, session_id, dest.as_ref(), progress, "artifact")
            .instrument(span)
            .await
    }

    /// Download the zip archive of a whole session to `dest`.
    pub async fn download_archive(
        &self,
        session_id: &SessionId,
        dest: impl AsRef<Path>,
        progress: Option<&ProgressSender>,
    ) -> ClientResult<u64> {
        let url = self.urls.archive(session_id);
        let span = info_span!("download", kind = "archive", session_id = %session_id);

        self.download_to(&url, session_id, dest.as_ref(), progress, "archive")
            .instrument(span)
            .await
    }

    /// Open the inline stream of a session file (`/session/output/{id}/{filename}`).
    ///
    /// The caller consumes the body, e.g. with `bytes_stream()`.
    pub async fn open_output_stream(
        &self,
        session_id: &SessionId,
        filename: &str,
    ) -> ClientResult<Response> {
        let url = self.urls.output(session_id, filename);
        let start = Instant::now();

        let result = self.send(&url, session_id).await;
        let status = match &result {
            Ok(response) => response.status().as_u16(),
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request("open_output_stream", status, start.elapsed().as_millis() as f64);

        result
    }

    async fn send(&self, url: &str, session_id: &SessionId) -> ClientResult<Response> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_http_status(status.as_u16(), Some(session_id), body))
    }

    async fn download_to(
        &self,
        url: &str,
        session_id: &SessionId,
        dest: &Path,
        progress: Option<&ProgressSender>,
        kind: &str,
    ) -> ClientResult<u64> {
        let start = Instant::now();
        let result = self.stream_to_file(url, session_id, dest, progress).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(&format!("download_{}", kind), status, start.elapsed().as_millis() as f64);

        if let Ok(bytes) = &result {
            record_download(kind, *bytes);
            info!("Downloaded {} bytes to {}", bytes, dest.display());
        }

        result
    }

    async fn stream_to_file(
        &self,
        url: &str,
        session_id: &SessionId,
        dest: &Path,
        progress: Option<&ProgressSender>,
    ) -> ClientResult<u64> {
        debug!("Downloading {} to {}", url, dest.display());

        let response = self.send(url, session_id).await?;
        let total = response.content_length().filter(|len| *len > 0);

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let next = tokio::time::timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| {
                    ClientError::Timeout(format!(
                        "no data for {}s after {} bytes",
                        self.read_timeout.as_secs(),
                        written
                    ))
                })?;

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let (Some(total), Some(tx)) = (total, progress) {
                let fraction = (written as f64 / total as f64).min(1.0);
                let _ = tx.send(DownloadProgress::Fraction(fraction));
            }
        }

        file.flush().await?;

        if let Some(tx) = progress {
            let _ = tx.send(DownloadProgress::Complete { bytes: written });
        }

        Ok(written)
    }
}
