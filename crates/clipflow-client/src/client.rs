//! HTTP implementation of [`SessionApi`].

use std::time::Instant;

use async_trait::async_trait;
use clipflow_models::{
    CreateSessionResponse, OutputUrls, PipelineParams, ProcessAck, SessionId, SessionListResponse,
    SessionSummary, StatusResponse,
};
use reqwest::{multipart::Form, Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

use crate::api::SessionApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics::record_request;

/// Session API client.
#[derive(Clone)]
pub struct SessionClient {
    http: Client,
    config: ClientConfig,
    urls: OutputUrls,
}

impl SessionClient {
    /// Create a client for the configured base address.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let urls = config.urls()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("clipflow-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { http, config, urls })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn urls(&self) -> &OutputUrls {
        &self.urls
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        session_id: Option<&SessionId>,
        fut: F,
    ) -> ClientResult<T>
    where
        F: std::future::Future<Output = ClientResult<T>>,
    {
        let span = match session_id {
            Some(id) => info_span!("session_api", operation = %operation, session_id = %id),
            None => info_span!("session_api", operation = %operation),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, latency_ms);

        result
    }

    /// Map a non-success response to an error.
    async fn check_status(
        response: Response,
        session_id: Option<&SessionId>,
    ) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "{} failed: {}", url, body);
        Err(ClientError::from_http_status(status.as_u16(), session_id, body))
    }

    /// Read the body as text and decode it, so a malformed body is reported
    /// as a protocol error rather than a transport one.
    async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ClientError::invalid_response(format!("{} (body: {})", e, truncate(&text, 200)))
        })
    }
}

#[async_trait]
impl SessionApi for SessionClient {
    async fn create_session(&self) -> ClientResult<SessionId> {
        let url = self.urls.endpoint("/session/create");

        self.execute_request("create_session", None, async {
            let response = self.http.post(&url).send().await?;
            let response = Self::check_status(response, None).await?;
            let body: CreateSessionResponse = Self::decode(response).await?;

            match body.session_id {
                Some(id) if !id.as_str().trim().is_empty() => Ok(id),
                _ => Err(ClientError::invalid_response(format!(
                    "create returned no session id (status: {})",
                    body.status
                ))),
            }
        })
        .await
    }

    async fn session_status(&self, session_id: &SessionId) -> ClientResult<StatusResponse> {
        let url = self.urls.endpoint(&format!(
            "/session/status/{}",
            urlencoding::encode(session_id.as_str())
        ));

        self.execute_request("session_status", Some(session_id), async {
            let response = self.http.get(&url).send().await?;
            let response = Self::check_status(response, Some(session_id)).await?;
            Self::decode(response).await
        })
        .await
    }

    async fn start_processing(
        &self,
        session_id: &SessionId,
        params: &PipelineParams,
    ) -> ClientResult<ProcessAck> {
        let url = self.urls.endpoint("/session/process");
        let form = params
            .to_form(session_id)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        self.execute_request("start_processing", Some(session_id), async {
            let response = self.http.post(&url).multipart(form).send().await?;
            let response = Self::check_status(response, Some(session_id)).await?;
            Self::decode(response).await
        })
        .await
    }

    async fn cancel_processing(&self, session_id: &SessionId) -> ClientResult<()> {
        let url = self.urls.endpoint(&format!(
            "/session/cancel/{}",
            urlencoding::encode(session_id.as_str())
        ));

        self.execute_request("cancel_processing", Some(session_id), async {
            let response = self.http.delete(&url).send().await?;
            Self::check_status(response, Some(session_id)).await?;
            Ok(())
        })
        .await
    }

    async fn keepalive(&self) -> ClientResult<()> {
        let url = self.urls.endpoint("/session/keepalive");

        self.execute_request("keepalive", None, async {
            let response = self
                .http
                .get(&url)
                .timeout(self.config.keepalive_timeout)
                .send()
                .await?;
            Self::check_status(response, None).await?;
            Ok(())
        })
        .await
    }

    async fn list_sessions(&self) -> ClientResult<Vec<SessionSummary>> {
        let url = self.urls.endpoint("/session/list");

        self.execute_request("list_sessions", None, async {
            let response = self.http.get(&url).send().await?;
            let response = Self::check_status(response, None).await?;
            let body: SessionListResponse = Self::decode(response).await?;
            Ok(body.sessions)
        })
        .await
    }

    async fn cleanup_session(&self, session_id: &SessionId) -> ClientResult<()> {
        let url = self.urls.endpoint(&format!(
            "/session/cleanup/{}",
            urlencoding::encode(session_id.as_str())
        ));

        self.execute_request("cleanup_session", Some(session_id), async {
            let response = self.http.delete(&url).send().await?;
            Self::check_status(response, Some(session_id)).await?;
            Ok(())
        })
        .await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
