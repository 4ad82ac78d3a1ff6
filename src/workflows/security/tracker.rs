//! Outbound issue-tracker integration.
//!
//! The backend is chosen once at startup: without an API base URL (or with the feature flag
//! off) the [`NullTrackerClient`] acknowledges everything locally and never touches the
//! network.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::comments::DecisionMode;
use super::domain::{is_valid_ticket_key, normalize_ticket_key, CriterionSnapshot, FrameworkSnapshot};
use crate::config::TrackerConfig;

/// `<base>/browse/<KEY>`, or `None` without a base URL or with an invalid key.
pub fn issue_url(base: Option<&str>, key: &str) -> Option<String> {
    let base = base.map(|base| base.trim_end_matches('/')).filter(|base| !base.is_empty())?;
    if key.is_empty() || !is_valid_ticket_key(key) {
        return None;
    }
    Some(format!("{base}/browse/{}", normalize_ticket_key(key)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRiskRequest {
    pub ticket: String,
    pub mode: DecisionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<CriterionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRiskResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_comment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub ok: bool,
}

/// Capability interface over the tracker backend.
pub trait TrackerClient: Send + Sync {
    fn upsert_risk(
        &self,
        request: &UpsertRiskRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<UpsertRiskResponse, TrackerError>> + Send;

    fn post_comment(
        &self,
        ticket: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Acknowledgement, TrackerError>> + Send;

    fn set_labels(
        &self,
        ticket: &str,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Acknowledgement, TrackerError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker request timed out")]
    Timeout,
    #[error("tracker request cancelled")]
    Cancelled,
    #[error("tracker responded {status}: {body}")]
    Status { status: u16, body: String },
    #[error("tracker transport failure: {0}")]
    Transport(reqwest::Error),
    #[error("tracker response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TrackerError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(value)
        }
    }
}

/// Acknowledges every call without a backend.
#[derive(Debug, Default, Clone)]
pub struct NullTrackerClient;

impl TrackerClient for NullTrackerClient {
    async fn upsert_risk(
        &self,
        request: &UpsertRiskRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        info!(ticket = %request.ticket, mode = ?request.mode, "tracker backend disabled; upsert acknowledged locally");
        Ok(UpsertRiskResponse {
            ok: true,
            updated_labels: None,
            posted_comment: None,
            ticket: Some(request.ticket.clone()),
        })
    }

    async fn post_comment(
        &self,
        ticket: &str,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        info!(%ticket, chars = text.chars().count(), "tracker backend disabled; comment acknowledged locally");
        Ok(Acknowledgement { ok: true })
    }

    async fn set_labels(
        &self,
        ticket: &str,
        labels: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        info!(%ticket, ?labels, "tracker backend disabled; labels acknowledged locally");
        Ok(Acknowledgement { ok: true })
    }
}

/// Responses that a `204 No Content` stands in for.
trait NoContent {
    fn no_content() -> Self;
}

impl NoContent for UpsertRiskResponse {
    fn no_content() -> Self {
        Self {
            ok: true,
            updated_labels: None,
            posted_comment: None,
            ticket: None,
        }
    }
}

impl NoContent for Acknowledgement {
    fn no_content() -> Self {
        Self { ok: true }
    }
}

#[derive(Serialize)]
struct CommentBody<'a> {
    ticket: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct LabelsBody<'a> {
    ticket: &'a str,
    labels: &'a [String],
}

/// JSON-over-HTTP client for the intake backend. One request per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpTrackerClient {
    client: Client,
    base_url: String,
}

impl HttpTrackerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TrackerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<R, TrackerError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + NoContent,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "posting to tracker backend");

        let send = self.client.post(&url).json(body).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(R::no_content());
        }

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
            bytes = response.bytes() => bytes?,
        };
        serde_json::from_slice(&bytes).map_err(|err| TrackerError::Decode(err.to_string()))
    }
}

impl TrackerClient for HttpTrackerClient {
    async fn upsert_risk(
        &self,
        request: &UpsertRiskRequest,
        cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        self.post_json("/risk", request, cancel).await
    }

    async fn post_comment(
        &self,
        ticket: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        self.post_json("/jira/comment", &CommentBody { ticket, text }, cancel)
            .await
    }

    async fn set_labels(
        &self,
        ticket: &str,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        self.post_json("/jira/labels", &LabelsBody { ticket, labels }, cancel)
            .await
    }
}

/// Client selected from configuration at construction time.
#[derive(Debug, Clone)]
pub enum TrackerBackend {
    Null(NullTrackerClient),
    Http(HttpTrackerClient),
}

impl TrackerBackend {
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackerError> {
        match (config.backend_enabled(), config.api_base_url.as_deref()) {
            (true, Some(base_url)) => {
                let timeout = Duration::from_millis(config.timeout_ms);
                info!(%base_url, timeout_ms = config.timeout_ms, "tracker backend enabled");
                Ok(Self::Http(HttpTrackerClient::new(base_url, timeout)?))
            }
            _ => Ok(Self::Null(NullTrackerClient)),
        }
    }
}

impl TrackerClient for TrackerBackend {
    async fn upsert_risk(
        &self,
        request: &UpsertRiskRequest,
        cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        match self {
            TrackerBackend::Null(client) => client.upsert_risk(request, cancel).await,
            TrackerBackend::Http(client) => client.upsert_risk(request, cancel).await,
        }
    }

    async fn post_comment(
        &self,
        ticket: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        match self {
            TrackerBackend::Null(client) => client.post_comment(ticket, text, cancel).await,
            TrackerBackend::Http(client) => client.post_comment(ticket, text, cancel).await,
        }
    }

    async fn set_labels(
        &self,
        ticket: &str,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        match self {
            TrackerBackend::Null(client) => client.set_labels(ticket, labels, cancel).await,
            TrackerBackend::Http(client) => client.set_labels(ticket, labels, cancel).await,
        }
    }
}
