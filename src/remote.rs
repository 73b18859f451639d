use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::content::ContentQuery;
use crate::ledger::ContentUnitProgress;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments: {0}")]
    BaseUrl(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("payload does not match the remote contract: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("remote service is disabled")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl RemoteError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            RemoteError::Api { status, .. } => classify_api_status(*status),
            RemoteError::Request(err) if err.is_decode() || err.is_builder() => {
                ApiErrorClass::Permanent
            }
            RemoteError::Request(_) | RemoteError::Timeout(_) | RemoteError::Disabled => {
                ApiErrorClass::Transient
            }
            RemoteError::Url(_) | RemoteError::BaseUrl(_) | RemoteError::Decode(_) => {
                ApiErrorClass::Permanent
            }
        }
    }

    /// Whether a later attempt can succeed without the request changing.
    /// Auth failures count as retryable: a refreshed token fixes them.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.classification(), ApiErrorClass::Permanent)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Await `fut`, turning an elapsed `limit` into `RemoteError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}

/// Body of `POST /progress/chapter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgressPayload {
    pub chapter_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ContentUnitProgress> for ChapterProgressPayload {
    fn from(record: &ContentUnitProgress) -> Self {
        Self {
            chapter_id: record.chapter_id().to_string(),
            subject_id: record.subject_id.clone(),
            class_id: record.class_id.clone(),
            completed: record.completed,
            completed_at: record.completed_at,
        }
    }
}

/// The remote learning service as seen from this device.
#[async_trait(?Send)]
pub trait LearnRemote {
    /// Fetch the JSON payload behind one content read path.
    async fn fetch_content(&self, query: &ContentQuery) -> Result<Value, RemoteError>;

    /// Submit one chapter progress record. Repeating an identical submission
    /// must be a no-op on the server.
    async fn submit_chapter_progress(
        &self,
        payload: &ChapterProgressPayload,
    ) -> Result<(), RemoteError>;
}

/// Stand-in remote for offline-only deployments; every call fails retryably,
/// so reads fall through to local tiers and writes stay queued.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRemote;

#[async_trait(?Send)]
impl LearnRemote for DisabledRemote {
    async fn fetch_content(&self, _query: &ContentQuery) -> Result<Value, RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn submit_chapter_progress(
        &self,
        _payload: &ChapterProgressPayload,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Disabled)
    }
}

/// HTTP client for the learning service.
#[derive(Clone, Debug)]
pub struct LearnClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl LearnClient {
    /// Create a client for `base_url` (e.g. "https://api.example.org/v1").
    /// `timeout` bounds every request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(timeout).build()?;
        tracing::debug!(%base_url, ?timeout, "creating LearnClient");
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: None,
        })
    }

    /// Return a client that sends `Authorization: Bearer <token>`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::Api { status, body })
        }
    }
}

#[async_trait(?Send)]
impl LearnRemote for LearnClient {
    #[tracing::instrument(level = "debug", skip(self), fields(path = %query))]
    async fn fetch_content(&self, query: &ContentQuery) -> Result<Value, RemoteError> {
        let url = self.endpoint(&query.path_segments())?;
        tracing::debug!(%url, "GET content");
        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<Value>().await?)
    }

    #[tracing::instrument(level = "debug", skip(self, payload), fields(chapter_id = %payload.chapter_id))]
    async fn submit_chapter_progress(
        &self,
        payload: &ChapterProgressPayload,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["progress", "chapter"])?;
        tracing::debug!(%url, completed = payload.completed, "POST chapter progress");
        let response = self.authorize(self.http.post(url)).json(payload).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
