//! Spreadsheet CSV export client.
//!
//! Fetching is abstracted behind [`CsvSource`] so the sync loop can be driven
//! by an HTTP client in production and by canned payloads in tests.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// How a failed fetch is reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum FailureKind {
    #[display("not configured")]
    NotConfigured,
    #[display("transport error")]
    Transport,
    #[display("empty or invalid payload")]
    EmptyOrInvalidPayload,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("No endpoint configured for source '{source_key}'")]
    NotConfigured { source_key: String },
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Failed to read local source: {0}")]
    Io(#[from] std::io::Error),
    #[error("Response is not CSV data ({reason}); check sheet sharing permissions")]
    InvalidPayload { reason: String },
    #[error("No valid rows in response")]
    NoValidRows,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::NotConfigured { .. } => FailureKind::NotConfigured,
            FetchError::Request(_) | FetchError::Status { .. } | FetchError::Io(_) => {
                FailureKind::Transport
            }
            FetchError::InvalidPayload { .. } | FetchError::NoValidRows => {
                FailureKind::EmptyOrInvalidPayload
            }
        }
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}

static HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<!doctype\s+html|<html").expect("HTML marker pattern is valid")
});

/// Heuristic check that a body is an HTML page rather than CSV data
pub fn looks_like_html(body: &str) -> bool {
    HTML_MARKER.is_match(body)
}

/// Reject bodies that cannot be CSV data before parsing them
pub fn check_payload(body: &str) -> Result<(), FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::invalid_payload("empty body"));
    }
    if looks_like_html(body) {
        return Err(FetchError::invalid_payload("HTML page"));
    }
    Ok(())
}

/// Source of raw CSV text keyed by endpoint
#[async_trait]
pub trait CsvSource: Send + Sync {
    async fn fetch_csv(&self, endpoint: &str) -> Result<String, FetchError>;
}

/// HTTP(S) client for published sheet exports.
///
/// `file://` endpoints are read from disk, which is handy for local exports.
#[derive(Debug, Clone)]
pub struct HttpCsvSource {
    client: reqwest::Client,
}

impl HttpCsvSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trendsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CsvSource for HttpCsvSource {
    async fn fetch_csv(&self, endpoint: &str) -> Result<String, FetchError> {
        if let Some(path) = endpoint.strip_prefix("file://") {
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        tracing::debug!(url = %endpoint, "📡 Fetching sheet export");
        let response = self.client.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        tracing::debug!(url = %endpoint, bytes = body.len(), "📨 Sheet export received");
        Ok(body)
    }
}
