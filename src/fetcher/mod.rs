pub mod http_fetcher;
pub mod parallel;
pub mod retry;

use async_trait::async_trait;
use thiserror::Error;

/// Typed per-item fetch failure. Everything here is recoverable at the
/// batch level: a failed item is reported and the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("blocked by anti-bot challenge")]
    Blocked,

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Short code used in the per-item progress line.
    pub fn code(&self) -> String {
        match self {
            FetchError::Timeout => "timeout".into(),
            FetchError::Http(status) => format!("http-{status}"),
            FetchError::Blocked => "blocked".into(),
            FetchError::Transport(_) => "error".into(),
        }
    }
}

/// Outcome of one fetch. Exactly one is produced per scheduled URL per
/// run; it is transient and consumed by the extractor immediately.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub payload: Option<String>,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub fn ok(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: Some(payload.into()),
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: FetchError) -> Self {
        Self {
            url: url.into(),
            payload: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn code(&self) -> String {
        match &self.error {
            None => "ok".into(),
            Some(err) => err.code(),
        }
    }
}

/// The page-fetching collaborator. Retries, sessions and headers live
/// behind this seam; the pipeline only sees content or a typed failure.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
