use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::app::Result;
use crate::config::Config;
use crate::fetcher::retry::RetryPolicy;
use crate::fetcher::{FetchError, PageFetcher};
use crate::session::Session;

/// reqwest-backed page fetcher: one client with the session's cookies,
/// browser-shaped default headers, and the uniform retry policy.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &Config, session: &Session) -> Result<Self> {
        let origins: Vec<Url> = config
            .cookie_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        let jar = session.seed_jar(&origins);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .cookie_provider(jar)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Blocked);
        }
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        if looks_blocked(&body) {
            return Err(FetchError::Blocked);
        }

        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.retry.run(|| self.fetch_once(url)).await
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Http(status.as_u16())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Anti-bot challenges come back as HTTP 200 with a captcha page.
fn looks_blocked(body: &str) -> bool {
    body.to_lowercase().contains("captcha")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captcha_body_is_blocked() {
        assert!(looks_blocked("<html><div id=\"CAPTCHA-box\"></div></html>"));
        assert!(!looks_blocked("<html><h1>Сырники</h1></html>"));
    }

    #[test]
    fn test_builds_with_defaults_and_empty_session() {
        let config = Config::default();
        let fetcher = HttpFetcher::new(&config, &Session::empty());
        assert!(fetcher.is_ok());
    }
}
