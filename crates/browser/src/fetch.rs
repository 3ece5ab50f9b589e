//! Page fetching over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use wayfarer_core::error::EnvironmentError;

/// One request the environment wants made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Get { url: String },
    Post { url: String, form: Vec<(String, String)> },
}

impl PageRequest {
    pub fn url(&self) -> &str {
        match self {
            Self::Get { url } | Self::Post { url, .. } => url,
        }
    }
}

/// A response body plus where it ended up after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.content_type.is_empty() || self.content_type.contains("html")
    }
}

/// Transport seam under [`crate::HttpEnvironment`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, EnvironmentError>;
}

/// `reqwest`-backed fetcher with a cookie jar, so sessions survive
/// across requests.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self, EnvironmentError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EnvironmentError::Unreachable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, EnvironmentError> {
        let builder = match request {
            PageRequest::Get { url } => self.client.get(url),
            PageRequest::Post { url, form } => self.client.post(url).form(form),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EnvironmentError::Timeout {
                    operation: format!("fetch {}", request.url()),
                    after_ms: self.timeout_secs * 1000,
                }
            } else {
                EnvironmentError::Navigation {
                    url: request.url().to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response
            .text()
            .await
            .map_err(|e| EnvironmentError::Navigation {
                url: url.clone(),
                reason: format!("Failed to read body: {e}"),
            })?;

        debug!(url = %url, status, bytes = body.len(), "Fetched page");

        Ok(FetchedPage {
            url,
            status,
            content_type,
            body,
        })
    }
}
