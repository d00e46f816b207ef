//! HTTP fetching for the crawler
//!
//! A fetch performs exactly one GET and classifies the outcome. There are no
//! retries at this level.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    UPGRADE_INSECURE_REQUESTS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::crawler::error::CrawlError;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Why a request did not produce a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    /// Could not connect (DNS, refused, TLS handshake)
    Connect,
    /// Too many redirects or a redirect loop
    Redirect,
    /// The response body could not be read or decoded
    Body,
    /// Any other transport failure
    Request,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connect => "connection failed",
            Self::Redirect => "redirect error",
            Self::Body => "failed to read body",
            Self::Request => "request failed",
        };
        f.write_str(text)
    }
}

/// Classified result of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx response
    Success {
        /// Decoded response body
        body: String,
        /// Value of the Content-Type header, if any
        content_type: Option<String>,
    },
    /// Non-2xx response
    HttpError(u16),
    /// Transport failure
    NetworkError(NetworkErrorKind),
    /// The request did not finish within the timeout
    Timeout,
}

impl FetchOutcome {
    /// Human readable description of a failed outcome
    pub fn describe(&self) -> String {
        match self {
            Self::Success { .. } => "ok".to_string(),
            Self::HttpError(status) => format!("HTTP status {}", status),
            Self::NetworkError(kind) => format!("network error: {}", kind),
            Self::Timeout => "request timed out".to_string(),
        }
    }
}

/// Something that can retrieve a page
pub trait Fetcher: Send + Sync + 'static {
    /// Perform one GET of `url`, giving up after `timeout`
    fn fetch(&self, url: &Url, timeout: Duration) -> impl Future<Output = FetchOutcome> + Send;
}

/// Whether a Content-Type can be fed to the HTML transformer
pub fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty()
        || mime.starts_with("text/")
        || mime == "application/xhtml+xml"
        || mime == "application/xml"
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default user agent and headers
    pub fn new() -> Result<Self, CrawlError> {
        Self::builder().build()
    }

    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }
}

/// Builder for HttpFetcher
#[derive(Debug, Default)]
pub struct HttpFetcherBuilder {
    user_agent: Option<String>,
    custom_headers: HashMap<String, String>,
}

impl HttpFetcherBuilder {
    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Headers merged over the defaults
    pub fn custom_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.custom_headers.extend(headers);
        self
    }

    /// Build the fetcher
    pub fn build(self) -> Result<HttpFetcher, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        for (name, value) in &self.custom_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                CrawlError::InvalidConfig(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                CrawlError::InvalidConfig(format!(
                    "Invalid header value for '{}': {}",
                    name.as_str(),
                    e
                ))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .default_headers(headers)
            .build()?;

        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url), level = "debug")]
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchOutcome {
        let response = match self.client.get(url.clone()).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => return classify(&e),
        };

        let status = response.status();
        if !status.is_success() {
            debug!("Non-success status {} for {}", status, url);
            return FetchOutcome::HttpError(status.as_u16());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.text().await {
            Ok(body) => FetchOutcome::Success { body, content_type },
            Err(e) if e.is_timeout() => FetchOutcome::Timeout,
            Err(_) => FetchOutcome::NetworkError(NetworkErrorKind::Body),
        }
    }
}

fn classify(err: &reqwest::Error) -> FetchOutcome {
    if err.is_timeout() {
        FetchOutcome::Timeout
    } else if err.is_connect() {
        FetchOutcome::NetworkError(NetworkErrorKind::Connect)
    } else if err.is_redirect() {
        FetchOutcome::NetworkError(NetworkErrorKind::Redirect)
    } else if err.is_body() || err.is_decode() {
        FetchOutcome::NetworkError(NetworkErrorKind::Body)
    } else {
        FetchOutcome::NetworkError(NetworkErrorKind::Request)
    }
}
