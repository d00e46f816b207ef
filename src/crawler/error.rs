//! Error types for the crawler module

use thiserror::Error;

/// Error type for crawler operations
///
/// Only job-fatal conditions surface as a `CrawlError` from a crawl. Problems
/// with individual pages are recorded on the page result instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The seed URL is not a well-formed absolute http(s) URL
    #[error("Invalid seed URL: {0}")]
    InvalidSeed(String),

    /// The crawl configuration cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An invariant of the crawl state was violated
    #[error("Internal crawler fault: {0}")]
    Internal(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a fetched page could not be turned into Markdown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The configured selector matched nothing on the page
    #[error("Selector '{0}' matched no elements")]
    SelectorNotFound(String),

    /// The configured selector is not valid CSS
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// The selector as configured
        selector: String,
        /// Parser message
        reason: String,
    },

    /// The payload cannot be treated as HTML at all
    #[error("Unparseable document: {0}")]
    Unparseable(String),

    /// The response was not a textual document
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl From<regex::Error> for CrawlError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidConfig(format!("Invalid pattern: {}", err))
    }
}

impl From<tokio::task::JoinError> for CrawlError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Worker task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for CrawlError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Internal("Frontier lock poisoned".to_string())
    }
}
