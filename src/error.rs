//! Error types for the markcrawl crate

use thiserror::Error;

use crate::crawler::CrawlError;
use crate::crawler::storage::StorageError;

/// Result type for markcrawl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for markcrawl operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The submitted job failed validation before any page was fetched
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Persisting crawl output failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CrawlError> for Error {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Http(e) => Error::Http(e),
            CrawlError::InvalidSeed(_) | CrawlError::InvalidConfig(_) => {
                Error::InvalidJob(err.to_string())
            }
            _ => Error::Crawl(err.to_string()),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => Error::Io(e),
            StorageError::Json(e) => Error::Json(e),
            _ => Error::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_seed_maps_to_invalid_job() {
        let err: Error = CrawlError::InvalidSeed("not a url".to_string()).into();
        assert!(matches!(err, Error::InvalidJob(_)));
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_internal_fault_maps_to_crawl() {
        let err: Error = CrawlError::Internal("frontier lock poisoned".to_string()).into();
        assert!(matches!(err, Error::Crawl(_)));
    }
}
