//! # Crawler Configuration Module
//!
//! This module provides configuration options for the crawl engine, including
//! controls for crawl depth, page limits, URL filtering, politeness and
//! content selection. It uses a builder pattern for flexible configuration.
//!
//! ## Key Components
//!
//! - `CrawlConfig`: The main configuration struct with crawler parameters
//! - `CrawlConfigBuilder`: Builder pattern implementation for easier configuration
//! - `MemoryThresholds`: Soft and hard memory ceilings for the memory monitor
//! - `RateLimitScope`: Whether the request interval is global or per origin
//!
//! A configuration is validated once when a crawl starts and is shared
//! read-only between workers afterwards.

use std::time::Duration;

use scraper::Selector;

use crate::crawler::error::CrawlError;
use crate::crawler::filter::UrlFilter;

const MIB: u64 = 1024 * 1024;

/// Scope in which the minimum request interval is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitScope {
    /// One interval shared by every request of the crawl
    #[default]
    Global,
    /// A separate interval per `scheme://host:port`
    PerOrigin,
}

/// Memory ceilings watched by the memory monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryThresholds {
    /// Resident size above which the process is considered under pressure
    pub soft_limit_bytes: u64,

    /// Resident size above which the crawl must stop
    pub hard_limit_bytes: u64,

    /// How often the process is sampled
    pub sample_interval: Duration,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            soft_limit_bytes: 400 * MIB,
            hard_limit_bytes: 500 * MIB,
            sample_interval: Duration::from_millis(500),
        }
    }
}

impl MemoryThresholds {
    /// Thresholds expressed in mebibytes
    pub fn from_mib(soft: u64, hard: u64) -> Self {
        Self {
            soft_limit_bytes: soft * MIB,
            hard_limit_bytes: hard * MIB,
            ..Self::default()
        }
    }
}

/// Configuration for a crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link distance from the seed
    pub max_depth: usize,

    /// Maximum number of successfully fetched pages
    pub max_pages: usize,

    /// Regex patterns a URL must match one of (when non-empty)
    pub include_patterns: Vec<String>,

    /// Regex patterns that reject a URL
    pub exclude_patterns: Vec<String>,

    /// Minimum interval between the start of two requests
    pub wait_time: Duration,

    /// CSS selector scoping the converted content
    pub selector: Option<String>,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Timeout for a single request
    pub request_timeout: Duration,

    /// Scope of the request interval
    pub rate_limit_scope: RateLimitScope,

    /// Whether to only follow links on the seed's host
    pub same_host_only: bool,

    /// CSS selectors for elements dropped before conversion
    pub strip_selectors: Vec<String>,

    /// Memory monitor ceilings
    pub memory: MemoryThresholds,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            wait_time: Duration::from_secs(1),
            selector: None,
            concurrency: 4,
            request_timeout: Duration::from_secs(30),
            rate_limit_scope: RateLimitScope::Global,
            same_host_only: true,
            strip_selectors: vec![
                "script".to_string(),
                "style".to_string(),
                "noscript".to_string(),
            ],
            memory: MemoryThresholds::default(),
        }
    }
}

/// Builder for CrawlConfig
#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlConfig::default(),
        }
    }

    /// Set the maximum depth to crawl
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the maximum number of pages to fetch
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Set the include patterns
    pub fn include_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.include_patterns = patterns;
        self
    }

    /// Set the exclude patterns
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Set the minimum interval between requests
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.config.wait_time = wait_time;
        self
    }

    /// Set the content selector
    pub fn selector(mut self, selector: Option<String>) -> Self {
        self.config.selector = selector;
        self
    }

    /// Set the number of concurrent workers
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the rate limiting scope
    pub fn rate_limit_scope(mut self, scope: RateLimitScope) -> Self {
        self.config.rate_limit_scope = scope;
        self
    }

    /// Set whether to stay on the seed's host
    pub fn same_host_only(mut self, same_host_only: bool) -> Self {
        self.config.same_host_only = same_host_only;
        self
    }

    /// Set the selectors for elements dropped before conversion
    pub fn strip_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.strip_selectors = selectors;
        self
    }

    /// Set the memory thresholds
    pub fn memory(mut self, memory: MemoryThresholds) -> Self {
        self.config.memory = memory;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

impl CrawlConfig {
    /// Create a new builder
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }

    /// Check the configuration and compile its URL filter
    pub fn validate(&self) -> Result<UrlFilter, CrawlError> {
        if self.max_pages == 0 {
            return Err(CrawlError::InvalidConfig(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(CrawlError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(CrawlError::InvalidConfig(
                "request_timeout must be positive".to_string(),
            ));
        }
        if self.memory.sample_interval.is_zero() {
            return Err(CrawlError::InvalidConfig(
                "memory sample interval must be positive".to_string(),
            ));
        }
        if self.memory.soft_limit_bytes > self.memory.hard_limit_bytes {
            return Err(CrawlError::InvalidConfig(
                "soft memory limit exceeds hard memory limit".to_string(),
            ));
        }
        for selector in self.selector.iter().chain(&self.strip_selectors) {
            Selector::parse(selector).map_err(|e| {
                CrawlError::InvalidConfig(format!("Invalid selector '{}': {}", selector, e))
            })?;
        }
        UrlFilter::new(&self.include_patterns, &self.exclude_patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = CrawlConfig::builder()
            .max_depth(1)
            .max_pages(10)
            .wait_time(Duration::from_millis(250))
            .selector(Some("article".to_string()))
            .rate_limit_scope(RateLimitScope::PerOrigin)
            .build();

        assert_eq!(config.max_depth, 1);
        assert_eq!(config.max_pages, 10);
        assert_eq!(config.wait_time, Duration::from_millis(250));
        assert_eq!(config.selector.as_deref(), Some("article"));
        assert_eq!(config.rate_limit_scope, RateLimitScope::PerOrigin);
        assert_eq!(config.concurrency, 4);
        assert!(config.same_host_only);
    }

    #[test]
    fn test_zero_max_pages_is_rejected() {
        let config = CrawlConfig::builder().max_pages(0).build();
        assert!(matches!(
            config.validate(),
            Err(CrawlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = CrawlConfig::builder()
            .exclude_patterns(vec!["(unclosed".to_string()])
            .build();
        assert!(matches!(
            config.validate(),
            Err(CrawlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let config = CrawlConfig::builder()
            .selector(Some("[[[".to_string()))
            .build();
        assert!(matches!(
            config.validate(),
            Err(CrawlError::InvalidConfig(_))
        ));

        let config = CrawlConfig::builder()
            .strip_selectors(vec!["nav".to_string(), "<<".to_string()])
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_thresholds_must_be_ordered() {
        let config = CrawlConfig::builder()
            .memory(MemoryThresholds::from_mib(600, 500))
            .build();
        assert!(config.validate().is_err());
    }
}
