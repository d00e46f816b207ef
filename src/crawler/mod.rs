//! Website crawler
//!
//! This module crawls a website breadth-first from a seed URL, bounded by
//! link depth and by the number of fetched pages, and converts every fetched
//! page to Markdown.
//!
//! The pieces are small and separately testable: a [`Frontier`] owns the
//! crawl state, a [`RateLimiter`] spaces requests, a [`MemoryMonitor`] samples
//! process memory, a [`Fetcher`] performs requests, [`transform`] turns HTML
//! into Markdown plus links, and [`UrlFilter`] decides which links are
//! followed. [`Crawler`] wires them into a worker pool.

mod config;
mod content_extraction;
mod error;
mod events;
pub mod fetcher;
mod filter;
mod frontier;
pub mod job;
pub mod links;
mod memory;
mod rate_limit;
mod result;
mod scheduler;
pub mod storage;

pub use config::{CrawlConfig, CrawlConfigBuilder, MemoryThresholds, RateLimitScope};
pub use content_extraction::{Transformed, html_to_markdown, transform};
pub use error::{CrawlError, TransformError};
pub use events::CrawlEvent;
pub use fetcher::{FetchOutcome, Fetcher, HttpFetcher, NetworkErrorKind};
pub use filter::{UrlFilter, is_admissible};
pub use frontier::{Admission, Frontier, FrontierEntry, Next};
pub use job::{CrawlJob, JobCrawlerConfig, JobOutput, run_job, run_job_with_events};
pub use memory::{MemoryMonitor, MemoryProbe, ProcessMemoryProbe};
pub use rate_limit::RateLimiter;
pub use result::{
    AdmissionCounters, CrawlResult, CrawlState, CrawlStats, CrawlStatus, PageOutcome, PageResult,
};
pub use scheduler::{Crawler, crawl_website};
pub use storage::{Storage, StorageConfig, StoredCrawl};
