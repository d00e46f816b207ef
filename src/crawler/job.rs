//! Crawl jobs as submitted by callers
//!
//! A [`CrawlJob`] is the serialized request shape: the seed, the optional
//! selector and headers, the request interval in seconds and the bounds of
//! the crawl. [`run_job`] validates it, runs the crawl over HTTP and, when
//! asked to, writes the output with [`Storage`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::crawler::config::CrawlConfig;
use crate::crawler::events::CrawlEvent;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::filter::UrlFilter;
use crate::crawler::memory::MemoryMonitor;
use crate::crawler::result::CrawlResult;
use crate::crawler::scheduler::Crawler;
use crate::crawler::storage::{Storage, StorageConfig, StoredCrawl};
use crate::error::{Error, Result};
use crate::settings::Settings;

pub const MAX_DEPTH_LIMIT: usize = 10;
pub const MAX_PAGES_LIMIT: usize = 1000;
pub const MAX_WAIT_SECS: f64 = 30.0;

/// Bounds of a job's crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCrawlerConfig {
    pub max_depth: usize,
    pub max_pages: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for JobCrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// A crawl request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJob {
    /// Seed URL
    pub url: String,

    /// CSS selector scoping the converted content
    #[serde(default)]
    pub selector: Option<String>,

    /// Whether to write the output to disk
    #[serde(default = "default_save_to_file")]
    pub save_to_file: bool,

    /// Minimum interval between requests, in seconds
    #[serde(default = "default_wait_time")]
    pub wait_time: f64,

    /// Extra headers sent with every request
    #[serde(default)]
    pub custom_headers: Option<HashMap<String, String>>,

    #[serde(default)]
    pub crawler_config: JobCrawlerConfig,
}

fn default_save_to_file() -> bool {
    true
}

fn default_wait_time() -> f64 {
    1.0
}

impl CrawlJob {
    /// A job for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
            save_to_file: default_save_to_file(),
            wait_time: default_wait_time(),
            custom_headers: None,
            crawler_config: JobCrawlerConfig::default(),
        }
    }

    /// Check the request bounds, the seed and the patterns
    pub fn validate(&self) -> Result<()> {
        let seed = Url::parse(&self.url)
            .map_err(|e| Error::InvalidJob(format!("invalid url '{}': {}", self.url, e)))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(Error::InvalidJob(format!(
                "unsupported scheme '{}'",
                seed.scheme()
            )));
        }

        if !self.wait_time.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&self.wait_time) {
            return Err(Error::InvalidJob(format!(
                "wait_time must be between 0 and {} seconds",
                MAX_WAIT_SECS
            )));
        }

        let bounds = &self.crawler_config;
        if bounds.max_depth > MAX_DEPTH_LIMIT {
            return Err(Error::InvalidJob(format!(
                "max_depth must be at most {}",
                MAX_DEPTH_LIMIT
            )));
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&bounds.max_pages) {
            return Err(Error::InvalidJob(format!(
                "max_pages must be between 1 and {}",
                MAX_PAGES_LIMIT
            )));
        }

        UrlFilter::new(&bounds.include_patterns, &bounds.exclude_patterns)?;
        Ok(())
    }

    /// Crawl configuration for this job under `settings`
    pub fn into_config(&self, settings: &Settings) -> CrawlConfig {
        CrawlConfig::builder()
            .max_depth(self.crawler_config.max_depth)
            .max_pages(self.crawler_config.max_pages)
            .include_patterns(self.crawler_config.include_patterns.clone())
            .exclude_patterns(self.crawler_config.exclude_patterns.clone())
            .wait_time(Duration::from_secs_f64(self.wait_time))
            .selector(self.selector.clone())
            .concurrency(settings.concurrency)
            .request_timeout(settings.request_timeout)
            .memory(settings.memory)
            .build()
    }
}

/// What a finished job produced
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub job_id: String,
    pub result: CrawlResult,
    /// Set when the job asked for its output to be saved and it was written
    pub stored: Option<StoredCrawl>,
    /// Why saving the output failed; the crawl result is still returned
    pub storage_error: Option<String>,
}

/// Validate and run `job`
pub async fn run_job(job: &CrawlJob, settings: &Settings) -> Result<JobOutput> {
    run_job_with_events(job, settings, None).await
}

/// Like [`run_job`], sending progress to `events`
#[instrument(skip_all, fields(url = %job.url))]
pub async fn run_job_with_events(
    job: &CrawlJob,
    settings: &Settings,
    events: Option<mpsc::Sender<CrawlEvent>>,
) -> Result<JobOutput> {
    job.validate()?;
    let config = job.into_config(settings);

    let fetcher = HttpFetcher::builder()
        .user_agent(settings.user_agent.clone())
        .custom_headers(job.custom_headers.clone().unwrap_or_default())
        .build()?;

    let mut crawler = Crawler::new(config, fetcher)
        .with_memory_monitor(MemoryMonitor::for_current_process(settings.memory));
    if let Some(sender) = events {
        crawler = crawler.with_events(sender);
    }

    let result = crawler.crawl(&job.url).await?;
    let job_id = Storage::job_id(result.started_at);

    let (stored, storage_error) = if job.save_to_file {
        let storage = Storage::with_config(StorageConfig {
            base_path: settings.output_dir.clone(),
        });
        match storage.store_result(&job_id, &result).await {
            Ok(stored) => (Some(stored), None),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to save crawl output");
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };

    info!(job_id = %job_id, status = ?result.status, "Job finished");
    Ok(JobOutput {
        job_id,
        result,
        stored,
        storage_error,
    })
}
