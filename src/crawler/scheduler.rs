//! Crawl orchestration
//!
//! A bounded pool of workers pulls entries from the shared [`Frontier`]. Each
//! worker runs rate limiter → fetch → transform → admit → record for one entry
//! at a time. The rate limiter is the only place a worker waits before a
//! network call; workers with nothing to do park on a [`Notify`] until another
//! worker records a result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::crawler::config::CrawlConfig;
use crate::crawler::content_extraction::transform;
use crate::crawler::error::{CrawlError, TransformError};
use crate::crawler::events::{CrawlEvent, EventSink};
use crate::crawler::fetcher::{FetchOutcome, Fetcher, HttpFetcher, is_textual};
use crate::crawler::frontier::{Frontier, FrontierEntry, Next};
use crate::crawler::memory::MemoryMonitor;
use crate::crawler::rate_limit::RateLimiter;
use crate::crawler::result::{CrawlResult, CrawlStatus, PageOutcome, PageResult};

/// Runs crawls with a given configuration and fetcher
pub struct Crawler<F: Fetcher> {
    config: Arc<CrawlConfig>,
    fetcher: Arc<F>,
    memory: Option<Arc<MemoryMonitor>>,
    events: EventSink,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(config: CrawlConfig, fetcher: F) -> Self {
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            memory: None,
            events: EventSink::default(),
        }
    }

    /// Abort crawls when the monitor crosses its hard threshold
    pub fn with_memory_monitor(mut self, monitor: MemoryMonitor) -> Self {
        self.memory = Some(Arc::new(monitor));
        self
    }

    /// Send progress events to `sender`
    pub fn with_events(mut self, sender: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Crawl from `seed`
    ///
    /// Fails only when the seed or configuration is invalid, before anything
    /// is fetched. Every other outcome, including internal faults, is
    /// reported through the returned result's status.
    #[instrument(skip(self), fields(max_depth = self.config.max_depth, max_pages = self.config.max_pages))]
    pub async fn crawl(&self, seed: &str) -> Result<CrawlResult, CrawlError> {
        let frontier = Frontier::start(seed, self.config.clone())?;
        let seed_url = frontier.seed().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!("Starting crawl for {}", seed_url);
        debug!("Crawler config: {:?}", self.config);
        self.events.emit(CrawlEvent::Started {
            seed: seed_url.clone(),
        });

        let shared = Arc::new(Shared {
            frontier: Mutex::new(frontier),
            wake: Notify::new(),
            stop: Notify::new(),
            limiter: RateLimiter::new(self.config.wait_time, self.config.rate_limit_scope),
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            memory: self.memory.clone(),
            events: self.events.clone(),
            pressure_reported: AtomicBool::new(false),
        });

        let mut workers = JoinSet::new();
        for id in 0..self.config.concurrency {
            workers.spawn(run_worker(id, shared.clone()));
        }

        while let Some(joined) = workers.join_next().await {
            let fault = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => CrawlError::from(e),
            };
            shared.fail(fault.to_string());
        }

        let mut frontier = shared
            .frontier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if frontier.is_running() {
            frontier.fail("all workers stopped while the crawl was running");
        }

        let result = CrawlResult::aggregate(
            &seed_url,
            frontier.state(),
            frontier.counters(),
            started_at,
            clock.elapsed(),
            frontier.failure().map(str::to_string),
        );
        drop(frontier);

        info!(
            status = ?result.status,
            pages_fetched = result.stats.pages_fetched,
            pages_failed = result.stats.pages_failed,
            elapsed_ms = result.stats.elapsed_ms,
            "Crawl finished"
        );
        self.events.emit(CrawlEvent::Finished {
            status: result.status,
            pages_fetched: result.stats.pages_fetched,
        });

        Ok(result)
    }
}

/// Crawl a website over HTTP with a process memory monitor
///
/// # Arguments
///
/// * `seed` - The URL to start from
/// * `config` - The crawler configuration
pub async fn crawl_website(seed: &str, config: CrawlConfig) -> Result<CrawlResult, CrawlError> {
    let monitor = MemoryMonitor::for_current_process(config.memory);
    Crawler::new(config, HttpFetcher::new()?)
        .with_memory_monitor(monitor)
        .crawl(seed)
        .await
}

struct Shared<F: Fetcher> {
    frontier: Mutex<Frontier>,
    wake: Notify,
    /// Signalled once the crawl reaches a terminal status
    stop: Notify,
    limiter: RateLimiter,
    config: Arc<CrawlConfig>,
    fetcher: Arc<F>,
    memory: Option<Arc<MemoryMonitor>>,
    events: EventSink,
    pressure_reported: AtomicBool,
}

impl<F: Fetcher> Shared<F> {
    fn memory_exhausted(&self) -> bool {
        let Some(monitor) = &self.memory else {
            return false;
        };
        if monitor.under_pressure() && !self.pressure_reported.swap(true, Ordering::Relaxed) {
            warn!(
                resident_bytes = monitor.resident_bytes(),
                "Process memory above soft threshold"
            );
        }
        monitor.must_abort()
    }

    fn fail(&self, reason: String) {
        self.frontier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail(reason);
        self.stop.notify_waiters();
        self.wake.notify_waiters();
    }

    /// Abort on memory exhaustion; true when the crawl is no longer running
    fn check_memory(&self, frontier: &mut Frontier) -> bool {
        if frontier.is_running() && self.memory_exhausted() {
            frontier.abort_for_memory();
        }
        self.settle(frontier)
    }

    /// Signal waiting workers if the crawl has ended
    fn settle(&self, frontier: &Frontier) -> bool {
        let stopped = !frontier.is_running();
        if stopped {
            self.stop.notify_waiters();
        }
        stopped
    }

    /// Wait for the rate limiter, giving up when the crawl ends meanwhile
    async fn wait_for_grant(&self, entry: &FrontierEntry) -> Result<bool, CrawlError> {
        let stopped = self.stop.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();
        if !self.frontier.lock()?.is_running() {
            return Ok(false);
        }

        let grant = self.limiter.acquire(&entry.url);
        tokio::pin!(grant);
        let mut memory_check = tokio::time::interval(self.config.memory.sample_interval);
        memory_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut grant => return Ok(true),
                _ = &mut stopped => return Ok(false),
                _ = memory_check.tick() => {
                    let mut frontier = self.frontier.lock()?;
                    if self.check_memory(&mut frontier) {
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn process(&self, entry: FrontierEntry) -> Result<(), CrawlError> {
        let granted = self.wait_for_grant(&entry).await?;

        {
            let mut frontier = self.frontier.lock()?;
            // stop is only signalled after the crawl became terminal
            if !granted || self.check_memory(&mut frontier) {
                debug!(url = %entry.url, "Crawl ended before dispatch; releasing entry");
                frontier.release(&entry);
                return Ok(());
            }
        }

        debug!(url = %entry.url, depth = entry.depth, "Fetching");
        let outcome = self
            .fetcher
            .fetch(&entry.url, self.config.request_timeout)
            .await;
        let (outcome, links) = self.convert(&entry, outcome);

        let (pages_fetched, success) = {
            let mut frontier = self.frontier.lock()?;
            for link in &links {
                frontier.admit(link, entry.depth);
            }
            let success = matches!(outcome, PageOutcome::Success { .. });
            frontier.record_result(PageResult {
                url: entry.url.to_string(),
                depth: entry.depth,
                sequence: entry.sequence,
                outcome,
            });
            self.settle(&frontier);
            (frontier.state().pages_fetched, success)
        };

        self.events.emit(CrawlEvent::PageCompleted {
            url: entry.url.to_string(),
            depth: entry.depth,
            success,
            pages_fetched,
            max_pages: self.config.max_pages,
        });
        Ok(())
    }

    fn convert(&self, entry: &FrontierEntry, outcome: FetchOutcome) -> (PageOutcome, Vec<url::Url>) {
        let (body, content_type) = match outcome {
            FetchOutcome::Success { body, content_type } => (body, content_type),
            failed => {
                let error = failed.describe();
                warn!(url = %entry.url, %error, "Fetch failed");
                return (PageOutcome::FetchError { error }, Vec::new());
            }
        };

        let transformed = match content_type {
            Some(content_type) if !is_textual(&content_type) => {
                Err(TransformError::UnsupportedContentType(content_type))
            }
            _ => transform(
                &body,
                self.config.selector.as_deref(),
                &entry.url,
                &self.config.strip_selectors,
            ),
        };

        match transformed {
            Ok(transformed) => {
                debug!(url = %entry.url, links = transformed.links.len(), "Converted page");
                let discovered_links = transformed.links.iter().map(|u| u.to_string()).collect();
                (
                    PageOutcome::Success {
                        markdown: transformed.markdown,
                        discovered_links,
                    },
                    transformed.links,
                )
            }
            Err(e) => {
                warn!(url = %entry.url, error = %e, "Transform failed");
                (
                    PageOutcome::TransformError {
                        error: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        }
    }
}

async fn run_worker<F: Fetcher>(id: usize, shared: Arc<Shared<F>>) -> Result<(), CrawlError> {
    let poll = shared.config.memory.sample_interval;
    loop {
        let woken = shared.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();

        let next = {
            let mut frontier = shared.frontier.lock()?;
            shared.check_memory(&mut frontier);
            frontier.next()
        };

        match next {
            Next::Entry(entry) => {
                shared.process(entry).await?;
                shared.wake.notify_waiters();
            }
            Next::Pending => {
                // also re-check memory periodically while parked
                let _ = tokio::time::timeout(poll, woken).await;
            }
            Next::Exhausted => {
                debug!(worker = id, "Worker done");
                shared.wake.notify_waiters();
                return Ok(());
            }
        }
    }
}

impl<F: Fetcher> std::fmt::Debug for Crawler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("config", &self.config)
            .field("memory_monitor", &self.memory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::config::MemoryThresholds;
    use crate::crawler::memory::tests::FixedProbe;
    use std::collections::HashMap;
    use std::time::Duration;
    use url::Url;

    /// Serves canned pages from memory
    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, FetchOutcome>,
        delay: Duration,
    }

    impl StaticFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                FetchOutcome::Success {
                    body: body.to_string(),
                    content_type: Some("text/html".to_string()),
                },
            );
            self
        }

        fn outcome(mut self, url: &str, outcome: FetchOutcome) -> Self {
            self.pages.insert(url.to_string(), outcome);
            self
        }
    }

    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> FetchOutcome {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.pages
                .get(url.as_str())
                .cloned()
                .unwrap_or(FetchOutcome::HttpError(404))
        }
    }

    fn config(max_depth: usize, max_pages: usize) -> CrawlConfig {
        CrawlConfig::builder()
            .max_depth(max_depth)
            .max_pages(max_pages)
            .wait_time(Duration::ZERO)
            .build()
    }

    #[tokio::test]
    async fn test_seed_with_two_children() {
        let fetcher = StaticFetcher::default()
            .page("https://a.test/", r#"<a href="/a">A</a> <a href="/b">B</a>"#)
            .page("https://a.test/a", "<p>leaf a</p>")
            .page("https://a.test/b", "<p>leaf b</p>");

        let result = Crawler::new(config(1, 10), fetcher)
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.status, CrawlStatus::Completed);
        assert_eq!(result.successes().count(), 3);
        let mut depths: Vec<usize> = result.pages.iter().map(|p| p.depth).collect();
        depths.sort();
        assert_eq!(depths, vec![0, 1, 1]);
    }

    #[tokio::test]
    async fn test_transform_error_does_not_stop_crawl() {
        let fetcher = StaticFetcher::default()
            .page("https://a.test/", r#"<article><a href="/a">A</a></article>"#)
            .page("https://a.test/a", "<p>no article</p>");
        let config = CrawlConfig::builder()
            .max_depth(2)
            .wait_time(Duration::ZERO)
            .selector(Some("article".to_string()))
            .build();

        let result = Crawler::new(config, fetcher)
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.status, CrawlStatus::Completed);
        assert_eq!(result.pages.len(), 2);
        let leaf = result.pages.iter().find(|p| p.depth == 1).unwrap();
        assert!(matches!(leaf.outcome, PageOutcome::TransformError { .. }));
    }

    #[tokio::test]
    async fn test_non_html_content_is_a_transform_error() {
        let fetcher = StaticFetcher::default().outcome(
            "https://a.test/",
            FetchOutcome::Success {
                body: "%PDF-1.4".to_string(),
                content_type: Some("application/pdf".to_string()),
            },
        );

        let result = Crawler::new(config(1, 10), fetcher)
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.pages.len(), 1);
        assert!(result.pages[0].error().unwrap().contains("application/pdf"));
    }

    #[tokio::test]
    async fn test_invalid_seed_fails_before_fetching() {
        let result = Crawler::new(config(1, 10), StaticFetcher::default())
            .crawl("::not a url::")
            .await;
        assert!(matches!(result, Err(CrawlError::InvalidSeed(_))));
    }

    #[tokio::test]
    async fn test_memory_pressure_aborts_crawl() {
        let probe = FixedProbe::default();
        probe.set(10_000);
        let thresholds = MemoryThresholds {
            soft_limit_bytes: 100,
            hard_limit_bytes: 1_000,
            sample_interval: Duration::from_millis(10),
        };
        let monitor = MemoryMonitor::spawn(probe, thresholds);
        let fetcher = StaticFetcher::default().page("https://a.test/", "<p>never</p>");

        let result = Crawler::new(config(1, 10), fetcher)
            .with_memory_monitor(monitor)
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.status, CrawlStatus::AbortedByMemory);
        assert!(result.pages.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_reported() {
        let fetcher = StaticFetcher::default().page("https://a.test/", "<p>only</p>");
        let (tx, mut rx) = mpsc::channel(16);

        let result = Crawler::new(config(0, 10), fetcher)
            .with_events(tx)
            .crawl("https://a.test/")
            .await
            .unwrap();
        assert_eq!(result.status, CrawlStatus::Completed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(CrawlEvent::Started { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            CrawlEvent::PageCompleted { success: true, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(CrawlEvent::Finished {
                status: CrawlStatus::Completed,
                pages_fetched: 1
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_respect_page_limit() {
        let mut fetcher = StaticFetcher {
            delay: Duration::from_millis(50),
            ..Default::default()
        };
        let links: String = (0..20)
            .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
            .collect();
        fetcher = fetcher.page("https://a.test/", &links);
        for i in 0..20 {
            fetcher = fetcher.page(&format!("https://a.test/p{}", i), "<p>leaf</p>");
        }
        let config = CrawlConfig::builder()
            .max_depth(1)
            .max_pages(5)
            .concurrency(8)
            .wait_time(Duration::ZERO)
            .build();

        let result = Crawler::new(config, fetcher)
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.status, CrawlStatus::AbortedByLimit);
        assert_eq!(result.stats.pages_fetched, 5);
        assert_eq!(result.successes().count(), 5);
    }

    /// Pushes memory over the hard limit once a page below the seed is fetched
    struct SpikingFetcher {
        inner: StaticFetcher,
        gauge: FixedProbe,
    }

    impl Fetcher for SpikingFetcher {
        async fn fetch(&self, url: &Url, timeout: Duration) -> FetchOutcome {
            if url.path() != "/" {
                self.gauge.set(u64::MAX);
            }
            self.inner.fetch(url, timeout).await
        }
    }

    #[tokio::test]
    async fn test_memory_abort_cancels_rate_limited_waits() {
        let wait = Duration::from_millis(300);
        let links: String = (0..4)
            .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
            .collect();
        let mut inner = StaticFetcher::default().page("https://a.test/", &links);
        for i in 0..4 {
            inner = inner.page(&format!("https://a.test/p{}", i), "<p>leaf</p>");
        }

        let gauge = FixedProbe::default();
        let thresholds = MemoryThresholds {
            soft_limit_bytes: 1_000,
            hard_limit_bytes: 2_000,
            sample_interval: Duration::from_millis(5),
        };
        let monitor = MemoryMonitor::spawn(gauge.clone(), thresholds);
        let config = CrawlConfig::builder()
            .max_depth(1)
            .concurrency(4)
            .wait_time(wait)
            .request_timeout(Duration::from_secs(1))
            .memory(thresholds)
            .build();

        let started = std::time::Instant::now();
        let result = Crawler::new(config, SpikingFetcher { inner, gauge })
            .with_memory_monitor(monitor)
            .crawl("https://a.test/")
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.status, CrawlStatus::AbortedByMemory);
        assert_eq!(result.pages.len(), 2);
        // the three waiting workers give up instead of sleeping through their grants
        assert!(elapsed < wait * 2, "crawl took {:?}", elapsed);
    }
}
