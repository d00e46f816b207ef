//! # Crawl Frontier
//!
//! The frontier owns all mutable state of one crawl: the visited set, the
//! queue of admitted but not yet fetched URLs, in-flight accounting and the
//! crawl status. It is a plain state machine; the scheduler serializes access
//! to it behind a mutex.
//!
//! ## Ordering
//!
//! Entries are queued per depth level in discovery order. An entry of depth
//! `k` is only handed out when no in-flight page is shallower than `k - 1`,
//! because such a page could still discover new depth `k - 1` entries. This
//! keeps dispatch strictly breadth-first even with concurrent workers.
//!
//! ## Page budget
//!
//! Every dispatched entry reserves one page of the `max_pages` budget until its
//! result is recorded, so concurrent successes can never overshoot the limit.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::crawler::config::CrawlConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::filter::UrlFilter;
use crate::crawler::links::{normalize, visit_key};
use crate::crawler::result::{AdmissionCounters, CrawlState, CrawlStatus, PageResult};

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized absolute URL
    pub url: Url,
    /// Link distance from the seed
    pub depth: usize,
    /// Discovery order, the seed being 0
    pub sequence: u64,
}

/// Answer of [`Frontier::next`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Fetch this entry
    Entry(FrontierEntry),
    /// Nothing can be dispatched until an in-flight page completes
    Pending,
    /// The crawl is over
    Exhausted,
}

/// Outcome of offering a discovered link to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
    TooDeep,
    OffHost,
    Filtered,
    Invalid,
    /// The crawl is no longer running
    Closed,
}

/// State of a single crawl
#[derive(Debug)]
pub struct Frontier {
    config: Arc<CrawlConfig>,
    filter: UrlFilter,
    seed: Url,
    visited: HashSet<String>,
    rejected: HashSet<String>,
    levels: Vec<VecDeque<FrontierEntry>>,
    in_flight: BTreeMap<usize, usize>,
    in_flight_total: usize,
    next_sequence: u64,
    state: CrawlState,
    counters: AdmissionCounters,
    failure: Option<String>,
}

impl Frontier {
    /// Validate the seed and configuration and enqueue the seed at depth 0
    pub fn start(seed: &str, config: Arc<CrawlConfig>) -> Result<Self, CrawlError> {
        let parsed =
            Url::parse(seed.trim()).map_err(|e| CrawlError::InvalidSeed(format!("{}: {}", seed, e)))?;
        let seed_url = normalize(parsed).ok_or_else(|| {
            CrawlError::InvalidSeed(format!("{}: must be an absolute http(s) URL", seed))
        })?;
        let filter = config.validate()?;

        let mut visited = HashSet::new();
        visited.insert(visit_key(&seed_url));

        let mut levels = vec![VecDeque::new()];
        levels[0].push_back(FrontierEntry {
            url: seed_url.clone(),
            depth: 0,
            sequence: 0,
        });

        info!(seed = %seed_url, max_depth = config.max_depth, max_pages = config.max_pages, "Frontier seeded");

        Ok(Self {
            config,
            filter,
            seed: seed_url,
            visited,
            rejected: HashSet::new(),
            levels,
            in_flight: BTreeMap::new(),
            in_flight_total: 0,
            next_sequence: 1,
            state: CrawlState::default(),
            counters: AdmissionCounters::default(),
            failure: None,
        })
    }

    /// Hand out the next entry in breadth-first order
    pub fn next(&mut self) -> Next {
        if self.state.status.is_terminal() {
            return Next::Exhausted;
        }

        if self.state.pages_fetched + self.in_flight_total >= self.config.max_pages {
            if self.in_flight_total == 0 {
                self.finish(CrawlStatus::AbortedByLimit);
                return Next::Exhausted;
            }
            return Next::Pending;
        }

        let Some(depth) = self.levels.iter().position(|level| !level.is_empty()) else {
            if self.in_flight_total == 0 {
                self.finish(CrawlStatus::Completed);
                return Next::Exhausted;
            }
            return Next::Pending;
        };

        if let Some((&shallowest, _)) = self.in_flight.iter().next() {
            if shallowest + 1 < depth {
                return Next::Pending;
            }
        }

        let Some(entry) = self.levels[depth].pop_front() else {
            return Next::Pending;
        };
        *self.in_flight.entry(depth).or_insert(0) += 1;
        self.in_flight_total += 1;
        Next::Entry(entry)
    }

    /// Offer a link discovered on a page at `parent_depth`
    pub fn admit(&mut self, link: &Url, parent_depth: usize) -> Admission {
        if self.state.status.is_terminal() {
            return Admission::Closed;
        }

        let Some(url) = normalize(link.clone()) else {
            return Admission::Invalid;
        };
        let key = visit_key(&url);

        if self.visited.contains(&key) {
            self.counters.duplicate += 1;
            return Admission::Duplicate;
        }

        let depth = parent_depth + 1;
        if depth > self.config.max_depth {
            if self.rejected.insert(key) {
                self.counters.too_deep += 1;
            }
            return Admission::TooDeep;
        }

        if self.config.same_host_only && url.host_str() != self.seed.host_str() {
            debug!(url = %key, "Skipping off-host link");
            if self.rejected.insert(key) {
                self.counters.filtered += 1;
            }
            return Admission::OffHost;
        }

        if !self.filter.is_admissible(&key) {
            debug!(url = %key, "Skipping link rejected by patterns");
            if self.rejected.insert(key) {
                self.counters.filtered += 1;
            }
            return Admission::Filtered;
        }

        self.visited.insert(key);
        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, VecDeque::new);
        }
        self.levels[depth].push_back(FrontierEntry {
            url,
            depth,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        Admission::Admitted
    }

    /// Record the result of a dispatched entry and release its slot
    pub fn record_result(&mut self, page: PageResult) {
        self.release_slot(page.depth);

        if page.is_success() {
            self.state.pages_fetched += 1;
        }
        self.state.results.push(page);

        if self.state.status == CrawlStatus::Running
            && self.state.pages_fetched >= self.config.max_pages
        {
            info!(pages = self.state.pages_fetched, "Page limit reached");
            self.finish(CrawlStatus::AbortedByLimit);
        }
    }

    /// Give back a dispatched entry that was never fetched
    pub fn release(&mut self, entry: &FrontierEntry) {
        self.release_slot(entry.depth);
    }

    /// Stop dispatching because the memory ceiling was crossed
    pub fn abort_for_memory(&mut self) {
        if self.state.status == CrawlStatus::Running {
            warn!(in_flight = self.in_flight_total, "Aborting crawl under memory pressure");
            self.finish(CrawlStatus::AbortedByMemory);
        }
    }

    /// Mark the crawl as failed, keeping every collected result
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "Crawl failed");
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
        self.finish(CrawlStatus::Failed);
    }

    pub fn status(&self) -> CrawlStatus {
        self.state.status
    }

    pub fn is_running(&self) -> bool {
        self.state.status == CrawlStatus::Running
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn counters(&self) -> AdmissionCounters {
        self.counters
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn queued_len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight_total
    }

    fn finish(&mut self, status: CrawlStatus) {
        if status != CrawlStatus::Completed {
            let discarded = self.queued_len();
            if discarded > 0 {
                debug!(discarded, "Discarding remaining frontier entries");
            }
            self.levels.iter_mut().for_each(VecDeque::clear);
        }
        self.state.status = status;
    }

    fn release_slot(&mut self, depth: usize) {
        match self.in_flight.get_mut(&depth) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.in_flight.remove(&depth);
                }
                self.in_flight_total -= 1;
            }
            _ => self.fail(format!("no in-flight entry at depth {}", depth)),
        }
    }
}
