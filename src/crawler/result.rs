//! Per-page results and the aggregated crawl result

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Pages are still being dispatched
    Running,
    /// The frontier was exhausted
    Completed,
    /// The page limit was reached
    AbortedByLimit,
    /// The memory monitor crossed its hard threshold
    AbortedByMemory,
    /// An internal fault stopped the crawl
    Failed,
}

impl CrawlStatus {
    pub fn is_terminal(self) -> bool {
        self != CrawlStatus::Running
    }
}

/// What happened to a single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    /// The page was fetched and converted
    Success {
        /// Converted content
        markdown: String,
        /// Links found in the converted content
        discovered_links: Vec<String>,
    },
    /// The page could not be retrieved
    FetchError {
        /// Description of the failure
        error: String,
    },
    /// The page was retrieved but could not be converted
    TransformError {
        /// Description of the failure
        error: String,
    },
}

/// Immutable record of one fetch-and-transform attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// Normalized URL of the page
    pub url: String,

    /// Link distance from the seed
    pub depth: usize,

    /// Discovery order of the page within the crawl
    pub sequence: u64,

    /// Outcome of the attempt
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Success { .. })
    }

    /// Markdown of a successful page
    pub fn markdown(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::Success { markdown, .. } => Some(markdown),
            _ => None,
        }
    }

    /// Links discovered on a successful page
    pub fn discovered_links(&self) -> Option<&[String]> {
        match &self.outcome {
            PageOutcome::Success {
                discovered_links, ..
            } => Some(discovered_links),
            _ => None,
        }
    }

    /// Error detail of a failed page
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::FetchError { error } | PageOutcome::TransformError { error } => {
                Some(error)
            }
            PageOutcome::Success { .. } => None,
        }
    }
}

/// Mutable progress of a crawl, owned by the frontier
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub status: CrawlStatus,
    pub pages_fetched: usize,
    /// Results in completion order
    pub results: Vec<PageResult>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            status: CrawlStatus::Running,
            pages_fetched: 0,
            results: Vec::new(),
        }
    }
}

/// Links turned away during admission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCounters {
    /// Rejected by include/exclude patterns or the same-host rule
    pub filtered: usize,
    /// Already visited or enqueued
    pub duplicate: usize,
    /// Deeper than the depth limit
    pub too_deep: usize,
}

/// Aggregate statistics of a finished crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub pages_skipped_by_filter: usize,
    pub pages_skipped_duplicate: usize,
    pub pages_skipped_by_depth: usize,
    pub elapsed_ms: u64,
}

/// Final output of a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    /// The URL the crawl started from
    pub seed_url: String,

    /// Terminal status
    pub status: CrawlStatus,

    /// Page results in completion order
    pub pages: Vec<PageResult>,

    /// Summary counters
    pub stats: CrawlStats,

    /// When the crawl started
    pub started_at: DateTime<Utc>,

    /// Detail of an internal fault when `status` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CrawlResult {
    /// Build the result from a terminal crawl state
    pub fn aggregate(
        seed_url: &str,
        state: &CrawlState,
        counters: AdmissionCounters,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        failure: Option<String>,
    ) -> Self {
        let pages_failed = state.results.iter().filter(|r| !r.is_success()).count();
        Self {
            seed_url: seed_url.to_string(),
            status: state.status,
            pages: state.results.clone(),
            stats: CrawlStats {
                pages_fetched: state.pages_fetched,
                pages_failed,
                pages_skipped_by_filter: counters.filtered,
                pages_skipped_duplicate: counters.duplicate,
                pages_skipped_by_depth: counters.too_deep,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            },
            started_at,
            failure,
        }
    }

    /// Successful pages only
    pub fn successes(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| p.is_success())
    }

    /// Pages ordered breadth-first: by depth, then by discovery order
    pub fn sorted_breadth_first(&self) -> Vec<&PageResult> {
        let mut pages: Vec<&PageResult> = self.pages.iter().collect();
        pages.sort_by_key(|p| (p.depth, p.sequence));
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, depth: usize, sequence: u64, outcome: PageOutcome) -> PageResult {
        PageResult {
            url: url.to_string(),
            depth,
            sequence,
            outcome,
        }
    }

    fn success() -> PageOutcome {
        PageOutcome::Success {
            markdown: "# Hi".to_string(),
            discovered_links: vec![],
        }
    }

    #[test]
    fn test_aggregate_counts() {
        let state = CrawlState {
            status: CrawlStatus::Completed,
            pages_fetched: 2,
            results: vec![
                page("https://a.test/b", 1, 2, success()),
                page(
                    "https://a.test/missing",
                    1,
                    3,
                    PageOutcome::FetchError {
                        error: "HTTP status 404".to_string(),
                    },
                ),
                page("https://a.test/", 0, 0, success()),
            ],
        };
        let counters = AdmissionCounters {
            filtered: 4,
            duplicate: 7,
            too_deep: 1,
        };

        let result = CrawlResult::aggregate(
            "https://a.test/",
            &state,
            counters,
            Utc::now(),
            Duration::from_millis(1500),
            None,
        );

        assert_eq!(result.status, CrawlStatus::Completed);
        assert_eq!(result.stats.pages_fetched, 2);
        assert_eq!(result.stats.pages_failed, 1);
        assert_eq!(result.stats.pages_skipped_by_filter, 4);
        assert_eq!(result.stats.elapsed_ms, 1500);
        assert_eq!(result.successes().count(), 2);

        let ordered: Vec<&str> = result
            .sorted_breadth_first()
            .iter()
            .map(|p| p.url.as_str())
            .collect();
        assert_eq!(
            ordered,
            vec!["https://a.test/", "https://a.test/b", "https://a.test/missing"]
        );
    }

    #[test]
    fn test_page_result_serializes_with_status_tag() {
        let result = page(
            "https://a.test/x",
            1,
            1,
            PageOutcome::TransformError {
                error: "Selector 'article' matched no elements".to_string(),
            },
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "transform_error");
        assert_eq!(json["depth"], 1);
        assert!(json.get("markdown").is_none());
        assert_eq!(result.error(), Some("Selector 'article' matched no elements"));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!CrawlStatus::Running.is_terminal());
        assert!(CrawlStatus::AbortedByMemory.is_terminal());
        assert_eq!(
            serde_json::to_string(&CrawlStatus::AbortedByLimit).unwrap(),
            "\"aborted_by_limit\""
        );
    }
}
