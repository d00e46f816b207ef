//! Persistence of crawl output
//!
//! Successful pages are written as Markdown files with a small front matter
//! block, laid out as `<base>/<job id>/<host>/<path segments>.md`. The full
//! crawl result is written next to them as `result.json`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

use super::result::{CrawlResult, PageResult};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base path for storage
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("content"),
        }
    }
}

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL for storage: {0}")]
    InvalidUrl(String),
}

type Result<T> = std::result::Result<T, StorageError>;

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where a crawl was written
#[derive(Debug, Clone)]
pub struct StoredCrawl {
    /// Directory holding everything for the job
    pub root: PathBuf,
    /// Markdown files, one per successful page
    pub pages: Vec<PathBuf>,
    /// The serialized crawl result
    pub result_file: PathBuf,
}

/// Storage manager for crawl output
#[derive(Debug, Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Create a new storage with default configuration
    pub fn new() -> Self {
        Self {
            config: StorageConfig::default(),
        }
    }

    /// Create a new storage with custom configuration
    pub fn with_config(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Job id derived from the crawl start time
    ///
    /// Ids are unique within a process and carry the process id, so jobs
    /// started in the same millisecond never share a directory.
    pub fn job_id(started_at: DateTime<Utc>) -> String {
        let n = JOB_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!(
            "crawl_{}_{:x}_{}",
            started_at.format("%Y%m%d_%H%M%S_%3f"),
            std::process::id(),
            n
        )
    }

    /// Gets the Markdown path for a page URL within a job
    pub fn get_storage_path(&self, job_id: &str, url: &str) -> Result<PathBuf> {
        let parsed = Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;

        let segments: Vec<String> = parsed
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(slugify)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut path = self.config.base_path.join(job_id).join(slugify(host));
        let (dirs, file) = match segments.split_last() {
            Some((last, dirs)) => (dirs, last.clone()),
            None => (&[][..], "index".to_string()),
        };
        for dir in dirs {
            path.push(dir);
        }

        let file = match parsed.query().map(slugify).filter(|q| !q.is_empty()) {
            Some(query) => format!("{}-{}", file, query),
            None => file,
        };
        path.push(format!("{}.md", file));
        Ok(path)
    }

    /// Writes one successful page; failed pages are skipped
    pub async fn store_page(
        &self,
        job_id: &str,
        page: &PageResult,
        date: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        let Some(markdown) = page.markdown() else {
            return Ok(None);
        };

        let path = self.get_storage_path(job_id, &page.url)?;
        ensure_parent(&path).await?;
        let document = format!(
            "---\nurl: {}\ndate: {}\n---\n\n{}\n",
            page.url,
            date.format("%Y-%m-%d"),
            markdown
        );
        fs::write(&path, document).await?;
        debug!("Stored {} at {}", page.url, path.display());
        Ok(Some(path))
    }

    /// Writes every successful page and the serialized result of a crawl
    #[instrument(skip(self, result), fields(pages = result.pages.len()))]
    pub async fn store_result(&self, job_id: &str, result: &CrawlResult) -> Result<StoredCrawl> {
        let root = self.config.base_path.join(job_id);
        fs::create_dir_all(&root).await?;

        let written = try_join_all(
            result
                .pages
                .iter()
                .map(|page| self.store_page(job_id, page, result.started_at)),
        )
        .await?;
        let pages: Vec<PathBuf> = written.into_iter().flatten().collect();

        let result_file = root.join("result.json");
        fs::write(&result_file, serde_json::to_vec_pretty(result)?).await?;

        info!("Stored {} pages under {}", pages.len(), root.display());
        Ok(StoredCrawl {
            root,
            pages,
            result_file,
        })
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Lowercase ASCII slug with `-` separators
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches(|c| c == '-' || c == '.');
    slug.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::result::{AdmissionCounters, CrawlState, CrawlStatus, PageOutcome};
    use std::time::Duration;

    fn storage(base: &Path) -> Storage {
        Storage::with_config(StorageConfig {
            base_path: base.to_path_buf(),
        })
    }

    fn page(url: &str, outcome: PageOutcome) -> PageResult {
        PageResult {
            url: url.to_string(),
            depth: 0,
            sequence: 0,
            outcome,
        }
    }

    #[test]
    fn test_get_storage_path() {
        let storage = storage(Path::new("/tmp/crawls"));

        let path = storage.get_storage_path("job", "https://a.test/").unwrap();
        assert_eq!(path, Path::new("/tmp/crawls/job/a.test/index.md"));

        let path = storage
            .get_storage_path("job", "https://a.test/docs/Getting-Started/intro")
            .unwrap();
        assert_eq!(path, Path::new("/tmp/crawls/job/a.test/docs/getting-started/intro.md"));

        let path = storage.get_storage_path("job", "https://a.test/list?page=2").unwrap();
        assert_eq!(path, Path::new("/tmp/crawls/job/a.test/list-page-2.md"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let storage = Storage::new();
        assert!(matches!(
            storage.get_storage_path("job", "not-a-url"),
            Err(StorageError::UrlParse(_))
        ));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started!"), "getting-started");
        assert_eq!(slugify("v1.2_notes"), "v1.2_notes");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_job_id_format() {
        let at = DateTime::parse_from_rfc3339("2024-05-06T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        let first = Storage::job_id(at);
        let second = Storage::job_id(at);

        assert!(first.starts_with("crawl_20240506_070809_000_"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_store_result_writes_pages_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let state = CrawlState {
            status: CrawlStatus::Completed,
            pages_fetched: 1,
            results: vec![
                page(
                    "https://a.test/docs/intro",
                    PageOutcome::Success {
                        markdown: "# Intro".to_string(),
                        discovered_links: vec![],
                    },
                ),
                page(
                    "https://a.test/missing",
                    PageOutcome::FetchError {
                        error: "HTTP status 404".to_string(),
                    },
                ),
            ],
        };
        let result = CrawlResult::aggregate(
            "https://a.test/",
            &state,
            AdmissionCounters::default(),
            Utc::now(),
            Duration::from_millis(10),
            None,
        );

        let stored = storage.store_result("job-1", &result).await.unwrap();

        assert_eq!(stored.pages.len(), 1);
        let written = tokio::fs::read_to_string(&stored.pages[0]).await.unwrap();
        assert!(written.starts_with("---\nurl: https://a.test/docs/intro\n"));
        assert!(written.contains("# Intro"));

        let summary = tokio::fs::read_to_string(&stored.result_file).await.unwrap();
        let parsed: CrawlResult = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed.pages.len(), 2);
        assert_eq!(parsed.status, CrawlStatus::Completed);
    }
}
