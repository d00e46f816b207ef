//! # markcrawl - bounded website crawling to Markdown
//!
//! This crate crawls a website breadth-first from a seed URL and converts
//! every fetched page to Markdown. Crawls are bounded by link depth and by
//! the number of fetched pages, spaced by a minimum request interval and
//! stopped early when the process runs out of memory.
//!
//! ## Features
//!
//! - Strict breadth-first crawling with a pool of concurrent workers
//! - Include/exclude URL filtering with regular expressions
//! - CSS selector scoping of the converted content
//! - Global or per-origin rate limiting
//! - Background memory monitoring with soft and hard ceilings
//! - Markdown and JSON output on disk
//!
//! ## Example
//!
//! ```rust,no_run
//! use markcrawl::crawler::{CrawlConfig, crawl_website};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlConfig::builder()
//!         .max_depth(1)
//!         .max_pages(10)
//!         .exclude_patterns(vec!["/private".to_string()])
//!         .build();
//!
//!     let result = crawl_website("https://example.com/", config).await?;
//!     for page in result.successes() {
//!         println!("{}: {} bytes", page.url, page.markdown().unwrap_or("").len());
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod settings;

pub mod crawler;

pub use error::{Error, Result};
pub use settings::Settings;

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::crawler::{CrawlConfig, CrawlJob, CrawlResult, CrawlStatus, PageResult};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::settings::Settings;
}
