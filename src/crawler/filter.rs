//! URL admission by include/exclude regex patterns

use regex::Regex;

use crate::crawler::error::CrawlError;

/// Compiled include/exclude patterns
///
/// Patterns are searched (not anchored) against the full normalized URL.
/// Exclude patterns always win over include patterns.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl UrlFilter {
    /// Compile a filter, failing on the first invalid pattern
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, CrawlError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Whether `url` may enter the frontier
    pub fn is_admissible(&self, url: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(url)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(url))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, CrawlError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|e| {
                CrawlError::InvalidConfig(format!("Invalid pattern '{}': {}", p.as_ref(), e))
            })
        })
        .collect()
}

/// One-shot admission check that compiles the patterns on every call
pub fn is_admissible<S: AsRef<str>>(
    url: &str,
    include: &[S],
    exclude: &[S],
) -> Result<bool, CrawlError> {
    Ok(UrlFilter::new(include, exclude)?.is_admissible(url))
}
