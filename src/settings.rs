//! Process-wide settings read from the environment

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::crawler::MemoryThresholds;
use crate::crawler::fetcher::DEFAULT_USER_AGENT;

/// Settings shared by every job run in this process
#[derive(Debug, Clone)]
pub struct Settings {
    /// User agent sent with every request
    pub user_agent: String,

    /// Timeout for a single request
    pub request_timeout: Duration,

    /// Number of concurrent workers per crawl
    pub concurrency: usize,

    /// Memory ceilings for the memory monitor
    pub memory: MemoryThresholds,

    /// Directory crawl output is written under
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            concurrency: 4,
            memory: MemoryThresholds::default(),
            output_dir: PathBuf::from("content"),
        }
    }
}

impl Settings {
    /// Read `MARKCRAWL_*` variables, keeping the default for anything unset or malformed
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => Some(value),
                _ => {
                    warn!("Ignoring invalid value {:?} for {}", raw, key);
                    None
                }
            }
        };

        let mib = 1024 * 1024;
        let memory = MemoryThresholds {
            soft_limit_bytes: parsed("MARKCRAWL_MEMORY_SOFT_MB")
                .map_or(defaults.memory.soft_limit_bytes, |mb| mb.saturating_mul(mib)),
            hard_limit_bytes: parsed("MARKCRAWL_MEMORY_HARD_MB")
                .map_or(defaults.memory.hard_limit_bytes, |mb| mb.saturating_mul(mib)),
            ..defaults.memory
        };

        Self {
            user_agent: lookup("MARKCRAWL_USER_AGENT")
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            request_timeout: parsed("MARKCRAWL_TIMEOUT_SECS")
                .map_or(defaults.request_timeout, Duration::from_secs),
            concurrency: parsed("MARKCRAWL_CONCURRENCY")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.concurrency),
            memory,
            output_dir: lookup("MARKCRAWL_OUTPUT_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map_or(defaults.output_dir, PathBuf::from),
        }
    }
}
