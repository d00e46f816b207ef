//! # markcrawl CLI
//!
//! Command-line front end for the crawler.
//!
//! - `crawl <url>`: crawl a site with flags for every crawl setting
//! - `job <file.json>`: run a crawl job described in a JSON file
//!
//! Both print the crawl result as JSON on stdout. Logs go to stderr and are
//! filtered with `RUST_LOG`.

mod telemetry;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use markcrawl::Settings;
use markcrawl::crawler::{
    CrawlConfig, CrawlEvent, CrawlJob, Crawler, HttpFetcher, MemoryMonitor, MemoryThresholds,
    RateLimitScope, Storage, StorageConfig, run_job_with_events,
};
use markcrawl::crawler::job::MAX_WAIT_SECS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

#[derive(Parser)]
#[command(author, version, about = "Crawl a website breadth-first and convert it to Markdown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a website from a seed URL
    Crawl(CrawlArgs),

    /// Run a crawl job from a JSON file
    Job(JobArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Seed URL
    #[arg(required = true)]
    url: String,

    /// Maximum link distance from the seed
    #[arg(short, long, default_value = "3")]
    depth: usize,

    /// Maximum number of pages to fetch
    #[arg(short = 'p', long, default_value = "100")]
    max_pages: usize,

    /// Regex a URL must match to be followed (repeatable)
    #[arg(short, long)]
    include: Vec<String>,

    /// Regex that stops a URL from being followed (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Minimum seconds between requests
    #[arg(short, long, default_value = "1.0")]
    wait: f64,

    /// CSS selector scoping the converted content
    #[arg(short, long)]
    selector: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Space requests per origin instead of globally
    #[arg(long)]
    per_origin: bool,

    /// Follow links to other hosts
    #[arg(long)]
    allow_offsite: bool,

    /// CSS selectors dropped before conversion (comma-separated)
    #[arg(long, default_value = "script,style,noscript")]
    strip: String,

    /// Soft memory ceiling in MiB
    #[arg(long)]
    memory_soft_mb: Option<u64>,

    /// Hard memory ceiling in MiB
    #[arg(long)]
    memory_hard_mb: Option<u64>,

    /// Write pages and the result under this directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// JSON file holding the job
    #[arg(required = true)]
    file: PathBuf,

    /// Output directory, overriding MARKCRAWL_OUTPUT_DIR
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing_subscriber();

    let settings = Settings::from_env();
    match cli.command {
        Commands::Crawl(args) => crawl_command(args, settings).await?,
        Commands::Job(args) => job_command(args, settings).await?,
    }

    Ok(())
}

#[instrument(skip(settings))]
async fn crawl_command(args: CrawlArgs, settings: Settings) -> anyhow::Result<()> {
    let wait_time = parse_wait(args.wait)?;

    let memory = match (args.memory_soft_mb, args.memory_hard_mb) {
        (None, None) => settings.memory,
        (soft, hard) => MemoryThresholds {
            soft_limit_bytes: soft.map_or(settings.memory.soft_limit_bytes, mib),
            hard_limit_bytes: hard.map_or(settings.memory.hard_limit_bytes, mib),
            ..settings.memory
        },
    };

    let config = CrawlConfig::builder()
        .max_depth(args.depth)
        .max_pages(args.max_pages)
        .include_patterns(args.include)
        .exclude_patterns(args.exclude)
        .wait_time(wait_time)
        .selector(args.selector)
        .concurrency(args.concurrency.unwrap_or(settings.concurrency))
        .request_timeout(args.timeout.map_or(settings.request_timeout, Duration::from_secs))
        .rate_limit_scope(if args.per_origin {
            RateLimitScope::PerOrigin
        } else {
            RateLimitScope::Global
        })
        .same_host_only(!args.allow_offsite)
        .strip_selectors(
            args.strip
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
        .memory(memory)
        .build();

    let fetcher = HttpFetcher::builder()
        .user_agent(settings.user_agent.clone())
        .build()?;
    let (events, progress) = progress_channel();
    let crawler = Crawler::new(config, fetcher)
        .with_memory_monitor(MemoryMonitor::for_current_process(memory))
        .with_events(events);

    let result = crawler.crawl(&args.url).await?;
    drop(crawler);
    let _ = progress.await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(output) = args.output {
        let storage = Storage::with_config(StorageConfig { base_path: output });
        let stored = storage
            .store_result(&Storage::job_id(result.started_at), &result)
            .await?;
        info!("Saved crawl to {}", stored.root.display());
    }
    Ok(())
}

#[instrument(skip(settings))]
async fn job_command(args: JobArgs, mut settings: Settings) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let job: CrawlJob = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.file.display()))?;
    if let Some(output) = args.output {
        settings.output_dir = output;
    }

    let (events, progress) = progress_channel();
    let output = run_job_with_events(&job, &settings, Some(events)).await?;
    let _ = progress.await;

    if let Some(stored) = &output.stored {
        info!("Saved job {} to {}", output.job_id, stored.root.display());
    }
    println!("{}", serde_json::to_string_pretty(&output.result)?);
    if let Some(error) = output.storage_error {
        anyhow::bail!("crawl finished but its output was not saved: {}", error);
    }
    Ok(())
}

/// Seconds between requests, bounded like a job's `wait_time`
fn parse_wait(seconds: f64) -> anyhow::Result<Duration> {
    if !seconds.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&seconds) {
        anyhow::bail!("--wait must be between 0 and {} seconds", MAX_WAIT_SECS);
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn mib(value: u64) -> u64 {
    value.saturating_mul(1024 * 1024)
}

/// Log crawl progress until every sender is dropped
fn progress_channel() -> (mpsc::Sender<CrawlEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let CrawlEvent::PageCompleted {
                url,
                success,
                pages_fetched,
                max_pages,
                ..
            } = event
            {
                let mark = if success { "ok" } else { "failed" };
                info!("[{}/{}] {} {}", pages_fetched, max_pages, mark, url);
            }
        }
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wait_bounds() {
        assert_eq!(parse_wait(0.5).unwrap(), Duration::from_millis(500));
        assert_eq!(parse_wait(0.0).unwrap(), Duration::ZERO);
        assert!(parse_wait(-1.0).is_err());
        assert!(parse_wait(1e300).is_err());
        assert!(parse_wait(f64::INFINITY).is_err());
        assert!(parse_wait(f64::NAN).is_err());
    }
}
