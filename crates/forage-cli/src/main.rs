mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use forage_client::{BrowserFactory, FieldSpec, MediaDownloader, PageExtractor};
use forage_core::pool::ResourcePool;
use forage_core::progress::{ProgressObserver, ProgressSnapshot};
use forage_core::retry::RetryPolicy;
use forage_core::scheduler::{Scheduler, SchedulerConfig};
use forage_core::task::TaskResult;

use sink::OutputFormat;

#[derive(Parser)]
#[command(name = "forage", version, about = "Concurrent browser-based page extractor")]
struct Cli {
    /// File with one target URL per line
    #[arg(short, long, default_value = "links.txt")]
    targets: PathBuf,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 3)]
    workers: usize,

    /// Number of browser sessions to keep pooled
    #[arg(long, default_value_t = 3)]
    pool_size: usize,

    /// Minimum pacing delay before each page load, in milliseconds
    #[arg(long, default_value_t = 2000)]
    rate_limit_min_ms: u64,

    /// Maximum pacing delay before each page load, in milliseconds
    #[arg(long, default_value_t = 5000)]
    rate_limit_max_ms: u64,

    /// Retry budget per target
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// How long to wait for a pooled browser before failing an attempt, in seconds
    #[arg(long, default_value_t = 30)]
    acquire_timeout_secs: u64,

    /// Per-page navigation timeout, in seconds
    #[arg(long, default_value_t = 8)]
    navigation_timeout_secs: u64,

    /// Field to extract, as a name=css-selector pair (repeatable)
    #[arg(short = 'f', long = "field", value_name = "NAME=SELECTOR")]
    fields: Vec<FieldSpec>,

    /// Collect img/video source URLs from each page
    #[arg(long, default_value_t = false)]
    collect_media: bool,

    /// Download collected media into this directory (implies --collect-media)
    #[arg(long, value_name = "DIR")]
    download_media: Option<PathBuf>,

    /// Maximum concurrent media downloads
    #[arg(long, default_value_t = 5)]
    download_concurrency: usize,

    /// Reuse an existing Chrome profile directory (cookies, sessions)
    #[arg(long, env = "FORAGE_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Output file (default: timestamped name in the working directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (CHROME_BIN, FORAGE_PROFILE_DIR)
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("forage_core=info".parse()?)
                .add_directive("forage_client=info".parse()?)
                .add_directive("forage_cli=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.pool_size == 0 {
        anyhow::bail!("--pool-size must be >= 1");
    }

    let targets = read_targets(&cli.targets)?;
    if targets.is_empty() {
        anyhow::bail!(
            "No targets found in {}. Add one URL per line and retry.",
            cli.targets.display()
        );
    }
    println!("Read {} targets from {}", targets.len(), cli.targets.display());

    let mut factory = BrowserFactory::new()
        .with_navigation_timeout(Duration::from_secs(cli.navigation_timeout_secs));
    if let Some(dir) = &cli.profile_dir {
        factory = factory.with_user_data_dir(dir);
    }

    let pool = Arc::new(
        ResourcePool::initialize(
            factory,
            cli.pool_size,
            Duration::from_secs(cli.acquire_timeout_secs),
        )
        .await,
    );
    let status = pool.status();
    if status.available == 0 {
        tracing::warn!(
            "No browser sessions could be created; every task will fail with pool exhaustion"
        );
    } else if status.available < status.capacity {
        tracing::warn!(
            created = status.available,
            requested = status.capacity,
            "Pool started below capacity"
        );
    }

    let collect_media = cli.collect_media || cli.download_media.is_some();
    let extractor = PageExtractor::new()
        .with_fields(cli.fields.clone())
        .with_media(collect_media);

    let config = SchedulerConfig {
        max_workers: cli.workers,
        max_retries: cli.max_retries,
        rate_limit_min: Duration::from_millis(cli.rate_limit_min_ms),
        rate_limit_max: Duration::from_millis(cli.rate_limit_max_ms),
        retry: RetryPolicy::default(),
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nShutdown requested — letting in-flight pages finish…");
            ctrl_c_cancel.cancel();
        }
    });

    let scheduler = Scheduler::new(Arc::clone(&pool), extractor, config);
    let results = scheduler.run(targets, cancel, &ConsoleObserver).await?;

    pool.shutdown().await;

    let succeeded = results.iter().filter(|r| r.success).count();
    println!(
        "\nProcessed {} targets ({succeeded} succeeded, {} failed)",
        results.len(),
        results.len() - succeeded
    );

    if !results.is_empty() {
        let path = cli
            .output
            .clone()
            .unwrap_or_else(|| sink::default_output_path(cli.format));
        sink::save_results(&results, cli.format, &path)
            .with_context(|| format!("Failed to save results to {}", path.display()))?;
        println!("Results saved to {}", path.display());
    }

    if let Some(dir) = &cli.download_media {
        download_media(&results, dir, cli.download_concurrency).await?;
    }

    Ok(())
}

/// Read targets from a text file: one per line, trimmed, blanks skipped.
fn read_targets(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Pull every collected media URL out of the successful payloads and
/// download them with a bounded fan-out.
async fn download_media(results: &[TaskResult], dir: &Path, concurrency: usize) -> Result<()> {
    let urls: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.payload.get("media"))
        .filter_map(|media| media.as_array())
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();

    if urls.is_empty() {
        println!("No media URLs collected, nothing to download");
        return Ok(());
    }

    let downloader = MediaDownloader::new(dir, concurrency)?;
    let outcomes = downloader.download_all(&urls).await;
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    println!(
        "Downloaded {ok}/{} media files into {}",
        outcomes.len(),
        dir.display()
    );
    Ok(())
}

/// Console progress: one summary line plus a ✓/✗ line per finalized task.
struct ConsoleObserver;

impl ProgressObserver for ConsoleObserver {
    fn on_task(&self, snapshot: &ProgressSnapshot, result: Option<&TaskResult>) {
        match result {
            Some(result) => {
                let mark = if result.success { "✓" } else { "✗" };
                println!(
                    "Progress: {}/{} ({:.1}% success) - elapsed {:.1}s, ~{:.1}s left",
                    snapshot.completed_tasks,
                    snapshot.total_tasks,
                    snapshot.success_rate,
                    snapshot.elapsed.as_secs_f64(),
                    snapshot.estimated_remaining.as_secs_f64(),
                );
                println!(
                    "  {mark} [{}] {} ({:.2}s)",
                    result.index,
                    truncate(&result.target, 60),
                    result.duration.as_secs_f64()
                );
            }
            None => {
                println!(
                    "Done: {}/{} tasks, {} failed, {:.1}s total",
                    snapshot.completed_tasks,
                    snapshot.total_tasks,
                    snapshot.failed_tasks,
                    snapshot.elapsed.as_secs_f64(),
                );
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
