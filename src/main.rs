//! scholar-badges - Google Scholar metrics for README badges
//!
//! Fetches citation count, h-index, i10-index and publication count for one
//! Scholar profile and rewrites the matching shields.io badges.
//!
//! ## Usage
//!
//! ```bash
//! scholar-badges update --profile tIcTCNgAAAAJ --document README.md
//! scholar-badges fetch
//! scholar-badges patch --citations 12,345 --publications 42
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scholar_badges::{
    config::{ConfigOverrides, RunConfig},
    cookies::CookieManager,
    fetcher::{WorkerCommand, WORKER_PROXY_ENV},
    metrics::MetricsRecord,
    patcher::{Patcher, UpdateStatus},
    pipeline, scholar,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Google Scholar metrics for README badges
#[derive(Parser)]
#[command(name = "scholar-badges")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metrics and update the document
    Update {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Fetch metrics and print them as JSON
    Fetch {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Write given values into the document without fetching
    Patch {
        /// Citation count (e.g. "12,345")
        #[arg(long)]
        citations: Option<String>,

        #[arg(long)]
        h_index: Option<String>,

        #[arg(long)]
        i10_index: Option<String>,

        /// Publication count (e.g. "42" or "42+")
        #[arg(long)]
        publications: Option<String>,

        /// Document holding the badges
        #[arg(long)]
        document: Option<PathBuf>,

        /// Print the patched document instead of writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },

    /// Single retrieval; prints the record on stdout (used by `update`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        profile: String,

        #[arg(long)]
        base_url: Option<String>,

        /// Request timeout, in seconds
        #[arg(long, default_value = "30")]
        http_timeout: u64,

        #[arg(long)]
        cookies: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
    /// Import a JSON cookie export (from FILE, or stdin)
    Import { file: Option<PathBuf> },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: the worker's stdout is its result channel
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Update { overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            run_update(config).await
        }
        Commands::Fetch { overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            run_fetch(config).await
        }
        Commands::Patch {
            citations,
            h_index,
            i10_index,
            publications,
            document,
            dry_run,
        } => {
            let overrides = ConfigOverrides {
                document,
                ..Default::default()
            };
            let config = load_config(cli.config.as_deref(), &overrides)?;
            let record = MetricsRecord::from_raw(
                citations.as_deref(),
                h_index.as_deref(),
                i10_index.as_deref(),
                publications.as_deref(),
            )?;
            if record.is_empty() {
                anyhow::bail!(
                    "Nothing to patch: pass at least one of \
                     --citations, --h-index, --i10-index, --publications"
                );
            }
            run_patch(&config, &record, dry_run)
        }
        Commands::Config { overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Cookies { action } => handle_cookies(cli.config.as_deref(), action),
        Commands::Worker {
            profile,
            base_url,
            http_timeout,
            cookies,
        } => run_worker(profile, base_url, http_timeout, cookies).await,
    }
}

// ============================================================================
// Configuration
// ============================================================================

fn load_config(path: Option<&std::path::Path>, overrides: &ConfigOverrides) -> Result<RunConfig> {
    RunConfig::resolve(path, overrides).context("Invalid configuration")
}

// ============================================================================
// Commands
// ============================================================================

/// Full run. Exits 0 whatever happened upstream; the next scheduled run retries.
async fn run_update(config: RunConfig) -> Result<()> {
    let worker = WorkerCommand::current_exe(&config).context("Cannot locate worker executable")?;
    let summary = pipeline::run(&config, worker).await?;

    match (&summary.metrics, &summary.update) {
        (None, _) => println!("Failed to fetch metrics - will retry on next scheduled run"),
        (Some(m), UpdateStatus::Updated) => {
            println!("{} updated: {}", config.document.display(), m)
        }
        (Some(_), UpdateStatus::Unchanged) => {
            println!("No changes needed - metrics are up to date")
        }
        (Some(_), UpdateStatus::Failed(reason)) => {
            println!("Error updating document: {}", reason)
        }
        (Some(_), UpdateStatus::Skipped) => {}
    }

    Ok(())
}

async fn run_fetch(config: RunConfig) -> Result<()> {
    let worker = WorkerCommand::current_exe(&config).context("Cannot locate worker executable")?;
    match pipeline::fetch(&config, worker).await {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No metrics available"),
    }
    Ok(())
}

fn run_patch(config: &RunConfig, record: &MetricsRecord, dry_run: bool) -> Result<()> {
    let patcher = Patcher::new(&config.markers)?;

    if dry_run {
        let text = std::fs::read_to_string(&config.document)
            .with_context(|| format!("Failed to read {}", config.document.display()))?;
        let outcome = patcher.patch(&text, Some(record));
        print!("{}", outcome.text);
        info!(changed = outcome.changed, "Dry run complete");
        return Ok(());
    }

    match patcher.update_file(&config.document, Some(record)) {
        UpdateStatus::Updated => println!("{} updated: {}", config.document.display(), record),
        UpdateStatus::Unchanged | UpdateStatus::Skipped => println!("No changes needed"),
        UpdateStatus::Failed(reason) => anyhow::bail!("Error updating document: {}", reason),
    }
    Ok(())
}

/// One retrieval in isolation. The parent kills this process on timeout.
async fn run_worker(
    profile: String,
    base_url: Option<String>,
    http_timeout: u64,
    cookies: Option<PathBuf>,
) -> Result<()> {
    let options = scholar::ScholarOptions {
        proxy: std::env::var(WORKER_PROXY_ENV).ok().filter(|p| !p.is_empty()),
        base_url,
        timeout: Duration::from_secs(http_timeout),
        cookies,
    };

    match scholar::fetch_profile_metrics(&profile, &options).await {
        Ok(record) => {
            println!("{}", serde_json::to_string(&record)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Retrieval failed");
            Err(e.into())
        }
    }
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(config: Option<&std::path::Path>, action: CookieAction) -> Result<()> {
    use std::io::Read;

    let config = load_config(config, &ConfigOverrides::default())?;
    let manager = CookieManager::resolve(config.cookies.as_deref());

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Import { file } => {
            let json = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    println!("Paste cookies in JSON format, then end input (Ctrl-D):");
                    println!(concat!(
                        r#"Format: [{{"name":"NID","value":"xxx","#,
                        r#""domain":".google.com"}},...]"#
                    ));
                    let mut input = String::new();
                    std::io::stdin().read_to_string(&mut input)?;
                    input
                }
            };
            let count = manager.import(json.trim()).context("Failed to parse cookies")?;
            println!("Successfully saved {} cookies to {:?}", count, manager.path());
        }
    }

    Ok(())
}
