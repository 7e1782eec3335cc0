//! One update run: fetch, then patch.

use crate::config::RunConfig;
use crate::error::Result;
use crate::fetcher::{MetricsFetcher, WorkerCommand};
use crate::metrics::MetricsRecord;
use crate::patcher::{Patcher, UpdateStatus};
use crate::proxy::ProxyPool;
use tracing::{info, warn};

/// What a run achieved.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metrics: Option<MetricsRecord>,
    pub update: UpdateStatus,
}

/// Fetch metrics with `worker` and patch the configured document.
///
/// Fails only on an invalid configuration. Fetch and document failures are
/// logged and show up in the summary.
pub async fn run(config: &RunConfig, worker: WorkerCommand) -> Result<RunSummary> {
    config.validate()?;
    let patcher = Patcher::new(&config.markers)?;

    let metrics = fetch(config, worker).await;
    if metrics.is_none() {
        warn!("Failed to fetch metrics - will retry on next scheduled run");
    }

    let update = patcher.update_file(&config.document, metrics.as_ref());
    info!(status = ?update, document = %config.document.display(), "Run complete");

    Ok(RunSummary { metrics, update })
}

/// Fetcher half of a run, with proxy setup.
pub async fn fetch(config: &RunConfig, worker: WorkerCommand) -> Option<MetricsRecord> {
    info!(profile = %config.profile_id, "Fetching Google Scholar metrics");
    let proxies = ProxyPool::configure(&config.proxy).await;
    MetricsFetcher::new(worker, config.fetch.clone(), proxies).fetch().await
}
