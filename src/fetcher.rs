//! Retrying metrics fetcher.
//!
//! Each attempt runs in a separate worker process so a hung request can be
//! killed from the outside: the parent waits for the worker's output up to
//! the attempt timeout, then kills and reaps it. Attempts never overlap, and
//! no error leaves this module; exhaustion is reported as `None`.

use crate::config::{FetchConfig, RunConfig};
use crate::error::{MetricsError, Result};
use crate::metrics::MetricsRecord;
use crate::proxy::ProxyPool;
use rand::Rng;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Environment variable carrying the proxy chosen for one attempt.
pub const WORKER_PROXY_ENV: &str = "SCHOLAR_BADGES_PROXY";

/// Program and arguments that perform one retrieval.
///
/// The worker must print a JSON [`MetricsRecord`] on stdout and exit 0 on
/// success. Anything else counts as a failed attempt.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// This binary's hidden `worker` subcommand, configured for `config`.
    pub fn current_exe(config: &RunConfig) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let mut args: Vec<OsString> = vec![
            "worker".into(),
            "--profile".into(),
            config.profile_id.clone().into(),
            "--http-timeout".into(),
            config.fetch.http_timeout().as_secs().to_string().into(),
        ];
        if let Some(base_url) = &config.fetch.base_url {
            args.push("--base-url".into());
            args.push(base_url.clone().into());
        }
        if let Some(cookies) = &config.cookies {
            args.push("--cookies".into());
            args.push(cookies.clone().into_os_string());
        }
        Ok(Self { program: exe, args })
    }

    fn command(&self, proxy: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        match proxy {
            Some(p) => cmd.env(WORKER_PROXY_ENV, p),
            None => cmd.env_remove(WORKER_PROXY_ENV),
        };
        cmd
    }
}

/// Run one worker under a hard timeout.
///
/// On expiry the worker is killed and reaped (bounded by `grace`) before
/// this returns.
pub async fn run_attempt(
    worker: &WorkerCommand,
    proxy: Option<&str>,
    timeout: Duration,
    grace: Duration,
) -> Result<MetricsRecord> {
    let mut child = worker
        .command(proxy)
        .spawn()
        .map_err(|e| MetricsError::Worker(format!("failed to spawn {:?}: {}", worker.program, e)))?;
    let pid = child.id();

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MetricsError::Worker("worker stdout not captured".to_string()))?;

    let work = async {
        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await?;
        let status = child.wait().await?;
        Ok::<_, MetricsError>((status, output))
    };
    let outcome = tokio::time::timeout(timeout, work).await;

    let (status, output) = match outcome {
        Ok(result) => result?,
        Err(_) => {
            warn!(pid, timeout_secs = timeout.as_secs_f64(), "Worker hit hard timeout, killing");
            terminate(&mut child, grace).await;
            return Err(MetricsError::Timeout(timeout));
        }
    };

    if !status.success() {
        return Err(MetricsError::Worker(format!("worker exited with {}", status)));
    }

    let text = String::from_utf8_lossy(&output);
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| MetricsError::Worker("worker produced no output".to_string()))?;
    Ok(serde_json::from_str(line)?)
}

/// Forcibly stop a worker and wait for it to be reaped.
async fn terminate(child: &mut Child, grace: Duration) {
    if let Err(e) = child.start_kill() {
        // Already exited between the timeout firing and the kill
        debug!(error = %e, "Kill signal not delivered");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "Worker reaped"),
        Ok(Err(e)) => error!(error = %e, "Failed to reap worker"),
        Err(_) => error!(
            grace_ms = grace.as_millis() as u64,
            "Worker not reaped within grace period"
        ),
    }
}

/// Retry loop around [`run_attempt`].
pub struct MetricsFetcher {
    worker: WorkerCommand,
    config: FetchConfig,
    proxies: Option<ProxyPool>,
}

impl MetricsFetcher {
    pub fn new(worker: WorkerCommand, config: FetchConfig, proxies: Option<ProxyPool>) -> Self {
        Self {
            worker,
            config,
            proxies,
        }
    }

    /// Fetch metrics, retrying up to `max_attempts` times.
    ///
    /// Returns the first successful record, or `None` once every attempt
    /// has failed.
    pub async fn fetch(&self) -> Option<MetricsRecord> {
        let attempts = self.config.max_attempts;

        for attempt in 1..=attempts {
            let delay = self.jitter(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before request");
                tokio::time::sleep(delay).await;
            }

            let proxy = self.proxies.as_ref().and_then(ProxyPool::pick);
            info!(
                attempt,
                max_attempts = attempts,
                proxy = proxy.unwrap_or("direct"),
                "Fetch attempt"
            );

            match run_attempt(
                &self.worker,
                proxy,
                self.config.attempt_timeout(),
                self.config.kill_grace(),
            )
            .await
            {
                Ok(record) => {
                    info!(attempt, metrics = %record, "Fetched metrics");
                    return Some(record);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Fetch attempt failed");
                }
            }
        }

        error!(attempts, "All fetch attempts failed");
        None
    }

    /// Random delay in `[delay_min_ms, delay_max_ms]`, optionally scaled by attempt.
    fn jitter(&self, attempt: u32) -> Duration {
        let (min, max) = (self.config.delay_min_ms, self.config.delay_max_ms);
        let base = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        let factor = if self.config.scale_delay_with_attempt {
            u64::from(attempt)
        } else {
            1
        };
        Duration::from_millis(base.saturating_mul(factor))
    }
}
