//! Run configuration.
//!
//! Everything a run needs is carried in [`RunConfig`], built once at startup
//! from defaults, an optional JSON file, and CLI overrides.

use crate::error::{MetricsError, Result};
use crate::patcher::MarkerSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Google Scholar profile identifier
pub const DEFAULT_PROFILE_ID: &str = "tIcTCNgAAAAJ";

/// Default document to patch
pub const DEFAULT_DOCUMENT: &str = "README.md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Scholar profile identifier (`user=` parameter)
    pub profile_id: String,
    /// Document holding the badges
    pub document: PathBuf,
    /// Cookie file override (default: `~/.scholar_badges_cookies.json`)
    pub cookies: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub proxy: ProxyConfig,
    pub markers: MarkerSet,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile_id: DEFAULT_PROFILE_ID.to_string(),
            document: PathBuf::from(DEFAULT_DOCUMENT),
            cookies: None,
            fetch: FetchConfig::default(),
            proxy: ProxyConfig::default(),
            markers: MarkerSet::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub max_attempts: u32,
    /// Hard bound on one attempt, enforced by killing the worker
    pub attempt_timeout_secs: u64,
    /// Time allowed for a killed worker to be reaped
    pub kill_grace_ms: u64,
    /// Per-request timeout inside the worker
    pub http_timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// Multiply the jittered delay by the attempt number
    pub scale_delay_with_attempt: bool,
    /// Mirror site URL
    pub base_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_secs: 60,
            kill_grace_ms: 2000,
            http_timeout_secs: 30,
            delay_min_ms: 2000,
            delay_max_ms: 5000,
            scale_delay_with_attempt: true,
            base_url: None,
        }
    }
}

impl FetchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// URL or file path of a plain-text proxy list
    pub source: Option<String>,
    /// Keep only proxies that answer `probe_url`
    pub probe: bool,
    pub probe_url: String,
    pub probe_timeout_secs: u64,
    pub probe_concurrency: usize,
    pub max_candidates: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            source: None,
            probe: false,
            probe_url: "https://scholar.google.com".to_string(),
            probe_timeout_secs: 5,
            probe_concurrency: 8,
            max_candidates: 50,
        }
    }
}

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// Scholar profile ID
    #[arg(long)]
    pub profile: Option<String>,

    /// Document holding the badges
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Maximum fetch attempts
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Hard timeout per attempt, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Proxy list (URL or file)
    #[arg(long)]
    pub proxy_list: Option<String>,

    /// Mirror site URL
    #[arg(long)]
    pub mirror: Option<String>,

    /// Skip the randomized delay before each attempt
    #[arg(long)]
    pub no_delay: bool,
}

impl RunConfig {
    /// Defaults, then the optional file, then `overrides`; validated.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(profile) = &overrides.profile {
            self.profile_id = profile.clone();
        }
        if let Some(document) = &overrides.document {
            self.document = document.clone();
        }
        if let Some(attempts) = overrides.attempts {
            self.fetch.max_attempts = attempts;
        }
        if let Some(timeout) = overrides.timeout {
            self.fetch.attempt_timeout_secs = timeout;
        }
        if let Some(source) = &overrides.proxy_list {
            self.proxy.source = Some(source.clone());
        }
        if let Some(mirror) = &overrides.mirror {
            self.fetch.base_url = Some(mirror.clone());
        }
        if overrides.no_delay {
            self.fetch.delay_min_ms = 0;
            self.fetch.delay_max_ms = 0;
        }
    }

    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MetricsError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.profile_id.trim().is_empty() {
            return Err(MetricsError::Config("profile_id must not be empty".to_string()));
        }
        if self.document.as_os_str().is_empty() {
            return Err(MetricsError::Config("document path must not be empty".to_string()));
        }
        let f = &self.fetch;
        if f.max_attempts == 0 {
            return Err(MetricsError::Config("fetch.max_attempts must be at least 1".to_string()));
        }
        if f.attempt_timeout_secs == 0 || f.http_timeout_secs == 0 {
            return Err(MetricsError::Config("fetch timeouts must be positive".to_string()));
        }
        if f.delay_min_ms > f.delay_max_ms {
            return Err(MetricsError::Config(format!(
                "fetch.delay_min_ms ({}) exceeds fetch.delay_max_ms ({})",
                f.delay_min_ms, f.delay_max_ms
            )));
        }
        if self.proxy.probe && self.proxy.probe_concurrency == 0 {
            return Err(MetricsError::Config(
                "proxy.probe_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
