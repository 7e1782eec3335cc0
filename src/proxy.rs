//! Proxy rotation.
//!
//! A pool of HTTP proxies is loaded once per run from a plain-text list
//! (URL or local file). Each fetch attempt picks one at random. Any failure
//! to build the pool leaves retrieval going out directly.

use crate::config::ProxyConfig;
use crate::error::{MetricsError, Result};
use futures::future::join_all;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self { proxies }
    }

    /// Build the pool described by `config`.
    ///
    /// Returns `None`, with a warning, when no source is set, the list
    /// can't be loaded, or no usable proxy remains.
    pub async fn configure(config: &ProxyConfig) -> Option<Self> {
        let source = config.source.as_deref()?;

        let mut pool = match Self::load(source).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(source, error = %e, "Failed to load proxy list, connecting directly");
                return None;
            }
        };

        pool.proxies.truncate(config.max_candidates);

        if config.probe {
            pool = pool.probe(config).await;
        }

        if pool.is_empty() {
            warn!(source, "No usable proxies, connecting directly");
            return None;
        }

        info!(count = pool.len(), "Proxy pool ready");
        Some(pool)
    }

    /// Load a list from an `http(s)://` URL or a file path.
    pub async fn load(source: &str) -> Result<Self> {
        let text = if source.starts_with("http://") || source.starts_with("https://") {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?;
            let response = client.get(source).send().await?;
            if !response.status().is_success() {
                return Err(MetricsError::Api {
                    code: response.status().as_u16(),
                    message: format!("Proxy list error: {}", response.status()),
                });
            }
            response.text().await?
        } else {
            tokio::fs::read_to_string(source).await?
        };

        let mut proxies = parse_proxy_list(&text);
        // Free lists are ordered by whatever the publisher likes; spread the load
        proxies.shuffle(&mut rand::thread_rng());
        debug!(count = proxies.len(), "Parsed proxy list");
        Ok(Self { proxies })
    }

    /// Keep only proxies that answer `probe_url` within the probe timeout.
    pub async fn probe(self, config: &ProxyConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.probe_concurrency.max(1)));
        let timeout = Duration::from_secs(config.probe_timeout_secs);

        let checks = self.proxies.into_iter().map(|proxy| {
            let semaphore = Arc::clone(&semaphore);
            let url = config.probe_url.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match probe_one(&proxy, &url, timeout).await {
                    Ok(()) => Some(proxy),
                    Err(e) => {
                        debug!(proxy = %proxy, error = %e, "Proxy failed probe");
                        None
                    }
                }
            }
        });

        let proxies: Vec<String> = join_all(checks).await.into_iter().flatten().collect();
        info!(alive = proxies.len(), "Proxy probe complete");
        Self { proxies }
    }

    /// Random proxy for the next attempt.
    pub fn pick(&self) -> Option<&str> {
        self.proxies.choose(&mut rand::thread_rng()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

async fn probe_one(proxy: &str, url: &str, timeout: Duration) -> Result<()> {
    let proxy = reqwest::Proxy::all(proxy)
        .map_err(|e| MetricsError::Config(format!("Invalid proxy URL: {}", e)))?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(timeout)
        .build()?;
    let response = client.head(url).send().await?;
    if response.status().is_server_error() {
        return Err(MetricsError::Api {
            code: response.status().as_u16(),
            message: "probe rejected".to_string(),
        });
    }
    Ok(())
}

/// Parse one proxy per line. Bare `host:port` entries become `http://` URLs.
pub fn parse_proxy_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let entry = line.split_whitespace().next()?;
            if entry.contains("://") {
                Some(entry.to_string())
            } else if entry.contains(':') {
                Some(format!("http://{}", entry))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_proxy_list() {
        let text = concat!(
            "# free list\n\n",
            "1.2.3.4:8080\n",
            "socks5://5.6.7.8:1080\n",
            "  9.9.9.9:3128  US elite\n",
            "not-a-proxy\n"
        );
        assert_eq!(
            parse_proxy_list(text),
            vec![
                "http://1.2.3.4:8080".to_string(),
                "socks5://5.6.7.8:1080".to_string(),
                "http://9.9.9.9:3128".to_string(),
            ]
        );
    }

    #[test]
    fn test_pick_from_empty_pool() {
        assert!(ProxyPool::default().pick().is_none());
        let pool = ProxyPool::new(vec!["http://1.2.3.4:80".to_string()]);
        assert_eq!(pool.pick(), Some("http://1.2.3.4:80"));
    }

    #[tokio::test]
    async fn test_configure_from_file() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        writeln!(temp, "1.2.3.4:8080\n5.6.7.8:3128\n10.0.0.1:80")?;
        let config = ProxyConfig {
            source: Some(temp.path().display().to_string()),
            max_candidates: 2,
            ..Default::default()
        };
        let pool = ProxyPool::configure(&config).await.expect("pool");
        assert_eq!(pool.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_configure_failure_is_non_fatal() {
        let config = ProxyConfig {
            source: Some("/nonexistent/proxies.txt".to_string()),
            ..Default::default()
        };
        assert!(ProxyPool::configure(&config).await.is_none());
        assert!(ProxyPool::configure(&ProxyConfig::default()).await.is_none());
    }
}
