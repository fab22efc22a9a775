// src/discovery/source.rs
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::manifest::{PluginMapDocument, SitemapDocument};
use super::target::{Target, TargetSet};
use crate::config::DiscoveryConfig;
use crate::metrics::MetricsCollector;

/// Anything that can resolve the current set of targets.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Never fails: upstream problems degrade to empty partitions.
    async fn discover(&self) -> Arc<TargetSet>;
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DiscoveryError {
    fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::Http { .. } => "http_error",
            DiscoveryError::Timeout(_) => "timeout",
            DiscoveryError::Transport(_) => "network_error",
            DiscoveryError::Parse(_) => "parse_error",
        }
    }
}

/// Raw manifest contents behind a cached target set, kept so a failed
/// refresh can fall back partition by partition.
#[derive(Debug)]
struct CachedTargets {
    targets: Arc<TargetSet>,
    sitemap_urls: Option<Arc<Vec<String>>>,
    plugins: Option<Arc<Vec<Target>>>,
    fetched_at: Instant,
}

pub struct TargetDiscovery {
    config: DiscoveryConfig,
    client: Client,
    cache: ArcSwapOption<CachedTargets>,
    refresh_lock: Mutex<()>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl TargetDiscovery {
    pub fn new(config: DiscoveryConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create discovery HTTP client")?;

        Ok(Self::with_client(config, client, metrics))
    }

    pub fn with_client(
        config: DiscoveryConfig,
        client: Client,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            config,
            client,
            cache: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            metrics,
        }
    }

    /// Drops the cached target set so the next call refetches.
    pub fn invalidate(&self) {
        self.cache.store(None);
    }

    fn fresh_cached(&self) -> Option<Arc<TargetSet>> {
        let cached = self.cache.load_full()?;
        let age = cached.fetched_at.elapsed();
        if age < self.config.cache_ttl() {
            debug!("Using cached targets (age: {}s)", age.as_secs());
            Some(cached.targets.clone())
        } else {
            None
        }
    }

    async fn refresh(&self) -> Arc<TargetSet> {
        let start = Instant::now();
        let previous = self.cache.load_full();
        info!(
            "Target cache {}, fetching fresh manifests",
            if previous.is_some() { "expired" } else { "empty" }
        );

        let (sitemap, plugin_map) = tokio::join!(
            self.fetch_manifest::<SitemapDocument>("sitemap", &self.config.sitemap_url),
            self.fetch_manifest::<PluginMapDocument>("plugin_map", &self.config.plugin_map_url),
        );

        let sitemap_urls = match sitemap {
            Ok(document) => Some(Arc::new(document.into_urls())),
            Err(_) => self.stale_partition(previous.as_deref(), |c| c.sitemap_urls.clone()),
        };
        let plugins = match plugin_map {
            Ok(document) => Some(Arc::new(document.into_targets())),
            Err(_) => self.stale_partition(previous.as_deref(), |c| c.plugins.clone()),
        };

        let targets = Arc::new(TargetSet::assemble(
            sitemap_urls.as_deref().map(Vec::as_slice).unwrap_or(&[]),
            plugins.as_deref().map(Vec::as_slice).unwrap_or(&[]),
            &self.config,
        ));

        info!(
            "Discovered {} apps, {} plugins, {} others in {:?}",
            targets.apps.len(),
            targets.plugins.len(),
            targets.others.len(),
            start.elapsed()
        );

        self.cache.store(Some(Arc::new(CachedTargets {
            targets: targets.clone(),
            sitemap_urls,
            plugins,
            fetched_at: Instant::now(),
        })));

        targets
    }

    fn stale_partition<T>(
        &self,
        previous: Option<&CachedTargets>,
        pick: impl Fn(&CachedTargets) -> Option<Arc<T>>,
    ) -> Option<Arc<T>> {
        if !self.config.fallback_to_stale {
            return None;
        }
        let stale = previous.and_then(pick);
        if stale.is_some() {
            warn!("Falling back to previously fetched manifest");
        }
        stale
    }

    async fn fetch_manifest<T: DeserializeOwned>(
        &self,
        name: &'static str,
        url: &Url,
    ) -> Result<T, DiscoveryError> {
        let start = Instant::now();
        debug!("Fetching {} from {}", name, url);

        let result = self.fetch_json(url).await;
        match &result {
            Ok(_) => {
                debug!("Fetched {} in {:?}", name, start.elapsed());
                self.record_fetch(name, "success");
            }
            Err(e) => {
                warn!(
                    manifest = name,
                    error_kind = e.kind(),
                    "Fetching {} failed after {:?}: {}",
                    url,
                    start.elapsed(),
                    e
                );
                self.record_fetch(name, e.kind());
            }
        }
        result
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DiscoveryError> {
        let fetch_timeout = self.config.fetch_timeout();
        let body = timeout(fetch_timeout, async {
            let response = self.client.get(url.as_str()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DiscoveryError::Http {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                });
            }
            Ok::<_, DiscoveryError>(response.bytes().await?)
        })
        .await
        .map_err(|_| DiscoveryError::Timeout(fetch_timeout))??;

        Ok(serde_json::from_slice(&body)?)
    }

    fn record_fetch(&self, manifest: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_discovery_fetch(manifest, outcome);
        }
    }
}

#[async_trait]
impl TargetSource for TargetDiscovery {
    async fn discover(&self) -> Arc<TargetSet> {
        if let Some(targets) = self.fresh_cached() {
            if let Some(metrics) = &self.metrics {
                metrics.discovery_cache_hits.inc();
            }
            return targets;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(targets) = self.fresh_cached() {
            return targets;
        }
        self.refresh().await
    }
}
