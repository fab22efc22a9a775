// src/aggregator/engine.rs
use anyhow::Result;
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::snapshot::{Snapshot, TargetHealth};
use crate::config::{AggregatorConfig, Config};
use crate::discovery::{Target, TargetDiscovery, TargetKind, TargetSet, TargetSource};
use crate::health::{HealthProber, ManifestResult, ProbeResult, Prober};
use crate::metrics::{MetricsCollector, Timer};
use crate::rate_limit::RateLimiter;

/// Last probe outcome for a routing domain. Replaced wholesale, never edited.
#[derive(Debug)]
struct CachedProbe {
    result: ProbeResult,
    manifest: Option<ManifestResult>,
}

/// Drives discovery and probing and assembles snapshots.
///
/// All mutable state (rate limiter, result cache, latest snapshot) is owned by
/// the instance, so independent aggregators never observe each other.
pub struct Aggregator {
    config: AggregatorConfig,
    source: Arc<dyn TargetSource>,
    prober: Arc<dyn Prober>,
    limiter: Arc<RateLimiter>,
    results: DashMap<String, Arc<CachedProbe>>,
    latest: ArcSwapOption<Snapshot>,
    probe_slots: Semaphore,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Aggregator {
    pub fn new(
        config: AggregatorConfig,
        source: Arc<dyn TargetSource>,
        prober: Arc<dyn Prober>,
        limiter: Arc<RateLimiter>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let probe_slots = Semaphore::new(config.max_concurrent_probes.max(1));
        Self {
            config,
            source,
            prober,
            limiter,
            results: DashMap::new(),
            latest: ArcSwapOption::empty(),
            probe_slots,
            metrics,
        }
    }

    /// Wires the production discovery, prober and rate limiter from config.
    pub fn from_config(config: &Config, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let source = Arc::new(TargetDiscovery::new(
            config.discovery.clone(),
            metrics.clone(),
        )?);
        let prober = Arc::new(HealthProber::new(config.probe.clone(), metrics.clone())?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.cooldown()));

        Ok(Self::new(
            config.aggregator.clone(),
            source,
            prober,
            limiter,
            metrics,
        ))
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub async fn targets(&self) -> Arc<TargetSet> {
        self.source.discover().await
    }

    /// The most recently published snapshot, if any.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.load_full()
    }

    pub async fn latest_or_build(self: &Arc<Self>) -> Arc<Snapshot> {
        match self.latest() {
            Some(snapshot) => snapshot,
            None => self.build_snapshot().await,
        }
    }

    /// Discovers targets, probes each concurrently and publishes the merged
    /// snapshot. A failing or panicking probe only affects its own entry.
    pub async fn build_snapshot(self: &Arc<Self>) -> Arc<Snapshot> {
        let timer = Timer::new();
        let targets = self.source.discover().await;

        let mut pending = Vec::with_capacity(targets.len());
        for target in targets.iter().cloned() {
            let aggregator = self.clone();
            let probed = target.clone();
            let task = tokio::spawn(async move { aggregator.evaluate(probed).await });
            pending.push((target, task));
        }

        let (order, tasks): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let outcomes = futures::future::join_all(tasks).await;

        let entries = order.into_iter().zip(outcomes).map(|(target, outcome)| {
            match outcome {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Probe task for {} failed: {}", target.routing_domain, e);
                    TargetHealth::new(
                        target,
                        ProbeResult::unknown(format!("Probe task failed: {}", e)),
                        None,
                    )
                }
            }
        });

        let snapshot = Arc::new(Snapshot::from_entries(entries));
        self.publish(&snapshot, &timer);
        snapshot
    }

    fn publish(&self, snapshot: &Arc<Snapshot>, timer: &Timer) {
        let summary = snapshot.summary;
        info!(
            "Health snapshot built in {:?}: {}/{} healthy ({}%)",
            timer.elapsed(),
            summary.healthy(),
            summary.total(),
            summary.overall_health_percentage
        );

        if let Some(metrics) = &self.metrics {
            metrics.update_partition("apps", summary.healthy_apps, summary.total_apps);
            metrics.update_partition("plugins", summary.healthy_plugins, summary.total_plugins);
            metrics.update_partition("others", summary.healthy_others, summary.total_others);
            metrics.record_snapshot(timer.elapsed(), summary.overall_health_percentage);
        }

        self.latest.store(Some(snapshot.clone()));
    }

    async fn evaluate(&self, target: Target) -> TargetHealth {
        let domain = target.routing_domain.clone();

        if !self.limiter.should_probe(&domain) {
            if let Some(metrics) = &self.metrics {
                metrics.record_suppressed_probe(target.kind.as_str());
            }
            return match self.cached(&domain) {
                Some(cached) => {
                    debug!("Reusing cached result for {}", domain);
                    TargetHealth::new(target, cached.result.clone(), cached.manifest.clone())
                }
                None => TargetHealth::new(
                    target,
                    ProbeResult::unknown("Probe suppressed by rate limiter before any result was recorded"),
                    None,
                ),
            };
        }

        let validate = target.kind == TargetKind::Plugin && self.config.validate_plugin_manifests;

        let (health, manifest) = {
            let _slot = self.probe_slots.acquire().await.ok();
            if validate {
                let (health, manifest) = tokio::join!(
                    self.prober.probe(&domain),
                    self.prober.validate_manifest(&domain)
                );
                (health, Some(manifest))
            } else {
                (self.prober.probe(&domain).await, None)
            }
        };

        self.limiter.record_probe(&domain);
        self.results.insert(
            domain,
            Arc::new(CachedProbe {
                result: health.clone(),
                manifest: manifest.clone(),
            }),
        );

        TargetHealth::new(target, health, manifest)
    }

    /// Single-domain check behind `/api/health/{key}`. Shares the rate limiter
    /// and result cache with snapshot builds.
    pub async fn check_domain(&self, domain: &str) -> ProbeResult {
        let previous = self.cached(domain);

        if !self.limiter.should_probe(domain) {
            if let Some(cached) = &previous {
                debug!("Serving cached result for {}", domain);
                return cached.result.clone();
            }
        }

        let result = {
            let _slot = self.probe_slots.acquire().await.ok();
            self.prober.probe(domain).await
        };

        self.limiter.record_probe(domain);
        self.results.insert(
            domain.to_string(),
            Arc::new(CachedProbe {
                result: result.clone(),
                manifest: previous.and_then(|cached| cached.manifest.clone()),
            }),
        );
        result
    }

    /// On-demand manifest validation behind `/api/manifest/{key}`. Not rate
    /// limited; a cached probe for the domain picks up the new manifest.
    pub async fn check_manifest(&self, domain: &str) -> ManifestResult {
        let manifest = {
            let _slot = self.probe_slots.acquire().await.ok();
            self.prober.validate_manifest(domain).await
        };

        if let Some(cached) = self.cached(domain) {
            self.results.insert(
                domain.to_string(),
                Arc::new(CachedProbe {
                    result: cached.result.clone(),
                    manifest: Some(manifest.clone()),
                }),
            );
        }
        manifest
    }

    fn cached(&self, domain: &str) -> Option<Arc<CachedProbe>> {
        self.results.get(domain).map(|entry| entry.value().clone())
    }
}
