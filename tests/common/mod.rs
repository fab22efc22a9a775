// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ubq_health_monitor::config::{AggregatorConfig, DiscoveryConfig};
use ubq_health_monitor::{
    Aggregator, ManifestResult, ProbeResult, Prober, RateLimiter, TargetSet, TargetSource,
};

/// Serves a fixed target set and counts calls.
pub struct StaticSource {
    targets: Arc<TargetSet>,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(targets: TargetSet) -> Self {
        Self {
            targets: Arc::new(targets),
            calls: AtomicUsize::new(0),
        }
    }

    /// Builds the set the way discovery would from raw sitemap URLs.
    pub fn from_urls(urls: &[&str]) -> Self {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        Self::new(TargetSet::assemble(&urls, &[], &DiscoveryConfig::default()))
    }
}

#[async_trait]
impl TargetSource for StaticSource {
    async fn discover(&self) -> Arc<TargetSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.clone()
    }
}

/// Answers probes from a status table; unknown domains get 200.
#[derive(Default)]
pub struct ScriptedProber {
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    panics_on: Option<String>,
    probes: Mutex<HashMap<String, usize>>,
    manifest_checks: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, domain: &str, status: u16) -> Self {
        self.statuses.insert(domain.to_string(), status);
        self
    }

    pub fn with_delay(mut self, domain: &str, delay: Duration) -> Self {
        self.delays.insert(domain.to_string(), delay);
        self
    }

    pub fn panicking_on(mut self, domain: &str) -> Self {
        self.panics_on = Some(domain.to_string());
        self
    }

    pub fn probe_count(&self, domain: &str) -> usize {
        self.probes
            .lock()
            .unwrap()
            .get(domain)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_probes(&self) -> usize {
        self.probes.lock().unwrap().values().sum()
    }

    pub fn manifest_checks(&self) -> usize {
        self.manifest_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, routing_domain: &str) -> ProbeResult {
        *self
            .probes
            .lock()
            .unwrap()
            .entry(routing_domain.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self
            .delays
            .get(routing_domain)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics_on.as_deref() == Some(routing_domain) {
            panic!("scripted probe panic for {}", routing_domain);
        }

        let status = self.statuses.get(routing_domain).copied().unwrap_or(200);
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        ProbeResult::from_response(
            status,
            reason,
            &format!("https://{}/", routing_domain),
            1,
            5000,
        )
    }

    async fn validate_manifest(&self, _routing_domain: &str) -> ManifestResult {
        self.manifest_checks.fetch_add(1, Ordering::SeqCst);
        ManifestResult::valid(
            200,
            "OK",
            serde_json::json!({"name": "plugin", "description": "scripted"}),
        )
    }
}

pub fn aggregator_config(max_concurrent_probes: usize) -> AggregatorConfig {
    AggregatorConfig {
        max_concurrent_probes,
        ..AggregatorConfig::default()
    }
}

pub fn aggregator(
    source: Arc<StaticSource>,
    prober: Arc<ScriptedProber>,
    config: AggregatorConfig,
) -> Arc<Aggregator> {
    Arc::new(Aggregator::new(
        config,
        source,
        prober,
        Arc::new(RateLimiter::new(Duration::from_secs(300))),
        None,
    ))
}
