// src/metrics/collector.rs
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;

use crate::health::DeploymentState;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Probe metrics
    pub probes_total: IntCounterVec,
    pub probe_duration_seconds: Histogram,
    pub probes_suppressed_total: IntCounterVec,
    pub manifest_validations_total: IntCounterVec,

    // Discovery metrics
    pub discovery_fetches_total: IntCounterVec,
    pub discovery_cache_hits: IntCounter,

    // Snapshot metrics
    pub snapshot_duration_seconds: Histogram,
    pub targets_total: IntGaugeVec,
    pub targets_healthy: IntGaugeVec,
    pub overall_health_percentage: IntGauge,

    // API metrics
    pub http_requests_total: IntCounterVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probes_total = IntCounterVec::new(
            Opts::new("ubq_monitor_probes_total", "Liveness probes by outcome"),
            &["state"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ubq_monitor_probe_duration_seconds",
                "Wall time of a liveness probe including retries",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 35.0]),
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let probes_suppressed_total = IntCounterVec::new(
            Opts::new(
                "ubq_monitor_probes_suppressed_total",
                "Probes skipped by the rate limiter",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(probes_suppressed_total.clone()))?;

        let manifest_validations_total = IntCounterVec::new(
            Opts::new(
                "ubq_monitor_manifest_validations_total",
                "Plugin manifest validations by result",
            ),
            &["valid"],
        )?;
        registry.register(Box::new(manifest_validations_total.clone()))?;

        let discovery_fetches_total = IntCounterVec::new(
            Opts::new(
                "ubq_monitor_discovery_fetches_total",
                "Upstream manifest fetches by outcome",
            ),
            &["manifest", "outcome"],
        )?;
        registry.register(Box::new(discovery_fetches_total.clone()))?;

        let discovery_cache_hits = IntCounter::new(
            "ubq_monitor_discovery_cache_hits_total",
            "Discovery calls served from cache",
        )?;
        registry.register(Box::new(discovery_cache_hits.clone()))?;

        let snapshot_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "ubq_monitor_snapshot_duration_seconds",
            "Time to build a health snapshot",
        ))?;
        registry.register(Box::new(snapshot_duration_seconds.clone()))?;

        let targets_total = IntGaugeVec::new(
            Opts::new("ubq_monitor_targets_total", "Targets per partition"),
            &["partition"],
        )?;
        registry.register(Box::new(targets_total.clone()))?;

        let targets_healthy = IntGaugeVec::new(
            Opts::new("ubq_monitor_targets_healthy", "Healthy targets per partition"),
            &["partition"],
        )?;
        registry.register(Box::new(targets_healthy.clone()))?;

        let overall_health_percentage = IntGauge::new(
            "ubq_monitor_overall_health_percentage",
            "Healthy share of all targets in the latest snapshot",
        )?;
        registry.register(Box::new(overall_health_percentage.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("ubq_monitor_http_requests_total", "API requests served"),
            &["route", "status_code"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            probes_total,
            probe_duration_seconds,
            probes_suppressed_total,
            manifest_validations_total,
            discovery_fetches_total,
            discovery_cache_hits,
            snapshot_duration_seconds,
            targets_total,
            targets_healthy,
            overall_health_percentage,
            http_requests_total,
        })
    }

    pub fn record_probe(&self, state: DeploymentState, duration: Duration) {
        self.probes_total.with_label_values(&[state.as_str()]).inc();
        self.probe_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_suppressed_probe(&self, kind: &str) {
        self.probes_suppressed_total.with_label_values(&[kind]).inc();
    }

    pub fn record_manifest_validation(&self, valid: bool) {
        let label = if valid { "true" } else { "false" };
        self.manifest_validations_total
            .with_label_values(&[label])
            .inc();
    }

    pub fn record_discovery_fetch(&self, manifest: &str, outcome: &str) {
        self.discovery_fetches_total
            .with_label_values(&[manifest, outcome])
            .inc();
    }

    pub fn update_partition(&self, partition: &str, healthy: usize, total: usize) {
        self.targets_total
            .with_label_values(&[partition])
            .set(total as i64);
        self.targets_healthy
            .with_label_values(&[partition])
            .set(healthy as i64);
    }

    pub fn record_snapshot(&self, duration: Duration, overall_percentage: u32) {
        self.snapshot_duration_seconds.observe(duration.as_secs_f64());
        self.overall_health_percentage.set(i64::from(overall_percentage));
    }

    pub fn record_http_request(&self, route: &str, status_code: u16) {
        let status = status_code.to_string();
        self.http_requests_total
            .with_label_values(&[route, &status])
            .inc();
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
