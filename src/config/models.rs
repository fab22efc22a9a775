// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use crate::retry::RetryStrategy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let base = self.discovery.base_domain.trim();
        if base.is_empty() {
            bail!("discovery.base_domain must not be empty");
        }
        if base.starts_with('.') || base.ends_with('.') {
            bail!("discovery.base_domain must not start or end with a dot: {}", base);
        }
        if self.discovery.fetch_timeout_secs == 0 {
            bail!("discovery.fetch_timeout_secs must be greater than zero");
        }

        match self.probe.scheme.as_str() {
            "http" | "https" => {}
            other => bail!("probe.scheme must be http or https, got {}", other),
        }
        if self.probe.base_timeout_ms == 0 {
            bail!("probe.base_timeout_ms must be greater than zero");
        }
        if self.probe.manifest_timeout_ms == 0 {
            bail!("probe.manifest_timeout_ms must be greater than zero");
        }

        if self.rate_limit.cooldown_secs == 0 {
            bail!("rate_limit.cooldown_secs must be greater than zero");
        }
        if self.rate_limit.eviction_interval_secs == 0 {
            bail!("rate_limit.eviction_interval_secs must be greater than zero");
        }

        if self.aggregator.max_concurrent_probes == 0 {
            bail!("aggregator.max_concurrent_probes must be at least 1");
        }
        if self.aggregator.refresh_interval_secs == 0 {
            bail!("aggregator.refresh_interval_secs must be greater than zero");
        }
        // Probes are stamped when they finish; a refresh that comes round
        // before the cooldown has passed since then reuses cached results.
        let min_refresh = self.rate_limit.cooldown() + self.probe.worst_case_wall_time();
        if self.aggregator.refresh_interval() <= min_refresh {
            bail!(
                "aggregator.refresh_interval_secs ({}s) must exceed rate_limit.cooldown_secs plus the worst-case probe time ({:?})",
                self.aggregator.refresh_interval_secs,
                min_refresh
            );
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            bail!("metrics.path must start with '/': {}", self.metrics.path);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    #[serde(default = "default_sitemap_url")]
    pub sitemap_url: Url,
    #[serde(default = "default_plugin_map_url")]
    pub plugin_map_url: Url,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Apps whose key starts with this prefix are reported as plugins.
    #[serde(default = "default_system_plugin_prefix")]
    pub system_plugin_prefix: String,
    #[serde(default = "default_system_plugin_description")]
    pub system_plugin_description: String,
    /// Reuse the last successfully fetched manifest when a refresh fails.
    #[serde(default)]
    pub fallback_to_stale: bool,
}

impl DiscoveryConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            sitemap_url: default_sitemap_url(),
            plugin_map_url: default_plugin_map_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            system_plugin_prefix: default_system_plugin_prefix(),
            system_plugin_description: default_system_plugin_description(),
            fallback_to_stale: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_timeout_ms")]
    pub base_timeout_ms: u64,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    #[serde(default = "default_manifest_timeout_ms")]
    pub manifest_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ProbeConfig {
    pub fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    /// Longest a single target evaluation can take: the full retry schedule
    /// or the manifest check, whichever is longer.
    pub fn worst_case_wall_time(&self) -> Duration {
        RetryStrategy::from_config(self)
            .worst_case()
            .max(self.manifest_timeout())
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            max_retries: default_max_retries(),
            base_timeout_ms: default_base_timeout_ms(),
            backoff_step_ms: default_backoff_step_ms(),
            manifest_timeout_ms: default_manifest_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    #[serde(default = "default_true")]
    pub validate_plugin_manifests: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl AggregatorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: default_max_concurrent_probes(),
            validate_plugin_manifests: true,
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_base_domain() -> String {
    "ubq.fi".to_string()
}

fn default_sitemap_url() -> Url {
    Url::parse("https://ubq.fi/sitemap.json").expect("static sitemap url is valid")
}

fn default_plugin_map_url() -> Url {
    Url::parse("https://ubq.fi/plugin-map.json").expect("static plugin map url is valid")
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_system_plugin_prefix() -> String {
    "os-".to_string()
}

fn default_system_plugin_description() -> String {
    "Operating System Plugin".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_timeout_ms() -> u64 {
    5000
}

fn default_backoff_step_ms() -> u64 {
    1000
}

fn default_manifest_timeout_ms() -> u64 {
    15000
}

fn default_user_agent() -> String {
    concat!("ubq-health-monitor/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_eviction_interval_secs() -> u64 {
    1800
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_refresh_interval_secs() -> u64 {
    360
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_true() -> bool {
    true
}
