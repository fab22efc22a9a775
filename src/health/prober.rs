// src/health/prober.rs
use crate::config::ProbeConfig;
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::RetryStrategy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::result::{ManifestResult, ProbeResult};

/// Liveness checks against a single routing domain. Implementations never
/// fail: every problem is encoded in the returned result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, routing_domain: &str) -> ProbeResult;

    async fn validate_manifest(&self, routing_domain: &str) -> ManifestResult;
}

pub struct HealthProber {
    config: ProbeConfig,
    client: Client,
    retry: RetryStrategy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthProber {
    pub fn new(config: ProbeConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create probe HTTP client")?;

        let retry = RetryStrategy::from_config(&config);

        Ok(Self {
            config,
            client,
            retry,
            metrics,
        })
    }

    pub fn retry_strategy(&self) -> &RetryStrategy {
        &self.retry
    }

    fn url_for(&self, routing_domain: &str, path: &str) -> String {
        format!("{}://{}{}", self.config.scheme, routing_domain, path)
    }
}

fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

#[async_trait]
impl Prober for HealthProber {
    async fn probe(&self, routing_domain: &str) -> ProbeResult {
        let url = self.url_for(routing_domain, "/");
        let timer = Timer::new();

        let outcome = self
            .retry
            .execute(|_| self.client.head(url.as_str()).send())
            .await;

        let result = match outcome {
            Ok((response, context)) => {
                let status = response.status();
                ProbeResult::from_response(
                    status.as_u16(),
                    reason_phrase(status),
                    &url,
                    context.number(),
                    context.timeout.as_millis() as u64,
                )
            }
            Err(exhausted) => {
                warn!(
                    "Health check for {} failed after {} attempts: {}",
                    routing_domain, exhausted.attempts, exhausted.last_error
                );
                ProbeResult::connection_failed(
                    &url,
                    exhausted.attempts,
                    Some(exhausted.last_error.to_string()),
                )
            }
        };

        debug!(
            "Probed {} in {:?}: {}",
            routing_domain,
            timer.elapsed(),
            result.deployment_status.as_str()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_probe(result.deployment_status, timer.elapsed());
        }

        result
    }

    async fn validate_manifest(&self, routing_domain: &str) -> ManifestResult {
        let url = self.url_for(routing_domain, "/manifest.json");
        let manifest_timeout = self.config.manifest_timeout();

        let fetched = timeout(manifest_timeout, async {
            let response = self.client.get(url.as_str()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Ok((status, None));
            }
            let document = response.json::<Value>().await?;
            Ok::<_, reqwest::Error>((status, Some(document)))
        })
        .await;

        let result = match fetched {
            Ok(Ok((status, Some(document)))) => check_manifest(status, document),
            Ok(Ok((status, None))) => ManifestResult::invalid(
                status.as_u16(),
                reason_phrase(status),
                format!("HTTP {}: {}", status.as_u16(), reason_phrase(status)),
            ),
            Ok(Err(e)) => {
                warn!("Plugin manifest check failed for {}: {}", routing_domain, e);
                ManifestResult::invalid(0, "Connection Failed", e.to_string())
            }
            Err(_) => {
                warn!(
                    "Plugin manifest check for {} timed out after {:?}",
                    routing_domain, manifest_timeout
                );
                ManifestResult::invalid(
                    0,
                    "Connection Failed",
                    format!("request timed out after {}ms", manifest_timeout.as_millis()),
                )
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_manifest_validation(result.manifest_valid);
        }
        result
    }
}

/// Tolerated manifest shapes; only `Described` with non-empty fields passes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Described { name: String, description: String },
    Object(Map<String, Value>),
    Other(Value),
}

fn check_manifest(status: StatusCode, document: Value) -> ManifestResult {
    let shape = match ManifestDocument::deserialize(&document) {
        Ok(shape) => shape,
        Err(_) => ManifestDocument::Other(document.clone()),
    };

    match shape {
        ManifestDocument::Described { name, description }
            if !name.trim().is_empty() && !description.trim().is_empty() =>
        {
            ManifestResult::valid(status.as_u16(), reason_phrase(status), document)
        }
        ManifestDocument::Described { .. } => ManifestResult::invalid(
            status.as_u16(),
            reason_phrase(status),
            "Missing required fields (name, description)",
        ),
        ManifestDocument::Object(fields) => {
            debug!(
                "Manifest lacks name/description; present fields: {:?}",
                fields.keys().collect::<Vec<_>>()
            );
            ManifestResult::invalid(
                status.as_u16(),
                reason_phrase(status),
                "Missing required fields (name, description)",
            )
        }
        ManifestDocument::Other(value) => ManifestResult::invalid(
            status.as_u16(),
            reason_phrase(status),
            format!("Manifest is not a JSON object (found {})", json_kind(&value)),
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
