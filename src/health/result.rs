// src/health/result.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    #[serde(rename = "not-deployed")]
    NotDeployed,
    #[serde(rename = "deployed-healthy")]
    Healthy,
    #[serde(rename = "deployed-unhealthy")]
    Unhealthy,
    #[serde(rename = "connection-failed")]
    ConnectionFailed,
    /// Placeholder for a target whose probe was suppressed before any result
    /// was recorded.
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeploymentState {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => DeploymentState::NotDeployed,
            200..=399 => DeploymentState::Healthy,
            _ => DeploymentState::Unhealthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::NotDeployed => "not-deployed",
            DeploymentState::Healthy => "deployed-healthy",
            DeploymentState::Unhealthy => "deployed-unhealthy",
            DeploymentState::ConnectionFailed => "connection-failed",
            DeploymentState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Timeout of the reporting attempt, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_error: Option<String>,
}

/// Outcome of one liveness probe. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub healthy: bool,
    pub status: u16,
    pub status_text: String,
    pub deployment_status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl ProbeResult {
    /// Classifies a received HTTP response. Diagnostics are attached only
    /// when the target is not healthy.
    pub fn from_response(
        status: u16,
        status_text: &str,
        url: &str,
        attempt: u32,
        timeout_ms: u64,
    ) -> Self {
        let deployment_status = DeploymentState::from_status(status);
        let healthy = deployment_status == DeploymentState::Healthy;

        let error = match deployment_status {
            DeploymentState::Healthy => None,
            DeploymentState::NotDeployed => Some("Domain not deployed yet".to_string()),
            _ => Some(format!("HTTP {}: {}", status, status_text)),
        };

        let diagnostics = (!healthy).then(|| Diagnostics {
            url: url.to_string(),
            attempt: Some(attempt),
            timeout: Some(timeout_ms),
            final_error: None,
        });

        Self {
            healthy,
            status,
            status_text: status_text.to_string(),
            deployment_status,
            error,
            timestamp: Utc::now(),
            diagnostics,
        }
    }

    /// No response was received after every attempt.
    pub fn connection_failed(url: &str, attempts: u32, final_error: Option<String>) -> Self {
        Self {
            healthy: false,
            status: 0,
            status_text: "Connection Failed".to_string(),
            deployment_status: DeploymentState::ConnectionFailed,
            error: Some(
                final_error
                    .clone()
                    .unwrap_or_else(|| "Connection failed after retries".to_string()),
            ),
            timestamp: Utc::now(),
            diagnostics: Some(Diagnostics {
                url: url.to_string(),
                attempt: Some(attempts),
                timeout: None,
                final_error,
            }),
        }
    }

    /// Neutral stand-in used when no probe result exists yet.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: 0,
            status_text: "Pending".to_string(),
            deployment_status: DeploymentState::Unknown,
            error: Some(reason.into()),
            timestamp: Utc::now(),
            diagnostics: None,
        }
    }
}

/// Outcome of a plugin manifest validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResult {
    pub manifest_valid: bool,
    pub status: u16,
    pub status_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ManifestResult {
    pub fn valid(status: u16, status_text: &str, manifest: Value) -> Self {
        Self {
            manifest_valid: true,
            status,
            status_text: status_text.to_string(),
            manifest: Some(manifest),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn invalid(status: u16, status_text: &str, error: impl Into<String>) -> Self {
        Self {
            manifest_valid: false,
            status,
            status_text: status_text.to_string(),
            manifest: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_deployed() {
        let result = ProbeResult::from_response(404, "Not Found", "https://x.ubq.fi/", 1, 5000);
        assert_eq!(result.deployment_status, DeploymentState::NotDeployed);
        assert!(!result.healthy);
        assert_eq!(result.error.as_deref(), Some("Domain not deployed yet"));
        assert_eq!(result.diagnostics.unwrap().attempt, Some(1));
    }

    #[test]
    fn success_and_redirects_are_healthy_without_diagnostics() {
        for status in [200, 204, 301, 399] {
            let result = ProbeResult::from_response(status, "", "https://x.ubq.fi/", 1, 5000);
            assert!(result.healthy, "status {}", status);
            assert_eq!(result.deployment_status, DeploymentState::Healthy);
            assert!(result.error.is_none());
            assert!(result.diagnostics.is_none());
        }
    }

    #[test]
    fn other_statuses_are_unhealthy() {
        let result = ProbeResult::from_response(
            503,
            "Service Unavailable",
            "https://x.ubq.fi/",
            1,
            5000,
        );
        assert_eq!(result.deployment_status, DeploymentState::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("HTTP 503: Service Unavailable"));
    }

    #[test]
    fn wire_format_uses_dashboard_names() {
        let result = ProbeResult::connection_failed("https://x.ubq.fi/", 3, Some("refused".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["deploymentStatus"], "connection-failed");
        assert_eq!(json["statusText"], "Connection Failed");
        assert_eq!(json["status"], 0);
        assert_eq!(json["diagnostics"]["attempt"], 3);
        assert_eq!(json["diagnostics"]["finalError"], "refused");
        assert!(json["diagnostics"].get("timeout").is_none());
    }
}
