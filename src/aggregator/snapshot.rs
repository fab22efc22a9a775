// src/aggregator/snapshot.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::discovery::{Target, TargetKind};
use crate::health::{ManifestResult, ProbeResult};

/// A target together with its latest probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHealth {
    #[serde(flatten)]
    pub target: Target,
    pub health: ProbeResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ManifestResult>,
}

impl TargetHealth {
    pub fn new(target: Target, health: ProbeResult, manifest: Option<ManifestResult>) -> Self {
        Self {
            target,
            health,
            manifest,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.healthy
    }
}

/// `round(healthy / total * 100)`, or 0 for an empty population.
pub fn health_percentage(healthy: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((healthy as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_apps: usize,
    pub healthy_apps: usize,
    pub total_plugins: usize,
    pub healthy_plugins: usize,
    pub total_others: usize,
    pub healthy_others: usize,
    pub overall_health_percentage: u32,
}

type Partition = BTreeMap<String, TargetHealth>;

fn healthy_count(partition: &Partition) -> usize {
    partition.values().filter(|entry| entry.is_healthy()).count()
}

impl Summary {
    pub fn from_partitions(apps: &Partition, plugins: &Partition, others: &Partition) -> Self {
        let healthy_apps = healthy_count(apps);
        let healthy_plugins = healthy_count(plugins);
        let healthy_others = healthy_count(others);
        let total = apps.len() + plugins.len() + others.len();

        Self {
            total_apps: apps.len(),
            healthy_apps,
            total_plugins: plugins.len(),
            healthy_plugins,
            total_others: others.len(),
            healthy_others,
            overall_health_percentage: health_percentage(
                healthy_apps + healthy_plugins + healthy_others,
                total,
            ),
        }
    }

    pub fn total(&self) -> usize {
        self.total_apps + self.total_plugins + self.total_others
    }

    pub fn healthy(&self) -> usize {
        self.healthy_apps + self.healthy_plugins + self.healthy_others
    }
}

/// The immutable result of one aggregation cycle. Partitions are keyed and
/// therefore ordered by target key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub apps: Partition,
    pub plugins: Partition,
    pub others: Partition,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = TargetHealth>) -> Self {
        let mut apps = Partition::new();
        let mut plugins = Partition::new();
        let mut others = Partition::new();

        for entry in entries {
            let partition = match entry.target.kind {
                TargetKind::App => &mut apps,
                TargetKind::Plugin => &mut plugins,
                TargetKind::Other => &mut others,
            };
            partition.insert(entry.target.key.clone(), entry);
        }

        let summary = Summary::from_partitions(&apps, &plugins, &others);
        Self {
            apps,
            plugins,
            others,
            summary,
            generated_at: Utc::now(),
        }
    }

    pub fn get(&self, kind: TargetKind, key: &str) -> Option<&TargetHealth> {
        match kind {
            TargetKind::App => self.apps.get(key),
            TargetKind::Plugin => self.plugins.get(key),
            TargetKind::Other => self.others.get(key),
        }
    }

    pub fn to_legacy(&self) -> LegacySnapshot {
        let apps: Vec<LegacyAppHealth> = self
            .apps
            .values()
            .chain(self.others.values())
            .map(LegacyAppHealth::from)
            .collect();
        let plugins: Vec<LegacyPluginHealth> =
            self.plugins.values().map(LegacyPluginHealth::from).collect();

        let healthy_apps = apps.iter().filter(|a| a.healthy).count();
        let healthy_plugins = plugins.iter().filter(|p| p.healthy).count();

        LegacySnapshot {
            last_updated: self.generated_at,
            summary: LegacySummary {
                total_apps: apps.len(),
                healthy_apps,
                total_plugins: plugins.len(),
                healthy_plugins,
                overall_health_percentage: health_percentage(
                    healthy_apps + healthy_plugins,
                    apps.len() + plugins.len(),
                ),
            },
            apps,
            plugins,
        }
    }
}

/// Flattened shape served on `/json` for older consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySnapshot {
    pub last_updated: DateTime<Utc>,
    pub apps: Vec<LegacyAppHealth>,
    pub plugins: Vec<LegacyPluginHealth>,
    pub summary: LegacySummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySummary {
    pub total_apps: usize,
    pub healthy_apps: usize,
    pub total_plugins: usize,
    pub healthy_plugins: usize,
    pub overall_health_percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAppHealth {
    pub name: String,
    pub domain: String,
    pub healthy: bool,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_checked: DateTime<Utc>,
}

impl From<&TargetHealth> for LegacyAppHealth {
    fn from(entry: &TargetHealth) -> Self {
        Self {
            name: entry.target.key.clone(),
            domain: entry.target.routing_domain.clone(),
            healthy: entry.health.healthy,
            status: entry.health.status,
            error: entry.health.error.clone(),
            last_checked: entry.health.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPluginHealth {
    pub name: String,
    pub variant: String,
    pub domain: String,
    pub healthy: bool,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&TargetHealth> for LegacyPluginHealth {
    fn from(entry: &TargetHealth) -> Self {
        Self {
            name: entry.target.key.clone(),
            variant: entry
                .target
                .variants
                .first()
                .cloned()
                .unwrap_or_else(|| "main".to_string()),
            domain: entry.target.routing_domain.clone(),
            healthy: entry.health.healthy,
            status: entry.health.status,
            error: entry.health.error.clone(),
            last_checked: entry.health.timestamp,
            manifest_valid: entry.manifest.as_ref().map(|m| m.manifest_valid),
            display_name: entry.target.display_name.clone(),
            description: entry.target.description.clone(),
        }
    }
}
