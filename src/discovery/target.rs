// src/discovery/target.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::subdomain::{classify_host, HostClass};
use crate::config::DiscoveryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    App,
    Plugin,
    Other,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::App => "app",
            TargetKind::Plugin => "plugin",
            TargetKind::Other => "other",
        }
    }
}

/// One probeable entity. Rebuilt on every discovery refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub key: String,
    pub kind: TargetKind,
    pub routing_domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl Target {
    /// An application hosted at `{key}.{base}`, or at the base itself for the
    /// empty key.
    pub fn app(key: &str, base_domain: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: TargetKind::App,
            routing_domain: routing_domain_for(key, base_domain),
            display_name: None,
            description: None,
            url: None,
            variants: Vec::new(),
        }
    }

    pub fn other(host: &str) -> Self {
        Self {
            key: host.to_string(),
            kind: TargetKind::Other,
            routing_domain: host.to_string(),
            display_name: None,
            description: None,
            url: None,
            variants: Vec::new(),
        }
    }

    /// A system-operated add-on found in the sitemap under the plugin prefix.
    pub fn system_plugin(key: &str, prefix: &str, description: &str, base_domain: &str) -> Self {
        let display_name = key
            .strip_prefix(prefix)
            .unwrap_or(key)
            .replace('-', " ");

        Self {
            key: key.to_string(),
            kind: TargetKind::Plugin,
            routing_domain: routing_domain_for(key, base_domain),
            display_name: Some(display_name),
            description: Some(description.to_string()),
            url: None,
            variants: Vec::new(),
        }
    }
}

pub fn routing_domain_for(key: &str, base_domain: &str) -> String {
    if key.is_empty() {
        base_domain.to_string()
    } else {
        format!("{}.{}", key, base_domain)
    }
}

/// The canonical target list produced by one discovery refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSet {
    pub apps: Vec<Target>,
    pub plugins: Vec<Target>,
    pub others: Vec<Target>,
    pub timestamp: DateTime<Utc>,
}

impl TargetSet {
    pub fn empty() -> Self {
        Self {
            apps: Vec::new(),
            plugins: Vec::new(),
            others: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builds the target set from the raw sitemap URLs and plugin-map entries.
    pub fn assemble(
        sitemap_urls: &[String],
        plugins: &[Target],
        config: &DiscoveryConfig,
    ) -> Self {
        let base = config.base_domain.as_str();
        let SitemapKeys { apps, others } = sitemap_keys(sitemap_urls, base);

        let (app_keys, plugins) = reclassify(
            apps,
            plugins,
            &config.system_plugin_prefix,
            &config.system_plugin_description,
            base,
        );

        Self {
            apps: app_keys.iter().map(|key| Target::app(key, base)).collect(),
            plugins,
            others: others.iter().map(|host| Target::other(host)).collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.apps
            .iter()
            .chain(self.plugins.iter())
            .chain(self.others.iter())
    }

    pub fn len(&self) -> usize {
        self.apps.len() + self.plugins.len() + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorted, deduplicated keys derived from sitemap URLs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SitemapKeys {
    pub apps: Vec<String>,
    pub others: Vec<String>,
}

pub fn sitemap_keys(urls: &[String], base_domain: &str) -> SitemapKeys {
    let mut apps = BTreeSet::new();
    let mut others = BTreeSet::new();

    for url in urls {
        match classify_host(url, base_domain) {
            HostClass::Root => {
                apps.insert(String::new());
            }
            HostClass::Subdomain(sub) => {
                apps.insert(sub);
            }
            HostClass::Foreign(host) => {
                others.insert(host);
            }
            HostClass::Invalid => {
                tracing::debug!("Skipping unparsable sitemap url: {}", url);
            }
        }
    }

    SitemapKeys {
        apps: apps.into_iter().collect(),
        others: others.into_iter().collect(),
    }
}

/// Moves prefixed app keys into the plugin partition and drops app keys that
/// collide with a plugin. Plugin-map entries win over synthesized plugins.
pub fn reclassify(
    app_keys: Vec<String>,
    plugins: &[Target],
    prefix: &str,
    description: &str,
    base_domain: &str,
) -> (Vec<String>, Vec<Target>) {
    let mut by_key: BTreeMap<String, Target> = BTreeMap::new();

    if !prefix.is_empty() {
        for key in app_keys.iter().filter(|key| key.starts_with(prefix)) {
            by_key.insert(
                key.clone(),
                Target::system_plugin(key, prefix, description, base_domain),
            );
        }
    }
    for plugin in plugins {
        by_key.insert(plugin.key.clone(), plugin.clone());
    }

    let apps = app_keys
        .into_iter()
        .filter(|key| !by_key.contains_key(key))
        .collect();

    (apps, by_key.into_values().collect())
}
