// src/discovery/manifest.rs
//
// Upstream manifests have shipped in several shapes over time. Each tolerated
// shape is one variant; anything else lands in `Unrecognized` and yields
// nothing.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use super::target::{Target, TargetKind};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SitemapDocument {
    /// `{"urls": [...]}`
    Wrapped { urls: Vec<SitemapEntry> },
    /// `[...]`
    List(Vec<SitemapEntry>),
    Unrecognized(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SitemapEntry {
    /// `{"url": "https://pay.ubq.fi", ...}`
    Object { url: String },
    /// `"https://pay.ubq.fi"`
    Bare(String),
    Unrecognized(Value),
}

impl SitemapDocument {
    pub fn into_urls(self) -> Vec<String> {
        let entries = match self {
            SitemapDocument::Wrapped { urls } => urls,
            SitemapDocument::List(entries) => entries,
            SitemapDocument::Unrecognized(value) => {
                tracing::warn!("Unrecognized sitemap document shape: {}", shape_of(&value));
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| match entry {
                SitemapEntry::Object { url } | SitemapEntry::Bare(url) => Some(url),
                SitemapEntry::Unrecognized(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PluginMapDocument {
    /// `{"plugins": [...]}`
    Wrapped { plugins: Vec<PluginEntry> },
    /// `[...]`
    List(Vec<PluginEntry>),
    Unrecognized(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PluginEntry {
    Descriptor(PluginDescriptor),
    Unrecognized(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    #[serde(alias = "name")]
    pub plugin_name: String,
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deployments: Option<BTreeMap<String, Value>>,
}

impl PluginDescriptor {
    /// Converts the descriptor into a plugin target; `None` when the canonical
    /// URL has no usable host.
    pub fn into_target(self) -> Option<Target> {
        let host = Url::parse(&self.url)
            .ok()?
            .host_str()
            .filter(|host| !host.is_empty())?
            .to_string();

        let variants = match self.deployments {
            Some(deployments) if !deployments.is_empty() => deployments.into_keys().collect(),
            _ => vec!["main".to_string()],
        };

        Some(Target {
            key: self.plugin_name,
            kind: TargetKind::Plugin,
            routing_domain: host,
            display_name: self.display_name,
            description: self.description,
            url: Some(self.url),
            variants,
        })
    }
}

impl PluginMapDocument {
    pub fn into_targets(self) -> Vec<Target> {
        let entries = match self {
            PluginMapDocument::Wrapped { plugins } => plugins,
            PluginMapDocument::List(entries) => entries,
            PluginMapDocument::Unrecognized(value) => {
                tracing::warn!("Unrecognized plugin map shape: {}", shape_of(&value));
                return Vec::new();
            }
        };

        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                PluginEntry::Descriptor(descriptor) => {
                    let name = descriptor.plugin_name.clone();
                    match descriptor.into_target() {
                        Some(target) => targets.push(target),
                        None => tracing::warn!("Skipping plugin {} without a valid url", name),
                    }
                }
                PluginEntry::Unrecognized(_) => {
                    tracing::debug!("Skipping unrecognized plugin map entry");
                }
            }
        }
        targets
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
