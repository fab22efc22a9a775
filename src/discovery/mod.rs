// src/discovery/mod.rs
mod manifest;
mod source;
mod subdomain;
mod target;

pub use manifest::{PluginDescriptor, PluginMapDocument, SitemapDocument};
pub use source::{DiscoveryError, TargetDiscovery, TargetSource};
pub use subdomain::{classify_host, extract_subdomain, HostClass};
pub use target::{reclassify, routing_domain_for, sitemap_keys, SitemapKeys, Target, TargetKind, TargetSet};
