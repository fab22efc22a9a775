// src/lib.rs
pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod health;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod server;

pub use aggregator::{Aggregator, Snapshot, SnapshotRefresher, TargetHealth};
pub use discovery::{extract_subdomain, Target, TargetDiscovery, TargetKind, TargetSet, TargetSource};
pub use health::{DeploymentState, HealthProber, ManifestResult, ProbeResult, Prober};
pub use rate_limit::RateLimiter;
