// src/aggregator/mod.rs
mod engine;
mod refresher;
mod snapshot;

pub use engine::Aggregator;
pub use refresher::SnapshotRefresher;
pub use snapshot::{
    health_percentage, LegacyAppHealth, LegacyPluginHealth, LegacySnapshot, LegacySummary,
    Snapshot, Summary, TargetHealth,
};
