// src/health/mod.rs
mod prober;
mod result;

pub use prober::{HealthProber, Prober};
pub use result::{DeploymentState, Diagnostics, ManifestResult, ProbeResult};
