// src/rate_limit/limiter.rs
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

/// Per-key probe cooldown.
///
/// Check-then-record is not atomic: two callers racing on the same key may
/// both be allowed through, which only costs a redundant probe.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_probes: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_probes: DashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True when `key` was never probed or its cooldown has fully elapsed.
    pub fn should_probe(&self, key: &str) -> bool {
        match self.last_probes.get(key).map(|entry| *entry.value()) {
            None => true,
            Some(last) => last.elapsed() > self.cooldown,
        }
    }

    pub fn record_probe(&self, key: &str) {
        self.last_probes.insert(key.to_string(), Instant::now());
    }

    /// Drops entries older than twice the cooldown. Returns how many went.
    pub fn evict_stale(&self) -> usize {
        let horizon = self.cooldown.saturating_mul(2);
        let mut evicted = 0;
        // retain holds each shard's write lock, so an entry being updated
        // concurrently is either seen with its new stamp or not at all.
        self.last_probes.retain(|_, last| {
            let keep = last.elapsed() <= horizon;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            tracing::debug!("Evicted {} stale rate limiter entries", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.last_probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_probes.is_empty()
    }
}
