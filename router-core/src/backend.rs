//! The Backend data model (§3): one configured inference target, its
//! static attributes plus the mutable runtime health state C2 and C4
//! share.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Static, immutable-after-load attributes of one configured backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Stable, case-folded unique identifier.
    pub id: String,
    pub endpoint: String,
    pub display_name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Mutable runtime state for one backend: health flag and the consecutive
/// probe counters the health prober's hysteresis logic maintains. Lives
/// inside the router process and is reset on restart (§3).
///
/// Uses atomics rather than a mutex: the health flag is read on every
/// request's pre-check (§4.4 step 1) and written only by the health
/// prober, so a lock-free flag avoids making request handling contend
/// with the background probe loop.
#[derive(Debug)]
pub struct BackendState {
    config: BackendConfig,
    /// Startup-pessimistic: every backend begins unhealthy until its
    /// first synchronous probe completes (§9 design note).
    healthy: AtomicBool,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl BackendState {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            healthy: AtomicBool::new(false),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, value: bool) {
        self.healthy.store(value, Ordering::Release);
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Record a passing probe outcome. Returns the new consecutive-success
    /// count; the caller (health prober) compares it against
    /// `healthy_threshold` to decide whether to flip the flag.
    pub fn record_probe_success(&self) -> u32 {
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a failing probe outcome. Returns the new consecutive-failure
    /// count.
    pub fn record_probe_failure(&self) -> u32 {
        self.consecutive_successes.store(0, Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BackendConfig {
        BackendConfig {
            id: "code_backend".into(),
            endpoint: "http://localhost:9001".into(),
            display_name: "Code Backend".into(),
            capabilities: vec!["code".into()],
            default_max_tokens: 2048,
            default_temperature: 0.7,
            aliases: vec!["codegen".into()],
        }
    }

    #[test]
    fn starts_unhealthy() {
        let state = BackendState::new(cfg());
        assert!(!state.is_healthy());
    }

    #[test]
    fn probe_counters_reset_on_opposite_outcome() {
        let state = BackendState::new(cfg());
        state.record_probe_success();
        state.record_probe_success();
        assert_eq!(state.consecutive_successes(), 2);
        state.record_probe_failure();
        assert_eq!(state.consecutive_successes(), 0);
        assert_eq!(state.consecutive_failures(), 1);
    }
}
