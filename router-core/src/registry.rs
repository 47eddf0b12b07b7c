//! Process-global circuit breaker registry.
//!
//! Grounded on `original_source/circuit_breaker.py`'s
//! `CircuitBreakerRegistry`: a `get_or_create` keyed lookup plus an
//! all-breakers stats dump and a reset-all, giving the admin reset
//! operation mentioned in §3 of the data model a concrete home without
//! introducing any HTTP surface of its own (that belongs to whatever
//! external collaborator exposes an admin endpoint).

use crate::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name.to_string(), config)))
            .clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(name).cloned()
    }

    pub async fn all_stats(&self) -> Vec<BreakerStats> {
        let breakers = self.breakers.read().await;
        let mut out = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            out.push(breaker.stats().await);
        }
        out
    }

    pub async fn reset_all(&self) {
        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.reset().await;
        }
    }
}
