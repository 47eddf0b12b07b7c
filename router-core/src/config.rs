//! # Config & Alias Resolver (C7)
//!
//! Loads the structured configuration document (§4.7) — backends,
//! routing policy, classifier keyword sets and thresholds, health-probe
//! parameters, breaker parameters — and builds the case-folded alias
//! table used to resolve a caller-supplied model identifier to a
//! canonical `backend_id`.

use crate::backend::BackendConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::health::HealthCheckConfig;
use crate::intent::ClassifierConfig;
use crate::invoker::RetryPolicy;
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RoutingPolicyConfig {
    /// intent label -> backend_id
    #[serde(default)]
    pub primary_by_intent: HashMap<String, String>,
    /// backend_id -> ordered list of fallback backend_ids
    #[serde(default)]
    pub fallback_chains: HashMap<String, Vec<String>>,
    /// The designated backend used when `primary_by_intent` has no entry
    /// for the classified intent.
    pub default_backend: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouterConfig {
    pub backends: Vec<BackendConfig>,
    pub routing: RoutingPolicyConfig,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub health: HealthCheckConfig,
    pub classifier: ClassifierConfig,
}

impl RouterConfig {
    /// Load from a TOML file at `path`, the same
    /// read-to-string-then-`toml::from_str` sequence used throughout this
    /// workspace.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            source: e,
        })?;
        let config: RouterConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject unknown backend references and malformed thresholds at load
    /// time rather than on each request (§9 design note).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let known: std::collections::HashSet<&str> =
            self.backends.iter().map(|b| b.id.as_str()).collect();

        for (intent, backend_id) in &self.routing.primary_by_intent {
            if !known.contains(backend_id.as_str()) {
                return Err(ConfigError::UnresolvableBackend {
                    reference: backend_id.clone(),
                    location: format!("routing.primary_by_intent[{intent}]"),
                });
            }
        }
        if !known.contains(self.routing.default_backend.as_str()) {
            return Err(ConfigError::UnresolvableBackend {
                reference: self.routing.default_backend.clone(),
                location: "routing.default_backend".to_string(),
            });
        }
        for (source, chain) in &self.routing.fallback_chains {
            if !known.contains(source.as_str()) {
                return Err(ConfigError::UnresolvableBackend {
                    reference: source.clone(),
                    location: "routing.fallback_chains key".to_string(),
                });
            }
            let mut seen = std::collections::HashSet::new();
            for candidate in chain {
                if !known.contains(candidate.as_str()) {
                    return Err(ConfigError::UnresolvableBackend {
                        reference: candidate.clone(),
                        location: format!("routing.fallback_chains[{source}]"),
                    });
                }
                if candidate == source {
                    return Err(ConfigError::InvalidThreshold {
                        field: format!("routing.fallback_chains[{source}]"),
                        reason: "fallback chain must not contain its own source backend".into(),
                    });
                }
                if !seen.insert(candidate.as_str()) {
                    return Err(ConfigError::InvalidThreshold {
                        field: format!("routing.fallback_chains[{source}]"),
                        reason: format!("duplicate candidate '{candidate}' in fallback chain"),
                    });
                }
            }
        }

        if self.retry.max_attempts < 1 {
            return Err(ConfigError::InvalidThreshold {
                field: "retry.max_attempts".into(),
                reason: "must be >= 1".into(),
            });
        }
        if self.retry.backoff_factor <= 1.0 {
            return Err(ConfigError::InvalidThreshold {
                field: "retry.backoff_factor".into(),
                reason: "must be > 1.0".into(),
            });
        }

        AliasResolver::build(&self.backends)?;
        Ok(())
    }
}

/// Case-folded mapping from every string a caller might supply —
/// `backend_id`, `display_name`, `display_name` with underscores replaced
/// by hyphens, and every alias — to the canonical `backend_id` (§4.7).
pub struct AliasResolver {
    aliases: HashMap<String, String>,
}

impl AliasResolver {
    pub fn build(backends: &[BackendConfig]) -> Result<Self, ConfigError> {
        let mut aliases: HashMap<String, String> = HashMap::new();

        let mut claim = |key: String, backend_id: &str, aliases: &mut HashMap<String, String>| -> Result<(), ConfigError> {
            let folded = key.to_lowercase();
            if let Some(existing) = aliases.get(&folded) {
                if existing != backend_id {
                    return Err(ConfigError::AliasCollision {
                        alias: folded,
                        first: existing.clone(),
                        second: backend_id.to_string(),
                    });
                }
                return Ok(());
            }
            aliases.insert(folded, backend_id.to_string());
            Ok(())
        };

        for backend in backends {
            claim(backend.id.clone(), &backend.id, &mut aliases)?;
            claim(backend.display_name.clone(), &backend.id, &mut aliases)?;
            claim(
                backend.display_name.replace('_', "-"),
                &backend.id,
                &mut aliases,
            )?;
            for alias in &backend.aliases {
                claim(alias.clone(), &backend.id, &mut aliases)?;
            }
        }

        Ok(Self { aliases })
    }

    /// Case-fold `identifier` and resolve it to a canonical `backend_id`,
    /// or `None` if it matches nothing known.
    pub fn resolve(&self, identifier: &str) -> Option<&str> {
        self.aliases.get(&identifier.to_lowercase()).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(id: &str, display: &str, aliases: Vec<&str>) -> BackendConfig {
        BackendConfig {
            id: id.into(),
            endpoint: format!("http://{id}"),
            display_name: display.into(),
            capabilities: vec![],
            default_max_tokens: 100,
            default_temperature: 0.7,
            aliases: aliases.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn resolves_id_display_name_and_alias_case_insensitively() {
        let backends = vec![backend("code_backend", "Code Backend", vec!["codegen"])];
        let resolver = AliasResolver::build(&backends).unwrap();
        assert_eq!(resolver.resolve("CODE_BACKEND"), Some("code_backend"));
        assert_eq!(resolver.resolve("code backend"), None); // display name has a space, not underscore form
        assert_eq!(resolver.resolve("Code Backend"), Some("code_backend"));
        assert_eq!(resolver.resolve("CodeGen"), Some("code_backend"));
    }

    #[test]
    fn hyphenated_display_name_variant_resolves() {
        let backends = vec![backend("b1", "My_Backend", vec![])];
        let resolver = AliasResolver::build(&backends).unwrap();
        assert_eq!(resolver.resolve("my-backend"), Some("b1"));
    }

    #[test]
    fn idempotent_resolution() {
        let backends = vec![backend("b1", "Backend One", vec!["one"])];
        let resolver = AliasResolver::build(&backends).unwrap();
        let first = resolver.resolve("one").unwrap().to_string();
        let second = resolver.resolve(&first).unwrap().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn colliding_aliases_are_a_load_error() {
        let backends = vec![
            backend("b1", "Backend One", vec!["shared"]),
            backend("b2", "Backend Two", vec!["shared"]),
        ];
        let result = AliasResolver::build(&backends);
        assert!(matches!(result, Err(ConfigError::AliasCollision { .. })));
    }

    #[test]
    fn unresolvable_fallback_reference_is_rejected() {
        let config = RouterConfig {
            backends: vec![backend("b1", "Backend One", vec![])],
            routing: RoutingPolicyConfig {
                primary_by_intent: HashMap::new(),
                fallback_chains: HashMap::from([("b1".to_string(), vec!["missing".to_string()])]),
                default_backend: "b1".to_string(),
            },
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            health: HealthCheckConfig::default(),
            classifier: ClassifierConfig::default(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnresolvableBackend { .. })));
    }

    #[test]
    fn fallback_chain_cannot_contain_its_own_source() {
        let config = RouterConfig {
            backends: vec![backend("b1", "Backend One", vec![])],
            routing: RoutingPolicyConfig {
                primary_by_intent: HashMap::new(),
                fallback_chains: HashMap::from([("b1".to_string(), vec!["b1".to_string()])]),
                default_backend: "b1".to_string(),
            },
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            health: HealthCheckConfig::default(),
            classifier: ClassifierConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn fallback_chain_cannot_contain_duplicate_candidates() {
        let config = RouterConfig {
            backends: vec![
                backend("b1", "Backend One", vec![]),
                backend("b2", "Backend Two", vec![]),
            ],
            routing: RoutingPolicyConfig {
                primary_by_intent: HashMap::new(),
                fallback_chains: HashMap::from([(
                    "b1".to_string(),
                    vec!["b2".to_string(), "b2".to_string()],
                )]),
                default_backend: "b1".to_string(),
            },
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            health: HealthCheckConfig::default(),
            classifier: ClassifierConfig::default(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold { .. })));
    }
}
