//! # Fallback Router (C5)
//!
//! Ties the other components together: classify intent, select a primary
//! backend, invoke it, and on failure walk the configured fallback chain
//! sequentially — never in parallel, each candidate fully exhausted
//! (including its own retries) before the next is touched (§4.5).

use crate::backend::BackendState;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::config::{AliasResolver, RoutingPolicyConfig};
use crate::intent::{ClassifierConfig, Intent, IntentClassifier};
use crate::invoker::{BackendInvoker, RetryPolicy};
use crate::metrics::MetricsRegistry;
use crate::models::{FailureMetadata, GenerateRequest, GenerateResponse, RoutingMetadata};
use crate::registry::CircuitBreakerRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Everything the router needs that was produced at config load: backend
/// runtime state, the alias table, and the static routing policy.
pub struct FallbackRouter {
    backends: HashMap<String, Arc<BackendState>>,
    aliases: AliasResolver,
    policy: RoutingPolicyConfig,
    classifier: IntentClassifier,
    invoker: BackendInvoker,
    breakers: Arc<CircuitBreakerRegistry>,
    breaker_config: CircuitBreakerConfig,
    metrics: &'static MetricsRegistry,
}

impl FallbackRouter {
    pub fn new(
        backends: HashMap<String, Arc<BackendState>>,
        aliases: AliasResolver,
        policy: RoutingPolicyConfig,
        classifier_config: ClassifierConfig,
        retry: RetryPolicy,
        breakers: Arc<CircuitBreakerRegistry>,
        breaker_config: CircuitBreakerConfig,
        metrics: &'static MetricsRegistry,
    ) -> Self {
        Self {
            backends,
            aliases,
            policy,
            classifier: IntentClassifier::new(&classifier_config),
            invoker: BackendInvoker::new(retry, metrics),
            breakers,
            breaker_config,
            metrics,
        }
    }

    fn select_primary(&self, intent: Intent, preferred: Option<&str>) -> (String, bool) {
        if let Some(preferred) = preferred {
            if let Some(resolved) = self.aliases.resolve(preferred) {
                return (resolved.to_string(), true);
            }
        }
        let by_intent = self
            .policy
            .primary_by_intent
            .get(&intent.to_string())
            .cloned()
            .unwrap_or_else(|| self.policy.default_backend.clone());
        (by_intent, false)
    }

    fn fallback_chain_for(&self, primary: &str) -> Vec<String> {
        self.policy.fallback_chains.get(primary).cloned().unwrap_or_default()
    }

    async fn invoke(&self, backend_id: &str, intent: Intent, prompt: &str, params: &crate::models::GenerationParams) -> crate::invoker::InvokeOutcome {
        let backend = match self.backends.get(backend_id) {
            Some(b) => b.clone(),
            None => {
                return crate::invoker::InvokeOutcome {
                    success: false,
                    text: None,
                    error: Some(crate::error::RouterError::Unexpected {
                        backend: backend_id.to_string(),
                        message: "backend not found".to_string(),
                    }),
                }
            }
        };
        let breaker = self
            .breakers
            .get_or_create(&format!("backend_{backend_id}"), self.breaker_config.clone())
            .await;
        self.invoker.try_backend(&backend, &breaker, intent, prompt, params).await
    }

    /// `generate(request) -> response`, the §4.5 six-step algorithm.
    pub async fn generate(&self, request: GenerateRequest, prompt: &str) -> GenerateResponse {
        let t_start = Instant::now();

        let classify_start = Instant::now();
        let (intent, confidence) = self.classifier.classify(&request.classifiable_text());
        self.metrics
            .observe_classification_latency(classify_start.elapsed().as_secs_f64());
        self.metrics.record_intent_classification(&intent.to_string(), confidence);

        let (primary, explicit_model_used) =
            self.select_primary(intent, request.preferred_backend.as_deref());

        let primary_outcome = self.invoke(&primary, intent, prompt, &request.params).await;
        if primary_outcome.success {
            self.metrics
                .observe_latency(&primary, &intent.to_string(), t_start.elapsed().as_secs_f64());
            return GenerateResponse::Success {
                text: primary_outcome.text.unwrap_or_default(),
                metadata: self.success_metadata(&primary, intent, confidence, false, None, t_start, explicit_model_used),
            };
        }

        let chain = self.fallback_chain_for(&primary);
        let mut tried = vec![primary.clone()];

        for candidate in &chain {
            self.metrics.record_fallback_request(&primary, candidate);
            self.metrics.record_model_fallback(&primary, "source");
            self.metrics.record_model_fallback(candidate, "target");

            let outcome = self.invoke(candidate, intent, prompt, &request.params).await;
            tried.push(candidate.clone());

            if outcome.success {
                self.metrics
                    .observe_latency(candidate, &intent.to_string(), t_start.elapsed().as_secs_f64());
                return GenerateResponse::Success {
                    text: outcome.text.unwrap_or_default(),
                    metadata: self.success_metadata(
                        candidate,
                        intent,
                        confidence,
                        true,
                        Some(primary.clone()),
                        t_start,
                        explicit_model_used,
                    ),
                };
            }
        }

        self.metrics.record_error("all", "all_models_failed");
        self.update_fallback_rate(&primary, true);
        GenerateResponse::Failure {
            error: "All models failed".to_string(),
            metadata: FailureMetadata {
                intent: intent.to_string(),
                confidence,
                tried_models: tried,
            },
        }
    }

    fn success_metadata(
        &self,
        backend_id: &str,
        intent: Intent,
        confidence: f64,
        fallback_used: bool,
        primary_model: Option<String>,
        t_start: Instant,
        explicit_model_used: bool,
    ) -> RoutingMetadata {
        self.update_fallback_rate(backend_id, fallback_used);
        let display_name = self
            .backends
            .get(backend_id)
            .map(|b| b.config().display_name.clone())
            .unwrap_or_else(|| backend_id.to_string());
        RoutingMetadata {
            backend_id: backend_id.to_string(),
            display_name,
            intent: intent.to_string(),
            confidence,
            fallback_used,
            primary_model,
            total_time_seconds: t_start.elapsed().as_secs_f64(),
            explicit_model_used,
        }
    }

    /// Rolling share of requests against `model` that needed a fallback.
    /// Implementation detail left to the implementer by §4.6; this keeps
    /// a simple exponential moving average per backend, blending each new
    /// sample against the gauge's last recorded value.
    fn update_fallback_rate(&self, model: &str, fallback_used: bool) {
        const ALPHA: f64 = 0.1;
        let sample = if fallback_used { 1.0 } else { 0.0 };
        let previous = self.metrics.fallback_rate(model).unwrap_or(sample);
        self.metrics.set_fallback_rate(model, ALPHA * sample + (1.0 - ALPHA) * previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;
    use crate::models::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend_with_mock(id: &str, status: u16, text: &str) -> (MockServer, Arc<BackendState>) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"text": text})))
            .mount(&server)
            .await;
        let state = BackendState::new(BackendConfig {
            id: id.into(),
            endpoint: server.uri(),
            display_name: id.into(),
            capabilities: vec![],
            default_max_tokens: 100,
            default_temperature: 0.7,
            aliases: vec![],
        });
        state.set_healthy(true);
        (server, Arc::new(state))
    }

    #[tokio::test]
    async fn falls_back_in_declared_order() {
        let (_s1, primary) = backend_with_mock("primary", 503, "").await;
        let (_s2, fallback) = backend_with_mock("fallback", 200, "fallback response").await;

        let mut backends = HashMap::new();
        backends.insert("primary".to_string(), primary);
        backends.insert("fallback".to_string(), fallback);

        let aliases = AliasResolver::build(&[
            BackendConfig {
                id: "primary".into(),
                endpoint: "x".into(),
                display_name: "primary".into(),
                capabilities: vec![],
                default_max_tokens: 100,
                default_temperature: 0.7,
                aliases: vec![],
            },
            BackendConfig {
                id: "fallback".into(),
                endpoint: "x".into(),
                display_name: "fallback".into(),
                capabilities: vec![],
                default_max_tokens: 100,
                default_temperature: 0.7,
                aliases: vec![],
            },
        ])
        .unwrap();

        let policy = RoutingPolicyConfig {
            primary_by_intent: HashMap::new(),
            fallback_chains: HashMap::from([("primary".to_string(), vec!["fallback".to_string()])]),
            default_backend: "primary".to_string(),
        };

        let router = FallbackRouter::new(
            backends,
            aliases,
            policy,
            ClassifierConfig::default(),
            RetryPolicy {
                max_attempts: 1,
                backoff_factor: 2.0,
            },
            Arc::new(CircuitBreakerRegistry::new()),
            CircuitBreakerConfig::default(),
            crate::metrics::global(),
        );

        let request = GenerateRequest::new(vec![Message::user("hello there")]);
        let response = router.generate(request, "hello there").await;

        match response {
            GenerateResponse::Success { text, metadata } => {
                assert_eq!(text, "fallback response");
                assert!(metadata.fallback_used);
                assert_eq!(metadata.primary_model.as_deref(), Some("primary"));
                assert_eq!(metadata.backend_id, "fallback");
            }
            GenerateResponse::Failure { .. } => panic!("expected success via fallback"),
        }
    }

    #[tokio::test]
    async fn all_backends_failed_reports_tried_list() {
        let (_s1, primary) = backend_with_mock("primary", 500, "").await;

        let mut backends = HashMap::new();
        backends.insert("primary".to_string(), primary);

        let aliases = AliasResolver::build(&[BackendConfig {
            id: "primary".into(),
            endpoint: "x".into(),
            display_name: "primary".into(),
            capabilities: vec![],
            default_max_tokens: 100,
            default_temperature: 0.7,
            aliases: vec![],
        }])
        .unwrap();

        let policy = RoutingPolicyConfig {
            primary_by_intent: HashMap::new(),
            fallback_chains: HashMap::new(),
            default_backend: "primary".to_string(),
        };

        let router = FallbackRouter::new(
            backends,
            aliases,
            policy,
            ClassifierConfig::default(),
            RetryPolicy {
                max_attempts: 1,
                backoff_factor: 2.0,
            },
            Arc::new(CircuitBreakerRegistry::new()),
            CircuitBreakerConfig::default(),
            crate::metrics::global(),
        );

        let request = GenerateRequest::new(vec![Message::user("hello there")]);
        let response = router.generate(request, "hello there").await;

        match response {
            GenerateResponse::Failure { error, metadata } => {
                assert_eq!(error, "All models failed");
                assert_eq!(metadata.tried_models, vec!["primary".to_string()]);
            }
            GenerateResponse::Success { .. } => panic!("expected failure"),
        }
    }
}
