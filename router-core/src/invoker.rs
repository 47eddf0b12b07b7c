//! # Backend Invoker (C4)
//!
//! Makes a single-backend call: health pre-check, breaker-wrapped HTTP
//! POST to `<endpoint>/generate`, bounded retries with exponential
//! backoff. Never performs fallback — it only reports the outcome for
//! one backend; the fallback router (C5) decides what happens next.

use crate::backend::BackendState;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::error::RouterError;
use crate::intent::Intent;
use crate::metrics::MetricsRegistry;
use crate::models::{BackendRequestPayload, BackendResponsePayload, GenerationParams};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TOP_P: f32 = 0.9;

fn default_stop_sequences() -> Vec<String> {
    vec!["<|eot_id|>".to_string(), "<|end_of_text|>".to_string()]
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
        }
    }
}

pub struct InvokeOutcome {
    pub success: bool,
    pub text: Option<String>,
    pub error: Option<RouterError>,
}

pub struct BackendInvoker {
    client: reqwest::Client,
    retry: RetryPolicy,
    metrics: &'static MetricsRegistry,
}

impl BackendInvoker {
    pub fn new(retry: RetryPolicy, metrics: &'static MetricsRegistry) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry,
            metrics,
        }
    }

    fn build_payload(backend: &BackendState, prompt: &str, params: &GenerationParams) -> BackendRequestPayload {
        let config = backend.config();
        BackendRequestPayload {
            prompt: prompt.to_string(),
            max_tokens: params.max_tokens.unwrap_or(config.default_max_tokens),
            temperature: params.temperature.unwrap_or(config.default_temperature),
            top_p: params.top_p.unwrap_or(DEFAULT_TOP_P),
            stop: params.stop.clone().unwrap_or_else(default_stop_sequences),
        }
    }

    async fn post_generate(
        &self,
        endpoint: &str,
        payload: &BackendRequestPayload,
    ) -> Result<String, RouterError> {
        let url = format!("{endpoint}/generate");
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RouterError::TransportError {
                backend: endpoint.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RouterError::HttpStatusError {
                backend: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: BackendResponsePayload = response.json().await.map_err(|e| RouterError::Unexpected {
            backend: endpoint.to_string(),
            message: format!("malformed response body: {e}"),
        })?;
        Ok(body.text)
    }

    /// Attempt a single backend call (§4.4). Pre-checks the health flag,
    /// then loops up to `retry.max_attempts` times through the breaker,
    /// backing off exponentially between retriable failures.
    pub async fn try_backend(
        &self,
        backend: &Arc<BackendState>,
        breaker: &CircuitBreaker,
        intent: Intent,
        prompt: &str,
        params: &GenerationParams,
    ) -> InvokeOutcome {
        let backend_id = backend.id().to_string();

        if !backend.is_healthy() {
            self.metrics.record_error(&backend_id, "unhealthy");
            return InvokeOutcome {
                success: false,
                text: None,
                error: Some(RouterError::Unhealthy { backend: backend_id }),
            };
        }

        self.metrics.record_model_request(&backend_id);
        let payload = Self::build_payload(backend, prompt, params);
        let endpoint = backend.config().endpoint.clone();

        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            let call_result = breaker
                .call(|| {
                    let endpoint = endpoint.clone();
                    let payload = payload.clone();
                    async move { self.post_generate(&endpoint, &payload).await }
                })
                .await;

            match call_result {
                Ok(Ok(text)) => {
                    self.metrics
                        .record_request(&backend_id, &intent.to_string(), "success");
                    return InvokeOutcome {
                        success: true,
                        text: Some(text),
                        error: None,
                    };
                }
                Ok(Err(router_error)) => {
                    self.metrics.record_error(&backend_id, router_error.error_type());
                    let retriable = router_error.is_retriable();
                    last_error = Some(router_error);
                    if !retriable {
                        break;
                    }
                }
                Err(CircuitBreakerError::Open) => {
                    self.metrics.record_error(&backend_id, "circuit_breaker_open");
                    return InvokeOutcome {
                        success: false,
                        text: None,
                        error: Some(RouterError::CircuitOpen { backend: backend_id }),
                    };
                }
                Err(CircuitBreakerError::Timeout) => {
                    let err = RouterError::Timeout {
                        backend: backend_id.clone(),
                        timeout_secs: breaker.config().request_timeout.as_secs_f64(),
                    };
                    self.metrics.record_error(&backend_id, err.error_type());
                    last_error = Some(err);
                }
            }

            let attempts_remain = attempt + 1 < self.retry.max_attempts;
            if attempts_remain {
                let backoff_secs = self.retry.backoff_factor.powi(attempt as i32);
                tokio::time::sleep(Duration::from_secs_f64(backoff_secs)).await;
            }
        }

        self.metrics
            .record_request(&backend_id, &intent.to_string(), "failed");
        InvokeOutcome {
            success: false,
            text: None,
            error: last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_state(endpoint: String, healthy: bool) -> Arc<BackendState> {
        let state = BackendState::new(BackendConfig {
            id: "b".into(),
            endpoint,
            display_name: "B".into(),
            capabilities: vec![],
            default_max_tokens: 100,
            default_temperature: 0.7,
            aliases: vec![],
        });
        state.set_healthy(healthy);
        Arc::new(state)
    }

    #[tokio::test]
    async fn unhealthy_backend_is_not_called() {
        let backend = backend_state("http://127.0.0.1:1".into(), false);
        let breaker = CircuitBreaker::new("b".into(), CircuitBreakerConfig::default());
        let invoker = BackendInvoker::new(RetryPolicy::default(), crate::metrics::global());

        let outcome = invoker
            .try_backend(&backend, &breaker, Intent::General, "hi", &GenerationParams::default())
            .await;

        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(RouterError::Unhealthy { .. })));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hello"})))
            .mount(&server)
            .await;

        let backend = backend_state(server.uri(), true);
        let breaker = CircuitBreaker::new("b".into(), CircuitBreakerConfig::default());
        let invoker = BackendInvoker::new(RetryPolicy::default(), crate::metrics::global());

        let outcome = invoker
            .try_backend(&backend, &breaker, Intent::General, "hi", &GenerationParams::default())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.text.unwrap(), "hello");
    }

    #[tokio::test]
    async fn retries_on_http_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "ok"})))
            .mount(&server)
            .await;

        let backend = backend_state(server.uri(), true);
        let breaker = CircuitBreaker::new("b".into(), CircuitBreakerConfig::default());
        let invoker = BackendInvoker::new(
            RetryPolicy {
                max_attempts: 2,
                backoff_factor: 1.0,
            },
            crate::metrics::global(),
        );

        let outcome = invoker
            .try_backend(&backend, &breaker, Intent::General, "hi", &GenerationParams::default())
            .await;

        assert!(outcome.success);
    }
}
