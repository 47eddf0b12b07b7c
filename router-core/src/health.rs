//! # Health Prober (C2)
//!
//! Periodically probes each backend's `<endpoint>/health`, applying
//! hysteresis before flipping the backend's health flag so a single
//! flaky probe doesn't flap it. Runs one synchronous round at startup so
//! the first requests have real signal, then on a timer until cancelled.

use crate::backend::BackendState;
use crate::metrics::MetricsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    #[serde(rename = "interval_seconds", with = "crate::common::duration_serde")]
    pub interval: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    #[serde(rename = "probe_timeout_seconds", with = "crate::common::duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

pub struct HealthProber {
    backends: Vec<Arc<BackendState>>,
    config: HealthCheckConfig,
    client: reqwest::Client,
    metrics: &'static MetricsRegistry,
}

impl HealthProber {
    pub fn new(
        backends: Vec<Arc<BackendState>>,
        config: HealthCheckConfig,
        metrics: &'static MetricsRegistry,
    ) -> Self {
        Self {
            backends,
            config,
            client: reqwest::Client::new(),
            metrics,
        }
    }

    /// Probe `<endpoint>/health`; HTTP 200 is healthy, anything else
    /// (including transport errors and timeouts) is unhealthy.
    async fn probe_once(&self, backend: &BackendState) -> bool {
        let url = format!("{}/health", backend.config().endpoint);
        let result = tokio::time::timeout(self.config.probe_timeout, self.client.get(&url).send()).await;
        matches!(result, Ok(Ok(response)) if response.status().is_success())
    }

    /// Apply one probe outcome to a backend's hysteresis counters, and
    /// flip the health flag (and the `model_health` gauge) only on
    /// crossing the configured threshold.
    async fn check_one(&self, backend: &BackendState) {
        let healthy_probe = self.probe_once(backend).await;
        let was_healthy = backend.is_healthy();

        if healthy_probe {
            let consecutive = backend.record_probe_success();
            if !was_healthy && consecutive >= self.config.healthy_threshold {
                backend.set_healthy(true);
                self.metrics.set_model_health(backend.id(), true);
                tracing::info!(backend = backend.id(), "backend flipped healthy");
            }
        } else {
            let consecutive = backend.record_probe_failure();
            if was_healthy && consecutive >= self.config.unhealthy_threshold {
                backend.set_healthy(false);
                self.metrics.set_model_health(backend.id(), false);
                tracing::warn!(backend = backend.id(), "backend flipped unhealthy");
            }
        }
    }

    /// Run one probe round over every backend concurrently.
    pub async fn check_all(&self) {
        let futures = self.backends.iter().map(|backend| self.check_one(backend));
        futures::future::join_all(futures).await;
    }

    /// Run the synchronous startup probe, then the periodic background
    /// loop, stopping promptly when `shutdown` fires. In-flight probes
    /// are bounded by their own `probe_timeout` and are never killed
    /// mid-flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            return;
        }

        self.check_all().await;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("health prober stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_state(endpoint: String) -> Arc<BackendState> {
        Arc::new(BackendState::new(BackendConfig {
            id: "b".into(),
            endpoint,
            display_name: "B".into(),
            capabilities: vec![],
            default_max_tokens: 100,
            default_temperature: 0.7,
            aliases: vec![],
        }))
    }

    #[tokio::test]
    async fn healthy_threshold_must_be_met_before_flipping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = backend_state(server.uri());
        let prober = HealthProber::new(
            vec![backend.clone()],
            HealthCheckConfig {
                healthy_threshold: 2,
                ..HealthCheckConfig::default()
            },
            crate::metrics::global(),
        );

        prober.check_all().await;
        assert!(!backend.is_healthy(), "one good probe must not flip it yet");
        prober.check_all().await;
        assert!(backend.is_healthy(), "second consecutive good probe should flip it");
    }

    #[tokio::test]
    async fn non_200_counts_as_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = backend_state(server.uri());
        let prober = HealthProber::new(vec![backend.clone()], HealthCheckConfig::default(), crate::metrics::global());
        prober.check_all().await;
        assert!(!backend.is_healthy());
        assert_eq!(backend.consecutive_failures(), 1);
    }
}
