//! # Metrics HTTP Listener
//!
//! The router's only HTTP surface: a Prometheus scrape endpoint and an
//! operator-facing health/breaker-status dump. Request routing itself
//! (`FallbackRouter::generate`) is a library call, not a wire endpoint —
//! embedding it behind an HTTP API (chat completions, auth, a dashboard)
//! is out of scope here and is left to whatever service embeds this
//! crate.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use router_core::registry::CircuitBreakerRegistry;
use router_core::MetricsRegistry;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state for the metrics listener's handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: &'static MetricsRegistry,
    pub breakers: Arc<CircuitBreakerRegistry>,
}

/// Prometheus text exposition of every metric family (§4.6).
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

/// Operator-facing breaker status dump, distinct from the scrape
/// endpoint above — intended for a human or a debugging script, not a
/// metrics collector.
async fn breaker_status(State(state): State<AppState>) -> Json<Vec<router_core::circuit_breaker::BreakerStats>> {
    Json(state.breakers.all_stats().await)
}

/// Liveness probe for the process itself (not a backend's health — see
/// `breaker_status` for per-backend circuit state).
async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub fn create_server(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/admin/circuit-breakers", get(breaker_status))
        .route("/live", get(liveness))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(10)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    fn test_state() -> AppState {
        AppState {
            metrics: router_core::metrics::global(),
            breakers: Arc::new(CircuitBreakerRegistry::new()),
        }
    }

    #[tokio::test]
    async fn live_endpoint_returns_ok() {
        let app = create_server(test_state());
        let server = TestServer::new(app).unwrap();
        let response = server.get("/live").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        router_core::metrics::global().record_request("test-model", "general", "success");
        let app = create_server(test_state());
        let server = TestServer::new(app).unwrap();
        let response = server.get("/metrics").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("requests_total"));
    }

    #[tokio::test]
    async fn breaker_status_endpoint_returns_empty_list_initially() {
        let app = create_server(test_state());
        let server = TestServer::new(app).unwrap();
        let response = server.get("/admin/circuit-breakers").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Vec<router_core::circuit_breaker::BreakerStats> = response.json();
        assert!(body.is_empty());
    }
}
