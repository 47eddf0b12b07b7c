//! Error taxonomy for the router, grouped by effect rather than by the
//! library that happened to raise it (per the failure-handling design:
//! every kind is recorded in `errors_total` before it is acted on).

use thiserror::Error;

/// Outcome classification for a single backend call attempt.
///
/// Every variant here is recorded against `errors_total{model, error_type}`
/// by the caller before being matched on; this type only carries enough
/// information to pick the right label and the right retry/fallback
/// action.
#[derive(Debug, Error, Clone)]
pub enum RouterError {
    /// Fail-fast rejection by the circuit breaker. Never retried within
    /// the same backend attempt budget; triggers a fallback step.
    #[error("circuit breaker open for backend '{backend}'")]
    CircuitOpen { backend: String },

    /// The call's deadline elapsed before a response arrived. Classified
    /// as a failure and retried within the backend's attempt budget.
    #[error("request to backend '{backend}' timed out after {timeout_secs:.1}s")]
    Timeout { backend: String, timeout_secs: f64 },

    /// Connection refused, DNS failure, TLS handshake failure, or a
    /// mid-stream reset. Retried within the backend's attempt budget.
    #[error("transport error calling backend '{backend}': {message}")]
    TransportError { backend: String, message: String },

    /// A non-2xx HTTP response. Retried within the backend's attempt
    /// budget.
    #[error("backend '{backend}' returned HTTP {status}")]
    HttpStatusError { backend: String, status: u16 },

    /// Pre-check refusal: the backend's health flag was false before any
    /// network I/O was attempted. Not retried within the same backend;
    /// triggers a fallback step immediately.
    #[error("backend '{backend}' is marked unhealthy")]
    Unhealthy { backend: String },

    /// Any exceptional outcome that doesn't fit the other kinds. Stops
    /// the retry loop for that backend and triggers a fallback step.
    #[error("unexpected error calling backend '{backend}': {message}")]
    Unexpected { backend: String, message: String },

    /// Terminal outcome after the primary and every candidate in its
    /// fallback chain have been exhausted.
    #[error("all backends failed, tried: {tried:?}")]
    AllBackendsFailed { tried: Vec<String> },
}

impl RouterError {
    /// The `error_type` label value this error is recorded under in
    /// `errors_total`. Kept distinct from the `Display` message, which is
    /// meant for logs rather than metric cardinality.
    pub fn error_type(&self) -> &'static str {
        match self {
            RouterError::CircuitOpen { .. } => "circuit_breaker_open",
            RouterError::Timeout { .. } => "timeout",
            RouterError::TransportError { .. } => "transport_error",
            RouterError::HttpStatusError { .. } => "http_status_error",
            RouterError::Unhealthy { .. } => "unhealthy",
            RouterError::Unexpected { .. } => "unexpected",
            RouterError::AllBackendsFailed { .. } => "all_models_failed",
        }
    }

    /// Whether this outcome should be retried against the same backend
    /// (within its remaining attempt budget). `CircuitOpen`, `Unhealthy`
    /// and `Unexpected` all stop the retry loop immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RouterError::Timeout { .. }
                | RouterError::TransportError { .. }
                | RouterError::HttpStatusError { .. }
        )
    }
}

/// Fatal configuration problems, surfaced at load time. Per the error
/// handling design, any of these must refuse process startup rather than
/// limp along with a partially valid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("alias '{alias}' is claimed by both backend '{first}' and backend '{second}'")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    #[error("'{reference}' in {location} does not resolve to a known backend")]
    UnresolvableBackend { reference: String, location: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidThreshold { field: String, reason: String },

    #[error("no backends configured")]
    NoBackends,
}
