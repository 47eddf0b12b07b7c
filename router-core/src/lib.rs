//! # Router Core
//!
//! The routing engine behind a resilient multi-model inference router:
//! per-backend circuit breakers, periodic health probing with hysteresis,
//! a keyword-based intent classifier, a fallback-chain invoker, a
//! process-global Prometheus metrics registry, and the config/alias
//! resolution layer that ties a caller-supplied model name to a concrete
//! backend.
//!
//! This crate is the library surface; `router-service` wraps it with a
//! CLI entry point, the background health-check task, and the metrics
//! HTTP listener.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! use router_core::config::RouterConfig;
//! use router_core::models::{GenerateRequest, Message};
//!
//! let config = RouterConfig::load("router.toml")?;
//! // construct a FallbackRouter from `config` (see router-service::main
//! // for the full wiring: backend states, alias resolver, breaker
//! // registry) and call `generate`:
//! let request = GenerateRequest::new(vec![Message::user("write a quicksort in rust")]);
//! # let _ = (config, request);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod circuit_breaker;
pub mod common;
pub mod config;
pub mod error;
pub mod health;
pub mod intent;
pub mod invoker;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod router;

pub use backend::{BackendConfig, BackendState};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{AliasResolver, RouterConfig, RoutingPolicyConfig};
pub use error::{ConfigError, RouterError};
pub use health::{HealthCheckConfig, HealthProber};
pub use intent::{ClassifierConfig, Intent, IntentClassifier};
pub use invoker::{BackendInvoker, RetryPolicy};
pub use metrics::MetricsRegistry;
pub use models::{GenerateRequest, GenerateResponse, GenerationParams, Message, Role};
pub use registry::CircuitBreakerRegistry;
pub use router::FallbackRouter;

/// Result type used across this crate's public fallible operations.
pub type Result<T> = std::result::Result<T, RouterError>;
