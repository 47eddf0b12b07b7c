//! # Router Service Binary
//!
//! The lifecycle controller around `router-core`'s routing engine: loads
//! and validates configuration, builds one circuit breaker and one
//! runtime health state per configured backend, runs the startup health
//! probe synchronously, starts the periodic background prober, serves
//! the metrics HTTP listener, and drains in-flight work on shutdown.
//!
//! ## Usage
//!
//! ```bash
//! router-service --config router.toml
//! router-service --config router.toml --host 0.0.0.0 --port 9090
//! router-service --log-level debug
//! ```
//!
//! ## Command Line Arguments
//!
//! Each flag also reads from an environment variable when unset, for the
//! handful of knobs that matter at deployment time rather than at invocation
//! time:
//!
//! - `--config, -c` / `ROUTER_CONFIG`: Path to the router's TOML configuration file (default: `router.toml`)
//! - `--port, -p` / `ROUTER_PORT`: Metrics listener port (default: 9090)
//! - `--host` / `ROUTER_HOST`: Metrics listener bind address (default: 127.0.0.1)
//! - `--log-level` / `ROUTER_LOG_LEVEL`: Logging level (default: info)

mod server;

use clap::Parser;
use router_core::backend::BackendState;
use router_core::config::{AliasResolver, RouterConfig};
use router_core::health::HealthProber;
use router_core::registry::CircuitBreakerRegistry;
use router_core::router::FallbackRouter;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The grace period given to in-flight work after a shutdown signal
/// before the process exits unconditionally.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the router's TOML configuration file.
    #[arg(short, long, env = "ROUTER_CONFIG", default_value = "router.toml")]
    config: String,

    /// Port the metrics HTTP listener binds to.
    #[arg(short, long, env = "ROUTER_PORT", default_value_t = 9090)]
    port: u16,

    /// Address the metrics HTTP listener binds to.
    #[arg(long, env = "ROUTER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, env = "ROUTER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(args.log_level.as_str()).init();

    // Configuration errors are fatal at startup; the process must refuse
    // to run on an invalid or unresolvable routing policy.
    let config = RouterConfig::load(&args.config)?;
    tracing::info!(config = %args.config, backends = config.backends.len(), "loaded router configuration");

    let aliases = AliasResolver::build(&config.backends)?;

    let mut backend_states = HashMap::new();
    let breaker_registry = Arc::new(CircuitBreakerRegistry::new());
    for backend_config in &config.backends {
        let state = Arc::new(BackendState::new(backend_config.clone()));
        backend_states.insert(backend_config.id.clone(), state);
        breaker_registry
            .get_or_create(&format!("backend_{}", backend_config.id), config.breaker.clone())
            .await;
    }

    let prober = Arc::new(HealthProber::new(
        backend_states.values().cloned().collect(),
        config.health.clone(),
        router_core::metrics::global(),
    ));

    // Synchronous startup round so the first requests after boot have
    // real health signal rather than the startup-pessimistic default.
    prober.check_all().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health_task = {
        let prober = prober.clone();
        tokio::spawn(async move {
            // `run` performs its own startup round; harmless repeat of
            // the one just above, then falls into the periodic loop.
            prober.run(shutdown_rx).await;
        })
    };

    // Fully wired for the process's lifetime even though this binary's
    // own HTTP surface is ops-only (§1 non-goal: no chat/completions
    // endpoint here) — whatever embeds this crate drives `generate`
    // through the library call directly.
    let _router = Arc::new(FallbackRouter::new(
        backend_states,
        aliases,
        config.routing.clone(),
        config.classifier.clone(),
        config.retry.clone(),
        breaker_registry.clone(),
        config.breaker.clone(),
        router_core::metrics::global(),
    ));

    let state = server::AppState {
        metrics: router_core::metrics::global(),
        breakers: breaker_registry,
    };
    let app = server::create_server(state);

    let addr = SocketAddr::new(args.host.parse()?, args.port);
    tracing::info!(%addr, "starting metrics listener");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    tracing::info!(grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(), "draining in-flight work");
    tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
    health_task.await.ok();

    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
