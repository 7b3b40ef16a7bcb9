//! Formance Ledger Proxy
//!
//! Single-binary Rust service that:
//! 1. Holds one OAuth2 client-credential pair, encrypted in process memory
//! 2. Exchanges it for bearer tokens via the client-credentials grant,
//!    cached until 60 seconds before expiry
//! 3. Forwards /api/ledger requests to the remote ledger API with the token

mod config;
mod error;
mod metrics;
mod proxy;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use ledger_auth::{TokenCache, Vault};

use crate::config::Config;
use crate::error::envelope;
use crate::proxy::ProxyState;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let api = routes::api_router(state.proxy.clone());
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(api)
        .fallback(not_found_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting ledger-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base = %config.ledger.api_base,
        token_url = %config.ledger.token_url,
        "configuration loaded"
    );

    let vault = Arc::new(Vault::new());
    let client = reqwest::Client::new();
    let tokens = Arc::new(TokenCache::new(
        vault.clone(),
        client.clone(),
        config.ledger.token_url.clone(),
    ));

    match &config.credentials {
        Some(creds) => {
            vault
                .set_credentials(&creds.client_id, creds.client_secret.expose())
                .await
                .context("failed to seed vault from environment")?;
            info!(client_id = %creds.client_id, "vault seeded from environment");
        }
        None => {
            warn!(
                "no FORMANCE_CLIENT_ID / FORMANCE_CLIENT_SECRET in environment; \
                 configure credentials via POST /api/credentials"
            );
        }
    }

    let proxy_state = ProxyState {
        client,
        api_base: config.ledger.api_base.clone(),
        vault,
        tokens,
        timeout: Duration::from_secs(config.server.timeout_secs),
        requests_total: Arc::new(AtomicU64::new(0)),
        errors_total: Arc::new(AtomicU64::new(0)),
    };

    let app_state = AppState {
        proxy: proxy_state,
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: 200 with credentials configured, 503 before then.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let requests = state.proxy.requests_total.load(Ordering::Relaxed);
    let errors = state.proxy.errors_total.load(Ordering::Relaxed);

    let (status_code, body) = if state.proxy.vault.is_configured().await {
        (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "credentials": "configured",
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "degraded",
                "credentials": "not_set",
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        )
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn not_found_handler() -> Response {
    envelope(StatusCode::NOT_FOUND, "not found", None)
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
