//! Axum HTTP server for the proxy: router, listener, graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::Instrument;

use promptlens_cook::record::TraceRecord;
use promptlens_cook::CaptureLog;

use super::forward;
use super::stats::ProxyStats;
use crate::config::ProxyConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub log: Arc<CaptureLog>,
    pub stats: ProxyStats,
}

impl AppState {
    /// Build the upstream HTTP client and open the capture log.
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;
        let log = Arc::new(
            CaptureLog::open(&config.output)
                .with_context(|| format!("cannot open capture log {}", config.output.display()))?,
        );
        Ok(Self {
            config,
            client,
            log,
            stats: ProxyStats::new(),
        })
    }
}

/// Bind the configured address and run until shutdown.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let listen_address = config.listen_address.clone();
    let state = AppState::new(config)?;

    let listener = tokio::net::TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("failed to bind {listen_address}"))?;

    tracing::info!(
        address = %listen_address,
        target = %state.config.target,
        output = %state.config.output.display(),
        "promptlens proxy listening"
    );
    serve(listener, state).await
}

/// Run the server on an already-bound listener (split out so tests can use
/// an ephemeral port).
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("promptlens proxy shut down gracefully");
    Ok(())
}

/// Build the proxy router: liveness and stats endpoints, and a catch-all
/// that mirrors everything else upstream.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/stats", get(handle_stats))
        .fallback(handle_proxy)
        .with_state(Arc::new(state))
}

/// Catch-all handler: forward any method and path to
/// `{target}{path}?{query}`, capturing one trace record per completed
/// upstream exchange.
async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let started = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let url = format!("{}{path}{query}", state.config.target);

    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), state.config.max_request_body_bytes)
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read client request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    state.stats.inc_requests();

    let record = TraceRecord::begin(forward::decode_request_body(&headers, &body));
    let span = promptlens_tracing::proxy_request_span!(&record.id, &method, &path);

    forward::forward(
        &state.client,
        &state.log,
        &state.stats,
        method,
        &url,
        &headers,
        body,
        record,
        started,
    )
    .instrument(span)
    .await
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT or SIGTERM for graceful shutdown.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
