//! Viewer server: static UI bundle plus the derived artifact over HTTP.
//!
//! The artifact lives next to the capture log (`<input>.cooked.json`) and
//! is re-cooked on startup when missing or older than the log. The server
//! itself is stateless: one artifact read per `/data.json` fetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

struct ViewerState {
    artifact_path: PathBuf,
}

/// Cook if stale, then serve the viewer until shutdown.
pub async fn run(input: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    let artifact_path = artifact_path_for(input);
    refresh_artifact(input, &artifact_path)?;

    let state = Arc::new(ViewerState {
        artifact_path: artifact_path.clone(),
    });
    let app = router(state);

    let listen_address = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("failed to bind {listen_address}"))?;

    tracing::info!(
        address = %listen_address,
        artifact = %artifact_path.display(),
        "promptlens viewer listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(crate::proxy::server::shutdown_signal())
        .await?;
    tracing::info!("promptlens viewer shut down gracefully");
    Ok(())
}

fn router(state: Arc<ViewerState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/app.js", get(handle_app_js))
        .route("/style.css", get(handle_style))
        .route("/data.json", get(handle_data))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The artifact path derived from the capture log path:
/// `capture.jsonl` -> `capture.cooked.json`.
pub fn artifact_path_for(input: &Path) -> PathBuf {
    input.with_extension("cooked.json")
}

/// Re-cook when the artifact is missing or older than the capture log.
fn refresh_artifact(input: &Path, artifact: &Path) -> anyhow::Result<()> {
    let input_meta = std::fs::metadata(input)
        .with_context(|| format!("cannot read capture log {}", input.display()))?;

    let stale = match std::fs::metadata(artifact) {
        Ok(artifact_meta) => match (input_meta.modified(), artifact_meta.modified()) {
            (Ok(input_mtime), Ok(artifact_mtime)) => artifact_mtime < input_mtime,
            _ => true,
        },
        Err(_) => true,
    };

    if stale {
        tracing::info!(artifact = %artifact.display(), "Artifact stale, cooking");
        promptlens_cook::cook_file(input, artifact)
            .with_context(|| format!("cook of {} failed", input.display()))?;
    }
    Ok(())
}

async fn handle_index() -> Html<&'static str> {
    Html(include_str!("assets/index.html"))
}

async fn handle_app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("assets/app.js"),
    )
}

async fn handle_style() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("assets/style.css"),
    )
}

async fn handle_data(State(state): State<Arc<ViewerState>>) -> Response {
    match tokio::fs::read(&state.artifact_path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read artifact");
            (StatusCode::NOT_FOUND, "artifact not found").into_response()
        }
    }
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
