//! HTTP and WebSocket service over one shared coordinator.
//!
//! Mutating routes take the write lock for their whole duration. Chat takes
//! a snapshot under the read lock and answers after releasing it, so a
//! reload never waits for a slow generation.

pub mod handlers;
pub mod ws;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bocs_knowledge::KnowledgeCoordinator;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Request-independent service settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Passages returned by `/search` when no limit is given
    pub top_k: usize,
    /// Turns of a WebSocket conversation sent with each question
    pub memory_depth: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RwLock<KnowledgeCoordinator>>,
    pub settings: ServiceSettings,
}

impl AppState {
    pub fn new(coordinator: KnowledgeCoordinator, settings: ServiceSettings) -> Self {
        Self {
            coordinator: Arc::new(RwLock::new(coordinator)),
            settings,
        }
    }
}

/// Origin allowed by the CORS middleware.
#[derive(Debug, Clone)]
pub struct AllowedOrigin(pub HeaderValue);

pub fn router(state: AppState, origin: AllowedOrigin, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ask", post(handlers::ask))
        .route("/ws", get(ws::upgrade))
        .route("/search", post(handlers::search))
        .route("/documents", post(handlers::upload_document))
        .route("/documents/new", get(handlers::new_documents))
        .route("/admin/index", post(handlers::admin_index))
        .route("/admin/reload", post(handlers::admin_reload))
        .route("/admin/reset", post(handlers::admin_reset))
        .route("/admin/purge", post(handlers::admin_purge))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(origin, cors_middleware))
        .with_state(state)
}

/// CORS for the configured front-end origin. Preflights end here.
async fn cors_middleware(
    State(AllowedOrigin(origin)): State<AllowedOrigin>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response
}

/// Open the store and load the upload directory when the store is empty.
/// A store that fails to open leaves the service up in the Failed state.
pub async fn prepare(coordinator: &mut KnowledgeCoordinator) {
    if let Err(e) = coordinator.initialize(false).await {
        tracing::error!("Starting without a knowledge store: {}", e);
        return;
    }

    let status = coordinator.status().await;
    if status.rows != Some(0) {
        tracing::info!(
            "Collection '{}' already holds {} chunk(s), skipping initial load",
            status.table,
            status.rows.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string())
        );
        return;
    }

    tracing::info!("Collection '{}' is empty, loading documents", status.table);
    let report = coordinator.auto_index_directory(None).await;
    for name in &report.indexed {
        coordinator.mark_as_indexed(name);
    }
    tracing::info!(
        "Initial load indexed {} document(s), {} failure(s)",
        report.count(),
        report.failures.len()
    );
}

/// Serve until Ctrl-C.
pub async fn serve(
    state: AppState,
    bind: &str,
    allowed_origin: &str,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    let origin = HeaderValue::from_str(allowed_origin)
        .with_context(|| format!("invalid allowed origin '{}'", allowed_origin))?;
    let app = router(state, AllowedOrigin(origin), max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind to {}", bind))?;
    tracing::info!("chatBOCS service listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("chatBOCS service stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_loads_an_empty_store() {
        let docs = TempDir::new().unwrap();
        std::fs::write(
            docs.path().join("decree_12.pdf"),
            "Decree 12 creates the monitoring office.",
        )
        .unwrap();
        let mut coordinator = testing::coordinator(docs.path());

        prepare(&mut coordinator).await;
        assert!(coordinator.is_ready());
        assert!(coordinator.check_for_new_documents(None).is_empty());
        // Initial handle plus the reload after indexing.
        assert_eq!(coordinator.generation(), 2);

        // A second start finds rows and leaves the store alone.
        prepare(&mut coordinator).await;
        assert_eq!(coordinator.generation(), 3);
        assert_eq!(coordinator.status().await.rows, Some(1));
    }

    #[tokio::test]
    async fn test_prepare_without_documents() {
        let docs = TempDir::new().unwrap();
        let mut coordinator = testing::coordinator(&docs.path().join("absent"));
        prepare(&mut coordinator).await;
        assert!(coordinator.is_ready());
        assert_eq!(coordinator.generation(), 1);
    }
}
