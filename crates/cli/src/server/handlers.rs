//! HTTP handlers.

use super::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use bocs_knowledge::documents::{doc_name_for, is_pdf, persist_upload};
use bocs_knowledge::session::TOP_K_RANGE;
use bocs_knowledge::{
    ChatOutcome, ConversationTurn, DocumentError, GenerationError, InitError, SearchError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

pub type ApiResponse = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl std::fmt::Display) -> ApiResponse {
    (status, Json(json!({ "error": message.to_string() })))
}

fn respond<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_value(body) {
        Ok(value) => (status, Json(value)),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub name: String,
}

/// Answer `question` on a snapshot of the live store. The read lock is
/// released before the agent runs.
pub(crate) async fn answer(
    state: &AppState,
    question: &str,
    history: &[ConversationTurn],
) -> ChatOutcome {
    let snapshot = {
        let coordinator = state.coordinator.read().await;
        if coordinator.is_ready() {
            coordinator.snapshot().ok_or(coordinator.state())
        } else {
            Err(coordinator.state())
        }
    };

    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(not_ready) => {
            return ChatOutcome {
                answer: Err(GenerationError::NotReady(not_ready)),
                duration: Default::default(),
                generation: None,
            }
        }
    };

    let outcome = snapshot
        .chat(question, history, state.settings.memory_depth)
        .await;

    let current = state.coordinator.read().await.generation();
    if current != snapshot.generation() {
        tracing::info!(
            "Answered with handle #{} after the store moved to #{}",
            snapshot.generation(),
            current
        );
    }
    outcome
}

fn generation_status(err: &GenerationError) -> StatusCode {
    match err {
        GenerationError::EmptyQuestion => StatusCode::BAD_REQUEST,
        GenerationError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        GenerationError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /ask {question}`
pub async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> ApiResponse {
    let question = request.question.trim();
    if question.is_empty() {
        return error(StatusCode::BAD_REQUEST, GenerationError::EmptyQuestion);
    }

    let outcome = answer(&state, question, &[]).await;
    match outcome.answer {
        Ok(text) => (StatusCode::OK, Json(json!({ "response": text }))),
        Err(e) => error(generation_status(&e), e),
    }
}

/// `POST /search {query, limit?}`
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResponse {
    let query = request.query.trim();
    if query.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Query is empty");
    }
    let limit = request
        .limit
        .unwrap_or(state.settings.top_k)
        .clamp(*TOP_K_RANGE.start(), *TOP_K_RANGE.end());

    let coordinator = state.coordinator.read().await;
    match coordinator.try_search(query, limit).await {
        Ok(results) => respond(StatusCode::OK, &results),
        Err(e @ SearchError::NotReady(_)) => error(StatusCode::SERVICE_UNAVAILABLE, e),
        Err(e) => {
            tracing::warn!("Search failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

fn document_status(err: &DocumentError) -> StatusCode {
    match err {
        DocumentError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        DocumentError::Unreadable { .. } | DocumentError::Empty(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /documents?name=<file.pdf>` with the raw PDF as body.
pub async fn upload_document(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResponse {
    let file_name = query.name.trim();
    if file_name.is_empty() || !is_pdf(file_name) {
        return error(StatusCode::BAD_REQUEST, "name must be a .pdf file name");
    }
    if body.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Request body is empty");
    }

    let mut coordinator = state.coordinator.write().await;
    if !coordinator.is_ready() {
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            DocumentError::NotReady(coordinator.state()),
        );
    }

    let staged = match persist_upload(coordinator.upload_dir(), file_name, &body) {
        Ok(staged) => staged,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    let doc_name = doc_name_for(Path::new(file_name));
    let result = coordinator
        .add_document(staged.path(), Some(&doc_name), true)
        .await;
    if let Err(e) = staged.cleanup() {
        tracing::warn!("{}", e);
    }

    match result {
        Ok(indexed) => {
            coordinator.mark_as_indexed(file_name);
            respond(StatusCode::CREATED, &indexed)
        }
        Err(e) => {
            tracing::warn!("Upload of {} failed: {}", file_name, e);
            error(document_status(&e), e)
        }
    }
}

/// `GET /documents/new`
pub async fn new_documents(State(state): State<AppState>) -> ApiResponse {
    let coordinator = state.coordinator.read().await;
    respond(StatusCode::OK, &coordinator.check_for_new_documents(None))
}

/// `POST /admin/index`: index the upload directory and mark what succeeded.
pub async fn admin_index(State(state): State<AppState>) -> ApiResponse {
    let mut coordinator = state.coordinator.write().await;
    let report = coordinator.auto_index_directory(None).await;
    for name in &report.indexed {
        coordinator.mark_as_indexed(name);
    }
    respond(StatusCode::OK, &report)
}

fn handle_result(result: Result<u64, InitError>) -> ApiResponse {
    match result {
        Ok(generation) => (StatusCode::OK, Json(json!({ "generation": generation }))),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `POST /admin/reload`
pub async fn admin_reload(State(state): State<AppState>) -> ApiResponse {
    let mut coordinator = state.coordinator.write().await;
    handle_result(coordinator.reload_knowledge_base().await)
}

/// `POST /admin/reset`
pub async fn admin_reset(State(state): State<AppState>) -> ApiResponse {
    let mut coordinator = state.coordinator.write().await;
    handle_result(coordinator.initialize(true).await)
}

/// `POST /admin/purge`
pub async fn admin_purge(State(state): State<AppState>) -> ApiResponse {
    let mut coordinator = state.coordinator.write().await;
    match coordinator.force_cleanup().await {
        Ok(generation) => (StatusCode::OK, Json(json!({ "generation": generation }))),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> ApiResponse {
    let coordinator = state.coordinator.read().await;
    respond(StatusCode::OK, &coordinator.status().await)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> ApiResponse {
    let coordinator = state.coordinator.read().await;
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "state": coordinator.state() })),
    )
}
