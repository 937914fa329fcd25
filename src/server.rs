//! JSON HTTP API for agent knowledge bases.
//!
//! Every agent is addressed by path. Its knowledge base is created by the
//! [`KnowledgeBaseRegistry`] on the first create or train request; reads,
//! updates and deletes for an agent without one return `404`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/agents` | Agents with a knowledge base |
//! | `GET`  | `/agents/{agent}/stats` | Counts, sizes, quota, training flag |
//! | `GET` `POST` | `/agents/{agent}/snippets` | List / create text snippets |
//! | `GET` `PUT` `DELETE` | `/agents/{agent}/snippets/{id}` | Read / replace / delete a snippet |
//! | `GET` `POST` | `/agents/{agent}/files` | List / register uploaded files |
//! | `GET` `DELETE` | `/agents/{agent}/files/{id}` | Read / delete a file |
//! | `GET` `POST` | `/agents/{agent}/websites` | List / add websites (crawl runs in background) |
//! | `GET` `DELETE` | `/agents/{agent}/websites/{id}` | Read / delete a website |
//! | `GET` `POST` | `/agents/{agent}/qa` | List / create Q&A pairs |
//! | `GET` `PUT` `DELETE` | `/agents/{agent}/qa/{id}` | Read / replace / delete a Q&A pair |
//! | `POST` | `/agents/{agent}/train` | Start a training run |
//! | `GET`  | `/agents/{agent}/training` | Most recent training run |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "snippet 7 not found" } }
//! ```
//!
//! Malformed JSON bodies and path ids are reported the same way.
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `already_in_progress` (409), `quota_exceeded` (413), `internal` (500).

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use helpdesk_kb_core::models::{
    FileInput, FileRecord, KbStats, QaEntry, QaInput, RecordId, SnippetInput, TextSnippet,
    TrainingRun, WebsiteSource,
};
use helpdesk_kb_core::KbError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::knowledge_base::KnowledgeBase;
use crate::registry::KnowledgeBaseRegistry;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<KnowledgeBaseRegistry>,
}

/// Build the API router over `registry`.
pub fn router(registry: Arc<KnowledgeBaseRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/agents", get(handle_list_agents))
        .route("/agents/{agent}/stats", get(handle_stats))
        .route(
            "/agents/{agent}/snippets",
            get(handle_list_snippets).post(handle_create_snippet),
        )
        .route(
            "/agents/{agent}/snippets/{id}",
            get(handle_get_snippet)
                .put(handle_update_snippet)
                .delete(handle_delete_snippet),
        )
        .route(
            "/agents/{agent}/files",
            get(handle_list_files).post(handle_upload_file),
        )
        .route(
            "/agents/{agent}/files/{id}",
            get(handle_get_file).delete(handle_delete_file),
        )
        .route(
            "/agents/{agent}/websites",
            get(handle_list_websites).post(handle_add_website),
        )
        .route(
            "/agents/{agent}/websites/{id}",
            get(handle_get_website).delete(handle_delete_website),
        )
        .route(
            "/agents/{agent}/qa",
            get(handle_list_qas).post(handle_create_qa),
        )
        .route(
            "/agents/{agent}/qa/{id}",
            get(handle_get_qa)
                .put(handle_update_qa)
                .delete(handle_delete_qa),
        )
        .route("/agents/{agent}/train", post(handle_train))
        .route("/agents/{agent}/training", get(handle_last_training))
        .layer(cors)
        .with_state(AppState { registry })
}

/// Starts the HTTP server on `[server].bind` and serves until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let registry = Arc::new(KnowledgeBaseRegistry::new(Arc::new(config.clone())));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("knowledge base server listening on http://{}", bind_addr);
    println!("Knowledge base server listening on http://{}", bind_addr);

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<KbError> for AppError {
    fn from(err: KbError) -> Self {
        let message = err.to_string();
        match err {
            KbError::NotFound { .. } => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            KbError::InvalidInput(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            KbError::AlreadyInProgress { .. } => {
                AppError::new(StatusCode::CONFLICT, "already_in_progress", message)
            }
            KbError::QuotaExceeded { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "quota_exceeded", message)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<KbError>() {
            Some(kb) => kb.clone().into(),
            None => {
                tracing::error!(error = %err, "request failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    err.to_string(),
                )
            }
        }
    }
}

type ApiResult<T> = Result<T, AppError>;

/// Knowledge base for a create or train request, created on first use.
async fn kb_for(state: &AppState, agent: &str) -> ApiResult<Arc<KnowledgeBase>> {
    Ok(state.registry.get_or_create(agent).await?)
}

/// Knowledge base for any other request. Unknown agents are `404` and are
/// not added to the registry.
fn existing_kb(state: &AppState, agent: &str) -> ApiResult<Arc<KnowledgeBase>> {
    KnowledgeBaseRegistry::validate_agent_id(agent)?;
    state.registry.get(agent).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("agent '{}' has no knowledge base", agent),
        )
    })
}

// ============ Extractors ============

/// `Json` whose rejections use the JSON error body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections use the JSON error body.
struct ApiPath<T>(T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

// ============ Health & agents ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<String>,
}

async fn handle_list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    Json(AgentListResponse {
        agents: state.registry.agent_ids(),
    })
}

async fn handle_stats(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<KbStats>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.stats().await))
}

// ============ Snippets ============

async fn handle_list_snippets(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<Vec<TextSnippet>>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.list_snippets().await))
}

async fn handle_create_snippet(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
    ApiJson(input): ApiJson<SnippetInput>,
) -> ApiResult<(StatusCode, Json<TextSnippet>)> {
    let kb = kb_for(&state, &agent).await?;
    let snippet = kb.create_snippet(input).await?;
    Ok((StatusCode::CREATED, Json(snippet)))
}

async fn handle_get_snippet(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<Json<TextSnippet>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.get_snippet(id).await?))
}

async fn handle_update_snippet(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
    ApiJson(input): ApiJson<SnippetInput>,
) -> ApiResult<Json<TextSnippet>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.update_snippet(id, input).await?))
}

async fn handle_delete_snippet(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<StatusCode> {
    let kb = existing_kb(&state, &agent)?;
    kb.delete_snippet(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Files ============

async fn handle_list_files(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<Vec<FileRecord>>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.list_files().await))
}

async fn handle_upload_file(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
    ApiJson(input): ApiJson<FileInput>,
) -> ApiResult<(StatusCode, Json<FileRecord>)> {
    let kb = kb_for(&state, &agent).await?;
    let file = kb.upload_file(input).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

async fn handle_get_file(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<Json<FileRecord>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.get_file(id).await?))
}

async fn handle_delete_file(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<StatusCode> {
    let kb = existing_kb(&state, &agent)?;
    kb.delete_file(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Websites ============

#[derive(Deserialize)]
struct AddWebsiteRequest {
    url: String,
}

async fn handle_list_websites(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<Vec<WebsiteSource>>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.list_websites().await))
}

/// Responds `202 Accepted` with the `pending` record; the crawl continues
/// after the response is sent.
async fn handle_add_website(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
    ApiJson(req): ApiJson<AddWebsiteRequest>,
) -> ApiResult<(StatusCode, Json<WebsiteSource>)> {
    let kb = kb_for(&state, &agent).await?;
    let pending = kb.add_website(&req.url).await?;
    Ok((StatusCode::ACCEPTED, Json(pending.website)))
}

async fn handle_get_website(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<Json<WebsiteSource>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.get_website(id).await?))
}

async fn handle_delete_website(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<StatusCode> {
    let kb = existing_kb(&state, &agent)?;
    kb.delete_website(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Q&A ============

async fn handle_list_qas(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<Vec<QaEntry>>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.list_qas().await))
}

async fn handle_create_qa(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
    ApiJson(input): ApiJson<QaInput>,
) -> ApiResult<(StatusCode, Json<QaEntry>)> {
    let kb = kb_for(&state, &agent).await?;
    let qa = kb.create_qa(input).await?;
    Ok((StatusCode::CREATED, Json(qa)))
}

async fn handle_get_qa(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<Json<QaEntry>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.get_qa(id).await?))
}

async fn handle_update_qa(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
    ApiJson(input): ApiJson<QaInput>,
) -> ApiResult<Json<QaEntry>> {
    let kb = existing_kb(&state, &agent)?;
    Ok(Json(kb.update_qa(id, input).await?))
}

async fn handle_delete_qa(
    State(state): State<AppState>,
    ApiPath((agent, id)): ApiPath<(String, RecordId)>,
) -> ApiResult<StatusCode> {
    let kb = existing_kb(&state, &agent)?;
    kb.delete_qa(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Training ============

/// Responds `202 Accepted` with the running run, or `409` if one is
/// already in flight.
async fn handle_train(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<(StatusCode, Json<TrainingRun>)> {
    let kb = kb_for(&state, &agent).await?;
    let handle = kb.start_training().await?;
    Ok((StatusCode::ACCEPTED, Json(handle.run().clone())))
}

async fn handle_last_training(
    State(state): State<AppState>,
    ApiPath(agent): ApiPath<String>,
) -> ApiResult<Json<TrainingRun>> {
    let kb = existing_kb(&state, &agent)?;
    kb.last_training().map(Json).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("agent '{}' has never been trained", agent),
        )
    })
}
