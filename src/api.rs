use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    app_state::AppState,
    cache::ResponseCache,
    ingest::{self, ParseError},
    metrics::PerformanceRecord,
    rag::RagError,
    session::SessionError,
};

/// Temas disponibles en la base de conocimiento filosófica. Una versión más
/// sofisticada los extraería de los metadatos del índice.
const KNOWLEDGE_TOPICS: &[&str] = &[
    "Free Will",
    "Determinism",
    "Compatibilism",
    "Consciousness",
    "Utilitarianism",
    "Deontology",
    "Justice",
    "Empiricism",
    "Rationalism",
];

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct DebateMessage {
    pub content: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "default".to_string()
}

#[derive(Deserialize)]
pub struct VoiceSessionRequest {
    pub room_name: Option<String>,
    pub user_identity: String,
    pub participant_name: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    5
}

#[derive(Deserialize)]
pub struct MetricsParams {
    #[serde(default = "default_metrics_limit")]
    pub limit: usize,
}

fn default_metrics_limit() -> usize {
    100
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content_base64: String,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/debate/test", post(debate_handler))
        .route("/api/knowledge/topics", get(knowledge_topics_handler))
        .route("/api/knowledge/search", get(knowledge_search_handler))
        .route("/api/voice/start-session", post(start_voice_session_handler))
        .route("/api/voice/session/:session_id", get(voice_session_status_handler))
        .route("/api/voice/session/:session_id", delete(end_voice_session_handler))
        .route("/api/voice/sessions", get(list_voice_sessions_handler))
        .route("/api/performance/metrics", get(performance_metrics_handler))
        .route("/api/documents/upload", post(upload_document_handler))
        .route("/api/documents/:file_id", delete(delete_document_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers: salud y capacidades ---

#[axum::debug_handler]
async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "AI Debate Partner API with RAG is running",
        "version": env!("CARGO_PKG_VERSION"),
        "rag_enabled": state.engine.is_ready(),
        "voice_enabled": state.config.voice_enabled(),
        "cache": state.cache.stats(),
    }))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "ai-debate-partner",
        "rag_status": if state.engine.is_ready() { "enabled" } else { "disabled" },
        "voice_status": if state.config.voice_enabled() { "enabled" } else { "disabled" },
    }))
}

// --- Handlers: debate RAG ---

#[axum::debug_handler]
async fn debate_handler(
    State(state): State<AppState>,
    Json(message): Json<DebateMessage>,
) -> Result<Json<Value>, ApiError> {
    let start_time = Instant::now();
    info!(
        "Mensaje de debate recibido de '{}': {:.100}...",
        message.user_id, message.content
    );

    // La caché es consultiva: un acierto evita recuperación y generación.
    let cache_key = ResponseCache::rag_query_key(&message.content);
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    match state.engine.answer(&message.content).await {
        Ok(outcome) => {
            let elapsed = start_time.elapsed().as_secs_f64();
            let degraded = !state.engine.is_ready();

            state.perf_log.append(&PerformanceRecord::now(
                elapsed,
                Some(outcome.confidence),
                message.content.len(),
                !degraded,
                degraded.then(|| "RAG not available".to_string()),
            ));

            let body = serde_json::to_value(&outcome)
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            if !degraded {
                state.cache.set(&cache_key, body.clone(), None);
            }
            Ok(Json(body))
        }
        Err(e) => {
            let elapsed = start_time.elapsed().as_secs_f64();
            error!("Error en el endpoint de debate: {e}");
            state.perf_log.append(&PerformanceRecord::now(
                elapsed,
                Some(0.0),
                message.content.len(),
                false,
                Some(e.to_string()),
            ));
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {e}"),
            ))
        }
    }
}

// --- Handlers: base de conocimiento ---

#[axum::debug_handler]
async fn knowledge_topics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "topics": KNOWLEDGE_TOPICS,
        "total_documents": state.engine.index_size(),
    }))
}

#[axum::debug_handler]
async fn knowledge_search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    match state.engine.search_knowledge(&params.query, params.limit).await {
        Ok(results) => Ok(Json(json!({
            "query": params.query,
            "total_found": results.len(),
            "results": results,
        }))),
        Err(RagError::Unavailable) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Knowledge base not available",
        )),
        Err(e) => {
            error!("Error buscando en la base de conocimiento: {e}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

// --- Handlers: sesiones de voz ---

fn session_error_response(e: SessionError) -> ApiError {
    match e {
        SessionError::CapacityExceeded => {
            api_error(StatusCode::TOO_MANY_REQUESTS, e.to_string())
        }
        SessionError::Configuration => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        SessionError::NotFound => api_error(StatusCode::NOT_FOUND, e.to_string()),
        SessionError::Token(detail) => {
            error!("Fallo firmando el token de sala: {detail}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start voice session",
            )
        }
    }
}

#[axum::debug_handler]
async fn start_voice_session_handler(
    State(state): State<AppState>,
    Json(request): Json<VoiceSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = state
        .sessions
        .start(
            &request.user_identity,
            request.room_name,
            request.participant_name,
        )
        .map_err(session_error_response)?;

    Ok(Json(json!({
        "token": started.token,
        "room_name": started.room_name,
        "livekit_url": started.livekit_url,
        "session_id": started.session_id,
        "expires_at": started.expires_at,
    })))
}

#[axum::debug_handler]
async fn voice_session_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .status(&session_id)
        .map_err(session_error_response)?;
    Ok(Json(serde_json::to_value(session).unwrap_or_default()))
}

#[axum::debug_handler]
async fn end_voice_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .sessions
        .end(&session_id)
        .map_err(session_error_response)?;
    Ok(Json(json!({
        "message": "Voice session ended successfully",
        "session_id": session_id,
    })))
}

#[axum::debug_handler]
async fn list_voice_sessions_handler(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.sessions.list();
    Json(json!({
        "total_count": sessions.len(),
        "active_sessions": sessions,
    }))
}

// --- Handlers: métricas de rendimiento ---

#[axum::debug_handler]
async fn performance_metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> Json<Value> {
    Json(state.perf_log.metrics_payload(params.limit))
}

// --- Handlers: documentos subidos ---

#[axum::debug_handler]
async fn upload_document_handler(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<Value>, ApiError> {
    let content = base64::engine::general_purpose::STANDARD
        .decode(&request.content_base64)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "content_base64 is not valid base64"))?;

    let saved = state
        .store
        .save_file(&request.filename, &content)
        .map_err(|e| {
            error!("No se pudo guardar el documento subido: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save document")
        })?;

    let parsed = match ingest::parse_document(std::path::Path::new(&saved.path)) {
        Ok(parsed) => parsed,
        Err(ParseError::UnsupportedFormat(ext)) => {
            return Err(api_error(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("Unsupported file type: {ext}"),
            ));
        }
        Err(e) => {
            error!("No se pudo parsear el documento subido: {e}");
            return Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Failed to parse document: {e}"),
            ));
        }
    };

    let chunks = ingest::chunk_document(
        &parsed.content,
        &parsed.pages,
        ingest::DEFAULT_CHUNK_SIZE,
        ingest::DEFAULT_CHUNK_OVERLAP,
    );

    Ok(Json(json!({
        "document": saved,
        "type": parsed.doc_type.as_str(),
        "page_count": parsed.pages.len(),
        "chunk_count": chunks.len(),
    })))
}

#[axum::debug_handler]
async fn delete_document_handler(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.store.delete_document(&file_id).map_err(|e| {
        error!("No se pudo eliminar el documento {file_id}: {e}");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete document")
    })?;

    if removed {
        Ok(Json(json!({
            "message": "Document deleted successfully",
            "id": file_id,
        })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "Document not found"))
    }
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
