//! Pruebas de integración de la superficie HTTP con el motor en modo
//! degradado (sin credenciales de OpenAI ni índice en disco): todo lo que no
//! depende de proveedores externos debe funcionar igualmente.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use serde_json::{json, Value};
use tower::ServiceExt;

use debate_rag_webapp::{
    api,
    app_state::AppState,
    cache::ResponseCache,
    config::{AppConfig, LlmProvider},
    ingest::DocumentStore,
    metrics::PerformanceLog,
    rag::DebateEngine,
    session::SessionRegistry,
};

struct TestHarness {
    app: Router,
    perf_log: Arc<PerformanceLog>,
    _tmp: tempfile::TempDir,
}

fn test_config(tmp: &std::path::Path, max_sessions: usize, with_livekit: bool) -> AppConfig {
    AppConfig {
        server_addr: "127.0.0.1:0".into(),
        llm_provider: LlmProvider::OpenAI,
        llm_embedding_model: "text-embedding-3-small".into(),
        llm_chat_model: "gpt-4o-mini".into(),
        // Sin clave: el motor debe arrancar degradado sin tocar la red.
        openai_api_key_present: false,
        knowledge_base_dir: tmp.join("kb").to_string_lossy().into_owned(),
        vector_index_path: tmp.join("index.json").to_string_lossy().into_owned(),
        upload_dir: tmp.join("uploads").to_string_lossy().into_owned(),
        performance_log_path: tmp.join("perf.jsonl").to_string_lossy().into_owned(),
        livekit_url: with_livekit.then(|| "wss://livekit.ejemplo.dev".to_string()),
        livekit_api_key: with_livekit.then(|| "devkey".to_string()),
        livekit_api_secret: with_livekit.then(|| "devsecret-devsecret-devsecret-12".to_string()),
        voice_session_timeout: 3600,
        max_concurrent_sessions: max_sessions,
        cache_enabled: false,
        cache_default_ttl: 3600,
    }
}

fn harness(max_sessions: usize, with_livekit: bool) -> TestHarness {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path(), max_sessions, with_livekit);

    let perf_log = Arc::new(PerformanceLog::new(&cfg.performance_log_path));
    let (shutdown_tx, _shutdown_rx) = tokio::sync::oneshot::channel();

    let state = AppState {
        engine: Arc::new(DebateEngine::initialize(&cfg)),
        sessions: Arc::new(SessionRegistry::from_config(&cfg)),
        cache: Arc::new(ResponseCache::new(cfg.cache_enabled, cfg.cache_default_ttl)),
        perf_log: perf_log.clone(),
        store: DocumentStore::new(&cfg.upload_dir).unwrap(),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        config: cfg,
    };

    TestHarness {
        app: api::create_router(state),
        perf_log,
        _tmp: tmp,
    }
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Los rechazos del extractor Json de axum llegan como texto plano; se
    // envuelven en un Value::String para poder asertar igualmente sobre ellos.
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[tokio::test]
async fn root_and_health_report_capabilities() {
    let h = harness(10, true);

    let (status, body) = request_json(&h.app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rag_enabled"], false);
    assert_eq!(body["voice_enabled"], true);
    assert_eq!(body["cache"]["enabled"], false);

    let (status, body) = request_json(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["rag_status"], "disabled");
    assert_eq!(body["voice_status"], "enabled");
}

#[tokio::test]
async fn degraded_debate_returns_fallback_and_logs_metrics() {
    let h = harness(10, true);

    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/debate/test",
        Some(json!({ "content": "Free will is an illusion" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confidence"], 0.3);
    assert_eq!(body["sources"], json!(["system_fallback"]));
    assert_eq!(body["retrieved_docs"], json!([]));
    assert!(!body["response"].as_str().unwrap().is_empty());

    // La petición degradada queda registrada como no exitosa.
    let records = h.perf_log.read_recent(10);
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("RAG not available"));
    assert_eq!(records[0].confidence_score, Some(0.3));

    // Y el endpoint de métricas la refleja con sus agregados.
    let (status, body) =
        request_json(&h.app, "GET", "/api/performance/metrics?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 1);
    assert_eq!(body["statistics"]["total_requests"], 1);
    assert_eq!(body["statistics"]["successful_requests"], 0);
}

#[tokio::test]
async fn knowledge_endpoints_in_degraded_mode() {
    let h = harness(10, true);

    let (status, body) = request_json(&h.app, "GET", "/api/knowledge/topics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topics"].as_array().unwrap().len(), 9);
    assert_eq!(body["total_documents"], 0);

    let (status, body) =
        request_json(&h.app, "GET", "/api/knowledge/search?query=justice&limit=3", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Knowledge base not available");
}

#[tokio::test]
async fn voice_session_lifecycle_over_http() {
    let h = harness(10, true);
    let before = chrono::Utc::now().timestamp();

    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/voice/start-session",
        Some(json!({ "user_identity": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert!(body["room_name"].as_str().unwrap().starts_with("debate-"));
    assert_eq!(body["livekit_url"], "wss://livekit.ejemplo.dev");
    let expires_at = body["expires_at"].as_i64().unwrap();
    assert!(expires_at >= before + 3600 && expires_at <= before + 3605);

    let session_id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) =
        request_json(&h.app, "GET", &format!("/api/voice/session/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["user_identity"], "alice");

    let (status, body) = request_json(&h.app, "GET", "/api/voice/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["active_sessions"][0]["session_id"], session_id);

    let (status, body) = request_json(
        &h.app,
        "DELETE",
        &format!("/api/voice/session/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Voice session ended successfully");

    // Terminar dos veces no es idempotente: la segunda es un 404.
    let (status, _) = request_json(
        &h.app,
        "DELETE",
        &format!("/api/voice/session/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        request_json(&h.app, "GET", "/api/voice/session/no-existe", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_capacity_returns_429_on_the_eleventh_start() {
    let h = harness(10, true);

    for i in 0..10 {
        let (status, _) = request_json(
            &h.app,
            "POST",
            "/api/voice/start-session",
            Some(json!({ "user_identity": format!("user-{i}") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "la sesión {i} debería caber");
    }

    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/voice/start-session",
        Some(json!({ "user_identity": "uno-mas" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["detail"],
        "Maximum number of concurrent voice sessions reached"
    );
}

#[tokio::test]
async fn malformed_session_body_is_a_422() {
    let h = harness(10, true);
    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/voice/start-session",
        Some(json!({ "room_name": "sin-identidad" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    // El rechazo del extractor es texto plano, no JSON, y nombra el campo.
    assert!(body.as_str().unwrap().contains("user_identity"));
}

#[tokio::test]
async fn missing_livekit_credentials_are_a_500() {
    let h = harness(10, false);
    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/voice/start-session",
        Some(json!({ "user_identity": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "LiveKit credentials not configured");
}

#[tokio::test]
async fn document_upload_parse_and_delete() {
    let h = harness(10, true);
    let content = "La justicia es la primera virtud de las instituciones sociales.";
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);

    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/documents/upload",
        Some(json!({ "filename": "rawls (borrador).md", "content_base64": encoded })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "text");
    assert_eq!(body["page_count"], 1);
    assert_eq!(body["chunk_count"], 1);
    assert_eq!(body["document"]["filename"], "rawls__borrador_.md");
    assert_eq!(body["document"]["size"], content.len());

    let file_id = body["document"]["id"].as_str().unwrap().to_string();
    let (status, _) =
        request_json(&h.app, "DELETE", &format!("/api/documents/{file_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        request_json(&h.app, "DELETE", &format!("/api/documents/{file_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_upload_type_is_rejected_as_value_not_crash() {
    let h = harness(10, true);
    let encoded = base64::engine::general_purpose::STANDARD.encode("binario");

    let (status, body) = request_json(
        &h.app,
        "POST",
        "/api/documents/upload",
        Some(json!({ "filename": "foto.png", "content_base64": encoded })),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["detail"].as_str().unwrap().contains(".png"));

    let (status, _) = request_json(
        &h.app,
        "POST",
        "/api/documents/upload",
        Some(json!({ "filename": "x.txt", "content_base64": "no-es-base64!!!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
