use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{
    cache::ResponseCache, config::AppConfig, ingest::DocumentStore, metrics::PerformanceLog,
    rag::DebateEngine, session::SessionRegistry,
};

/// Estado compartido del proceso: el motor RAG y el índice cargado son de
/// sólo lectura tras el arranque; el registro de sesiones y la caché
/// protegen internamente sus propios mapas.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<DebateEngine>,
    pub sessions: Arc<SessionRegistry>,
    pub cache: Arc<ResponseCache>,
    pub perf_log: Arc<PerformanceLog>,
    pub store: DocumentStore,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}
