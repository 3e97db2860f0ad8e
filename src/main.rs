use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use debate_rag_webapp::{
    api,
    app_state::AppState,
    cache::ResponseCache,
    config::AppConfig,
    ingest::DocumentStore,
    metrics::PerformanceLog,
    rag::DebateEngine,
    session::SessionRegistry,
};

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Inicializar el motor RAG (puede arrancar degradado) y el resto de
    //    colaboradores compartidos
    let engine = Arc::new(DebateEngine::initialize(&cfg));
    if engine.is_ready() {
        info!("Backend arrancado con RAG habilitado");
    } else {
        info!("Backend arrancado con funcionalidad limitada (modo degradado)");
    }

    let sessions = Arc::new(SessionRegistry::from_config(&cfg));
    let cache = Arc::new(ResponseCache::new(cfg.cache_enabled, cfg.cache_default_ttl));
    let perf_log = Arc::new(PerformanceLog::new(&cfg.performance_log_path));
    let store = DocumentStore::new(&cfg.upload_dir)
        .expect("Error creando el directorio de documentos subidos");

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        engine,
        sessions,
        cache,
        perf_log,
        store,
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 5. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .nest("/", api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .unwrap();
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .unwrap();

    info!("✅ Servidor cerrado correctamente.");
}
