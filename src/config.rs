//! Carga y gestión de configuración de la aplicación (LLM + LiveKit + rutas).

use std::env;
use anyhow::{anyhow, Result};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    /// Presencia de OPENAI_API_KEY en el entorno. Si falta, el motor RAG
    /// arranca en modo degradado; nunca debe abortar el proceso.
    pub openai_api_key_present: bool,

    /// Directorio con los documentos markdown de la base de conocimiento.
    pub knowledge_base_dir: String,
    /// Fichero JSON donde se persiste el índice vectorial.
    pub vector_index_path: String,
    /// Directorio donde se guardan los documentos subidos.
    pub upload_dir: String,
    /// Fichero JSONL de métricas de rendimiento (append-only).
    pub performance_log_path: String,

    // --- LiveKit / sesiones de voz ---
    pub livekit_url: Option<String>,
    pub livekit_api_key: Option<String>,
    pub livekit_api_secret: Option<String>,
    /// Duración de una sesión de voz (y TTL del token firmado), en segundos.
    pub voice_session_timeout: u64,
    pub max_concurrent_sessions: usize,

    // --- Caché de respuestas (opcional) ---
    pub cache_enabled: bool,
    pub cache_default_ttl: u64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let openai_api_key_present = env::var("OPENAI_API_KEY")
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);

        let knowledge_base_dir = env::var("KNOWLEDGE_BASE_PATH")
            .unwrap_or_else(|_| "knowledge_base".to_string());
        let vector_index_path = env::var("VECTOR_INDEX_PATH")
            .unwrap_or_else(|_| "data/knowledge_index.json".to_string());
        let upload_dir =
            env::var("UPLOAD_DIR").unwrap_or_else(|_| "data/uploads".to_string());
        let performance_log_path = env::var("PERFORMANCE_LOG_PATH")
            .unwrap_or_else(|_| "data/performance_logs.jsonl".to_string());

        let livekit_url = read_optional("LIVEKIT_URL");
        if let Some(u) = &livekit_url {
            // Validamos pronto: una URL malformada sólo daría errores crípticos
            // cuando el frontend intente conectarse a la sala.
            Url::parse(u).map_err(|e| anyhow!("LIVEKIT_URL no es una URL válida: {e}"))?;
        }
        let livekit_api_key = read_optional("LIVEKIT_API_KEY");
        let livekit_api_secret = read_optional("LIVEKIT_API_SECRET");

        let voice_session_timeout = env::var("VOICE_SESSION_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);
        let max_concurrent_sessions = env::var("MAX_CONCURRENT_SESSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let cache_enabled = env::var("CACHE_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let cache_default_ttl = env::var("CACHE_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        Ok(Self {
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            openai_api_key_present,
            knowledge_base_dir,
            vector_index_path,
            upload_dir,
            performance_log_path,
            livekit_url,
            livekit_api_key,
            livekit_api_secret,
            voice_session_timeout,
            max_concurrent_sessions,
            cache_enabled,
            cache_default_ttl,
        })
    }

    /// ¿Están las credenciales necesarias para firmar tokens de sala?
    pub fn voice_enabled(&self) -> bool {
        self.livekit_api_key.is_some() && self.livekit_api_secret.is_some()
    }
}

fn read_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
