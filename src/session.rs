//! Registro de sesiones de voz efímeras.
//!
//! El registro es el único dueño del mapa de sesiones y protege con un mutex
//! las secuencias de lectura-modificación-escritura de `start`/`end`/limpieza,
//! de modo que el límite de sesiones concurrentes se respete bajo peticiones
//! simultáneas. La expiración es perezosa: un barrido O(n) al entrar en
//! `start()` y `list()`, sin temporizador de fondo.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use livekit_api::access_token::{AccessToken, VideoGrants};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::VoiceSession;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Maximum number of concurrent voice sessions reached")]
    CapacityExceeded,
    #[error("LiveKit credentials not configured")]
    Configuration,
    #[error("Voice session not found")]
    NotFound,
    #[error("No se pudo firmar el token de acceso: {0}")]
    Token(String),
}

/// Resultado de arrancar una sesión: token firmado + datos para el cliente.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub token: String,
    pub room_name: String,
    pub livekit_url: String,
    pub session_id: String,
    pub expires_at: i64,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, VoiceSession>>,
    api_key: Option<String>,
    api_secret: Option<String>,
    livekit_url: Option<String>,
    session_timeout: u64,
    max_concurrent: usize,
}

impl SessionRegistry {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            api_key: cfg.livekit_api_key.clone(),
            api_secret: cfg.livekit_api_secret.clone(),
            livekit_url: cfg.livekit_url.clone(),
            session_timeout: cfg.voice_session_timeout,
            max_concurrent: cfg.max_concurrent_sessions,
        }
    }

    /// Crea una sesión nueva: barrido de expiradas, comprobación de aforo,
    /// firma del token de sala y alta del registro, todo bajo el mismo lock.
    pub fn start(
        &self,
        user_identity: &str,
        room_name: Option<String>,
        participant_name: Option<String>,
    ) -> Result<StartedSession, SessionError> {
        let mut sessions = self.sessions.lock().unwrap();
        sweep_expired(&mut sessions);

        if sessions.len() >= self.max_concurrent {
            return Err(SessionError::CapacityExceeded);
        }

        let room_name = room_name
            .unwrap_or_else(|| format!("debate-{}", &Uuid::new_v4().simple().to_string()[..8]));
        let session_id = Uuid::new_v4().to_string();
        let token = self.sign_join_token(&room_name, user_identity, participant_name.as_deref())?;

        let now = Utc::now().timestamp();
        let expires_at = now + self.session_timeout as i64;

        sessions.insert(
            session_id.clone(),
            VoiceSession {
                session_id: session_id.clone(),
                room_name: room_name.clone(),
                user_identity: user_identity.to_string(),
                participant_name,
                status: "active".to_string(),
                created_at: now,
                expires_at,
            },
        );

        info!(
            "Sesión de voz {session_id} creada para '{user_identity}' en la sala {room_name}"
        );

        Ok(StartedSession {
            token,
            room_name,
            livekit_url: self
                .livekit_url
                .clone()
                .unwrap_or_else(|| "wss://your-livekit-server.com".to_string()),
            session_id,
            expires_at,
        })
    }

    /// Estado de una sesión concreta. Una sesión barrida por expiración
    /// también es `NotFound`.
    pub fn status(&self, session_id: &str) -> Result<VoiceSession, SessionError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    /// Termina una sesión. No es idempotente: una segunda llamada es `NotFound`.
    pub fn end(&self, session_id: &str) -> Result<VoiceSession, SessionError> {
        let removed = self
            .sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .ok_or(SessionError::NotFound)?;
        info!(
            "Sesión de voz {session_id} terminada en la sala {}",
            removed.room_name
        );
        Ok(removed)
    }

    /// Lista las sesiones vigentes tras barrer las expiradas. El campo
    /// `status` se devuelve tal cual se almacenó: el barrido sólo elimina
    /// registros, nunca los marca como "expired" in situ.
    pub fn list(&self) -> Vec<VoiceSession> {
        let mut sessions = self.sessions.lock().unwrap();
        sweep_expired(&mut sessions);
        let mut all: Vec<VoiceSession> = sessions.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    fn sign_join_token(
        &self,
        room_name: &str,
        identity: &str,
        name: Option<&str>,
    ) -> Result<String, SessionError> {
        let (api_key, api_secret) = match (&self.api_key, &self.api_secret) {
            (Some(k), Some(s)) => (k, s),
            _ => return Err(SessionError::Configuration),
        };

        AccessToken::with_api_key(api_key, api_secret)
            .with_identity(identity)
            .with_name(name.unwrap_or(identity))
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.session_timeout))
            .to_jwt()
            .map_err(|e| SessionError::Token(e.to_string()))
    }
}

fn sweep_expired(sessions: &mut HashMap<String, VoiceSession>) {
    let now = Utc::now().timestamp();
    sessions.retain(|session_id, session| {
        let alive = session.expires_at >= now;
        if !alive {
            info!("Sesión expirada eliminada: {session_id}");
        }
        alive
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn test_config(max: usize, timeout: u64) -> AppConfig {
        AppConfig {
            server_addr: "127.0.0.1:0".into(),
            llm_provider: LlmProvider::OpenAI,
            llm_embedding_model: String::new(),
            llm_chat_model: String::new(),
            openai_api_key_present: false,
            knowledge_base_dir: String::new(),
            vector_index_path: String::new(),
            upload_dir: String::new(),
            performance_log_path: String::new(),
            livekit_url: Some("wss://livekit.ejemplo.dev".into()),
            livekit_api_key: Some("devkey".into()),
            livekit_api_secret: Some("devsecret-devsecret-devsecret-12".into()),
            voice_session_timeout: timeout,
            max_concurrent_sessions: max,
            cache_enabled: false,
            cache_default_ttl: 3600,
        }
    }

    #[test]
    fn start_issues_token_room_and_expiry() {
        let registry = SessionRegistry::from_config(&test_config(10, 3600));
        let before = Utc::now().timestamp();
        let started = registry.start("alice", None, None).unwrap();

        assert!(!started.token.is_empty());
        assert!(started.room_name.starts_with("debate-"));
        assert_eq!(started.room_name.len(), "debate-".len() + 8);
        assert!(started.expires_at >= before + 3600);
        assert_eq!(started.livekit_url, "wss://livekit.ejemplo.dev");

        let record = registry.status(&started.session_id).unwrap();
        assert_eq!(record.user_identity, "alice");
        assert_eq!(record.status, "active");
    }

    #[test]
    fn capacity_limit_blocks_and_end_frees_one_slot() {
        let registry = SessionRegistry::from_config(&test_config(3, 3600));
        let ids: Vec<String> = (0..3)
            .map(|i| registry.start(&format!("user-{i}"), None, None).unwrap().session_id)
            .collect();

        assert!(matches!(
            registry.start("uno-mas", None, None),
            Err(SessionError::CapacityExceeded)
        ));

        registry.end(&ids[0]).unwrap();
        assert!(registry.start("ahora-si", None, None).is_ok());
    }

    #[test]
    fn end_is_not_idempotent() {
        let registry = SessionRegistry::from_config(&test_config(10, 3600));
        let started = registry.start("bob", None, None).unwrap();

        registry.end(&started.session_id).unwrap();
        assert!(matches!(
            registry.end(&started.session_id),
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            registry.status(&started.session_id),
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn missing_credentials_fail_with_configuration_error() {
        let mut cfg = test_config(10, 3600);
        cfg.livekit_api_secret = None;
        let registry = SessionRegistry::from_config(&cfg);
        assert!(matches!(
            registry.start("alice", None, None),
            Err(SessionError::Configuration)
        ));
    }

    #[test]
    fn expired_sessions_disappear_from_list_after_sweep() {
        let registry = SessionRegistry::from_config(&test_config(10, 0));
        let started = registry.start("carol", None, None).unwrap();

        // Con timeout 0 la sesión expira en cuanto avance el reloj.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(registry.list().is_empty());
        assert!(matches!(
            registry.status(&started.session_id),
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn caller_supplied_room_name_is_respected() {
        let registry = SessionRegistry::from_config(&test_config(10, 3600));
        let started = registry
            .start("dana", Some("sala-propia".into()), Some("Dana".into()))
            .unwrap();
        assert_eq!(started.room_name, "sala-propia");
        let record = registry.status(&started.session_id).unwrap();
        assert_eq!(record.participant_name.as_deref(), Some("Dana"));
    }
}
