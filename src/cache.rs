//! Caché opcional de respuestas con TTL, direccionada por contenido.
//!
//! La caché es puramente consultiva: en modo deshabilitado todas las
//! operaciones son no-ops silenciosos que devuelven ausencia/false, nunca un
//! error. Los llamantes no pueden depender de ella para corrección.
//!
//! Nota: reconstruir el índice de conocimiento NO invalida la caché; existe
//! una ventana de lecturas obsoletas hasta que expiren los TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Caché en memoria compartida por todo el proceso.
pub struct ResponseCache {
    enabled: bool,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(enabled: bool, default_ttl_secs: u64) -> Self {
        if enabled {
            info!("Caché de respuestas habilitada (TTL por defecto: {default_ttl_secs}s)");
        } else {
            info!("Caché de respuestas deshabilitada; se servirá todo sin cachear");
        }
        Self {
            enabled,
            default_ttl: Duration::from_secs(default_ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Devuelve el valor cacheado, o `None` si no existe, expiró o la caché
    /// está deshabilitada. La ausencia nunca es un error.
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                info!("Acierto de caché para la clave: {key}");
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expirada: se elimina perezosamente.
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserta un valor con TTL explícito (o el TTL por defecto).
    /// Devuelve `false` en modo deshabilitado.
    pub fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> bool {
        if !self.enabled {
            return false;
        }

        let ttl = ttl_secs.map(Duration::from_secs).unwrap_or(self.default_ttl);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }

    /// Elimina una clave concreta. Devuelve `false` en modo deshabilitado.
    pub fn delete(&self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.entries.lock().unwrap().remove(key);
        true
    }

    /// Elimina las claves que casan con el patrón: `*` borra todo y
    /// `prefijo:*` borra por prefijo.
    pub fn clear(&self, pattern: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        if pattern == "*" {
            entries.clear();
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            entries.retain(|k, _| !k.starts_with(prefix));
        } else {
            entries.remove(pattern);
        }
        info!(
            "Caché limpiada con patrón '{pattern}' ({} claves eliminadas)",
            before - entries.len()
        );
        true
    }

    /// Información básica del estado de la caché.
    pub fn stats(&self) -> Value {
        if !self.enabled {
            return json!({
                "enabled": false,
                "message": "Response caching is disabled",
            });
        }

        let entries = self.entries.lock().unwrap();
        let live = entries
            .values()
            .filter(|e| e.expires_at > Instant::now())
            .count();
        json!({
            "enabled": true,
            "total_keys": entries.len(),
            "live_keys": live,
            "default_ttl_seconds": self.default_ttl.as_secs(),
        })
    }

    // ------------------------------------------------------------------
    // Derivación de claves (identidad semántica estable)
    // ------------------------------------------------------------------

    /// Clave para cachear una recuperación RAG por texto de consulta.
    pub fn rag_query_key(query: &str) -> String {
        hashed_key("rag", query)
    }

    /// Clave para cachear un contraargumento por par argumento|contexto.
    /// Reservada para el camino de generación directa (sin recuperación) del
    /// agente de voz; el endpoint de debate usa [`Self::rag_query_key`].
    pub fn debate_response_key(argument: &str, context: &str) -> String {
        hashed_key("debate", &format!("{argument}|{context}"))
    }
}

fn hashed_key(prefix: &str, data: &str) -> String {
    format!("{prefix}:{:x}", Sha256::digest(data.as_bytes()))
}
