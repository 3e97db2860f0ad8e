//! Generador de contraargumentos aumentado por recuperación (RAG).
//!
//! Flujo en estado Ready:
//!   1. Embedding del argumento del usuario.
//!   2. Recuperación de los 3 chunks más cercanos del índice persistido.
//!   3. Plantilla fija de debate con el contexto concatenado.
//!   4. Respuesta del LLM devuelta tal cual, con confianza 0.85.
//!
//! Si faltan credenciales o el índice no se puede cargar, el motor arranca en
//! modo degradado (terminal hasta reiniciar el proceso) y sirve una respuesta
//! enlatada con confianza 0.3 sin lanzar nunca al llamante.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::llm::LlmManager;
use crate::vector_store::{KnowledgeIndex, SearchHit};

/// Número de chunks recuperados por consulta.
const TOP_K: usize = 3;
/// Confianza fija de una respuesta generada con recuperación.
const RAG_CONFIDENCE: f64 = 0.85;
/// Confianza fija de la respuesta enlatada en modo degradado.
const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Longitud máxima de la vista previa de un chunk recuperado.
const PREVIEW_CHARS: usize = 200;

const FALLBACK_RESPONSE: &str = "I understand your point, but I need my philosophical \
knowledge base to provide a proper counter-argument. Please ensure the system is \
properly configured with OpenAI API key and knowledge base.";

#[derive(Debug, Error)]
pub enum RagError {
    /// El índice no está disponible (modo degradado); el buscador directo
    /// del conocimiento responde 503 en este caso.
    #[error("Knowledge base not available")]
    Unavailable,
    /// Fallo de un colaborador externo (embeddings, índice, LLM). Se captura
    /// en la frontera HTTP sin filtrar detalles internos del proveedor.
    #[error("Fallo aguas arriba: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Intercambio de debate de una petición: respuesta, confianza y trazabilidad
/// de las fuentes recuperadas.
#[derive(Debug, Clone, Serialize)]
pub struct DebateOutcome {
    pub response: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub retrieved_docs: Vec<RetrievedDoc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDoc {
    pub source: String,
    pub content_preview: String,
}

/// Resultado de una búsqueda directa sobre la base de conocimiento.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeHit {
    pub content: String,
    pub metadata: serde_json::Value,
    pub source: String,
}

enum EngineState {
    Ready {
        llm: LlmManager,
        index: Arc<KnowledgeIndex>,
    },
    Degraded {
        reason: String,
    },
}

pub struct DebateEngine {
    state: EngineState,
}

impl DebateEngine {
    /// Inicializa el motor en el arranque del proceso. Nunca falla: cualquier
    /// dependencia ausente deja el motor en modo degradado.
    pub fn initialize(cfg: &AppConfig) -> Self {
        if !cfg.openai_api_key_present {
            warn!("OPENAI_API_KEY no encontrada; el motor RAG arranca degradado");
            return Self::degraded("OpenAI API key not found");
        }

        let index_path = Path::new(&cfg.vector_index_path);
        let index = match KnowledgeIndex::load(index_path) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    "No se pudo cargar el índice vectorial desde {}: {e}. \
                     Ejecute 'prepare-knowledge-base' primero.",
                    index_path.display()
                );
                return Self::degraded("vector index not available");
            }
        };

        let llm = match LlmManager::from_config(cfg) {
            Ok(llm) => llm,
            Err(e) => {
                warn!("No se pudo inicializar el gestor LLM: {e}");
                return Self::degraded("LLM manager initialization failed");
            }
        };

        info!(
            "Motor de debate listo: índice con {} entradas, modelo de chat '{}'",
            index.len(),
            llm.chat_model
        );
        Self {
            state: EngineState::Ready {
                llm,
                index: Arc::new(index),
            },
        }
    }

    fn degraded(reason: &str) -> Self {
        Self {
            state: EngineState::Degraded {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    /// Número de entradas del índice cargado (0 en modo degradado).
    pub fn index_size(&self) -> usize {
        match &self.state {
            EngineState::Ready { index, .. } => index.len(),
            EngineState::Degraded { .. } => 0,
        }
    }

    /// Genera el contraargumento para el argumento del usuario.
    ///
    /// En modo degradado devuelve siempre la respuesta enlatada; los fallos
    /// del camino Ready se propagan como `RagError::Upstream` sin corromper
    /// el estado del motor.
    pub async fn answer(&self, argument: &str) -> Result<DebateOutcome, RagError> {
        let (llm, index) = match &self.state {
            EngineState::Ready { llm, index } => (llm, index),
            EngineState::Degraded { reason } => {
                warn!("RAG no disponible ({reason}); sirviendo respuesta de reserva");
                return Ok(DebateOutcome {
                    response: FALLBACK_RESPONSE.to_string(),
                    confidence: FALLBACK_CONFIDENCE,
                    sources: vec!["system_fallback".to_string()],
                    retrieved_docs: Vec::new(),
                });
            }
        };

        let query_vec = llm.embed_query(argument).await?;
        let hits = index.search(&query_vec, TOP_K)?;

        let context = hits
            .iter()
            .map(|h| h.entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let response = llm.answer_with_context(argument, &context).await?;

        let sources = collect_sources(&hits);
        let retrieved_docs = hits
            .iter()
            .map(|h| RetrievedDoc {
                source: source_basename(&h.entry.source),
                content_preview: content_preview(&h.entry.text),
            })
            .collect();

        info!("Respuesta generada con {} fuentes", sources.len());

        Ok(DebateOutcome {
            response,
            confidence: RAG_CONFIDENCE,
            sources,
            retrieved_docs,
        })
    }

    /// Búsqueda directa sobre la base de conocimiento (sin pasar por el LLM).
    pub async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>, RagError> {
        let (llm, index) = match &self.state {
            EngineState::Ready { llm, index } => (llm, index),
            EngineState::Degraded { .. } => return Err(RagError::Unavailable),
        };

        let query_vec = llm.embed_query(query).await?;
        let hits = index.search(&query_vec, limit)?;

        Ok(hits
            .iter()
            .map(|h| KnowledgeHit {
                content: h.entry.text.clone(),
                metadata: serde_json::json!({
                    "source": h.entry.source,
                    "score": h.score,
                }),
                source: source_basename(&h.entry.source),
            })
            .collect())
    }
}

/// Lista de nombres de documento deduplicada preservando el orden de
/// recuperación.
fn collect_sources(hits: &[SearchHit<'_>]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in hits {
        let basename = source_basename(&hit.entry.source);
        if !sources.contains(&basename) {
            sources.push(basename);
        }
    }
    sources
}

fn source_basename(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string())
}

/// Vista previa truncada a 200 caracteres, con elipsis sólo si hubo recorte.
fn content_preview(text: &str) -> String {
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexEntry;

    fn hit(entry: &IndexEntry, score: f64) -> SearchHit<'_> {
        SearchHit { score, entry }
    }

    #[tokio::test]
    async fn degraded_engine_serves_canned_response() {
        let engine = DebateEngine::degraded("sin índice");
        assert!(!engine.is_ready());
        assert_eq!(engine.index_size(), 0);

        for argument in ["Free will is an illusion", "", "x"] {
            let outcome = engine.answer(argument).await.unwrap();
            assert_eq!(outcome.confidence, 0.3);
            assert_eq!(outcome.sources, vec!["system_fallback".to_string()]);
            assert!(outcome.retrieved_docs.is_empty());
            assert!(!outcome.response.is_empty());
        }
    }

    #[tokio::test]
    async fn degraded_engine_rejects_knowledge_search() {
        let engine = DebateEngine::degraded("sin índice");
        assert!(matches!(
            engine.search_knowledge("justice", 5).await,
            Err(RagError::Unavailable)
        ));
    }

    #[test]
    fn sources_are_deduplicated_in_insertion_order() {
        let entries = vec![
            IndexEntry { text: "a".into(), source: "kb/hume.md".into(), embedding: vec![] },
            IndexEntry { text: "b".into(), source: "kb/kant.md".into(), embedding: vec![] },
            IndexEntry { text: "c".into(), source: "kb/hume.md".into(), embedding: vec![] },
        ];
        let hits: Vec<SearchHit<'_>> =
            entries.iter().map(|e| hit(e, 0.9)).collect();
        assert_eq!(collect_sources(&hits), vec!["hume.md", "kant.md"]);
    }

    #[test]
    fn preview_truncates_with_ellipsis_only_when_needed() {
        let short = "corto";
        assert_eq!(content_preview(short), "corto");

        let long = "x".repeat(250);
        let preview = content_preview(&long);
        assert_eq!(preview.chars().count(), 203);
        assert!(preview.ends_with("..."));

        let exact = "y".repeat(200);
        assert_eq!(content_preview(&exact), exact);
    }
}
