//! Índice vectorial local persistido en disco.
//!
//! API pública:
//!   - `KnowledgeIndex::load(&Path)` / `save(&Path)`
//!   - `KnowledgeIndex::search(&[f64], usize)` — top-k por similitud coseno.
//!
//! El índice se construye offline con el binario `prepare-knowledge-base` y
//! el servidor lo carga una única vez en el arranque; no existe ruta de
//! escritura en tiempo de petición (cualquier cambio exige reconstruirlo
//! entero).

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::IndexEntry;

/// Índice completo: modelo de embeddings usado, fecha de construcción y
/// entradas (texto + documento de origen + vector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    pub embedding_model: String,
    pub created_at: String,
    pub entries: Vec<IndexEntry>,
}

/// Resultado de una búsqueda: puntuación coseno y entrada coincidente.
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub score: f64,
    pub entry: &'a IndexEntry,
}

impl KnowledgeIndex {
    pub fn new(embedding_model: impl Into<String>, entries: Vec<IndexEntry>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            created_at: Utc::now().to_rfc3339(),
            entries,
        }
    }

    /// Carga el índice desde su fichero JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer el índice en {}", path.display()))?;
        let index: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Índice corrupto en {}", path.display()))?;
        info!(
            "Índice vectorial cargado: {} entradas (modelo '{}')",
            index.entries.len(),
            index.embedding_model
        );
        Ok(index)
    }

    /// Persiste el índice entero, creando el directorio padre si hace falta.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(self)?;
        fs::write(path, raw)
            .with_context(|| format!("No se pudo escribir el índice en {}", path.display()))?;
        info!(
            "Índice vectorial guardado en {} ({} entradas)",
            path.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Devuelve las `top_k` entradas más cercanas al vector de consulta,
    /// ordenadas por puntuación descendente.
    pub fn search(&self, query_vec: &[f64], top_k: usize) -> Result<Vec<SearchHit<'_>>> {
        if query_vec.is_empty() {
            return Err(anyhow!("El vector de consulta está vacío"));
        }

        let mut scored: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                score: cosine_similarity(query_vec, &entry.embedding),
                entry,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
