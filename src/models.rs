//! Modelos de dominio (documentos subidos, páginas, chunks y sesiones de voz).

use serde::{Deserialize, Serialize};

/// Metadatos de un fichero subido y almacenado en disco.
/// El `id` es el hash SHA-256 del contenido, por lo que guardar dos veces
/// los mismos bytes es idempotente (mismo id, misma ruta).
#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub size: usize,
    pub mime_type: Option<String>,
}

/// Unidad ordenada dentro de un documento. Para .txt/.md son pseudo-páginas
/// construidas por presupuesto de caracteres; para .pdf son páginas reales.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub page: usize,
    pub content: String,
}

/// Resultado de parsear un documento soportado.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub pages: Vec<Page>,
    pub doc_type: DocumentType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Text,
    Pdf,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
        }
    }
}

/// Trozo de texto derivado de un documento, con atribución de página
/// aproximada e índice dentro del documento (base cero).
#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunk {
    pub text: String,
    pub page: usize,
    pub chunk_index: usize,
}

/// Entrada del índice vectorial persistido: texto del chunk, documento de
/// origen y su embedding. Inmutable tras la construcción del índice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub source: String,
    pub embedding: Vec<f64>,
}

/// Registro de una sesión de voz efímera.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSession {
    pub session_id: String,
    pub room_name: String,
    pub user_identity: String,
    pub participant_name: Option<String>,
    /// Nota: este campo nunca se transiciona a "expired" in situ; la limpieza
    /// perezosa elimina el registro entero.
    pub status: String,
    pub created_at: i64,
    pub expires_at: i64,
}
