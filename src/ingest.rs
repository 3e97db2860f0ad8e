//! Ingesta de documentos subidos: almacenamiento con hash de contenido,
//! parseo por tipo (texto/markdown/PDF), paginación y chunking por ventanas
//! de palabras con solapamiento.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mime_guess::MimeGuess;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{DocumentChunk, DocumentType, Page, ParsedDocument, SavedFile};

/// Presupuesto de caracteres para cada pseudo-página de un fichero de texto.
pub const CHARS_PER_PAGE: usize = 2000;
/// Tamaño de ventana por defecto del chunking, en palabras.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Solapamiento por defecto entre ventanas consecutivas, en palabras.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Tipo de fichero no soportado: {0}")]
    UnsupportedFormat(String),
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
    #[error("No se pudo extraer texto del PDF: {0}")]
    Pdf(String),
}

/// Almacén en disco de documentos subidos, identificados por hash de contenido.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    upload_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)
            .with_context(|| format!("No se pudo crear {}", upload_dir.display()))?;
        Ok(Self { upload_dir })
    }

    /// Guarda un fichero subido bajo `{sha256}_{nombre_saneado}`.
    /// Contenido idéntico con el mismo nombre sobreescribe la misma ruta.
    pub fn save_file(&self, filename: &str, content: &[u8]) -> Result<SavedFile> {
        let file_hash = format!("{:x}", Sha256::digest(content));
        let safe_filename = sanitize_filename(filename);
        let file_path = self.upload_dir.join(format!("{file_hash}_{safe_filename}"));

        fs::write(&file_path, content)
            .with_context(|| format!("No se pudo escribir {}", file_path.display()))?;

        info!("Fichero guardado: {}", file_path.display());

        Ok(SavedFile {
            id: file_hash,
            filename: safe_filename,
            path: file_path.to_string_lossy().to_string(),
            size: content.len(),
            mime_type: MimeGuess::from_path(&file_path).first().map(|m| m.to_string()),
        })
    }

    /// Elimina cualquier fichero cuyo nombre empiece por `{id}_`.
    /// Devuelve `true` si se encontró y borró alguno.
    pub fn delete_document(&self, file_id: &str) -> Result<bool> {
        let prefix = format!("{file_id}_");
        for entry in fs::read_dir(&self.upload_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) {
                fs::remove_file(entry.path())?;
                info!("Documento eliminado: {}", entry.path().display());
                return Ok(true);
            }
        }
        Ok(false)
    }

}

/// Sanea un nombre de fichero al conjunto seguro `[A-Za-z0-9._-]`.
/// Es idempotente: sanear dos veces produce el mismo resultado.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parsea un documento según su extensión. Cualquier fallo se devuelve como
/// valor, nunca como pánico.
pub fn parse_document(path: &Path) -> Result<ParsedDocument, ParseError> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "txt" | "md" => parse_text_file(path),
        "pdf" => parse_pdf_file(path),
        other => Err(ParseError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn parse_text_file(path: &Path) -> Result<ParsedDocument, ParseError> {
    let content = fs::read_to_string(path)?;
    let pages = split_into_pages(&content, CHARS_PER_PAGE);
    Ok(ParsedDocument {
        content,
        pages,
        doc_type: DocumentType::Text,
    })
}

fn parse_pdf_file(path: &Path) -> Result<ParsedDocument, ParseError> {
    let raw_pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| ParseError::Pdf(e.to_string()))?;

    // Las páginas sin texto extraíble (escaneos, portadas) se descartan.
    let pages: Vec<Page> = raw_pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(idx, text)| Page {
            page: idx + 1,
            content: text,
        })
        .collect();

    let content = pages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ParsedDocument {
        content,
        pages,
        doc_type: DocumentType::Pdf,
    })
}

/// Divide texto plano en pseudo-páginas acumulando líneas hasta superar el
/// presupuesto de caracteres.
pub fn split_into_pages(content: &str, chars_per_page: usize) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut current_length = 0usize;
    let mut page_num = 1usize;

    for line in content.split('\n') {
        let line_length = line.len();
        if current_length + line_length > chars_per_page && !current_lines.is_empty() {
            pages.push(Page {
                page: page_num,
                content: current_lines.join("\n"),
            });
            current_lines = vec![line];
            current_length = line_length;
            page_num += 1;
        } else {
            current_lines.push(line);
            current_length += line_length;
        }
    }

    if !current_lines.is_empty() {
        pages.push(Page {
            page: page_num,
            content: current_lines.join("\n"),
        });
    }

    pages
}

/// Divide el contenido en chunks por ventana deslizante de palabras.
/// El paso es `chunk_size - chunk_overlap`, acotado a un mínimo de 1 palabra
/// para que un solapamiento mal configurado no produzca un bucle infinito.
/// Se emite una ventana por cada inicio `0, paso, 2*paso, ...` menor que el
/// total de palabras; cuando el paso divide exactamente, la última ventana
/// queda contenida en la anterior.
pub fn chunk_document(
    content: &str,
    pages: &[Page],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);
    if stride == 1 && chunk_overlap >= chunk_size {
        warn!(
            "chunk_overlap ({chunk_overlap}) >= chunk_size ({chunk_size}); \
             paso acotado a 1 palabra"
        );
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        let chunk_text = words[start..end].join(" ");
        let chunk_page = find_page_for_text(&chunk_text, pages);

        chunks.push(DocumentChunk {
            text: chunk_text,
            page: chunk_page,
            chunk_index: chunks.len(),
        });

        start += stride;
    }

    info!("Creados {} chunks del documento", chunks.len());
    chunks
}

/// Atribución de página best-effort: primera página cuyo texto contiene los
/// primeros 100 caracteres del chunk; si no hay coincidencia, la primera.
fn find_page_for_text(text: &str, pages: &[Page]) -> usize {
    if pages.is_empty() {
        return 1;
    }

    let sample: String = text.chars().take(100).collect();
    for page in pages {
        if page.content.contains(&sample) {
            return page.page;
        }
    }

    pages[0].page
}
