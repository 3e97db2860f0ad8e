//! Constructor offline del índice de conocimiento.
//!
//! Recorre el directorio de la base de conocimiento, trocea cada documento
//! markdown con ventanas más grandes que las de subida (para preservar la
//! coherencia de los argumentos filosóficos), calcula los embeddings y
//! persiste el índice completo en disco. No existe actualización parcial:
//! cualquier cambio exige reconstruir el índice entero.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use debate_rag_webapp::{
    config::AppConfig,
    ingest,
    llm::LlmManager,
    models::IndexEntry,
    vector_store::KnowledgeIndex,
};

/// Ventana de chunking para la base de conocimiento, en palabras.
const KB_CHUNK_SIZE: usize = 1000;
const KB_CHUNK_OVERLAP: usize = 100;
/// Tamaño de lote para las llamadas de embeddings.
const EMBED_BATCH_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    if !cfg.openai_api_key_present {
        return Err(anyhow!(
            "Falta OPENAI_API_KEY; no se pueden calcular embeddings"
        ));
    }

    let kb_dir = Path::new(&cfg.knowledge_base_dir);
    if !kb_dir.is_dir() {
        return Err(anyhow!(
            "El directorio de la base de conocimiento no existe: {}. \
             Coloque ahí sus textos filosóficos en markdown.",
            kb_dir.display()
        ));
    }

    info!("Iniciando la construcción de la base de conocimiento...");
    let llm = LlmManager::from_config(&cfg)?;

    // 1) Recolectar y trocear todos los documentos markdown.
    let mut chunk_pairs: Vec<(String, String)> = Vec::new();
    let mut documents_loaded = 0usize;

    for entry in WalkDir::new(kb_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let parsed = match ingest::parse_document(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Saltando {}: {e}", path.display());
                continue;
            }
        };

        let chunks = ingest::chunk_document(
            &parsed.content,
            &parsed.pages,
            KB_CHUNK_SIZE,
            KB_CHUNK_OVERLAP,
        );
        if chunks.is_empty() {
            warn!("Documento vacío o sin texto útil: {}", path.display());
            continue;
        }

        documents_loaded += 1;
        let source = path.to_string_lossy().to_string();
        chunk_pairs.extend(chunks.into_iter().map(|c| (source.clone(), c.text)));
    }

    if documents_loaded == 0 {
        return Err(anyhow!(
            "No se encontraron ficheros markdown en {}",
            kb_dir.display()
        ));
    }
    info!(
        "Cargados {documents_loaded} documentos ({} chunks)",
        chunk_pairs.len()
    );

    // 2) Embeddings por lotes.
    let mut entries: Vec<IndexEntry> = Vec::with_capacity(chunk_pairs.len());
    for (batch_idx, batch) in chunk_pairs.chunks(EMBED_BATCH_SIZE).enumerate() {
        info!(
            "Calculando embeddings del lote {}/{}",
            batch_idx + 1,
            chunk_pairs.len().div_ceil(EMBED_BATCH_SIZE)
        );
        let embedded = llm
            .embed_chunks(batch)
            .await
            .context("Fallo calculando embeddings")?;
        entries.extend(embedded.into_iter().map(|e| IndexEntry {
            text: e.text,
            source: e.source,
            embedding: e.vector,
        }));
    }

    // 3) Persistir el índice completo.
    let index = KnowledgeIndex::new(cfg.llm_embedding_model.clone(), entries);
    let index_path = Path::new(&cfg.vector_index_path);
    index.save(index_path)?;

    info!(
        "✅ Base de conocimiento creada y guardada en {}",
        index_path.display()
    );
    Ok(())
}
