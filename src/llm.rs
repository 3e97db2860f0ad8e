//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use crate::config::{AppConfig, LlmProvider};
use anyhow::{anyhow, Result};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

/// Encuadre fijo del oponente de debate. La respuesta del modelo se devuelve
/// tal cual al llamante, sin post-procesado.
pub const DEBATE_SYSTEM_PROMPT: &str = "\
You are an expert philosophical debate opponent. Your role is to challenge the user's argument with well-reasoned counter-arguments based on established philosophical positions.

Instructions:
1. Analyze the user's argument carefully
2. Use the provided philosophical context to construct a strong counter-argument
3. Reference specific philosophical concepts, thinkers, or schools of thought when relevant
4. Be intellectually rigorous but accessible
5. Challenge assumptions and point out potential weaknesses
6. Maintain a respectful but assertive debate tone
7. Keep your response focused and under 200 words";

/// Resultado de un embedding de un chunk.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub source: String,
    pub text: String,
    pub vector: Vec<f64>,
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    /// Calcula embeddings para una lista de (documento_origen, texto).
    ///
    /// Nota: sólo implementado para OpenAI. Para otros proveedores
    /// se podrían añadir ramas adicionales al `match`.
    pub async fn embed_chunks(
        &self,
        chunks: &[(String, String)],
    ) -> Result<Vec<EmbeddedChunk>> {
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(chunks).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }

    /// Embedding de una consulta individual del usuario.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        let embedded = self
            .embed_chunks(&[("query".to_string(), text.to_string())])
            .await?;
        embedded
            .into_iter()
            .next()
            .map(|e| e.vector)
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la consulta"))
    }

    async fn embed_with_openai(
        &self,
        chunks: &[(String, String)],
    ) -> Result<Vec<EmbeddedChunk>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        // Cliente OpenAI de Rig
        let client = openai::Client::from_env();

        // Modelo de embeddings: config o default
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);

        // Extraemos sólo los textos
        let texts: Vec<String> = chunks.iter().map(|(_, text)| text.clone()).collect();

        // Embeddings en bloque (.embed_texts viene de EmbeddingModel)
        let embeddings = embedding_model.embed_texts(texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                embeddings.len(),
                chunks.len()
            ));
        }

        // Reconstruimos EmbeddedChunk con origen + texto + vector
        let mut result = Vec::new();
        for ((source, text), emb) in chunks.iter().zip(embeddings.iter()) {
            result.push(EmbeddedChunk {
                source: source.clone(),
                text: text.clone(),
                vector: emb.vec.clone(),
            });
        }

        Ok(result)
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    /// Genera el contraargumento a partir del argumento del usuario y el
    /// contexto recuperado (concatenación de los chunks relevantes).
    pub async fn answer_with_context(
        &self,
        argument: &str,
        context: &str,
    ) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.answer_with_openai(argument, context).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }

    async fn answer_with_openai(
        &self,
        argument: &str,
        context: &str,
    ) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let full_context = format!(
            "Context from philosophical knowledge base:\n{}\n\nUser's argument: {}",
            context, argument
        );

        let agent = client
            .agent(model_name)
            .preamble(DEBATE_SYSTEM_PROMPT)
            .context(&full_context)
            .build();

        let answer = agent.prompt(argument).await?;
        Ok(answer)
    }

    /// Variante simplificada usada por el agente de voz: construye su propio
    /// prompt con el argumento y un contexto libre opcional y llama al modelo
    /// de chat directamente, sin recuperación vectorial.
    pub async fn generate_debate_response(
        &self,
        user_argument: &str,
        context: Option<&str>,
    ) -> Result<String> {
        use rig::providers::openai;
        use rig::client::CompletionClient as _;

        if !matches!(self.provider, LlmProvider::OpenAI) {
            return Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                self.provider
            ));
        }

        let client = openai::Client::from_env();
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let user_prompt = match context {
            Some(ctx) if !ctx.trim().is_empty() => format!(
                "User's argument: {user_argument}\n\nPhilosophical context:\n{ctx}\n\nYour counter-argument:"
            ),
            _ => format!("User's argument: {user_argument}\n\nYour counter-argument:"),
        };

        let agent = client
            .agent(model_name)
            .preamble(DEBATE_SYSTEM_PROMPT)
            .build();

        let answer = agent.prompt(user_prompt.as_str()).await?;
        Ok(answer)
    }
}
