//! Puente de voz: une la sala de audio en tiempo real con el generador de
//! contraargumentos.
//!
//! El responder es una etapa explícita del pipeline, compuesta en
//! construcción entre la transcripción y la generación (nada de parchear el
//! chat del agente en caliente). Existen dos estrategias intercambiables para
//! el mismo contrato del generador: llamar al endpoint HTTP de debate del
//! servidor, o llamar directamente al modelo de chat sin recuperación.

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::llm::LlmManager;

/// Saludo que el agente pronuncia al entrar en la sala.
pub const WELCOME_MESSAGE: &str = "Welcome to the AI Debate Arena! I'm your \
philosophical opponent. Present your argument, and I'll challenge it with \
reasoned counter-arguments.";

/// Evento emitido cuando el agente transcribe el habla de un participante.
#[derive(Debug, Clone)]
pub struct TranscriptionEvent {
    pub room_name: String,
    pub speaker_identity: String,
    pub text: String,
}

/// Respuesta saliente: se locuta en la sala y se publica como mensaje de
/// datos por el canal lateral.
#[derive(Debug, Clone)]
pub struct SpokenReply {
    pub room_name: String,
    pub text: String,
    pub data_payload: serde_json::Value,
}

/// Estrategia de generación del contraargumento, elegida al construir el
/// agente. Ambas cumplen el mismo contrato y nunca fallan hacia el pipeline:
/// cualquier problema se degrada a una frase de cortesía.
pub enum DebateResponder {
    /// Reenvía el argumento al endpoint `/api/debate/test` del servidor.
    HttpEndpoint {
        client: reqwest::Client,
        endpoint: String,
    },
    /// Llama al modelo de chat directamente, sin recuperación vectorial.
    DirectModel { llm: LlmManager },
}

impl DebateResponder {
    pub fn http_endpoint(endpoint: impl Into<String>) -> Self {
        Self::HttpEndpoint {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn direct_model(llm: LlmManager) -> Self {
        Self::DirectModel { llm }
    }

    /// Genera el contraargumento para una intervención transcrita.
    pub async fn respond(&self, user_argument: &str) -> String {
        match self {
            Self::HttpEndpoint { client, endpoint } => {
                respond_via_endpoint(client, endpoint, user_argument).await
            }
            Self::DirectModel { llm } => {
                match llm.generate_debate_response(user_argument, None).await {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Fallo del modelo directo: {e}");
                        "Let me think about that for a moment...".to_string()
                    }
                }
            }
        }
    }
}

async fn respond_via_endpoint(
    client: &reqwest::Client,
    endpoint: &str,
    user_argument: &str,
) -> String {
    let result = client
        .post(endpoint)
        .json(&json!({
            "content": user_argument,
            "user_id": "voice_agent",
        }))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            match response.json::<serde_json::Value>().await {
                Ok(body) => body
                    .get("response")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        "I need a moment to formulate my response.".to_string()
                    }),
                Err(e) => {
                    error!("Respuesta del endpoint de debate ilegible: {e}");
                    "I need a moment to formulate my response.".to_string()
                }
            }
        }
        Ok(response) => {
            error!(
                "El endpoint de debate devolvió el estado {}",
                response.status()
            );
            "I'm having trouble accessing my philosophical knowledge right now.".to_string()
        }
        Err(e) => {
            error!("Error generando el contraargumento: {e}");
            "Let me think about that for a moment...".to_string()
        }
    }
}

/// Bucle principal del puente: consume transcripciones y emite una respuesta
/// por intervención. Las llamadas al generador son estrictamente secuenciales
/// por sala; no hay solapamiento ni cancelación de llamadas en vuelo.
pub async fn run_bridge(
    responder: &DebateResponder,
    mut transcripts: broadcast::Receiver<TranscriptionEvent>,
    replies: mpsc::Sender<SpokenReply>,
) {
    loop {
        let event = match transcripts.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("El puente de voz se retrasó; {skipped} transcripciones perdidas");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Canal de transcripciones cerrado; el puente termina");
                return;
            }
        };

        if event.text.trim().is_empty() {
            continue;
        }

        info!(
            "Transcripción de '{}' en {}: {}",
            event.speaker_identity, event.room_name, event.text
        );

        let counter_argument = responder.respond(&event.text).await;
        let reply = SpokenReply {
            room_name: event.room_name.clone(),
            data_payload: json!({
                "type": "counter_argument",
                "in_reply_to": event.speaker_identity,
                "text": counter_argument,
            }),
            text: counter_argument,
        };

        if replies.send(reply).await.is_err() {
            info!("Canal de respuestas cerrado; el puente termina");
            return;
        }
    }
}
