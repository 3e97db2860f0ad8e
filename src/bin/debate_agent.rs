//! Agente de debate por voz: proceso independiente del servidor HTTP.
//!
//! Se une a una sala de audio con un token firmado, saluda y responde a cada
//! intervención transcrita con un contraargumento del generador. La
//! transcripción y la locución corren a cargo de proveedores externos que
//! alimentan/consumen los canales del puente; en este binario las
//! transcripciones llegan por stdin (una intervención por línea) y las
//! respuestas salen por el canal de respuestas, lo que permite ejercitar el
//! pipeline completo sin la pila de audio.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use livekit_api::access_token::{AccessToken, VideoGrants};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use debate_rag_webapp::{
    config::AppConfig,
    llm::LlmManager,
    voice_agent::{
        run_bridge, DebateResponder, SpokenReply, TranscriptionEvent, WELCOME_MESSAGE,
    },
};

const DEFAULT_DEBATE_ENDPOINT: &str = "http://localhost:8000/api/debate/test";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    // Las credenciales de sala son imprescindibles para este proceso.
    let (api_key, api_secret, livekit_url) = match (
        &cfg.livekit_api_key,
        &cfg.livekit_api_secret,
        &cfg.livekit_url,
    ) {
        (Some(k), Some(s), Some(u)) => (k.clone(), s.clone(), u.clone()),
        _ => {
            return Err(anyhow!(
                "Faltan variables de entorno obligatorias: LIVEKIT_URL, \
                 LIVEKIT_API_KEY y LIVEKIT_API_SECRET"
            ));
        }
    };

    let room_name =
        env::var("AGENT_ROOM").map_err(|_| anyhow!("Falta AGENT_ROOM en el entorno"))?;

    // Estrategia de generación: endpoint HTTP del servidor (por defecto) o
    // modelo directo sin recuperación.
    let responder = match env::var("DEBATE_RESPONDER").as_deref() {
        Ok("direct") => DebateResponder::direct_model(LlmManager::from_config(&cfg)?),
        _ => {
            let endpoint = env::var("DEBATE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_DEBATE_ENDPOINT.to_string());
            DebateResponder::http_endpoint(endpoint)
        }
    };

    // Token propio del agente para unirse a la sala.
    let token = AccessToken::with_api_key(&api_key, &api_secret)
        .with_identity("debate-agent")
        .with_name("AI Debate Partner")
        .with_grants(VideoGrants {
            room_join: true,
            room: room_name.clone(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        })
        .with_ttl(Duration::from_secs(cfg.voice_session_timeout))
        .to_jwt()
        .map_err(|e| anyhow!("No se pudo firmar el token del agente: {e}"))?;

    info!(
        "Conectando a la sala '{room_name}' en {livekit_url} (token de {} bytes)",
        token.len()
    );

    let (transcript_tx, transcript_rx) = broadcast::channel::<TranscriptionEvent>(256);
    let (reply_tx, mut reply_rx) = mpsc::channel::<SpokenReply>(16);

    // Salida de la sala: locución + mensaje de datos por el canal lateral.
    let output_task = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            info!("[{}] dice: {}", reply.room_name, reply.text);
            info!("[{}] datos: {}", reply.room_name, reply.data_payload);
        }
    });

    // Saludo inicial antes de atender intervenciones.
    reply_tx
        .send(SpokenReply {
            room_name: room_name.clone(),
            text: WELCOME_MESSAGE.to_string(),
            data_payload: serde_json::json!({ "type": "greeting" }),
        })
        .await
        .ok();

    // Entrada de transcripciones: una intervención por línea de stdin.
    let stdin_room = room_name.clone();
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = TranscriptionEvent {
                room_name: stdin_room.clone(),
                speaker_identity: "participant".to_string(),
                text: line,
            };
            if transcript_tx.send(event).is_err() {
                break;
            }
        }
        info!("Entrada de transcripciones agotada");
    });

    info!("Agente de debate listo y esperando intervenciones");
    run_bridge(&responder, transcript_rx, reply_tx).await;

    if let Err(e) = stdin_task.await {
        error!("La tarea de entrada terminó con error: {e}");
    }
    output_task.await.ok();

    info!("✅ Agente de debate cerrado correctamente.");
    Ok(())
}
