//! Compañero de debate con IA: pipeline RAG sobre una base de conocimiento
//! filosófica, registro de sesiones de voz y puente de voz hacia el mismo
//! generador.

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod rag;
pub mod session;
pub mod vector_store;
pub mod voice_agent;
