//! Shared LLM provider clients (Ollama/OpenAI) with a unified error
//! surface, health probing, and cached fast/slow/embedding profiles.
//!
//! This crate is the transport layer other crates in the workspace build
//! on: the embedding client's retry policy and the answer composer's chat
//! calls both go through [`service_profiles::LlmServiceProfiles`].

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

/// Convenience re-export matching this crate's doc examples.
pub mod llm {
    pub use crate::config::llm_model_config::LlmModelConfig;
    pub use crate::config::llm_provider::LlmProvider;
}
