//! Concrete LLM backend adapters.
//!
//! Each adapter owns its own wire format and maps it onto the uniform
//! request/response contract of [`crate::provider`].

pub mod azure;
pub mod ollama;

pub use azure::{AzureConfig, AzureOpenAiProvider};
pub use ollama::{OllamaProvider, ollama_config};
