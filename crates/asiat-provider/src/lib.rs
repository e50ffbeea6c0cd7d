//! Model gateway clients for ASIAT.
//!
//! Every backend implements [`asiat_core::provider::ProviderClient`]; use
//! [`ProviderClientFactory::create_client`] to pick one from configuration.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod http;
pub mod models;
pub mod ollama;
pub mod openai;

pub use client::{ProviderClientFactory, ProviderKind};
pub use error::{ProviderError, Result};
pub use fallback::FallbackProviderClient;
