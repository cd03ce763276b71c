//! Cached provider clients, keyed by provider, model and temperature.
//!
//! The registry is an explicit object handed to constructors rather than
//! a process-global singleton. It is read-mostly: entries are created
//! lazily on first request and reused for the life of the process.

use crate::providers::{DummyProvider, OpenAiProvider};
use nb_core::{ChatProvider, EmbeddingProvider, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Dummy,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
    pub temperature: Option<f32>,
}

impl ProviderConfig {
    pub fn dummy() -> Self {
        Self {
            kind: ProviderKind::Dummy,
            api_key: None,
            base_url: None,
            chat_model: None,
            embedding_model: None,
            temperature: None,
        }
    }

    pub fn openai(api_key: String) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: Some(api_key),
            base_url: None,
            chat_model: None,
            embedding_model: None,
            temperature: None,
        }
    }

    fn cache_key(&self) -> String {
        format!(
            "{:?}_{}_{}_{}",
            self.kind,
            self.chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL),
            self.embedding_model
                .as_deref()
                .unwrap_or(DEFAULT_EMBEDDING_MODEL),
            self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        )
    }
}

#[derive(Default)]
pub struct ClientRegistry {
    chat: RwLock<HashMap<String, Arc<dyn ChatProvider>>>,
    embedding: RwLock<HashMap<String, Arc<dyn EmbeddingProvider>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chat_model(&self, config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
        let key = config.cache_key();
        if let Some(client) = self.chat.read().expect("registry lock").get(&key) {
            return Ok(client.clone());
        }
        let client: Arc<dyn ChatProvider> = match config.kind {
            ProviderKind::Dummy => Arc::new(DummyProvider),
            ProviderKind::OpenAi => Arc::new(build_openai(config)?),
        };
        self.chat
            .write()
            .expect("registry lock")
            .entry(key)
            .or_insert(client.clone());
        Ok(client)
    }

    pub fn embedding_model(&self, config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let key = config.cache_key();
        if let Some(client) = self.embedding.read().expect("registry lock").get(&key) {
            return Ok(client.clone());
        }
        let client: Arc<dyn EmbeddingProvider> = match config.kind {
            ProviderKind::Dummy => Arc::new(DummyProvider),
            ProviderKind::OpenAi => Arc::new(build_openai(config)?),
        };
        self.embedding
            .write()
            .expect("registry lock")
            .entry(key)
            .or_insert(client.clone());
        Ok(client)
    }
}

fn build_openai(config: &ProviderConfig) -> Result<OpenAiProvider> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Inference("API key for OpenAI provider is not set".to_string()))?;
    Ok(OpenAiProvider::new(
        api_key,
        config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        config
            .chat_model
            .clone()
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        config
            .embedding_model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_clients_are_cached_per_key() {
        let registry = ClientRegistry::new();
        let config = ProviderConfig::dummy();
        let a = registry.chat_model(&config).unwrap();
        let b = registry.chat_model(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn openai_without_key_is_an_error() {
        let registry = ClientRegistry::new();
        let mut config = ProviderConfig::openai(String::new());
        config.api_key = Some(String::new());
        assert!(registry.chat_model(&config).is_err());
    }

    #[test]
    fn distinct_temperatures_get_distinct_clients() {
        let registry = ClientRegistry::new();
        let mut warm = ProviderConfig::dummy();
        warm.temperature = Some(0.9);
        let cold = ProviderConfig::dummy();
        let a = registry.chat_model(&warm).unwrap();
        let b = registry.chat_model(&cold).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
