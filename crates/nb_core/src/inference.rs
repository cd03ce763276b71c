use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Provider-agnostic embedding capability. Implementations raise on
/// provider errors; callers decide the fallback policy.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Embed a piece of text into a fixed-dimension vector.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Provider-agnostic chat capability. Output is free text that often
/// carries JSON, optionally wrapped in fenced code blocks.
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Complete a prompt into a text response.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
