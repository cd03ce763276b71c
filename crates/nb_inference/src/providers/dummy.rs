use async_trait::async_trait;
use nb_core::{ChatProvider, EmbeddingProvider, Result, DEFAULT_EMBEDDING_DIM};
use std::collections::HashMap;
use std::fmt;

/// Deterministic offline provider for tests and local runs: embeddings
/// from character statistics, chat completions as a canned report.
pub struct DummyProvider;

impl fmt::Debug for DummyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyProvider").finish()
    }
}

#[async_trait]
impl EmbeddingProvider for DummyProvider {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0; DEFAULT_EMBEDDING_DIM];
        let text_len = text.len().max(1) as f32;
        embedding[0] = text_len / 1000.0;

        let mut char_freq = HashMap::new();
        for c in text.chars() {
            *char_freq.entry(c).or_insert(0usize) += 1;
        }
        for (i, (_, count)) in char_freq.into_iter().enumerate().take(DEFAULT_EMBEDDING_DIM - 1) {
            embedding[i + 1] = count as f32 / text_len;
        }

        Ok(embedding)
    }
}

#[async_trait]
impl ChatProvider for DummyProvider {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        // A minimal well-formed final report; good enough to exercise
        // the orchestration path end to end without a real model.
        let lead: String = prompt.split_whitespace().take(12).collect::<Vec<_>>().join(" ");
        Ok(format!(
            concat!(
                "{{\"full_report_content\": \"Offline briefing stub generated without a ",
                "language model. Prompt lead: {}\", ",
                "\"summary\": \"Offline briefing stub.\", ",
                "\"user_profile_references\": \"n/a\", ",
                "\"key_directions\": {{\"market_sentiment\": \"neutral\", \"recommendations\": []}}, ",
                "\"related_stocks\": [], ",
                "\"ai_impact_score\": \"low\", ",
                "\"news_articles\": []}}"
            ),
            lead.replace('"', "'")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_sized() {
        let provider = DummyProvider;
        let a = provider.embed_text("Test text").await.unwrap();
        let b = provider.embed_text("Test text").await.unwrap();
        assert_eq!(a.len(), DEFAULT_EMBEDDING_DIM);
        assert_eq!(a[0], b[0]);
        assert!(a[0] > 0.0);
    }

    #[tokio::test]
    async fn completion_is_valid_report_json() {
        let provider = DummyProvider;
        let output = provider.complete("please generate a briefing").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(!value["full_report_content"].as_str().unwrap().is_empty());
    }
}
