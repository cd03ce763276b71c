//! The closed set of agents the orchestrator can dispatch to, each a
//! thin adapter from a JSON input to one pipeline component.

use crate::prompts;
use nb_core::json::extract_json;
use nb_core::{
    Article, ChatProvider, Error, ProfileStore, RankedCandidate, Result, UserProfile,
};
use nb_ingest::{IngestOptions, NewsIngestionPipeline};
use nb_ranking::{RankingEngine, RankingOptions};
use nb_storage::{VectorEntityStore, VectorStore};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Every tool the orchestrator may call. Closed by construction;
/// dispatch goes through [`AgentSet::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Profiler,
    Fetcher,
    Filter,
    Analyzer,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Profiler,
        AgentKind::Fetcher,
        AgentKind::Filter,
        AgentKind::Analyzer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Profiler => "user_profiler",
            AgentKind::Fetcher => "news_fetcher",
            AgentKind::Filter => "news_filter",
            AgentKind::Analyzer => "news_analyzer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentKind::Profiler => {
                "Look up the user's profile and interests. Input: {\"user_id\": <id>}"
            }
            AgentKind::Fetcher => {
                "Fetch the latest articles from all due news sources. Input: {} or {\"limit\": <n>}"
            }
            AgentKind::Filter => {
                "Filter and rank stored news for the user. Input: {\"user_id\": <id>, \"max_articles\": <n>}"
            }
            AgentKind::Analyzer => {
                "Analyze ranked articles for sentiment, stocks and trends. Input: the news_filter result"
            }
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// One line per tool, for the system prompt.
    pub fn listing() -> String {
        Self::ALL
            .iter()
            .map(|k| format!("- {}: {}", k.name(), k.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct UserProfilerAgent<P> {
    profiles: Arc<dyn ProfileStore>,
    vectors: Arc<VectorStore<UserProfile, P>>,
}

impl<P> UserProfilerAgent<P>
where
    P: VectorEntityStore<UserProfile>,
{
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        vectors: Arc<VectorStore<UserProfile, P>>,
    ) -> Self {
        Self { profiles, vectors }
    }

    /// Resolve the profile, creating a defaulted one when absent, and
    /// recompute its interest embedding when missing or a refresh is
    /// requested.
    pub async fn invoke(&self, input: Value) -> Result<Value> {
        let user_id = require_user_id(&input)?;
        let profile = self.profiles.get_or_create(user_id).await?;
        let refresh = input
            .get("refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !profile.embedded || refresh {
            let done = self
                .vectors
                .upsert(user_id, &profile.embedding_text())
                .await?;
            if !done {
                warn!(user_id, "interest embedding could not be computed");
            }
        }

        let profile = self.profiles.get_or_create(user_id).await?;
        Ok(json!({
            "user_id": profile.user_id,
            "self_portrait": profile.self_portrait,
            "preferred_topics": profile.preferred_topics,
            "excluded_topics": profile.excluded_topics,
            "embedded": profile.embedded,
        }))
    }
}

pub struct NewsFetcherAgent<S> {
    pipeline: Arc<NewsIngestionPipeline<S>>,
}

impl<S> NewsFetcherAgent<S>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
{
    pub fn new(pipeline: Arc<NewsIngestionPipeline<S>>) -> Self {
        Self { pipeline }
    }

    pub async fn invoke(&self, input: Value) -> Result<Value> {
        let mut options = IngestOptions::default();
        if let Some(limit) = input.get("limit").and_then(Value::as_u64) {
            options.limit = limit as usize;
        }
        if let Some(force) = input.get("force_refresh").and_then(Value::as_bool) {
            options.force_refresh = force;
        }
        let outcome = self.pipeline.run(options).await?;
        info!(fetched = outcome.fetched, "fetch step complete");
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct NewsFilterAgent<S> {
    engine: Arc<RankingEngine<S>>,
}

impl<S> NewsFilterAgent<S>
where
    S: VectorEntityStore<Article>,
{
    pub fn new(engine: Arc<RankingEngine<S>>) -> Self {
        Self { engine }
    }

    pub async fn invoke(&self, input: Value) -> Result<Value> {
        let user_id = require_user_id(&input)?;
        let mut options = RankingOptions::default();
        if let Some(max) = input.get("max_articles").and_then(Value::as_u64) {
            options.max_articles = max as usize;
        }
        if let Some(rr) = input.get("re_ranking").and_then(Value::as_bool) {
            options.re_ranking = rr;
        }
        let outcome = self.engine.rank(user_id, None, options).await?;
        info!(
            user_id,
            selected = outcome.candidates.len(),
            "filter step complete"
        );
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct NewsAnalyzerAgent {
    chat: Arc<dyn ChatProvider>,
}

impl NewsAnalyzerAgent {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }

    /// Batch-analyze ranked candidates. Unparseable model output is not
    /// a failure; the raw text is carried under `raw_analysis`.
    pub async fn invoke(&self, input: Value) -> Result<Value> {
        let candidates: Vec<RankedCandidate> = input
            .get("candidates")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let profile: UserProfile = input
            .get("user_profile")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| UserProfile::new(0));

        if candidates.is_empty() {
            return Ok(json!({"raw_analysis": "no articles to analyze"}));
        }

        let output = self
            .chat
            .complete(&prompts::analyzer(&profile, &candidates))
            .await?;
        match extract_json(&output) {
            Some(Value::Object(map)) => Ok(Value::Object(map)),
            _ => {
                warn!("analysis output was not structured JSON");
                Ok(json!({"raw_analysis": output}))
            }
        }
    }
}

/// The explicit dispatch table over the closed agent set.
pub struct AgentSet<S, P> {
    pub profiler: UserProfilerAgent<P>,
    pub fetcher: NewsFetcherAgent<S>,
    pub filter: NewsFilterAgent<S>,
    pub analyzer: NewsAnalyzerAgent,
}

impl<S, P> AgentSet<S, P>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
    P: VectorEntityStore<UserProfile>,
{
    pub async fn invoke(&self, kind: AgentKind, input: Value) -> Result<Value> {
        match kind {
            AgentKind::Profiler => self.profiler.invoke(input).await,
            AgentKind::Fetcher => self.fetcher.invoke(input).await,
            AgentKind::Filter => self.filter.invoke(input).await,
            AgentKind::Analyzer => self.analyzer.invoke(input).await,
        }
    }
}

fn require_user_id(input: &Value) -> Result<u64> {
    input
        .get("user_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::NotFound("user_id missing from tool input".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nb_inference::providers::DummyProvider;
    use nb_inference::EmbeddingService;
    use nb_storage::MemoryProfileStore;

    #[derive(Debug)]
    struct ScriptedChat(String);

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn agent_names_round_trip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(AgentKind::parse("unknown_tool"), None);
    }

    #[tokio::test]
    async fn profiler_creates_and_embeds_a_missing_profile() {
        let profiles = Arc::new(MemoryProfileStore::new());
        let embedder = Arc::new(EmbeddingService::new(Arc::new(DummyProvider)));
        let vectors = Arc::new(VectorStore::new(profiles.clone(), embedder));
        let agent = UserProfilerAgent::new(profiles.clone(), vectors);

        let out = agent.invoke(json!({"user_id": 7})).await.unwrap();
        assert_eq!(out["user_id"], 7);
        assert_eq!(out["embedded"], true);
        let stored = profiles.get(7).await.unwrap().unwrap();
        assert!(stored.interest_embedding.is_some());
    }

    #[tokio::test]
    async fn profiler_requires_a_user_id() {
        let profiles = Arc::new(MemoryProfileStore::new());
        let embedder = Arc::new(EmbeddingService::new(Arc::new(DummyProvider)));
        let vectors = Arc::new(VectorStore::new(profiles.clone(), embedder));
        let agent = UserProfilerAgent::new(profiles, vectors);
        assert!(agent.invoke(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn analyzer_falls_back_to_raw_text() {
        let agent = NewsAnalyzerAgent::new(Arc::new(ScriptedChat(
            "markets look mixed today".to_string(),
        )));
        let input = json!({
            "candidates": [{
                "article_id": 1,
                "url": "http://test.example/a",
                "title": "Fed holds",
                "summary": "rates unchanged",
                "source_name": "wire",
                "published_at": null,
                "relevance_score": 0.5,
                "recency_score": 0.5,
                "combined_score": 0.5,
                "relevance_reason": "default selection"
            }]
        });
        let out = agent.invoke(input).await.unwrap();
        assert_eq!(out["raw_analysis"], "markets look mixed today");
    }

    #[tokio::test]
    async fn analyzer_passes_structured_output_through() {
        let agent = NewsAnalyzerAgent::new(Arc::new(ScriptedChat(
            r#"```json
{"market_sentiment": "neutral", "related_stocks": [], "key_trends": ["rates"]}
```"#
                .to_string(),
        )));
        let input = json!({
            "candidates": [{
                "article_id": 1,
                "url": "http://test.example/a",
                "title": "Fed holds",
                "summary": "rates unchanged",
                "source_name": "wire",
                "published_at": null,
                "relevance_score": 0.5,
                "recency_score": 0.5,
                "combined_score": 0.5,
                "relevance_reason": "default selection"
            }]
        });
        let out = agent.invoke(input).await.unwrap();
        assert_eq!(out["market_sentiment"], "neutral");
    }
}
