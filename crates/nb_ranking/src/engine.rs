//! The news filter: candidate sourcing, exclusion filtering, recency
//! decay, LLM re-ranking, and score fusion.

use crate::recency::{recency_score, NEUTRAL_RECENCY};
use chrono::{DateTime, Utc};
use nb_core::json::extract_json;
use nb_core::{
    Article, ChatProvider, Error, FilterCriteria, ProfileStore, RankedCandidate, RankingOutcome,
    Result, UserProfile,
};
use nb_storage::{DistanceMetric, QueryHit, VectorEntityStore, VectorStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RELEVANCE_WEIGHT: f32 = 0.7;
const RECENCY_WEIGHT: f32 = 0.3;

/// How many candidates to pull per requested result, so the later
/// stages have a selection base.
const CANDIDATE_POOL_FACTOR: usize = 5;

const DEFAULT_RELEVANCE: f32 = 0.5;
const DEFAULT_REASON: &str = "default selection";

#[derive(Debug, Clone)]
pub struct RankingOptions {
    pub max_articles: usize,
    pub re_ranking: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            max_articles: 10,
            re_ranking: true,
        }
    }
}

/// One relevance judgment from the re-ranking model.
#[derive(Debug, Deserialize)]
struct RelevanceJudgment {
    id: u64,
    #[serde(default)]
    relevance_score: f32,
    #[serde(default)]
    relevance_reason: String,
}

pub struct RankingEngine<S> {
    profiles: Arc<dyn ProfileStore>,
    vectors: Arc<VectorStore<Article, S>>,
    chat: Option<Arc<dyn ChatProvider>>,
}

impl<S> RankingEngine<S>
where
    S: VectorEntityStore<Article>,
{
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        vectors: Arc<VectorStore<Article, S>>,
        chat: Option<Arc<dyn ChatProvider>>,
    ) -> Self {
        Self {
            profiles,
            vectors,
            chat,
        }
    }

    /// Rank news for a user. A missing profile is a hard failure; an
    /// empty result after exclusion filtering is a valid outcome.
    pub async fn rank(
        &self,
        user_id: u64,
        pool: Option<Vec<Article>>,
        options: RankingOptions,
    ) -> Result<RankingOutcome> {
        let profile = self
            .profiles
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile for user {}", user_id)))?;

        let now = Utc::now();
        let mut candidates = match pool {
            Some(articles) => articles
                .into_iter()
                .map(|a| candidate_from_article(&a, now))
                .collect(),
            None => self.source_candidates(&profile, options.max_articles, now).await?,
        };
        let total_candidates = candidates.len();
        debug!(total_candidates, user_id, "candidate pool assembled");

        candidates.retain(|c| !is_excluded(c, &profile.excluded_topics));
        info!(
            survived = candidates.len(),
            dropped = total_candidates - candidates.len(),
            "exclusion filter applied"
        );

        let criteria = FilterCriteria {
            preferred_topics: profile.preferred_topics.clone(),
            excluded_topics: profile.excluded_topics.clone(),
            max_articles: options.max_articles,
            re_ranking_enabled: options.re_ranking,
        };

        if candidates.is_empty() {
            return Ok(RankingOutcome {
                candidates,
                criteria,
                total_candidates,
            });
        }

        let mut ranked = match self.chat.as_deref().filter(|_| options.re_ranking) {
            Some(chat) => {
                re_rank(chat, &profile, candidates, options.max_articles).await
            }
            None => truncate_with_defaults(candidates, options.max_articles),
        };

        ranked.truncate(options.max_articles);
        Ok(RankingOutcome {
            candidates: ranked,
            criteria,
            total_candidates,
        })
    }

    /// Pull candidates from the vector store: by interest embedding
    /// when the profile has one, else by a synthesized topic query.
    async fn source_candidates(
        &self,
        profile: &UserProfile,
        max_articles: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedCandidate>> {
        let top_k = max_articles * CANDIDATE_POOL_FACTOR;
        let hits = match profile.interest_embedding.as_ref().filter(|v| !v.is_empty()) {
            Some(embedding) => {
                self.vectors
                    .query(None, Some(embedding.clone()), top_k, DistanceMetric::Cosine, &[])
                    .await?
            }
            None => {
                let topics = if profile.preferred_topics.is_empty() {
                    "finance".to_string()
                } else {
                    profile.preferred_topics.join(", ")
                };
                let query = format!("latest financial news about {}", topics);
                self.vectors
                    .query(Some(&query), None, top_k, DistanceMetric::Cosine, &[])
                    .await?
            }
        };
        Ok(hits.iter().map(|h| candidate_from_hit(h, now)).collect())
    }
}

/// Present the surviving candidates to the model and fuse its
/// relevance scores with recency. Any parse failure degrades to
/// the pre-filtered list with default annotations.
async fn re_rank(
    chat: &dyn ChatProvider,
    profile: &UserProfile,
    candidates: Vec<RankedCandidate>,
    max_articles: usize,
) -> Vec<RankedCandidate> {
    let prompt = build_rerank_prompt(profile, &candidates, max_articles);

    let output = match chat.complete(&prompt).await {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "re-ranking call failed, using pre-filtered order");
            return truncate_with_defaults(candidates, max_articles);
        }
    };

    let judgments: Vec<RelevanceJudgment> = match extract_json(&output)
        .and_then(|v| serde_json::from_value(v).ok())
    {
        Some(judgments) => judgments,
        None => {
            warn!("could not parse re-ranking output, using pre-filtered order");
            return truncate_with_defaults(candidates, max_articles);
        }
    };

    let mut fused = Vec::with_capacity(candidates.len());
    for mut candidate in candidates {
        let Some(judgment) = judgments.iter().find(|j| j.id == candidate.article_id) else {
            candidate.relevance_score = DEFAULT_RELEVANCE;
            candidate.relevance_reason = DEFAULT_REASON.to_string();
            candidate.combined_score = DEFAULT_RELEVANCE;
            fused.push(candidate);
            continue;
        };
        // A zero relevance score is an explicit exclusion by the
        // model.
        if judgment.relevance_score == 0.0 {
            debug!(id = candidate.article_id, "dropped by re-ranking model");
            continue;
        }
        candidate.relevance_score = judgment.relevance_score;
        candidate.relevance_reason = if judgment.relevance_reason.is_empty() {
            DEFAULT_REASON.to_string()
        } else {
            judgment.relevance_reason.clone()
        };
        candidate.combined_score = RELEVANCE_WEIGHT * (judgment.relevance_score / 100.0)
            + RECENCY_WEIGHT * candidate.recency_score;
        fused.push(candidate);
    }

    fused.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    fused.truncate(max_articles);
    fused
}

fn candidate_from_article(article: &Article, now: DateTime<Utc>) -> RankedCandidate {
    RankedCandidate {
        article_id: article.id,
        url: article.url.clone(),
        title: article.title.clone(),
        summary: article.summary.clone(),
        source_name: article.source_name.clone(),
        published_at: article.published_at,
        relevance_score: DEFAULT_RELEVANCE,
        recency_score: recency_score(article.published_at, now),
        combined_score: DEFAULT_RELEVANCE,
        relevance_reason: DEFAULT_REASON.to_string(),
    }
}

fn candidate_from_hit(hit: &QueryHit, now: DateTime<Utc>) -> RankedCandidate {
    let meta = &hit.metadata;
    let published_at: Option<DateTime<Utc>> = meta
        .get("published_at")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());
    let text = |key: &str| {
        meta.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    RankedCandidate {
        article_id: hit.id,
        url: text("url"),
        title: text("title"),
        summary: text("summary"),
        source_name: text("source_name"),
        published_at,
        relevance_score: DEFAULT_RELEVANCE,
        recency_score: published_at
            .map(|at| recency_score(Some(at), now))
            .unwrap_or(NEUTRAL_RECENCY),
        combined_score: DEFAULT_RELEVANCE,
        relevance_reason: DEFAULT_REASON.to_string(),
    }
}

/// Case-insensitive substring match of any excluded topic against the
/// candidate's headline text.
fn is_excluded(candidate: &RankedCandidate, excluded_topics: &[String]) -> bool {
    if excluded_topics.is_empty() {
        return false;
    }
    let haystack = candidate.headline_text().to_lowercase();
    excluded_topics
        .iter()
        .any(|topic| !topic.is_empty() && haystack.contains(&topic.to_lowercase()))
}

fn truncate_with_defaults(
    mut candidates: Vec<RankedCandidate>,
    max_articles: usize,
) -> Vec<RankedCandidate> {
    candidates.truncate(max_articles);
    for candidate in &mut candidates {
        candidate.relevance_score = DEFAULT_RELEVANCE;
        candidate.relevance_reason = DEFAULT_REASON.to_string();
        candidate.combined_score = DEFAULT_RELEVANCE;
    }
    candidates
}

fn build_rerank_prompt(
    profile: &UserProfile,
    candidates: &[RankedCandidate],
    max_articles: usize,
) -> String {
    let items: Vec<_> = candidates
        .iter()
        .map(|c| {
            json!({
                "id": c.article_id,
                "title": c.title,
                "summary": c.summary,
                "url": c.url,
                "published_at": c.published_at,
                "recency_score": c.recency_score,
            })
        })
        .collect();
    format!(
        "You are a financial news editor selecting articles for a personalized briefing.\n\
         \n\
         Reader profile: {}\n\
         Preferred topics: {}\n\
         Excluded topics: {}\n\
         \n\
         Score each candidate article below for relevance to this reader on a 0-100 scale. \
         Use 0 only for articles that should be excluded entirely. \
         Select at most {} articles.\n\
         \n\
         Candidates:\n{}\n\
         \n\
         Respond with a JSON array only, one object per scored article:\n\
         [{{\"id\": <article id>, \"relevance_score\": <0-100>, \"relevance_reason\": \"<one sentence>\"}}]",
        profile.embedding_text(),
        profile.preferred_topics.join(", "),
        profile.excluded_topics.join(", "),
        max_articles,
        serde_json::to_string_pretty(&items).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nb_core::ArticleStore;
    use nb_inference::providers::DummyProvider;
    use nb_inference::EmbeddingService;
    use nb_storage::{MemoryArticleStore, MemoryProfileStore};

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

    fn article(id_hint: &str, title: &str, summary: &str) -> Article {
        Article {
            id: 0,
            url: format!("http://test.example/{}", id_hint),
            title: title.to_string(),
            summary: summary.to_string(),
            source_name: "test".to_string(),
            published_at: Some(Utc::now()),
            content: format!("{} {}", title, summary),
            author: String::new(),
            keywords: vec![],
            categories: vec![],
            embedding: None,
            embedded: false,
        }
    }

    type TestEngine = (
        RankingEngine<MemoryArticleStore>,
        Arc<MemoryArticleStore>,
        Arc<VectorStore<Article, MemoryArticleStore>>,
    );

    async fn engine_with(profile: UserProfile, chat: Option<Arc<dyn ChatProvider>>) -> TestEngine {
        let profiles = Arc::new(MemoryProfileStore::new());
        profiles.upsert(profile).await.unwrap();
        let articles = Arc::new(MemoryArticleStore::new());
        let embedder = Arc::new(EmbeddingService::new(Arc::new(DummyProvider)));
        let vectors = Arc::new(VectorStore::new(articles.clone(), embedder));
        (
            RankingEngine::new(profiles, vectors.clone(), chat),
            articles,
            vectors,
        )
    }

    fn profile_with_topics(preferred: &[&str], excluded: &[&str]) -> UserProfile {
        UserProfile {
            preferred_topics: preferred.iter().map(|s| s.to_string()).collect(),
            excluded_topics: excluded.iter().map(|s| s.to_string()).collect(),
            ..UserProfile::new(1)
        }
    }

    #[tokio::test]
    async fn missing_profile_is_a_hard_failure() {
        let (engine, _, _) = engine_with(UserProfile::new(1), None).await;
        let err = engine
            .rank(99, Some(vec![]), RankingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn excluded_topic_filters_candidates() {
        // Preferred 科技, excluded 房地产; one of three candidates
        // mentions the excluded topic in its summary.
        let profile = profile_with_topics(&["科技"], &["房地产"]);
        let (engine, _, _) = engine_with(profile, None).await;
        let pool = vec![
            article("tech", "芯片公司发布新品", "科技行业动态"),
            article("prop", "楼市降温", "房地产市场持续下行"),
            article("macro", "央行维持利率不变", "宏观经济观察"),
        ];
        let outcome = engine
            .rank(
                1,
                Some(pool),
                RankingOptions {
                    max_articles: 10,
                    re_ranking: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.total_candidates, 3);
        assert_eq!(outcome.candidates.len(), 2);
        assert!(outcome.candidates.iter().all(|c| !c.summary.contains("房地产")));
        for c in &outcome.candidates {
            assert_eq!(c.relevance_score, 0.5);
            assert_eq!(c.relevance_reason, "default selection");
        }
    }

    #[tokio::test]
    async fn exclusion_is_case_insensitive() {
        let profile = profile_with_topics(&[], &["crypto"]);
        let (engine, _, _) = engine_with(profile, None).await;
        let pool = vec![
            article("a", "Crypto exchange collapses", "details"),
            article("b", "Bond yields rise", "details"),
        ];
        let outcome = engine
            .rank(
                1,
                Some(pool),
                RankingOptions {
                    max_articles: 10,
                    re_ranking: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].title, "Bond yields rise");
    }

    #[tokio::test]
    async fn fusion_weights_relevance_and_recency() {
        let profile = profile_with_topics(&["markets"], &[]);
        let mut pool = vec![article("a", "Fed decision", "rates held")];
        pool[0].id = 0;
        let chat = ScriptedChat(
            r#"[{"id": 1, "relevance_score": 80, "relevance_reason": "on topic"}]"#.to_string(),
        );
        let (engine, articles, _) = engine_with(profile, Some(Arc::new(chat))).await;
        let stored = articles.insert(pool.remove(0)).await.unwrap();
        assert_eq!(stored.id, 1);

        let outcome = engine
            .rank(1, Some(vec![stored]), RankingOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        let c = &outcome.candidates[0];
        // 0.7 * 0.8 + 0.3 * 1.0
        assert!((c.combined_score - 0.86).abs() < 1e-6, "got {}", c.combined_score);
        assert_eq!(c.relevance_reason, "on topic");
    }

    #[tokio::test]
    async fn zero_relevance_is_dropped() {
        let profile = profile_with_topics(&["markets"], &[]);
        let chat = ScriptedChat(
            r#"[{"id": 1, "relevance_score": 0, "relevance_reason": "off topic"},
                {"id": 2, "relevance_score": 60, "relevance_reason": "relevant"}]"#
                .to_string(),
        );
        let (engine, articles, _) = engine_with(profile, Some(Arc::new(chat))).await;
        let a = articles.insert(article("a", "Celebrity gossip", "s")).await.unwrap();
        let b = articles.insert(article("b", "Earnings season", "s")).await.unwrap();

        let outcome = engine
            .rank(1, Some(vec![a, b]), RankingOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].article_id, 2);
    }

    #[tokio::test]
    async fn unparseable_model_output_falls_back() {
        let profile = profile_with_topics(&["markets"], &[]);
        let chat = ScriptedChat("I cannot rank these articles, sorry.".to_string());
        let (engine, _, _) = engine_with(profile, Some(Arc::new(chat))).await;
        let pool = vec![
            article("a", "First", "s"),
            article("b", "Second", "s"),
            article("c", "Third", "s"),
        ];
        let outcome = engine
            .rank(
                1,
                Some(pool),
                RankingOptions {
                    max_articles: 2,
                    re_ranking: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].title, "First");
        assert!(outcome
            .candidates
            .iter()
            .all(|c| c.relevance_reason == "default selection"));
    }

    #[tokio::test]
    async fn candidates_come_from_the_vector_store_when_no_pool_given() {
        let profile = profile_with_topics(&["stock market"], &[]);
        let (engine, articles, vectors) = engine_with(profile, None).await;
        let stored = articles
            .insert(article("a", "Index futures climb", "stock market overview"))
            .await
            .unwrap();
        vectors.upsert(stored.id, &stored.content).await.unwrap();

        let outcome = engine
            .rank(
                1,
                None,
                RankingOptions {
                    max_articles: 5,
                    re_ranking: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].article_id, stored.id);
        assert_eq!(outcome.candidates[0].title, "Index futures climb");
    }
}
