//! Nearest-neighbor retrieval over entities that carry an embedding and
//! a processed flag. Generic over the entity and its backing store so
//! the same machinery serves articles and user profiles.

use crate::memory::{MemoryArticleStore, MemoryProfileStore};
use async_trait::async_trait;
use nb_core::{Article, ArticleStore, ProfileStore, Result, UserProfile};
use nb_inference::EmbeddingService;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L2,
    Cosine,
    InnerProduct,
}

impl DistanceMetric {
    /// Parse a caller-supplied metric name. Unknown names are a caller
    /// error; the store answers them with an empty, logged result.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "l2" => Some(Self::L2),
            "cosine" => Some(Self::Cosine),
            "inner_product" | "ip" => Some(Self::InnerProduct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: u64,
    pub score: f32,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Value,
}

/// An entity the vector store can index.
pub trait VectorEntity: Clone + Send + Sync {
    fn vector_id(&self) -> u64;
    fn text(&self) -> String;
    fn embedding(&self) -> Option<&[f32]>;
    fn set_embedding(&mut self, embedding: Vec<f32>);
    fn processed(&self) -> bool;
    fn set_processed(&mut self, processed: bool);
    fn metadata(&self) -> Value;

    /// Equality/overlap filter match on one attribute.
    fn matches_filter(&self, key: &str, value: &Value) -> bool {
        match self.metadata().get(key) {
            Some(Value::Array(items)) => match value {
                Value::Array(wanted) => wanted.iter().any(|w| items.contains(w)),
                single => items.contains(single),
            },
            Some(found) => found == value,
            None => false,
        }
    }
}

impl VectorEntity for Article {
    fn vector_id(&self) -> u64 {
        self.id
    }

    fn text(&self) -> String {
        self.content.clone()
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    fn set_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = Some(embedding);
    }

    fn processed(&self) -> bool {
        self.embedded
    }

    fn set_processed(&mut self, processed: bool) {
        self.embedded = processed;
    }

    fn metadata(&self) -> Value {
        json!({
            "url": self.url,
            "title": self.title,
            "summary": self.summary,
            "source_name": self.source_name,
            "published_at": self.published_at,
            "author": self.author,
            "keywords": self.keywords,
            "categories": self.categories,
        })
    }
}

impl VectorEntity for UserProfile {
    fn vector_id(&self) -> u64 {
        self.user_id
    }

    fn text(&self) -> String {
        self.embedding_text()
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.interest_embedding.as_deref()
    }

    fn set_embedding(&mut self, embedding: Vec<f32>) {
        self.interest_embedding = Some(embedding);
    }

    fn processed(&self) -> bool {
        self.embedded
    }

    fn set_processed(&mut self, processed: bool) {
        self.embedded = processed;
    }

    fn metadata(&self) -> Value {
        json!({
            "user_id": self.user_id,
            "preferred_topics": self.preferred_topics,
            "excluded_topics": self.excluded_topics,
        })
    }
}

/// Backing persistence for one entity type.
#[async_trait]
pub trait VectorEntityStore<E: VectorEntity>: Send + Sync {
    async fn fetch(&self, id: u64) -> Result<Option<E>>;
    async fn save(&self, entity: E) -> Result<bool>;
    async fn all(&self) -> Result<Vec<E>>;
    async fn remove(&self, id: u64) -> Result<bool>;
}

#[async_trait]
impl VectorEntityStore<Article> for MemoryArticleStore {
    async fn fetch(&self, id: u64) -> Result<Option<Article>> {
        ArticleStore::get(self, id).await
    }

    async fn save(&self, entity: Article) -> Result<bool> {
        ArticleStore::update(self, entity).await
    }

    async fn all(&self) -> Result<Vec<Article>> {
        ArticleStore::all(self).await
    }

    async fn remove(&self, id: u64) -> Result<bool> {
        ArticleStore::delete(self, id).await
    }
}

#[async_trait]
impl VectorEntityStore<UserProfile> for MemoryProfileStore {
    async fn fetch(&self, id: u64) -> Result<Option<UserProfile>> {
        ProfileStore::get(self, id).await
    }

    async fn save(&self, entity: UserProfile) -> Result<bool> {
        ProfileStore::upsert(self, entity).await.map(|_| true)
    }

    async fn all(&self) -> Result<Vec<UserProfile>> {
        // Profiles are looked up by id; bulk scans are only needed for
        // article retrieval, so this stays unimplemented until a caller
        // appears.
        Ok(Vec::new())
    }

    async fn remove(&self, _id: u64) -> Result<bool> {
        Ok(false)
    }
}

pub struct VectorStore<E, S> {
    backend: Arc<S>,
    embedder: Arc<EmbeddingService>,
    _entity: PhantomData<E>,
}

impl<E, S> VectorStore<E, S>
where
    E: VectorEntity,
    S: VectorEntityStore<E>,
{
    pub fn new(backend: Arc<S>, embedder: Arc<EmbeddingService>) -> Self {
        Self {
            backend,
            embedder,
            _entity: PhantomData,
        }
    }

    /// Embed `text` and attach it to the entity with `id`. Returns
    /// `false` when the entity is missing or no usable embedding could
    /// be produced; the processed flag is only ever set alongside a
    /// non-empty, nonzero vector.
    pub async fn upsert(&self, id: u64, text: &str) -> Result<bool> {
        let Some(mut entity) = self.backend.fetch(id).await? else {
            warn!(id, "upsert target not found");
            return Ok(false);
        };

        let embedding = self.embedder.embed(text).await;
        if embedding.is_empty() || embedding.iter().all(|x| *x == 0.0) {
            warn!(id, "embedding computation yielded nothing usable");
            return Ok(false);
        }

        let dim = embedding.len();
        entity.set_embedding(embedding);
        entity.set_processed(true);
        self.backend.save(entity).await?;
        info!(id, dim, "stored embedding");
        Ok(true)
    }

    /// Nearest neighbors of a query text or a pre-computed vector.
    /// Exactly one of the two must resolve to a vector; otherwise the
    /// result is empty. Only processed entities with a stored embedding
    /// are eligible.
    pub async fn query(
        &self,
        query_text: Option<&str>,
        query_embedding: Option<Vec<f32>>,
        top_k: usize,
        metric: DistanceMetric,
        filters: &[(String, Value)],
    ) -> Result<Vec<QueryHit>> {
        let query_vec = match query_embedding {
            Some(v) if !v.is_empty() => v,
            _ => match query_text {
                Some(text) => self.embedder.embed(text).await,
                None => {
                    warn!("query needs either text or an embedding");
                    return Ok(Vec::new());
                }
            },
        };
        if query_vec.is_empty() {
            warn!("query embedding is empty, returning no hits");
            return Ok(Vec::new());
        }

        let mut hits: Vec<QueryHit> = Vec::new();
        for entity in self.backend.all().await? {
            if !entity.processed() {
                continue;
            }
            let Some(embedding) = entity.embedding() else {
                continue;
            };
            if !filters
                .iter()
                .all(|(key, value)| entity.matches_filter(key, value))
            {
                continue;
            }
            let score = match metric {
                DistanceMetric::L2 => l2_distance(&query_vec, embedding),
                DistanceMetric::Cosine => 1.0 - cosine_similarity(&query_vec, embedding),
                DistanceMetric::InnerProduct => inner_product(&query_vec, embedding),
            };
            hits.push(QueryHit {
                id: entity.vector_id(),
                score,
                embedding: embedding.to_vec(),
                text: entity.text(),
                metadata: entity.metadata(),
            });
        }

        match metric {
            // Distances rank ascending, inner product descending.
            DistanceMetric::L2 | DistanceMetric::Cosine => {
                hits.sort_by(|a, b| a.score.total_cmp(&b.score))
            }
            DistanceMetric::InnerProduct => hits.sort_by(|a, b| b.score.total_cmp(&a.score)),
        }
        hits.truncate(top_k);
        debug!(hits = hits.len(), ?metric, "vector query complete");
        Ok(hits)
    }

    /// String-metric variant of [`query`]; an unrecognized metric name
    /// logs an error and returns no hits.
    pub async fn query_with_metric_name(
        &self,
        query_text: Option<&str>,
        query_embedding: Option<Vec<f32>>,
        top_k: usize,
        metric: &str,
        filters: &[(String, Value)],
    ) -> Result<Vec<QueryHit>> {
        match DistanceMetric::parse(metric) {
            Some(metric) => {
                self.query(query_text, query_embedding, top_k, metric, filters)
                    .await
            }
            None => {
                warn!(metric, "unsupported distance metric");
                Ok(Vec::new())
            }
        }
    }

    pub async fn get_embedding(&self, id: u64) -> Result<Option<Vec<f32>>> {
        Ok(self
            .backend
            .fetch(id)
            .await?
            .and_then(|e| e.embedding().map(|v| v.to_vec())))
    }

    pub async fn delete(&self, id: u64) -> Result<bool> {
        self.backend.remove(id).await
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
