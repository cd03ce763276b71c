//! In-memory store backends. State lives behind a tokio `RwLock`; each
//! store is cheap to clone and share via `Arc`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nb_core::{
    Article, ArticleStore, BriefingReport, Error, NewsSource, ProfileStore, ReportStore, Result,
    SourceStore, UserProfile,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct ArticleState {
    next_id: u64,
    by_id: HashMap<u64, Article>,
}

#[derive(Clone, Default)]
pub struct MemoryArticleStore {
    state: Arc<RwLock<ArticleState>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn insert(&self, mut article: Article) -> Result<Article> {
        let mut state = self.state.write().await;
        if state.by_id.values().any(|a| a.url == article.url) {
            return Err(Error::Storage(format!(
                "article already stored for url {}",
                article.url
            )));
        }
        state.next_id += 1;
        article.id = state.next_id;
        state.by_id.insert(article.id, article.clone());
        debug!(id = article.id, url = %article.url, "stored article");
        Ok(article)
    }

    async fn get(&self, id: u64) -> Result<Option<Article>> {
        Ok(self.state.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        Ok(self
            .state
            .read()
            .await
            .by_id
            .values()
            .find(|a| a.url == url)
            .cloned())
    }

    async fn exists_url(&self, url: &str) -> Result<bool> {
        Ok(self.state.read().await.by_id.values().any(|a| a.url == url))
    }

    async fn update(&self, article: Article) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.by_id.get_mut(&article.id) {
            Some(slot) => {
                *slot = article;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        Ok(self.state.write().await.by_id.remove(&id).is_some())
    }

    async fn all(&self) -> Result<Vec<Article>> {
        let mut articles: Vec<Article> = self.state.read().await.by_id.values().cloned().collect();
        articles.sort_by_key(|a| a.id);
        Ok(articles)
    }
}

#[derive(Clone, Default)]
pub struct MemorySourceStore {
    state: Arc<RwLock<HashMap<String, NewsSource>>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, source: NewsSource) -> Result<()> {
        self.state
            .write()
            .await
            .insert(source.name.clone(), source);
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn get(&self, name: &str) -> Result<Option<NewsSource>> {
        Ok(self.state.read().await.get(name).cloned())
    }

    async fn get_or_create(&self, name: &str, url: &str) -> Result<(NewsSource, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.get(name) {
            return Ok((existing.clone(), false));
        }
        let source = NewsSource {
            name: name.to_string(),
            url: url.to_string(),
            description: format!("News source for {}", name),
            active: true,
            last_fetched_at: None,
        };
        state.insert(name.to_string(), source.clone());
        debug!(name, "created news source");
        Ok((source, true))
    }

    async fn all_active(&self) -> Result<Vec<NewsSource>> {
        let mut sources: Vec<NewsSource> = self
            .state
            .read()
            .await
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let source = state
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("news source {}", name)))?;
        source.last_fetched_at = Some(at);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    state: Arc<RwLock<HashMap<u64, UserProfile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: u64) -> Result<Option<UserProfile>> {
        Ok(self.state.read().await.get(&user_id).cloned())
    }

    async fn get_or_create(&self, user_id: u64) -> Result<UserProfile> {
        let mut state = self.state.write().await;
        Ok(state
            .entry(user_id)
            .or_insert_with(|| {
                debug!(user_id, "created defaulted user profile");
                UserProfile::new(user_id)
            })
            .clone())
    }

    async fn upsert(&self, profile: UserProfile) -> Result<()> {
        self.state.write().await.insert(profile.user_id, profile);
        Ok(())
    }
}

#[derive(Default)]
struct ReportState {
    next_id: u64,
    by_id: HashMap<u64, BriefingReport>,
}

#[derive(Clone, Default)]
pub struct MemoryReportStore {
    state: Arc<RwLock<ReportState>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn create(&self, user_id: u64) -> Result<BriefingReport> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let report = BriefingReport::pending(state.next_id, user_id);
        state.by_id.insert(report.id, report.clone());
        debug!(id = report.id, user_id, "created pending report");
        Ok(report)
    }

    async fn get(&self, id: u64) -> Result<Option<BriefingReport>> {
        Ok(self.state.read().await.by_id.get(&id).cloned())
    }

    async fn update(&self, report: BriefingReport) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.by_id.get_mut(&report.id) {
            Some(slot) => {
                *slot = report;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn for_user(&self, user_id: u64) -> Result<Vec<BriefingReport>> {
        let mut reports: Vec<BriefingReport> = self
            .state
            .read()
            .await
            .by_id
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(reports)
    }
}
