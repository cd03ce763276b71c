use crate::types::{Article, BriefingReport, NewsSource, UserProfile};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Store a new article, assigning its id. The URL is the natural key;
    /// storing an already-known URL is a storage error.
    async fn insert(&self, article: Article) -> Result<Article>;

    async fn get(&self, id: u64) -> Result<Option<Article>>;

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>>;

    async fn exists_url(&self, url: &str) -> Result<bool>;

    /// Replace a stored article wholesale, matched by id.
    async fn update(&self, article: Article) -> Result<bool>;

    async fn delete(&self, id: u64) -> Result<bool>;

    async fn all(&self) -> Result<Vec<Article>>;
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<NewsSource>>;

    /// Resolve a source by name, creating it (active, never fetched)
    /// when absent. Returns the source and whether it was created.
    async fn get_or_create(&self, name: &str, url: &str) -> Result<(NewsSource, bool)>;

    async fn all_active(&self) -> Result<Vec<NewsSource>>;

    /// Update the fetch cursor for a source.
    async fn touch(&self, name: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: u64) -> Result<Option<UserProfile>>;

    /// Resolve a profile, creating a defaulted one when absent.
    async fn get_or_create(&self, user_id: u64) -> Result<UserProfile>;

    async fn upsert(&self, profile: UserProfile) -> Result<()>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create a report in `pending` state and assign its id.
    async fn create(&self, user_id: u64) -> Result<BriefingReport>;

    async fn get(&self, id: u64) -> Result<Option<BriefingReport>>;

    async fn update(&self, report: BriefingReport) -> Result<bool>;

    async fn for_user(&self, user_id: u64) -> Result<Vec<BriefingReport>>;
}
