use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default embedding dimension when the provider cannot be probed.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: String,
    pub summary: String,
    pub author: String,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub url: String,
    pub description: String,
    pub active: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: u64,
    pub self_portrait: String,
    pub preferred_topics: Vec<String>,
    pub excluded_topics: Vec<String>,
    pub interest_embedding: Option<Vec<f32>>,
    pub embedded: bool,
}

impl UserProfile {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            self_portrait: String::new(),
            preferred_topics: vec!["stock market".to_string(), "economic trends".to_string()],
            excluded_topics: Vec::new(),
            interest_embedding: None,
            embedded: false,
        }
    }

    /// Text the interest embedding is derived from: self-portrait plus
    /// preferred topics, with generic defaults when both are empty.
    pub fn embedding_text(&self) -> String {
        let portrait = if self.self_portrait.trim().is_empty() {
            "investor"
        } else {
            self.self_portrait.as_str()
        };
        let topics = if self.preferred_topics.is_empty() {
            "finance".to_string()
        } else {
            self.preferred_topics.join(", ")
        };
        format!("{}. Topics of interest: {}", portrait, topics)
    }
}

/// Raw item parsed out of an RSS/Atom feed, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: String,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
}

/// Per-invocation ranking signal bundle. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub article_id: u64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub relevance_score: f32,
    pub recency_score: f32,
    pub combined_score: f32,
    pub relevance_reason: String,
}

impl RankedCandidate {
    /// Title plus summary, the text the exclusion filter matches
    /// against.
    pub fn headline_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub preferred_topics: Vec<String>,
    pub excluded_topics: Vec<String>,
    pub max_articles: usize,
    pub re_ranking_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub candidates: Vec<RankedCandidate>,
    pub criteria: FilterCriteria,
    pub total_candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub fetched: usize,
    pub embedded: usize,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDirections {
    pub market_sentiment: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingReport {
    pub id: u64,
    pub user_id: u64,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    pub report_date: NaiveDate,
    pub summary: String,
    pub full_report_content: String,
    pub key_directions: KeyDirections,
    pub related_stocks: Vec<String>,
    pub impact_score: String,
    pub article_urls: Vec<String>,
    pub error_message: Option<String>,
}

impl BriefingReport {
    pub fn pending(id: u64, user_id: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            status: ReportStatus::Pending,
            generated_at: now,
            report_date: now.date_naive(),
            summary: "Briefing request received, generating in the background.".to_string(),
            full_report_content: String::new(),
            key_directions: KeyDirections::default(),
            related_stocks: Vec::new(),
            impact_score: String::new(),
            article_urls: Vec::new(),
            error_message: None,
        }
    }
}
