pub mod error;
pub mod inference;
pub mod json;
pub mod storage;
pub mod types;

pub use error::Error;
pub use error::Result;
pub use inference::{ChatProvider, EmbeddingProvider};
pub use storage::{ArticleStore, ProfileStore, ReportStore, SourceStore};
pub use types::{
    Article, BriefingReport, FeedEntry, FetchOutcome, FilterCriteria, KeyDirections, NewsSource,
    RankedCandidate, RankingOutcome, ReportStatus, UserProfile, DEFAULT_EMBEDDING_DIM,
};

pub mod prelude {
    pub use crate::inference::{ChatProvider, EmbeddingProvider};
    pub use crate::storage::{ArticleStore, ProfileStore, ReportStore, SourceStore};
    pub use crate::types::*;
    pub use crate::{Error, Result};
}
