//! Feed ingestion for the briefing system: RSS/Atom parsing, full-text
//! extraction, and the per-source fetch pipeline.

pub mod extract;
pub mod feed;
pub mod pipeline;

pub use extract::extract_article_text;
pub use feed::parse_feed;
pub use pipeline::{
    FeedSource, HttpFeedSource, IngestOptions, NewsIngestionPipeline, DEFAULT_FETCH_LIMIT,
};
