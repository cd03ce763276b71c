//! Multi-signal news ranking: vector retrieval, exclusion filtering,
//! recency decay, LLM re-ranking, and score fusion.

pub mod engine;
pub mod recency;

pub use engine::{RankingEngine, RankingOptions};
pub use recency::{recency_score, NEUTRAL_RECENCY};
