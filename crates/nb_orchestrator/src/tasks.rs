//! Background job entry points and the retry contract they share.
//! The queue transport itself lives elsewhere; each job here is
//! idempotent with respect to the id it operates on.

use crate::agents::UserProfilerAgent;
use crate::service::BriefingService;
use nb_core::{Article, FetchOutcome, Result, UserProfile};
use nb_ingest::{IngestOptions, NewsIngestionPipeline};
use nb_storage::VectorEntityStore;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const RETRY_ATTEMPTS: usize = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run `op` up to `attempts` times with a fixed delay between tries,
/// returning the first success or the last error.
pub async fn run_with_retry<T, F, Fut>(
    label: &str,
    attempts: usize,
    delay: Duration,
    op: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(label, attempt, "job succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(label, attempt, error = %e, "job attempt failed");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt runs"))
}

/// Generate the briefing for an already-created report.
pub async fn generate_briefing<S, P>(
    service: &BriefingService<S, P>,
    report_id: u64,
) -> Result<()>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
    P: VectorEntityStore<UserProfile>,
{
    run_with_retry("generate_briefing", RETRY_ATTEMPTS, RETRY_DELAY, || {
        service.process_generation(report_id)
    })
    .await
}

/// Recompute one user's interest embedding.
pub async fn update_profile_embedding<P>(
    profiler: &UserProfilerAgent<P>,
    user_id: u64,
) -> Result<()>
where
    P: VectorEntityStore<UserProfile>,
{
    run_with_retry("update_profile_embedding", RETRY_ATTEMPTS, RETRY_DELAY, || {
        profiler.invoke(json!({"user_id": user_id, "refresh": true}))
    })
    .await
    .map(|_| ())
}

/// One ingestion cycle over all due sources.
pub async fn fetch_and_embed<S>(pipeline: &NewsIngestionPipeline<S>) -> Result<FetchOutcome>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
{
    run_with_retry("fetch_and_embed", RETRY_ATTEMPTS, RETRY_DELAY, || {
        pipeline.run(IngestOptions::default())
    })
    .await
}
