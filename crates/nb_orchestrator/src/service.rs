//! Report lifecycle around the orchestrator: pending on request,
//! exactly one transition to generating, then completed or failed.

use crate::orchestrator::{OrchestrationResult, Orchestrator};
use chrono::Utc;
use nb_core::{
    Article, BriefingReport, Error, KeyDirections, ReportStatus, ReportStore, Result, UserProfile,
};
use nb_storage::VectorEntityStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

pub struct BriefingService<S, P> {
    reports: Arc<dyn ReportStore>,
    orchestrator: Orchestrator<S, P>,
}

impl<S, P> BriefingService<S, P>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
    P: VectorEntityStore<UserProfile>,
{
    pub fn new(reports: Arc<dyn ReportStore>, orchestrator: Orchestrator<S, P>) -> Self {
        Self {
            reports,
            orchestrator,
        }
    }

    /// Register a briefing request. The heavy work happens later in
    /// [`process_generation`].
    pub async fn create_report(&self, user_id: u64) -> Result<BriefingReport> {
        let report = self.reports.create(user_id).await?;
        info!(report_id = report.id, user_id, "briefing report requested");
        Ok(report)
    }

    /// Generate the report content. Retries re-resolve the report by
    /// id, so a retried job updates the same record instead of
    /// creating a duplicate. Failures are written to the report and
    /// propagated so the job layer can retry.
    pub async fn process_generation(&self, report_id: u64) -> Result<()> {
        match self.generate(report_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mark_failed(report_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn generate(&self, report_id: u64) -> Result<()> {
        let mut report = self
            .reports
            .get(report_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("report {}", report_id)))?;

        report.status = ReportStatus::Generating;
        self.reports.update(report.clone()).await?;

        match self.orchestrator.run(report.user_id).await {
            OrchestrationResult::Complete(data) => {
                apply_report_data(&mut report, &data);
                report.status = ReportStatus::Completed;
                report.generated_at = Utc::now();
                report.report_date = report.generated_at.date_naive();
                report.error_message = None;
                self.reports.update(report).await?;
                info!(report_id, "briefing report completed");
                Ok(())
            }
            OrchestrationResult::Error(message) => {
                error!(report_id, %message, "briefing generation failed");
                Err(Error::Inference(message))
            }
        }
    }

    /// Best-effort terminal write; the original error is what the
    /// caller sees even if this update cannot land.
    async fn mark_failed(&self, report_id: u64, message: &str) {
        let Ok(Some(mut report)) = self.reports.get(report_id).await else {
            return;
        };
        report.status = ReportStatus::Failed;
        report.error_message = Some(message.to_string());
        let _ = self.reports.update(report).await;
    }
}

/// Copy the orchestrator's payload into the persisted report fields.
/// Absent or mistyped fields fall back to empty values.
fn apply_report_data(report: &mut BriefingReport, data: &Value) {
    report.full_report_content = data
        .get("full_report_content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    report.summary = data
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    report.key_directions = data
        .get("key_directions")
        .cloned()
        .and_then(|v| serde_json::from_value::<KeyDirections>(v).ok())
        .unwrap_or_default();
    report.related_stocks = data
        .get("related_stocks")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    report.impact_score = match data.get("ai_impact_score") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    report.article_urls = data
        .get("news_articles")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(obj) => obj
                        .get("url")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{
        AgentSet, NewsAnalyzerAgent, NewsFetcherAgent, NewsFilterAgent, UserProfilerAgent,
    };
    use async_trait::async_trait;
    use nb_core::{ChatProvider, FeedEntry, ProfileStore};
    use nb_ingest::{FeedSource, NewsIngestionPipeline};
    use nb_inference::providers::DummyProvider;
    use nb_inference::EmbeddingService;
    use nb_ranking::RankingEngine;
    use nb_storage::{
        MemoryArticleStore, MemoryProfileStore, MemoryReportStore, MemorySourceStore, VectorStore,
    };
    use serde_json::json;

    #[derive(Debug)]
    struct OneShotChat(String);

    #[async_trait]
    impl ChatProvider for OneShotChat {
        fn name(&self) -> &str {
            "oneshot"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct EmptyFeed;

    #[async_trait]
    impl FeedSource for EmptyFeed {
        async fn fetch_feed(&self, _url: &str) -> Result<Vec<FeedEntry>> {
            Ok(Vec::new())
        }

        async fn fetch_page(&self, _url: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    type TestService = (
        BriefingService<MemoryArticleStore, MemoryProfileStore>,
        Arc<MemoryReportStore>,
    );

    fn service(final_output: &str) -> TestService {
        let chat: Arc<dyn ChatProvider> = Arc::new(OneShotChat(final_output.to_string()));
        let profiles = Arc::new(MemoryProfileStore::new());
        let articles = Arc::new(MemoryArticleStore::new());
        let embedder = Arc::new(EmbeddingService::new(Arc::new(DummyProvider)));
        let article_vectors = Arc::new(VectorStore::new(articles.clone(), embedder.clone()));
        let profile_vectors = Arc::new(VectorStore::new(profiles.clone(), embedder.clone()));
        let pipeline = Arc::new(NewsIngestionPipeline::new(
            Arc::new(MemorySourceStore::new()),
            articles.clone(),
            VectorStore::new(articles, embedder),
            Arc::new(EmptyFeed),
        ));
        let engine = Arc::new(RankingEngine::new(
            profiles.clone() as Arc<dyn ProfileStore>,
            article_vectors,
            Some(chat.clone()),
        ));
        let agents = AgentSet {
            profiler: UserProfilerAgent::new(profiles, profile_vectors),
            fetcher: NewsFetcherAgent::new(pipeline),
            filter: NewsFilterAgent::new(engine),
            analyzer: NewsAnalyzerAgent::new(chat.clone()),
        };
        let reports = Arc::new(MemoryReportStore::new());
        (
            BriefingService::new(reports.clone(), Orchestrator::new(agents, chat)),
            reports,
        )
    }

    #[tokio::test]
    async fn generation_completes_the_report() {
        let (service, reports) = service(
            r#"{"full_report_content": "Full narrative.", "summary": "Short.", "ai_impact_score": "low"}"#,
        );
        let report = service.create_report(9).await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);

        service.process_generation(report.id).await.unwrap();
        let done = reports.get(report.id).await.unwrap().unwrap();
        assert_eq!(done.status, ReportStatus::Completed);
        assert_eq!(done.full_report_content, "Full narrative.");
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn generation_failure_marks_the_report_failed() {
        let (service, reports) = service("sorry, I lost track of the task");
        let report = service.create_report(9).await.unwrap();

        assert!(service.process_generation(report.id).await.is_err());
        let failed = reports.get(report.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ReportStatus::Failed);
        assert!(failed.error_message.is_some());
    }

    #[tokio::test]
    async fn unknown_report_id_is_not_found() {
        let (service, _) = service("{}");
        assert!(matches!(
            service.process_generation(404).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn report_data_maps_urls_from_strings_and_objects() {
        let mut report = BriefingReport::pending(1, 1);
        let data = json!({
            "full_report_content": "Narrative.",
            "summary": "Short.",
            "key_directions": {"market_sentiment": "bullish", "recommendations": ["hold"]},
            "related_stocks": ["AAPL"],
            "ai_impact_score": "medium",
            "news_articles": [
                "http://wire.test/a",
                {"url": "http://wire.test/b", "title": "ignored"}
            ]
        });
        apply_report_data(&mut report, &data);
        assert_eq!(report.full_report_content, "Narrative.");
        assert_eq!(report.key_directions.market_sentiment, "bullish");
        assert_eq!(
            report.article_urls,
            vec!["http://wire.test/a", "http://wire.test/b"]
        );
        assert_eq!(report.impact_score, "medium");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let mut report = BriefingReport::pending(1, 1);
        apply_report_data(&mut report, &json!({"full_report_content": "x"}));
        assert!(report.summary.is_empty());
        assert!(report.related_stocks.is_empty());
        assert!(report.article_urls.is_empty());
    }
}
