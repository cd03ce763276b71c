use clap::Parser;
use nb_core::{ArticleStore, Error, ProfileStore, ReportStore, Result, SourceStore};
use nb_inference::{ClientRegistry, EmbeddingService, ProviderConfig, ProviderKind};
use nb_ingest::{HttpFeedSource, IngestOptions, NewsIngestionPipeline};
use nb_orchestrator::{
    AgentSet, BriefingService, NewsAnalyzerAgent, NewsFetcherAgent, NewsFilterAgent, Orchestrator,
    UserProfilerAgent,
};
use nb_ranking::{RankingEngine, RankingOptions};
use nb_storage::{MemoryArticleStore, MemoryProfileStore, MemoryReportStore, MemorySourceStore, VectorStore};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Personalized financial news briefings", long_about = None)]
struct Cli {
    /// Inference provider: openai or dummy (offline, deterministic)
    #[arg(long, default_value = "dummy")]
    provider: String,
    /// Falls back to the OPENAI_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    chat_model: Option<String>,
    #[arg(long)]
    embedding_model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch and embed articles from one or more feeds
    Fetch {
        /// Feed in name=url form, repeatable
        #[arg(long, required = true)]
        source: Vec<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Ignore the per-source fetch cooldown
        #[arg(long)]
        force: bool,
    },
    /// Fetch, then rank news for a user
    Rank {
        #[arg(long)]
        user: u64,
        #[arg(long, required = true)]
        source: Vec<String>,
        #[arg(long, default_value_t = 10)]
        max_articles: usize,
        /// Skip the LLM re-ranking stage
        #[arg(long)]
        no_rerank: bool,
        /// Preferred topic, repeatable
        #[arg(long)]
        topic: Vec<String>,
        /// Excluded topic, repeatable
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Generate a full briefing report for a user
    Brief {
        #[arg(long)]
        user: u64,
        #[arg(long, required = true)]
        source: Vec<String>,
        #[arg(long)]
        topic: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        /// Free-text self-description used for the interest embedding
        #[arg(long)]
        portrait: Option<String>,
    },
    /// Show or update a user profile and its interest embedding
    Profile {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        topic: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        portrait: Option<String>,
    },
}

struct App {
    sources: Arc<MemorySourceStore>,
    articles: Arc<MemoryArticleStore>,
    profiles: Arc<MemoryProfileStore>,
    reports: Arc<MemoryReportStore>,
    chat: Arc<dyn nb_core::ChatProvider>,
    profile_vectors: Arc<VectorStore<nb_core::UserProfile, MemoryProfileStore>>,
    pipeline: Arc<NewsIngestionPipeline<MemoryArticleStore>>,
    engine: Arc<RankingEngine<MemoryArticleStore>>,
}

impl App {
    fn new(config: &ProviderConfig) -> Result<Self> {
        let registry = ClientRegistry::new();
        let chat = registry.chat_model(config)?;
        let embedding = registry.embedding_model(config)?;
        let embedder = Arc::new(EmbeddingService::new(embedding));

        let sources = Arc::new(MemorySourceStore::new());
        let articles = Arc::new(MemoryArticleStore::new());
        let profiles = Arc::new(MemoryProfileStore::new());
        let reports = Arc::new(MemoryReportStore::new());

        let article_vectors = Arc::new(VectorStore::new(articles.clone(), embedder.clone()));
        let profile_vectors = Arc::new(VectorStore::new(profiles.clone(), embedder.clone()));
        let pipeline = Arc::new(NewsIngestionPipeline::new(
            sources.clone(),
            articles.clone(),
            VectorStore::new(articles.clone(), embedder.clone()),
            Arc::new(HttpFeedSource::new()),
        ));
        let engine = Arc::new(RankingEngine::new(
            profiles.clone() as Arc<dyn ProfileStore>,
            article_vectors,
            Some(chat.clone()),
        ));

        Ok(Self {
            sources,
            articles,
            profiles,
            reports,
            chat,
            profile_vectors,
            pipeline,
            engine,
        })
    }

    async fn register_sources(&self, entries: &[String]) -> Result<()> {
        for entry in entries {
            let (name, url) = parse_source(entry)?;
            let (_, created) = self.sources.get_or_create(&name, &url).await?;
            if created {
                info!("📰 Registered source {} ({})", name, url);
            }
        }
        Ok(())
    }

    async fn fetch(&self, limit: usize, force: bool) -> Result<()> {
        let outcome = self
            .pipeline
            .run(IngestOptions {
                source: None,
                limit,
                force_refresh: force,
            })
            .await?;
        info!(
            "📥 Fetched {} new articles ({} embedded) from {} sources",
            outcome.fetched,
            outcome.embedded,
            outcome.sources.len()
        );
        Ok(())
    }

    async fn update_profile(
        &self,
        user: u64,
        topics: &[String],
        excluded: &[String],
        portrait: Option<&str>,
    ) -> Result<()> {
        let mut profile = self.profiles.get_or_create(user).await?;
        if !topics.is_empty() {
            profile.preferred_topics = topics.to_vec();
            profile.embedded = false;
        }
        if !excluded.is_empty() {
            profile.excluded_topics = excluded.to_vec();
        }
        if let Some(portrait) = portrait {
            profile.self_portrait = portrait.to_string();
            profile.embedded = false;
        }
        self.profiles.upsert(profile.clone()).await?;
        if !profile.embedded {
            self.profile_vectors
                .upsert(user, &profile.embedding_text())
                .await?;
            info!("🧠 Interest embedding updated for user {}", user);
        }
        Ok(())
    }

    fn briefing_service(&self) -> BriefingService<MemoryArticleStore, MemoryProfileStore> {
        let agents = AgentSet {
            profiler: UserProfilerAgent::new(self.profiles.clone(), self.profile_vectors.clone()),
            fetcher: NewsFetcherAgent::new(self.pipeline.clone()),
            filter: NewsFilterAgent::new(self.engine.clone()),
            analyzer: NewsAnalyzerAgent::new(self.chat.clone()),
        };
        BriefingService::new(
            self.reports.clone() as Arc<dyn ReportStore>,
            Orchestrator::new(agents, self.chat.clone()),
        )
    }
}

fn parse_source(entry: &str) -> Result<(String, String)> {
    match entry.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
            Ok((name.to_string(), parsed.into()))
        }
        _ => Err(Error::InvalidUrl(format!(
            "source must be name=url, got {:?}",
            entry
        ))),
    }
}

fn provider_config(cli: &Cli) -> Result<ProviderConfig> {
    let kind = match cli.provider.as_str() {
        "openai" => ProviderKind::OpenAi,
        "dummy" => ProviderKind::Dummy,
        other => {
            return Err(Error::Inference(format!(
                "unknown provider {:?}, expected openai or dummy",
                other
            )))
        }
    };
    Ok(ProviderConfig {
        kind,
        api_key: cli
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        base_url: cli.base_url.clone(),
        chat_model: cli.chat_model.clone(),
        embedding_model: cli.embedding_model.clone(),
        temperature: None,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = provider_config(&cli)?;
    let app = App::new(&config)?;
    info!("✨ Providers initialized (using {})", cli.provider);

    match &cli.command {
        Commands::Fetch {
            source,
            limit,
            force,
        } => {
            app.register_sources(source).await?;
            app.fetch(*limit, *force).await?;
            for article in app.articles.all().await? {
                println!("[{}] {} ({})", article.source_name, article.title, article.url);
            }
        }
        Commands::Rank {
            user,
            source,
            max_articles,
            no_rerank,
            topic,
            exclude,
        } => {
            app.register_sources(source).await?;
            app.update_profile(*user, topic, exclude, None).await?;
            app.fetch(usize::MAX, true).await?;

            let outcome = app
                .engine
                .rank(
                    *user,
                    None,
                    RankingOptions {
                        max_articles: *max_articles,
                        re_ranking: !no_rerank,
                    },
                )
                .await?;
            info!(
                "🔎 {} of {} candidates selected",
                outcome.candidates.len(),
                outcome.total_candidates
            );
            for (rank, c) in outcome.candidates.iter().enumerate() {
                println!(
                    "{:>2}. [{:.2}] {} - {}",
                    rank + 1,
                    c.combined_score,
                    c.title,
                    c.relevance_reason
                );
            }
        }
        Commands::Brief {
            user,
            source,
            topic,
            exclude,
            portrait,
        } => {
            app.register_sources(source).await?;
            app.update_profile(*user, topic, exclude, portrait.as_deref())
                .await?;

            let service = app.briefing_service();
            let report = service.create_report(*user).await?;
            info!("📝 Generating briefing report {}", report.id);
            nb_orchestrator::tasks::generate_briefing(&service, report.id).await?;

            let history = app.reports.for_user(*user).await?;
            let report = history
                .first()
                .ok_or_else(|| Error::NotFound(format!("report {}", report.id)))?;
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        Commands::Profile {
            user,
            topic,
            exclude,
            portrait,
        } => {
            app.update_profile(*user, topic, exclude, portrait.as_deref())
                .await?;
            let profile = app.profiles.get_or_create(*user).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}
