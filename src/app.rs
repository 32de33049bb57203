//! Composition root: builds every shared component once at process start
//! and passes explicit references downward. The embedding clients and the
//! vector store are shared between the ingestion and search paths.

use crate::config::Settings;
use crate::embeddings::create_backend;
use crate::error::Result;
use crate::jobs::JobManager;
use crate::pipeline::IngestionPipeline;
use crate::search::SearchService;
use crate::service::IngestionService;
use crate::store::create_store;
use std::sync::Arc;

pub struct App {
    pub settings: Arc<Settings>,
    pub service: Arc<IngestionService>,
    pub search: Arc<SearchService>,
    pub jobs: Arc<JobManager>,
}

impl App {
    pub async fn build(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);

        let primary = create_backend(&settings, settings.embedding_provider)?;
        let fallback = create_backend(&settings, settings.embedding_provider.fallback())?;
        let store = create_store(&settings).await?;

        let jobs = Arc::new(JobManager::new(settings.subscriber_queue_capacity));
        let pipeline = Arc::new(IngestionPipeline::new(
            &settings,
            Arc::clone(&primary),
            fallback,
            Arc::clone(&store),
            Arc::clone(&jobs),
        )?);
        let service = Arc::new(IngestionService::new(
            settings.ingestion_concurrency,
            pipeline,
            Arc::clone(&jobs),
        ));
        let search = Arc::new(SearchService::new(primary, store));

        Ok(Self {
            settings,
            service,
            search,
            jobs,
        })
    }
}
