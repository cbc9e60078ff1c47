//! Shared dependencies of the ingestion and answering pipelines.
//!
//! [`Services`] bundles the fragment store, progress store, inference
//! provider and the configured engine pieces. It is cheap to clone, so the
//! HTTP server hands one copy to every background ingestion task.

use std::sync::Arc;

use anyhow::Result;

use pagewise_core::chunk::SlidingWindow;
use pagewise_core::enrich::Enricher;
use pagewise_core::inference::InferenceProvider;
use pagewise_core::progress::{InMemoryProgressStore, ProgressStore};
use pagewise_core::store::FragmentStore;

use crate::config::{Config, IngestConfig, RetrievalConfig};
use crate::db;
use crate::inference::create_provider;
use crate::migrate::migrate;
use crate::sqlite_store::SqliteFragmentStore;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn FragmentStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub inference: Arc<dyn InferenceProvider>,
    pub enricher: Arc<Enricher>,
    pub window: SlidingWindow,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
}

impl Services {
    /// Assemble services around an existing store and provider.
    pub fn new(
        config: &Config,
        store: Arc<dyn FragmentStore>,
        inference: Arc<dyn InferenceProvider>,
    ) -> Result<Self> {
        let progress = InMemoryProgressStore::new(chrono::Duration::seconds(
            config.progress.retention_secs,
        ));
        Self::with_progress(config, store, Arc::new(progress), inference)
    }

    /// Like [`Services::new`], with an explicit progress store.
    pub fn with_progress(
        config: &Config,
        store: Arc<dyn FragmentStore>,
        progress: Arc<dyn ProgressStore>,
        inference: Arc<dyn InferenceProvider>,
    ) -> Result<Self> {
        let enricher = Enricher::new(config.catalog.load()?)
            .with_min_template_score(config.ingest.min_template_score)
            .with_context_chars(config.ingest.inference_context_chars);
        Ok(Self {
            store,
            progress,
            inference,
            enricher: Arc::new(enricher),
            window: config.chunking.window()?,
            ingest: config.ingest.clone(),
            retrieval: config.retrieval.clone(),
        })
    }

    /// SQLite store (schema applied) plus the configured inference provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate(&pool).await?;
        let store: Arc<dyn FragmentStore> = Arc::new(SqliteFragmentStore::new(pool));
        let inference: Arc<dyn InferenceProvider> =
            Arc::from(create_provider(&config.inference)?);
        Self::new(config, store, inference)
    }
}
