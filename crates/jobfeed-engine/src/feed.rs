//! Operations offered to front ends
//!
//! [`JobFeed`] ties the store and the ingestion service together behind the
//! calls a bot or read API makes: run ingestion, query postings, list
//! employment types, and purge stale rows. It also owns the session store
//! that front ends keep per-user selections in.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use jobfeed_common::Source;

use crate::config::AppConfig;
use crate::db::{PostingStore, QueryFailure, StoreResult};
use crate::fetch::{FetchError, ResilientFetcher};
use crate::ingest::{BatchConfig, IngestError, IngestReport, IngestionService};
use crate::query::{FilterSpec, KeywordExpr, PostingPage, PostingQuery, QueryError};
use crate::session::SessionStore;
use crate::sources::SourceRegistry;

#[derive(Debug, Clone)]
pub struct JobFeed {
    store: PostingStore,
    ingestion: IngestionService,
    sessions: Arc<SessionStore>,
}

impl JobFeed {
    pub fn new(store: PostingStore, ingestion: IngestionService, sessions: SessionStore) -> Self {
        Self {
            store,
            ingestion,
            sessions: Arc::new(sessions),
        }
    }

    /// Wire the built-in sources, fetcher, and store from configuration
    pub fn from_config(config: &AppConfig, store: PostingStore) -> Result<Self, FetchError> {
        let fetcher = ResilientFetcher::from_config(&config.fetch)?;
        let ingestion = IngestionService::new(
            SourceRegistry::from_config(&config.sources),
            Arc::new(fetcher),
            Arc::new(store.clone()),
            BatchConfig::from_config(&config.ingest),
        );
        let sessions = SessionStore::new(Duration::from_secs(config.sessions.ttl_secs));
        Ok(Self::new(store, ingestion, sessions))
    }

    pub fn store(&self) -> &PostingStore {
        &self.store
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Upsert a `sources` row for every registered adapter
    pub async fn register_sources(&self) -> StoreResult<Vec<Source>> {
        let sources: Vec<Source> = self
            .ingestion
            .registry()
            .adapters()
            .map(|adapter| adapter.source())
            .collect();

        for source in &sources {
            self.store.register_source(source).await?;
        }

        Ok(sources)
    }

    pub async fn run_ingestion(
        &self,
        source_name: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        self.ingestion.run_ingestion(source_name, cancel).await
    }

    pub async fn run_all(&self, cancel: &CancellationToken) -> Vec<IngestReport> {
        self.ingestion.run_all(cancel).await
    }

    /// Postings matching `filters`, newest first
    pub async fn query_postings(
        &self,
        filters: FilterSpec,
        limit: i64,
        offset: i64,
    ) -> Result<PostingPage, QueryFailure> {
        self.execute(PostingQuery::new(filters).page(limit, offset)).await
    }

    /// Postings matching a keyword expression on top of `extra_filters`
    pub async fn query_postings_by_keyword(
        &self,
        keywords: &str,
        extra_filters: FilterSpec,
        limit: i64,
        offset: i64,
    ) -> Result<PostingPage, QueryFailure> {
        let expr = KeywordExpr::parse(keywords);
        if expr.is_empty() {
            return Err(QueryError::EmptyKeywords.into());
        }

        self.execute(
            PostingQuery::new(extra_filters)
                .with_keywords(expr)
                .page(limit, offset),
        )
        .await
    }

    /// Run the filters and keywords saved in a session
    pub async fn query_session(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PostingPage, QueryFailure> {
        let context = self.sessions.get_or_create(session_id).await;
        self.execute(context.to_query(limit, offset)).await
    }

    async fn execute(&self, query: PostingQuery) -> Result<PostingPage, QueryFailure> {
        query.validate()?;

        let items = self.store.select_postings(&query).await?;
        let total = self
            .store
            .count_postings(&query.filters, query.keywords.as_ref())
            .await?;

        Ok(PostingPage::new(items, total, query.limit, query.offset))
    }

    pub async fn list_employment_types(&self) -> StoreResult<Vec<String>> {
        self.store.list_employment_types().await
    }

    /// Delete postings older than `days`, returning how many were removed
    pub async fn purge_stale(&self, days: i32) -> StoreResult<u64> {
        self.store.purge(days).await
    }
}
