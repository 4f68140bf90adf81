//! Concurrent ingestion across registered sources

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{BatchConfig, IngestError, IngestReport, IngestionCoordinator};
use crate::db::PostingSink;
use crate::fetch::ResilientFetcher;
use crate::sources::SourceRegistry;

/// Runs ingestion for one source or for all of them
#[derive(Clone)]
pub struct IngestionService {
    registry: SourceRegistry,
    fetcher: Arc<ResilientFetcher>,
    sink: Arc<dyn PostingSink>,
    config: BatchConfig,
}

impl IngestionService {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<ResilientFetcher>,
        sink: Arc<dyn PostingSink>,
        config: BatchConfig,
    ) -> Self {
        Self {
            registry,
            fetcher,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn coordinator(&self, name: &str) -> Result<IngestionCoordinator, IngestError> {
        let adapter = self.registry.get(name).ok_or_else(|| IngestError::UnknownSource {
            name: name.to_string(),
            known: self.registry.names().join(", "),
        })?;

        Ok(IngestionCoordinator::new(
            adapter,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.sink),
            self.config,
        ))
    }

    /// Run one source in the calling task
    pub async fn run_ingestion(
        &self,
        source_name: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let coordinator = self.coordinator(source_name)?;
        Ok(coordinator.run(cancel).await)
    }

    /// Run every registered source concurrently, one task each.
    ///
    /// Reports come back in registry order. A task that panics is reported as
    /// aborted; its siblings keep running.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Vec<IngestReport> {
        let names = self.registry.names();
        self.run_many(&names, cancel).await
    }

    /// Run the named sources concurrently
    pub async fn run_many(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Vec<IngestReport> {
        let mut handles = Vec::with_capacity(names.len());

        for name in names {
            match self.coordinator(name) {
                Ok(coordinator) => {
                    let token = cancel.child_token();
                    let handle = tokio::spawn(async move { coordinator.run(&token).await });
                    handles.push((name.clone(), Some(handle)));
                },
                Err(e) => {
                    error!(error = %e, "Skipping source");
                    handles.push((name.clone(), None));
                },
            }
        }

        info!(sources = handles.len(), "Ingestion runs started");

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let report = match handle {
                Some(handle) => match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(source = %name, error = %e, "Ingestion task failed");
                        IngestReport::aborted(name)
                    },
                },
                None => IngestReport::aborted(name),
            };
            reports.push(report);
        }

        reports
    }
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
