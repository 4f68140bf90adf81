//! Ingestion pipeline
//!
//! One [`IngestionCoordinator`] drives one source through
//! `Paginating -> FetchingBatch -> (Paginating | Done | Aborted)`.
//! [`IngestionService`] runs coordinators for several sources concurrently
//! and keeps their failures apart.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::IngestConfig;

pub mod coordinator;
pub mod service;

pub use coordinator::{IngestionCoordinator, RunState};
pub use service::IngestionService;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Unknown source '{name}'. Registered sources: {known}")]
    UnknownSource { name: String, known: String },
}

/// Scheduling of detail fetches within one source run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Concurrent detail fetches per batch
    pub batch_width: usize,
    /// Pause between batches of the same page
    pub batch_delay: Duration,
    /// Pause before requesting the next listing page
    pub page_delay: Duration,
    pub max_pages: Option<u32>,
}

impl BatchConfig {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            batch_width: config.batch_width.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_pages: config.max_pages,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Outcome of one source run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: String,
    pub inserted: usize,
    pub skipped: usize,
    /// Listing pages fetched successfully
    pub pages: u32,
    /// The run ended on a listing failure
    pub aborted: bool,
    /// The run was stopped by its caller
    pub cancelled: bool,
}

impl IngestReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Report for a run that never got to finish its own bookkeeping
    pub fn aborted(source: impl Into<String>) -> Self {
        Self {
            aborted: true,
            ..Self::new(source)
        }
    }
}
