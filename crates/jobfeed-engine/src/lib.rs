//! Jobfeed Engine Library
//!
//! Aggregates entry-level job postings from several job boards into
//! PostgreSQL and answers filtered and keyword queries over them.
//!
//! # Overview
//!
//! - **Fetching**: `ResilientFetcher` with bounded retries, exponential backoff,
//!   and proxy rotation on 403
//! - **Sources**: one `SourceAdapter` per job board, looked up in a `SourceRegistry`
//! - **Ingestion**: a coordinator per source; sources run concurrently and fail independently
//! - **Store**: postings, employment types, and sources in PostgreSQL via SQLx
//! - **Queries**: parameterized filters and include/exclude keyword search
//! - **Sessions**: per-session filter state for front ends
//!
//! # Data Flow
//!
//! ```text
//! IngestionCoordinator -> SourceAdapter::list_page -> ResilientFetcher::get_json
//!                      -> SourceAdapter::fetch_detail / normalize
//!                      -> PostingSink::insert_posting
//!
//! caller -> FilterSpec (+ KeywordExpr) -> query::build_select -> PostingStore
//! ```
//!
//! # Example
//!
//! ```no_run
//! use jobfeed_engine::{config::AppConfig, db, JobFeed, PostingStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let feed = JobFeed::from_config(&config, PostingStore::new(pool))?;
//!
//!     for report in feed.run_all(&CancellationToken::new()).await {
//!         println!("{}: {} inserted", report.source, report.inserted);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod feed;
pub mod fetch;
pub mod ingest;
pub mod query;
pub mod session;
pub mod sources;

pub use db::{MemorySink, PostingSink, PostingStore, StoreError};
pub use feed::JobFeed;
pub use fetch::{FetchError, ResilientFetcher, RetryPolicy};
pub use ingest::{IngestError, IngestReport, IngestionCoordinator, IngestionService};
pub use query::{FilterField, FilterSpec, KeywordExpr, PostingPage, PostingQuery, QueryError};
pub use session::{SessionContext, SessionStore};
pub use sources::{SourceAdapter, SourceRegistry};
