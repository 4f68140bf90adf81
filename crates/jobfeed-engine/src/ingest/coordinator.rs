//! Per-source ingestion run
//!
//! Pages are requested strictly one after another. Items of a page are
//! processed in batches of `batch_width` concurrent detail fetches, with
//! `batch_delay` between batches. A failing item is logged and skipped; a
//! failing listing request ends the run as aborted.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BatchConfig, IngestReport};
use crate::db::PostingSink;
use crate::fetch::ResilientFetcher;
use crate::sources::{ListingPage, RawItem, SourceAdapter};

/// Position of a run in its state machine
#[derive(Debug)]
pub enum RunState {
    Paginating,
    FetchingBatch(ListingPage),
    Done,
    Aborted,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Cancelled)
    }
}

pub struct IngestionCoordinator {
    adapter: Arc<dyn SourceAdapter>,
    fetcher: Arc<ResilientFetcher>,
    sink: Arc<dyn PostingSink>,
    config: BatchConfig,
}

impl IngestionCoordinator {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        fetcher: Arc<ResilientFetcher>,
        sink: Arc<dyn PostingSink>,
        mut config: BatchConfig,
    ) -> Self {
        config.batch_width = config.batch_width.max(1);
        Self {
            adapter,
            fetcher,
            sink,
            config,
        }
    }

    pub fn source_name(&self) -> &str {
        self.adapter.name()
    }

    /// Run the source to completion, abort, or cancellation.
    ///
    /// Postings inserted before a cancellation or abort stay in the sink.
    #[tracing::instrument(skip_all, fields(source = %self.adapter.name()))]
    pub async fn run(&self, cancel: &CancellationToken) -> IngestReport {
        let mut report = IngestReport::new(self.adapter.name());
        let mut state = RunState::Paginating;
        let mut page = 0u32;

        info!("Starting ingestion run");

        while !state.is_terminal() {
            state = match state {
                RunState::Paginating => self.paginate(page, cancel, &mut report).await,
                RunState::FetchingBatch(listing) => {
                    let next = self.fetch_batches(page, listing, cancel, &mut report).await;
                    page += 1;
                    next
                },
                terminal => terminal,
            };
        }

        match state {
            RunState::Aborted => report.aborted = true,
            RunState::Cancelled => report.cancelled = true,
            _ => {},
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            pages = report.pages,
            aborted = report.aborted,
            cancelled = report.cancelled,
            "Ingestion run finished"
        );

        report
    }

    async fn paginate(
        &self,
        page: u32,
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) -> RunState {
        if cancel.is_cancelled() {
            return RunState::Cancelled;
        }

        if let Some(max_pages) = self.config.max_pages {
            if page >= max_pages {
                info!(max_pages, "Page limit reached");
                return RunState::Done;
            }
        }

        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RunState::Cancelled,
            listing = self.adapter.list_page(&self.fetcher, page) => listing,
        };

        match listing {
            Ok(listing) => {
                report.pages += 1;
                debug!(page, items = listing.items.len(), has_more = listing.has_more, "Listing page fetched");

                if listing.items.is_empty() {
                    info!(page, "Empty listing page, done");
                    RunState::Done
                } else {
                    RunState::FetchingBatch(listing)
                }
            },
            Err(e) => {
                error!(page, error = %e, "Listing fetch failed, aborting source");
                RunState::Aborted
            },
        }
    }

    async fn fetch_batches(
        &self,
        page: u32,
        listing: ListingPage,
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) -> RunState {
        for (index, batch) in listing.items.chunks(self.config.batch_width).enumerate() {
            if index > 0 && !self.wait(self.config.batch_delay, cancel).await {
                return RunState::Cancelled;
            }
            if cancel.is_cancelled() {
                return RunState::Cancelled;
            }

            let outcomes = join_all(batch.iter().map(|item| self.process_item(page, item))).await;
            let inserted = outcomes.iter().filter(|ok| **ok).count();
            report.inserted += inserted;
            report.skipped += outcomes.len() - inserted;

            debug!(page, batch = index, inserted, size = outcomes.len(), "Batch stored");
        }

        if !listing.has_more {
            info!(page, "Last page reached");
            return RunState::Done;
        }

        if !self.wait(self.config.page_delay, cancel).await {
            return RunState::Cancelled;
        }

        RunState::Paginating
    }

    /// Fetch, normalize, and store one item; false when it was skipped
    async fn process_item(&self, page: u32, item: &RawItem) -> bool {
        let raw = match self.adapter.fetch_detail(&self.fetcher, item).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(item_id = %item.id, page, error = %e, "Detail fetch failed, skipping item");
                return false;
            },
        };

        let posting = match self.adapter.normalize(&raw) {
            Ok(posting) => posting,
            Err(e) => {
                warn!(item_id = %item.id, page, error = %e, "Normalization failed, skipping item");
                return false;
            },
        };

        if posting.salary.is_inverted() {
            warn!(
                item_id = %item.id,
                salary_from = posting.salary.from,
                salary_to = posting.salary.to,
                "Salary range is inverted, keeping both figures"
            );
        }

        match self.sink.insert_posting(&posting).await {
            Ok(id) => {
                debug!(item_id = %item.id, posting_id = %id, "Posting stored");
                true
            },
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    page,
                    constraint = e.is_constraint_violation(),
                    error = %e,
                    "Insert failed, skipping item"
                );
                false
            },
        }
    }

    /// Sleep unless cancelled first; false on cancellation
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{MemorySink, StoreError, StoreResult};
    use crate::fetch::{EgressPool, FetchError, RetryPolicy};
    use crate::sources::NormalizeError;
    use async_trait::async_trait;
    use jobfeed_common::{NewPosting, SalaryRange};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Adapter serving scripted pages without any HTTP
    struct ScriptedAdapter {
        pages: Vec<Result<ListingPage, ()>>,
        failing_details: Vec<String>,
        listed: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        detail_delay: Duration,
        cancel_after_page: Option<(u32, CancellationToken)>,
    }

    impl ScriptedAdapter {
        fn new(pages: Vec<Result<ListingPage, ()>>) -> Self {
            Self {
                pages,
                failing_details: Vec::new(),
                listed: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                detail_delay: Duration::ZERO,
                cancel_after_page: None,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        fn base_url(&self) -> &str {
            "http://scripted.test"
        }

        async fn list_page(&self, _fetcher: &ResilientFetcher, page: u32) -> Result<ListingPage, FetchError> {
            self.listed.fetch_add(1, Ordering::SeqCst);
            if let Some((after, token)) = &self.cancel_after_page {
                if page > *after {
                    token.cancel();
                }
            }
            match self.pages.get(page as usize) {
                Some(Ok(listing)) => Ok(listing.clone()),
                Some(Err(())) => Err(FetchError::Exhausted {
                    url: format!("http://scripted.test/page/{}", page),
                    attempts: 3,
                    last: "status 503".to_string(),
                }),
                None => Ok(ListingPage::default()),
            }
        }

        async fn fetch_detail(&self, _fetcher: &ResilientFetcher, item: &RawItem) -> Result<Value, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.detail_delay.is_zero() {
                tokio::time::sleep(self.detail_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing_details.contains(&item.id) {
                return Err(FetchError::Rejected {
                    url: item.id.clone(),
                    status: 404,
                });
            }
            Ok(item.data.clone())
        }

        fn normalize(&self, raw: &Value) -> Result<NewPosting, NormalizeError> {
            let title = raw["title"].as_str().ok_or(NormalizeError::MissingField("title"))?;
            Ok(NewPosting {
                title: title.to_string(),
                profession: String::new(),
                company_name: String::new(),
                salary: SalaryRange::from_raw(raw["from"].as_f64(), raw["to"].as_f64()),
                source_name: "scripted".to_string(),
                link: format!("http://scripted.test/{}", title),
                description: String::new(),
                employment_types: Vec::new(),
            })
        }
    }

    /// Sink rejecting postings with a given title
    #[derive(Default)]
    struct PickySink {
        rejected_title: String,
        stored: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PostingSink for PickySink {
        async fn insert_posting(&self, posting: &NewPosting) -> StoreResult<Uuid> {
            if posting.title == self.rejected_title {
                return Err(StoreError::Invalid("rejected".to_string()));
            }
            self.stored.lock().unwrap().push(posting.title.clone());
            Ok(Uuid::new_v4())
        }
    }

    fn page(ids: &[&str], has_more: bool) -> Result<ListingPage, ()> {
        Ok(ListingPage {
            items: ids
                .iter()
                .map(|id| RawItem {
                    id: id.to_string(),
                    data: json!({ "title": id }),
                })
                .collect(),
            has_more,
        })
    }

    fn fetcher() -> Arc<ResilientFetcher> {
        Arc::new(ResilientFetcher::new(
            EgressPool::build(&[], Duration::from_secs(1), "test").unwrap(),
            RetryPolicy::new(1, Duration::ZERO, Duration::ZERO),
        ))
    }

    fn quick(batch_width: usize) -> BatchConfig {
        BatchConfig {
            batch_width,
            batch_delay: Duration::from_millis(50),
            page_delay: Duration::from_millis(50),
            max_pages: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_walks_pages_until_source_reports_end() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            page(&["a", "b", "c"], true),
            page(&["d"], false),
            page(&["never"], false),
        ]));
        let sink = Arc::new(MemorySink::new());
        let coordinator = IngestionCoordinator::new(adapter.clone(), fetcher(), sink.clone(), quick(2));

        let report = coordinator.run(&CancellationToken::new()).await;

        assert_eq!(report.inserted, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.pages, 2);
        assert!(!report.aborted && !report.cancelled);
        assert_eq!(adapter.listed.load(Ordering::SeqCst), 2);
        assert_eq!(sink.len().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_failures_are_skipped() {
        let mut adapter = ScriptedAdapter::new(vec![Ok(ListingPage {
            items: vec![
                RawItem { id: "ok".into(), data: json!({ "title": "ok" }) },
                RawItem { id: "gone".into(), data: json!({ "title": "gone" }) },
                RawItem { id: "shapeless".into(), data: json!({ "name": 1 }) },
                RawItem { id: "dup".into(), data: json!({ "title": "dup" }) },
                RawItem { id: "inverted".into(), data: json!({ "title": "inverted", "from": 90000.0, "to": 30000.0 }) },
            ],
            has_more: false,
        })]);
        adapter.failing_details = vec!["gone".to_string()];
        let sink = Arc::new(PickySink {
            rejected_title: "dup".to_string(),
            ..PickySink::default()
        });

        let coordinator = IngestionCoordinator::new(Arc::new(adapter), fetcher(), sink.clone(), quick(2));
        let report = coordinator.run(&CancellationToken::new()).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 3);
        assert!(!report.aborted);
        assert_eq!(*sink.stored.lock().unwrap(), vec!["ok", "inverted"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_failure_aborts_but_keeps_earlier_pages() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![page(&["a", "b"], true), Err(())]));
        let sink = Arc::new(MemorySink::new());
        let coordinator = IngestionCoordinator::new(adapter, fetcher(), sink.clone(), quick(4));

        let report = coordinator.run(&CancellationToken::new()).await;

        assert!(report.aborted);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.pages, 1);
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_width_bounds_concurrency() {
        let mut adapter = ScriptedAdapter::new(vec![page(&["1", "2", "3", "4", "5", "6", "7"], false)]);
        adapter.detail_delay = Duration::from_millis(10);
        let adapter = Arc::new(adapter);

        let coordinator = IngestionCoordinator::new(adapter.clone(), fetcher(), Arc::new(MemorySink::new()), quick(3));
        let report = coordinator.run(&CancellationToken::new()).await;

        assert_eq!(report.inserted, 7);
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_batch_width_runs_one_item_at_a_time() {
        let mut adapter = ScriptedAdapter::new(vec![page(&["a", "b"], false)]);
        adapter.detail_delay = Duration::from_millis(10);
        let adapter = Arc::new(adapter);

        let coordinator = IngestionCoordinator::new(adapter.clone(), fetcher(), Arc::new(MemorySink::new()), quick(0));
        let report = coordinator.run(&CancellationToken::new()).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_before_next_page() {
        let token = CancellationToken::new();
        let mut adapter = ScriptedAdapter::new(vec![
            page(&["a"], true),
            page(&["b"], true),
            page(&["c"], true),
        ]);
        adapter.cancel_after_page = Some((0, token.clone()));
        let sink = Arc::new(MemorySink::new());

        let coordinator = IngestionCoordinator::new(Arc::new(adapter), fetcher(), sink.clone(), quick(1));
        let report = coordinator.run(&token).await;

        assert!(report.cancelled);
        assert!(!report.aborted);
        assert_eq!(report.inserted, 1);
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let adapter = Arc::new(ScriptedAdapter::new(vec![page(&["a"], false)]));

        let coordinator = IngestionCoordinator::new(adapter.clone(), fetcher(), Arc::new(MemorySink::new()), quick(1));
        let report = coordinator.run(&token).await;

        assert!(report.cancelled);
        assert_eq!(adapter.listed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_cap() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            page(&["a"], true),
            page(&["b"], true),
            page(&["c"], true),
        ]));
        let mut config = quick(1);
        config.max_pages = Some(2);

        let coordinator = IngestionCoordinator::new(adapter, fetcher(), Arc::new(MemorySink::new()), config);
        let report = coordinator.run(&CancellationToken::new()).await;

        assert_eq!(report.pages, 2);
        assert_eq!(report.inserted, 2);
        assert!(!report.cancelled && !report.aborted);
    }
}
