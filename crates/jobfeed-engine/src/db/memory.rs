//! In-memory posting sink for dry runs

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use jobfeed_common::NewPosting;

use super::{PostingSink, StoreResult};

/// Collects postings instead of writing them to the database
#[derive(Debug, Default)]
pub struct MemorySink {
    postings: Mutex<Vec<(Uuid, NewPosting)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.postings.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.postings.lock().await.is_empty()
    }

    /// Snapshot of everything inserted so far, in insertion order
    pub async fn postings(&self) -> Vec<NewPosting> {
        self.postings
            .lock()
            .await
            .iter()
            .map(|(_, posting)| posting.clone())
            .collect()
    }
}

#[async_trait]
impl PostingSink for MemorySink {
    async fn insert_posting(&self, posting: &NewPosting) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.postings.lock().await.push((id, posting.clone()));
        Ok(id)
    }
}
