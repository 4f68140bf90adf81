//! Per-session search context
//!
//! Front ends keep a user's current filters and keyword expression here,
//! keyed by an opaque session id. Entries expire after `ttl` without use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::query::{FilterSpec, KeywordExpr, PostingQuery};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub filters: FilterSpec,
    /// Raw keyword expression as typed by the user
    pub keywords: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SessionContext {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            filters: FilterSpec::new(),
            keywords: None,
            created_at: now,
            last_seen: now,
        }
    }

    /// Query for the session's current selection
    pub fn to_query(&self, limit: i64, offset: i64) -> PostingQuery {
        let mut query = PostingQuery::new(self.filters.clone()).page(limit, offset);
        if let Some(expr) = self.keywords.as_deref().map(KeywordExpr::parse) {
            if !expr.is_empty() {
                query = query.with_keywords(expr);
            }
        }
        query
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionContext>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    fn is_expired(&self, context: &SessionContext, now: DateTime<Utc>) -> bool {
        now - context.last_seen > self.ttl
    }

    /// Remove every expired entry; callers hold the write lock
    fn sweep(&self, sessions: &mut HashMap<String, SessionContext>, now: DateTime<Utc>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, context| !self.is_expired(context, now));
        before - sessions.len()
    }

    /// Current context for `session_id`, starting a fresh one if missing or expired.
    ///
    /// Expired sessions of other ids are evicted on the way.
    pub async fn get_or_create(&self, session_id: &str) -> SessionContext {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions, now);

        let context = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(now));
        context.last_seen = now;

        context.clone()
    }

    /// Read without touching `last_seen`
    pub async fn get(&self, session_id: &str) -> Option<SessionContext> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|context| !self.is_expired(context, now))
            .cloned()
    }

    /// Apply `change` to the session's context and return the result
    pub async fn update<F>(&self, session_id: &str, change: F) -> SessionContext
    where
        F: FnOnce(&mut SessionContext),
    {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions, now);

        let context = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(now));

        change(context);
        context.last_seen = now;
        context.clone()
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.write().await.remove(session_id)
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions, now)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterField;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(Duration::from_secs(60));

        store
            .update("alice", |ctx| ctx.filters.insert(FilterField::Profession, "python"))
            .await;
        let bob = store.get_or_create("bob").await;

        assert!(bob.filters.is_empty());
        assert_eq!(
            store.get("alice").await.map(|ctx| ctx.filters.values(FilterField::Profession).to_vec()),
            Some(vec!["python".to_string()])
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        let store = SessionStore::new(Duration::ZERO);

        store
            .update("s1", |ctx| ctx.keywords = Some("python, -java".to_string()))
            .await;
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.get("s1").await.is_none());
        let fresh = store.get_or_create("s1").await;
        assert!(fresh.keywords.is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SessionStore::new(Duration::ZERO);
        store.get_or_create("a").await;
        store.get_or_create("b").await;
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.purge_expired().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_evicted_on_access() {
        let store = SessionStore::new(Duration::ZERO);
        for i in 0..100 {
            store.get_or_create(&format!("s{}", i)).await;
        }
        std::thread::sleep(Duration::from_millis(5));

        store.get_or_create("another").await;
        assert_eq!(store.len().await, 1);

        std::thread::sleep(Duration::from_millis(5));
        store.update("third", |ctx| ctx.keywords = Some("rust".to_string())).await;
        assert_eq!(store.len().await, 1);
        assert!(store.get("another").await.is_none());
    }

    #[tokio::test]
    async fn test_live_sessions_survive_eviction() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.get_or_create("a").await;
        store.get_or_create("b").await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.get_or_create("a").await;
        assert!(store.remove("a").await.is_some());
        assert!(store.remove("a").await.is_none());
    }

    #[test]
    fn test_context_to_query() {
        let mut context = SessionContext::new(Utc::now());
        context.filters.insert(FilterField::SalaryFrom, "50000");
        context.keywords = Some(" , ".to_string());

        let query = context.to_query(20, 40);
        assert!(query.keywords.is_none());
        assert_eq!((query.limit, query.offset), (20, 40));

        context.keywords = Some("python".to_string());
        assert_eq!(
            context.to_query(20, 0).keywords.map(|k| k.include),
            Some(vec!["python".to_string()])
        );
    }
}
