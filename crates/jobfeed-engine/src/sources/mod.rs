//! Job board adapters
//!
//! A [`SourceAdapter`] knows one board's listing endpoint, detail endpoint,
//! and record shape. The ingestion coordinator only talks to this trait, so a
//! new board is added by implementing it and registering the adapter in a
//! [`SourceRegistry`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use jobfeed_common::{NewPosting, Source};

use crate::config::SourcesConfig;
use crate::fetch::{FetchError, ResilientFetcher};

pub mod hh;
pub mod trudvsem;

pub use hh::HhAdapter;
pub use trudvsem::TrudvsemAdapter;

/// A raw record could not be mapped to a posting
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("Unexpected record shape: {0}")]
    UnexpectedShape(String),
}

/// One listing entry as returned by a board, before detail fetching
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Board-side identifier, used in logs
    pub id: String,
    pub data: Value,
}

/// One listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<RawItem>,
    /// Whether the board's own accounting reports another page
    pub has_more: bool,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name, also stored as `source_name` on postings
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn source(&self) -> Source {
        Source::new(self.name(), self.base_url())
    }

    /// Fetch listing page `page` (0-based)
    async fn list_page(&self, fetcher: &ResilientFetcher, page: u32) -> Result<ListingPage, FetchError>;

    /// Fetch the full record for a listing entry.
    ///
    /// Boards whose listing already carries every field return the entry as is.
    async fn fetch_detail(&self, _fetcher: &ResilientFetcher, item: &RawItem) -> Result<Value, FetchError> {
        Ok(item.data.clone())
    }

    /// Map a full record to a posting
    fn normalize(&self, raw: &Value) -> Result<NewPosting, NormalizeError>;
}

/// Adapters by name
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in board configured from `config`
    pub fn from_config(config: &SourcesConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HhAdapter::new(config.hh.clone())));
        registry.register(Arc::new(TrudvsemAdapter::new(config.trudvsem.clone())));
        registry
    }

    /// Add an adapter, replacing any previous one with the same name
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

// ============================================================================
// JSON helpers shared by adapters
// ============================================================================

/// Follow a path of object keys
pub(crate) fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Trimmed string at `path`; numbers are rendered, null and blank are `None`
pub(crate) fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Number at `path`, accepting numeric strings
pub(crate) fn number_at(value: &Value, path: &[&str]) -> Option<f64> {
    match lookup(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Board identifier of a listing entry
pub(crate) fn item_id(value: &Value) -> Option<String> {
    text_at(value, &["id"])
}

/// JSON type name for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_from_config() {
        let registry = SourceRegistry::from_config(&SourcesConfig::default());
        assert_eq!(registry.names(), vec!["hh.ru".to_string(), "trudvsem.ru".to_string()]);
        assert!(registry.get("hh.ru").is_some());
        assert!(registry.get("superjob.ru").is_none());
    }

    #[test]
    fn test_json_helpers() {
        let value = json!({
            "salary": { "from": 40000, "to": "60000" },
            "name": "  ",
            "id": 123
        });

        assert_eq!(number_at(&value, &["salary", "from"]), Some(40000.0));
        assert_eq!(number_at(&value, &["salary", "to"]), Some(60000.0));
        assert_eq!(number_at(&value, &["salary", "currency"]), None);
        assert_eq!(text_at(&value, &["name"]), None);
        assert_eq!(item_id(&value), Some("123".to_string()));
    }
}
