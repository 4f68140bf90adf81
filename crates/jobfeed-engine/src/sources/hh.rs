//! hh.ru adapter
//!
//! Listing: `GET {base}/vacancies?text&area&per_page&page&experience=noExperience`
//! returns `{items: [{id, ..}], page, pages, found}`. Listing entries are
//! abbreviated, so every item is re-fetched from `GET {base}/vacancies/{id}`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::warn;
use url::Url;

use jobfeed_common::text::strip_markup;
use jobfeed_common::{NewPosting, SalaryRange};

use super::{item_id, json_kind, number_at, text_at, ListingPage, NormalizeError, RawItem, SourceAdapter};
use crate::config::HhConfig;
use crate::fetch::{FetchError, ResilientFetcher};

pub const SOURCE_NAME: &str = "hh.ru";

/// Identification header the API asks clients to send
pub const USER_AGENT_HEADER: &str = "HH-User-Agent";

#[derive(Debug, Clone)]
pub struct HhAdapter {
    config: HhConfig,
    base_url: String,
    headers: HeaderMap,
}

impl HhAdapter {
    pub fn new(config: HhConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&config.user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT_HEADER, value);
            },
            Err(e) => warn!(source = SOURCE_NAME, error = %e, "Unusable HH user agent, not sending it"),
        }

        Self {
            config,
            base_url,
            headers,
        }
    }

    /// `{base}/vacancies/{id}` with the id as one escaped path segment
    fn detail_url(&self, id: &str) -> Result<Url, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            base: self.base_url.clone(),
            reason: reason.to_string(),
        };

        if matches!(id, "" | "." | "..") {
            return Err(invalid(&format!("unusable vacancy id '{}'", id)));
        }

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path"))?
            .pop_if_empty()
            .push("vacancies")
            .push(id);
        Ok(url)
    }

    fn listing_query(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("text", self.config.query.clone()),
            ("area", self.config.area.clone()),
            ("per_page", self.config.page_size.to_string()),
            ("page", page.to_string()),
            ("experience", "noExperience".to_string()),
        ]
    }
}

/// Items and continuation flag from a listing body
fn parse_listing(url: &str, body: &Value, page: u32) -> Result<ListingPage, FetchError> {
    let entries = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::InvalidBody {
            url: url.to_string(),
            reason: "listing has no 'items' array".to_string(),
        })?;

    let items: Vec<RawItem> = entries
        .iter()
        .filter_map(|entry| match item_id(entry) {
            Some(id) => Some(RawItem {
                id,
                data: entry.clone(),
            }),
            None => {
                warn!(source = SOURCE_NAME, page, "Listing entry without id, skipping");
                None
            },
        })
        .collect();

    let pages = body.get("pages").and_then(Value::as_u64).unwrap_or(0);
    let has_more = !entries.is_empty() && u64::from(page) + 1 < pages;

    Ok(ListingPage { items, has_more })
}

#[async_trait]
impl SourceAdapter for HhAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_page(&self, fetcher: &ResilientFetcher, page: u32) -> Result<ListingPage, FetchError> {
        let url = format!("{}/vacancies", self.base_url);
        let body = fetcher
            .fetch(&url, &self.listing_query(page), &self.headers)
            .await?;
        parse_listing(&url, &body, page)
    }

    async fn fetch_detail(&self, fetcher: &ResilientFetcher, item: &RawItem) -> Result<Value, FetchError> {
        let url = self.detail_url(&item.id)?;
        fetcher.fetch(url.as_str(), &[], &self.headers).await
    }

    fn normalize(&self, raw: &Value) -> Result<NewPosting, NormalizeError> {
        if !raw.is_object() {
            return Err(NormalizeError::UnexpectedShape(format!(
                "expected a vacancy object, got {}",
                json_kind(raw)
            )));
        }

        let title = text_at(raw, &["name"]).ok_or(NormalizeError::MissingField("name"))?;
        let link =
            text_at(raw, &["alternate_url"]).ok_or(NormalizeError::MissingField("alternate_url"))?;

        let profession = raw
            .get("professional_roles")
            .and_then(|roles| roles.get(0))
            .and_then(|role| text_at(role, &["name"]))
            .unwrap_or_default();

        let salary = SalaryRange::from_raw(
            number_at(raw, &["salary", "from"]),
            number_at(raw, &["salary", "to"]),
        );

        Ok(NewPosting {
            title,
            profession,
            company_name: text_at(raw, &["employer", "name"]).unwrap_or_default(),
            salary,
            source_name: SOURCE_NAME.to_string(),
            link,
            description: text_at(raw, &["description"])
                .map(|html| strip_markup(&html))
                .unwrap_or_default(),
            employment_types: text_at(raw, &["employment", "name"]).into_iter().collect(),
        })
    }
}
