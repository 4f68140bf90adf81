//! trudvsem.ru open data adapter
//!
//! Listing: `GET {base}/vacancies/region/{region}?text&offset&limit`. The
//! listing already carries complete records, so there is no detail request.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use jobfeed_common::text::strip_markup;
use jobfeed_common::{NewPosting, SalaryRange};

use super::{item_id, json_kind, number_at, text_at, ListingPage, NormalizeError, RawItem, SourceAdapter};
use crate::config::TrudvsemConfig;
use crate::fetch::{FetchError, ResilientFetcher};

pub const SOURCE_NAME: &str = "trudvsem.ru";

#[derive(Debug, Clone)]
pub struct TrudvsemAdapter {
    config: TrudvsemConfig,
    base_url: String,
}

impl TrudvsemAdapter {
    pub fn new(config: TrudvsemConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self { config, base_url }
    }

    fn listing_query(&self, page: u32) -> Vec<(&'static str, String)> {
        let page_size = u64::from(self.config.page_size);
        vec![
            ("text", self.config.query.clone()),
            ("offset", (u64::from(page) * page_size).to_string()),
            ("limit", page_size.to_string()),
        ]
    }

    fn parse_listing(&self, url: &str, body: &Value, page: u32) -> Result<ListingPage, FetchError> {
        if !body.is_object() {
            return Err(FetchError::InvalidBody {
                url: url.to_string(),
                reason: format!("expected an object, got {}", json_kind(body)),
            });
        }

        // An empty result set comes back without the vacancies array
        let entries = body
            .get("results")
            .and_then(|results| results.get("vacancies"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let items: Vec<RawItem> = entries
            .iter()
            .filter_map(|entry| {
                let vacancy = entry.get("vacancy").unwrap_or(entry);
                match item_id(vacancy) {
                    Some(id) => Some(RawItem {
                        id,
                        data: vacancy.clone(),
                    }),
                    None => {
                        warn!(source = SOURCE_NAME, page, "Listing entry without id, skipping");
                        None
                    },
                }
            })
            .collect();

        let total = number_at(body, &["meta", "total"])
            .or_else(|| number_at(body, &["results", "total"]))
            .map(|total| total.max(0.0) as u64)
            .unwrap_or(0);
        let seen = (u64::from(page) + 1) * u64::from(self.config.page_size);
        let has_more = !entries.is_empty() && seen < total;

        Ok(ListingPage { items, has_more })
    }
}

#[async_trait]
impl SourceAdapter for TrudvsemAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_page(&self, fetcher: &ResilientFetcher, page: u32) -> Result<ListingPage, FetchError> {
        let url = format!("{}/vacancies/region/{}", self.base_url, self.config.region);
        let body = fetcher.get_json(&url, &self.listing_query(page)).await?;
        self.parse_listing(&url, &body, page)
    }

    fn normalize(&self, raw: &Value) -> Result<NewPosting, NormalizeError> {
        if !raw.is_object() {
            return Err(NormalizeError::UnexpectedShape(format!(
                "expected a vacancy object, got {}",
                json_kind(raw)
            )));
        }

        let title = text_at(raw, &["job-name"]).ok_or(NormalizeError::MissingField("job-name"))?;
        let link = text_at(raw, &["vac_url"]).ok_or(NormalizeError::MissingField("vac_url"))?;

        let profession = text_at(raw, &["category", "specialisation"]).unwrap_or_else(|| title.clone());

        Ok(NewPosting {
            profession,
            title,
            company_name: text_at(raw, &["company", "name"]).unwrap_or_default(),
            salary: SalaryRange::from_raw(number_at(raw, &["salary_min"]), number_at(raw, &["salary_max"])),
            source_name: SOURCE_NAME.to_string(),
            link,
            description: text_at(raw, &["duty"])
                .map(|html| strip_markup(&html))
                .unwrap_or_default(),
            employment_types: text_at(raw, &["employment"]).into_iter().collect(),
        })
    }
}
