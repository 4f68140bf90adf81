//! Posting filters and keyword search
//!
//! A [`FilterSpec`] maps a field to a list of acceptable values. Values of the
//! same field are OR-ed, different fields are AND-ed. A [`KeywordExpr`] adds a
//! free-text include/exclude predicate on top. [`builder`] turns both into a
//! parameterized statement; no filter value ever becomes part of the SQL text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use jobfeed_common::Posting;

pub mod builder;
pub mod keywords;

pub use builder::{build_count, build_select};
pub use keywords::KeywordExpr;

/// Default page size for posting queries
pub const DEFAULT_LIMIT: i64 = 100;

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown filter field '{0}'. Expected one of: profession, company_name, description, source_name, salary_from, salary_to, employment_type")]
    UnknownField(String),

    #[error("Filter '{field}' expects a whole number, got '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Limit must be between 1 and 1000, offset must not be negative (limit={limit}, offset={offset})")]
    InvalidPagination { limit: i64, offset: i64 },

    #[error("Keyword expression contains no terms")]
    EmptyKeywords,

    #[error("Filter pair '{0}' must look like field=value")]
    MalformedPair(String),
}

/// Filterable posting fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Profession,
    CompanyName,
    Description,
    SourceName,
    SalaryFrom,
    SalaryTo,
    EmploymentType,
}

impl FilterField {
    pub const ALL: [FilterField; 7] = [
        FilterField::Profession,
        FilterField::CompanyName,
        FilterField::Description,
        FilterField::SourceName,
        FilterField::SalaryFrom,
        FilterField::SalaryTo,
        FilterField::EmploymentType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Profession => "profession",
            FilterField::CompanyName => "company_name",
            FilterField::Description => "description",
            FilterField::SourceName => "source_name",
            FilterField::SalaryFrom => "salary_from",
            FilterField::SalaryTo => "salary_to",
            FilterField::EmploymentType => "employment_type",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| QueryError::UnknownField(s.to_string()))
    }
}

/// Field name to acceptable values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    fields: BTreeMap<FilterField, Vec<String>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of several values for one field
    pub fn with<I, S>(mut self, field: FilterField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.insert(field, value);
        }
        self
    }

    /// Add one value. Values are trimmed; blank values are ignored.
    pub fn insert(&mut self, field: FilterField, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let values = self.fields.entry(field).or_default();
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }

    /// Parse `field=value[,value]` pairs as accepted by the CLI
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (field, values) = pair
                .split_once('=')
                .ok_or_else(|| QueryError::MalformedPair(pair.to_string()))?;
            let field: FilterField = field.parse()?;
            for value in values.split(',') {
                spec.insert(field, value);
            }
        }
        spec.validate()?;
        Ok(spec)
    }

    pub fn values(&self, field: FilterField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(Vec::is_empty)
    }

    /// Non-empty fields in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (FilterField, &[String])> {
        self.fields
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| (*field, values.as_slice()))
    }

    /// Parsed numeric values of a salary field
    pub fn numeric_values(&self, field: FilterField) -> Result<Vec<i64>, QueryError> {
        self.values(field)
            .iter()
            .map(|value| {
                value.parse::<i64>().map_err(|_| QueryError::InvalidNumber {
                    field: field.as_str(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        for field in [FilterField::SalaryFrom, FilterField::SalaryTo] {
            self.numeric_values(field)?;
        }
        Ok(())
    }
}

/// A complete posting query: filters, optional keywords, and paging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingQuery {
    pub filters: FilterSpec,
    pub keywords: Option<KeywordExpr>,
    pub limit: i64,
    pub offset: i64,
}

impl PostingQuery {
    pub fn new(filters: FilterSpec) -> Self {
        Self {
            filters,
            keywords: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_keywords(mut self, keywords: KeywordExpr) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if !(1..=MAX_LIMIT).contains(&self.limit) || self.offset < 0 {
            return Err(QueryError::InvalidPagination {
                limit: self.limit,
                offset: self.offset,
            });
        }
        self.filters.validate()
    }
}

/// One page of query results with the total match count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingPage {
    pub items: Vec<Posting>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl PostingPage {
    pub fn new(items: Vec<Posting>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            has_more: offset + (items.len() as i64) < total,
            items,
            total,
            limit,
            offset,
        }
    }
}

/// Escape LIKE metacharacters so the value matches literally
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%value%` with the value escaped
pub(crate) fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip() {
        for field in FilterField::ALL {
            assert_eq!(field.as_str().parse::<FilterField>().unwrap(), field);
        }
        assert_eq!(" Salary_From ".parse::<FilterField>().unwrap(), FilterField::SalaryFrom);
        assert!(matches!(
            "duration".parse::<FilterField>(),
            Err(QueryError::UnknownField(_))
        ));
    }

    #[test]
    fn test_insert_trims_and_dedups() {
        let spec = FilterSpec::new().with(FilterField::Profession, ["  python ", "", "python", "go"]);
        assert_eq!(spec.values(FilterField::Profession), ["python", "go"]);
        assert!(spec.values(FilterField::CompanyName).is_empty());
    }

    #[test]
    fn test_blank_only_spec_is_empty() {
        let spec = FilterSpec::new().with(FilterField::Description, ["  "]);
        assert!(spec.is_empty());
        assert_eq!(spec.iter().count(), 0);
    }

    #[test]
    fn test_from_pairs() {
        let spec = FilterSpec::from_pairs([
            "employment_type=Полная занятость,Частичная занятость",
            "salary_from=50000",
        ])
        .unwrap();

        assert_eq!(spec.values(FilterField::EmploymentType).len(), 2);
        assert_eq!(spec.numeric_values(FilterField::SalaryFrom).unwrap(), vec![50000]);
    }

    #[test]
    fn test_from_pairs_rejects_bad_input() {
        assert!(matches!(
            FilterSpec::from_pairs(["profession"]),
            Err(QueryError::MalformedPair(_))
        ));
        assert!(matches!(
            FilterSpec::from_pairs(["salary_to=lots"]),
            Err(QueryError::InvalidNumber { field: "salary_to", .. })
        ));
    }

    #[test]
    fn test_pagination_bounds() {
        let query = PostingQuery::new(FilterSpec::new());
        assert!(query.validate().is_ok());
        assert!(query.clone().page(0, 0).validate().is_err());
        assert!(query.clone().page(1001, 0).validate().is_err());
        assert!(query.clone().page(10, -1).validate().is_err());
        assert!(query.page(1000, 5000).validate().is_ok());
    }

    #[test]
    fn test_page_has_more() {
        let page = PostingPage::new(Vec::new(), 0, 10, 0);
        assert!(!page.has_more);

        let page = PostingPage::new(Vec::new(), 25, 10, 20);
        assert!(page.has_more);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_sure\\"), "100\\%\\_sure\\\\");
        assert_eq!(contains_pattern("c++"), "%c++%");
    }

    #[test]
    fn test_spec_serializes_as_map() {
        let spec = FilterSpec::new().with(FilterField::SourceName, ["hh.ru"]);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({ "source_name": ["hh.ru"] }));
    }
}
