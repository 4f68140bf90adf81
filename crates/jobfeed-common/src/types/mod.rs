//! Canonical domain types
//!
//! Every source adapter normalizes its raw records into [`NewPosting`]; the
//! store hands back [`Posting`] rows with the aggregated employment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Salary bounds in whole currency units.
///
/// `None` means the source did not publish the figure. Nothing is inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl SalaryRange {
    pub fn new(from: Option<i64>, to: Option<i64>) -> Self {
        Self { from, to }
    }

    /// Build from raw source figures, treating missing, zero, and negative values as absent
    pub fn from_raw(from: Option<f64>, to: Option<f64>) -> Self {
        fn figure(value: Option<f64>) -> Option<i64> {
            value
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| v.round() as i64)
        }

        Self {
            from: figure(from),
            to: figure(to),
        }
    }

    /// True when both bounds are present and `from` exceeds `to`
    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

/// Posting produced by normalization, before it has an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub title: String,
    pub profession: String,
    pub company_name: String,
    pub salary: SalaryRange,
    pub source_name: String,
    pub link: String,
    pub description: String,
    /// Zero or more labels; the store creates unseen ones on demand
    pub employment_types: Vec<String>,
}

/// Stored posting as returned by queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: Uuid,
    pub title: String,
    pub profession: String,
    pub company_name: String,
    pub salary_from: Option<i64>,
    pub salary_to: Option<i64>,
    pub source_name: String,
    pub link: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// De-duplicated and sorted
    pub employment_types: Vec<String>,
}

/// External job board reference data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub base_url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}
