//! Posting persistence
//!
//! Every method runs its statements directly on the pool. Inserting a posting
//! is not wrapped in a transaction: if a link insert fails, the posting row
//! and any links already written stay, and the error reaches the caller, which
//! counts the item as skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use jobfeed_common::{NewPosting, Posting, Source};

use super::{StoreError, StoreResult};
use crate::query::{build_count, build_select, FilterSpec, KeywordExpr, PostingQuery, QueryError};

/// Destination for normalized postings, as seen by ingestion
#[async_trait]
pub trait PostingSink: Send + Sync {
    /// Persist one posting and its employment-type links, returning its id
    async fn insert_posting(&self, posting: &NewPosting) -> StoreResult<Uuid>;
}

#[derive(Debug, FromRow)]
struct PostingRow {
    id: Uuid,
    title: String,
    profession: String,
    company_name: String,
    salary_from: Option<i64>,
    salary_to: Option<i64>,
    source_name: String,
    link: String,
    description: String,
    created_at: DateTime<Utc>,
    employment_types: Vec<String>,
}

impl From<PostingRow> for Posting {
    fn from(row: PostingRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            profession: row.profession,
            company_name: row.company_name,
            salary_from: row.salary_from,
            salary_to: row.salary_to,
            source_name: row.source_name,
            link: row.link,
            description: row.description,
            created_at: row.created_at,
            employment_types: row.employment_types,
        }
    }
}

#[derive(Debug, FromRow)]
struct SourceRow {
    name: String,
    base_url: String,
}

/// Postgres-backed store for postings, employment types, and sources
#[derive(Debug, Clone)]
pub struct PostingStore {
    pool: PgPool,
}

impl PostingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get or create an employment type by exact name.
    ///
    /// A single upsert statement, so concurrent callers racing on a new name
    /// all receive the same id.
    pub async fn upsert_employment_type(&self, name: &str) -> StoreResult<i32> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO employment_types (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Postings matching `query`, newest first
    pub async fn select_postings(&self, query: &PostingQuery) -> Result<Vec<Posting>, QueryFailure> {
        let mut qb = build_select(query)?;
        let rows: Vec<PostingRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(rows.into_iter().map(Posting::from).collect())
    }

    /// Number of postings matching the filters, ignoring paging
    pub async fn count_postings(
        &self,
        filters: &FilterSpec,
        keywords: Option<&KeywordExpr>,
    ) -> Result<i64, QueryFailure> {
        let mut qb = build_count(filters, keywords)?;
        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(total)
    }

    /// Delete postings created more than `days` days ago.
    ///
    /// Links go with them through `ON DELETE CASCADE`; employment types stay.
    pub async fn purge(&self, days: i32) -> StoreResult<u64> {
        if days < 0 {
            return Err(StoreError::Invalid(format!(
                "purge window must not be negative, got {} days",
                days
            )));
        }

        let result = sqlx::query(
            "DELETE FROM postings WHERE created_at < NOW() - make_interval(days => $1)",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        tracing::info!(days, deleted = result.rows_affected(), "Purged stale postings");

        Ok(result.rows_affected())
    }

    pub async fn list_employment_types(&self) -> StoreResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM employment_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Insert or refresh a source's base URL
    pub async fn register_source(&self, source: &Source) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (name, base_url)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET base_url = EXCLUDED.base_url
            "#,
        )
        .bind(&source.name)
        .bind(&source.base_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_sources(&self) -> StoreResult<Vec<Source>> {
        let rows: Vec<SourceRow> =
            sqlx::query_as("SELECT name, base_url FROM sources ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| Source::new(row.name, row.base_url))
            .collect())
    }
}

#[async_trait]
impl PostingSink for PostingStore {
    async fn insert_posting(&self, posting: &NewPosting) -> StoreResult<Uuid> {
        if posting.title.trim().is_empty() || posting.link.trim().is_empty() {
            return Err(StoreError::Invalid(
                "title and link must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO postings (
                id, title, profession, company_name, salary_from, salary_to,
                source_name, link, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(&posting.title)
        .bind(&posting.profession)
        .bind(&posting.company_name)
        .bind(posting.salary.from)
        .bind(posting.salary.to)
        .bind(&posting.source_name)
        .bind(&posting.link)
        .bind(&posting.description)
        .execute(&self.pool)
        .await?;

        for name in &posting.employment_types {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let type_id = self.upsert_employment_type(name).await?;

            sqlx::query(
                r#"
                INSERT INTO posting_employment_types (posting_id, employment_type_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(type_id)
            .execute(&self.pool)
            .await?;
        }

        tracing::debug!(
            posting_id = %id,
            source = %posting.source_name,
            employment_types = posting.employment_types.len(),
            "Inserted posting"
        );

        Ok(id)
    }
}

/// Failure of a read query: rejected before execution, or failed in the database
#[derive(Debug, thiserror::Error)]
pub enum QueryFailure {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
