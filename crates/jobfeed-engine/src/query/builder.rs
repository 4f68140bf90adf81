//! SQL generation for posting queries
//!
//! Both statements share one predicate writer so the count always agrees with
//! the page it describes. Predicates only reference `p` or correlated
//! `EXISTS` subqueries, which keeps them valid with or without the type joins.

use sqlx::{Postgres, QueryBuilder};

use super::{contains_pattern, FilterField, FilterSpec, KeywordExpr, PostingQuery, QueryError};

const SELECT_POSTINGS: &str = "SELECT p.id, p.title, p.profession, p.company_name, \
     p.salary_from, p.salary_to, p.source_name, p.link, p.description, p.created_at, \
     COALESCE(ARRAY_AGG(DISTINCT et.name ORDER BY et.name) \
     FILTER (WHERE et.name IS NOT NULL), ARRAY[]::TEXT[]) AS employment_types \
     FROM postings p \
     LEFT JOIN posting_employment_types pe ON pe.posting_id = p.id \
     LEFT JOIN employment_types et ON et.id = pe.employment_type_id \
     WHERE TRUE";

const COUNT_POSTINGS: &str = "SELECT COUNT(*) FROM postings p WHERE TRUE";

/// Build the paged select for `query`
pub fn build_select(query: &PostingQuery) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    query.validate()?;

    let mut qb = QueryBuilder::new(SELECT_POSTINGS);
    push_filters(&mut qb, &query.filters, query.keywords.as_ref())?;

    qb.push(" GROUP BY p.id ORDER BY p.created_at DESC, p.id LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);

    Ok(qb)
}

/// Build `SELECT COUNT(*)` over the same predicates as [`build_select`]
pub fn build_count(
    filters: &FilterSpec,
    keywords: Option<&KeywordExpr>,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut qb = QueryBuilder::new(COUNT_POSTINGS);
    push_filters(&mut qb, filters, keywords)?;
    Ok(qb)
}

fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    filters: &FilterSpec,
    keywords: Option<&KeywordExpr>,
) -> Result<(), QueryError> {
    for (field, values) in filters.iter() {
        match field {
            FilterField::Profession
            | FilterField::CompanyName
            | FilterField::Description
            | FilterField::SourceName => push_text(qb, text_column(field), values),
            FilterField::SalaryFrom => {
                push_numeric(qb, "p.salary_from", ">=", filters.numeric_values(field)?)
            }
            FilterField::SalaryTo => {
                push_numeric(qb, "p.salary_to", "<=", filters.numeric_values(field)?)
            }
            FilterField::EmploymentType => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM posting_employment_types pe2 \
                     JOIN employment_types et2 ON et2.id = pe2.employment_type_id \
                     WHERE pe2.posting_id = p.id AND et2.name = ANY(",
                )
                .push_bind(values.to_vec())
                .push("))");
            }
        }
    }

    if let Some(keywords) = keywords {
        if keywords.is_empty() {
            return Err(QueryError::EmptyKeywords);
        }
        keywords.push_predicate(qb);
    }

    Ok(())
}

fn text_column(field: FilterField) -> &'static str {
    match field {
        FilterField::Profession => "p.profession",
        FilterField::CompanyName => "p.company_name",
        FilterField::Description => "p.description",
        _ => "p.source_name",
    }
}

fn push_text(qb: &mut QueryBuilder<'static, Postgres>, column: &'static str, values: &[String]) {
    qb.push(" AND (");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(column).push(" ILIKE ").push_bind(contains_pattern(value));
    }
    qb.push(")");
}

// NULL salaries never satisfy a comparison, so a salary filter excludes them
fn push_numeric(
    qb: &mut QueryBuilder<'static, Postgres>,
    column: &'static str,
    op: &'static str,
    values: Vec<i64>,
) {
    qb.push(" AND (");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(column).push(" ").push(op).push(" ").push_bind(value);
    }
    qb.push(")");
}
