//! Include/exclude keyword expressions
//!
//! `"python, -java"` keeps postings mentioning python anywhere in the text
//! columns and drops every posting that mentions java, even alongside python.

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

use super::contains_pattern;

/// Columns searched by keyword expressions
pub const KEYWORD_COLUMNS: [&str; 5] = [
    "p.profession",
    "p.title",
    "p.company_name",
    "p.source_name",
    "p.description",
];

/// Parsed keyword expression
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordExpr {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl KeywordExpr {
    /// Parse comma-separated terms; a leading `-` marks an exclusion.
    ///
    /// Blank terms and a bare `-` are ignored.
    pub fn parse(input: &str) -> Self {
        let mut expr = Self::default();

        for raw in input.split(',') {
            let term = raw.trim();
            if let Some(excluded) = term.strip_prefix('-') {
                let excluded = excluded.trim();
                if !excluded.is_empty() {
                    push_unique(&mut expr.exclude, excluded);
                }
            } else if !term.is_empty() {
                push_unique(&mut expr.include, term);
            }
        }

        expr
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Append ` AND ...` conditions for this expression.
    ///
    /// Every term is bound as a parameter once per searched column.
    pub fn push_predicate(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        if !self.include.is_empty() {
            qb.push(" AND (");
            let mut first = true;
            for term in &self.include {
                for column in KEYWORD_COLUMNS {
                    if !first {
                        qb.push(" OR ");
                    }
                    first = false;
                    qb.push(column).push(" ILIKE ").push_bind(contains_pattern(term));
                }
            }
            qb.push(")");
        }

        for term in &self.exclude {
            qb.push(" AND NOT (");
            for (i, column) in KEYWORD_COLUMNS.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column).push(" ILIKE ").push_bind(contains_pattern(term));
            }
            qb.push(")");
        }
    }
}

fn push_unique(terms: &mut Vec<String>, term: &str) {
    let lowered = term.to_lowercase();
    if !terms.iter().any(|t| t.to_lowercase() == lowered) {
        terms.push(term.to_string());
    }
}
