//! Raw-row explorer, field statistics and deterministic sampling queries

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{
    combine_filters, dataset_view, date_expr, format_number, numeric_expr, quote_ident,
    search_predicate, text_expr, typed_expr, where_clause,
};
use crate::chart::ChartFilter;
use crate::naming;
use crate::schema::{ColumnProfile, InferredType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One requested sort, parsed from `column`, `column:asc` or `column:desc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

impl FromStr for SortSpec {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        // A suffix that is not a direction stays part of the column name
        let (column, direction) = match token.rsplit_once(':') {
            Some((col, dir)) if dir.trim().eq_ignore_ascii_case("asc") => (col, SortDirection::Asc),
            Some((col, dir)) if dir.trim().eq_ignore_ascii_case("desc") => {
                (col, SortDirection::Desc)
            }
            _ => (token, SortDirection::Asc),
        };
        let column = column.trim();
        if column.is_empty() {
            return Err(format!("invalid sort '{}': column name is empty", token));
        }
        Ok(SortSpec::new(column, direction))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{}:asc", self.column),
            SortDirection::Desc => write!(f, "{}:desc", self.column),
        }
    }
}

/// A filtered, searched and sorted view of the dataset rows.
///
/// Columns, filters and sorts must already be validated against the schema.
#[derive(Debug, Clone, Copy)]
pub struct RowsQuery<'a> {
    pub columns: &'a [ColumnProfile],
    pub filters: &'a [ChartFilter],
    pub search: Option<&'a str>,
    pub sort: &'a [SortSpec],
}

impl<'a> RowsQuery<'a> {
    pub fn new(columns: &'a [ColumnProfile]) -> Self {
        Self {
            columns,
            filters: &[],
            search: None,
            sort: &[],
        }
    }

    /// WHERE conditions: combined filters AND the free-text search
    pub fn conditions(&self) -> Vec<String> {
        let mut conditions = Vec::new();
        if let Some(filters) = combine_filters(self.filters) {
            conditions.push(filters);
        }
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        if let Some(search) = self.search.and_then(|term| search_predicate(&names, term)) {
            conditions.push(search);
        }
        conditions
    }

    /// Every column cast to text, under its own name
    pub fn projection(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} AS {}", text_expr(&c.name), quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// ORDER BY terms, always ending with the row-number tiebreaker
    pub fn order_by(&self) -> String {
        let mut terms: Vec<String> = self
            .sort
            .iter()
            .map(|s| {
                let inferred = self
                    .columns
                    .iter()
                    .find(|c| c.name == s.column)
                    .map(|c| c.inferred_type)
                    .unwrap_or(InferredType::String);
                format!(
                    "{} {} NULLS LAST",
                    typed_expr(&s.column, inferred),
                    s.direction.sql_keyword()
                )
            })
            .collect();

        if terms.is_empty() {
            if let Some(first) = self.columns.first() {
                terms.push(format!(
                    "{} ASC NULLS LAST",
                    typed_expr(&first.name, first.inferred_type)
                ));
            }
        }
        terms.push(format!("{} ASC", quote_ident(naming::ROW_NUMBER_COLUMN)));
        terms.join(", ")
    }

    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {}{}",
            dataset_view(),
            where_clause(&self.conditions())
        )
    }

    pub fn page_sql(&self, limit: usize, offset: usize) -> String {
        format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
            self.projection(),
            dataset_view(),
            where_clause(&self.conditions()),
            self.order_by(),
            limit,
            offset
        )
    }

    /// Deterministic pseudo-random sample of at most `cap` rows.
    ///
    /// Rows are ordered by a hash of their content, so the same file always
    /// yields the same sample regardless of engine scan order.
    pub fn sample_sql(&self, cap: usize) -> String {
        let hashed = self
            .columns
            .iter()
            .map(|c| text_expr(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {}{} ORDER BY md5(concat_ws(chr(31), {})), {} LIMIT {}",
            self.projection(),
            dataset_view(),
            where_clause(&self.conditions()),
            hashed,
            quote_ident(naming::ROW_NUMBER_COLUMN),
            cap
        )
    }
}

// ============================================================================
// Field statistics
// ============================================================================

/// Non-blank text of a column
fn present(column: &str) -> String {
    let text = text_expr(column);
    format!("{} IS NOT NULL AND TRIM({}) <> ''", text, text)
}

/// Distinct non-blank values and blank cell count
pub fn field_summary_sql(column: &str, conditions: &[String]) -> String {
    let text = text_expr(column);
    format!(
        "SELECT COUNT(DISTINCT {}) FILTER (WHERE {}), COUNT(*) FILTER (WHERE NOT ({})) FROM {}{}",
        text,
        present(column),
        present(column),
        dataset_view(),
        where_clause(conditions)
    )
}

/// Most frequent values, ties broken by value
pub fn top_values_sql(column: &str, conditions: &[String], limit: usize) -> String {
    let mut conditions = conditions.to_vec();
    conditions.push(present(column));
    format!(
        "SELECT {} AS v, COUNT(*) AS {} FROM {}{} GROUP BY 1 ORDER BY 2 DESC, 1 ASC LIMIT {}",
        text_expr(column),
        quote_ident(naming::COUNT_COLUMN),
        dataset_view(),
        where_clause(&conditions),
        limit
    )
}

/// Numeric value used for range binning; dates become epoch seconds
pub fn range_value_expr(column: &str, inferred_type: InferredType) -> String {
    match inferred_type {
        InferredType::Date => format!("EPOCH({})", date_expr(column)),
        _ => numeric_expr(column),
    }
}

/// MIN and MAX of the range value
pub fn range_bounds_sql(column: &str, inferred_type: InferredType, conditions: &[String]) -> String {
    let value = range_value_expr(column, inferred_type);
    format!(
        "SELECT MIN({}), MAX({}) FROM {}{}",
        value,
        value,
        dataset_view(),
        where_clause(conditions)
    )
}

/// Per-bucket counts for `bins` equal-width buckets starting at `min`.
///
/// The maximum lands in the last bucket. A zero width puts every value in
/// bucket 0.
pub fn range_counts_sql(
    column: &str,
    inferred_type: InferredType,
    conditions: &[String],
    min: f64,
    width: f64,
    bins: usize,
) -> String {
    let value = quote_ident(naming::VALUE_COLUMN);
    let bucket = if width > 0.0 {
        format!(
            "LEAST(CAST(FLOOR(({} - {}) / {}) AS BIGINT), {})",
            value,
            format_number(min),
            format_number(width),
            bins.saturating_sub(1)
        )
    } else {
        "0".to_string()
    };
    format!(
        "SELECT {} AS {}, COUNT(*) AS {} FROM (SELECT {} AS {} FROM {}{}) WHERE {} IS NOT NULL GROUP BY 1 ORDER BY 1",
        bucket,
        quote_ident(naming::BUCKET_COLUMN),
        quote_ident(naming::COUNT_COLUMN),
        range_value_expr(column, inferred_type),
        value,
        dataset_view(),
        where_clause(conditions),
        value
    )
}
