//! SQL generation for the embedded DuckDB engine
//!
//! Column names come straight from uploaded CSV headers and filter values from
//! request strings, and the engine reads CSVs through a view with dynamically
//! named columns, so queries are built as text. Every identifier goes through
//! [`quote_ident`] and every string literal through [`quote_literal`]; nothing
//! else in the crate splices user text into SQL.
//!
//! The dataset view reads every column as VARCHAR. Expressions here re-type a
//! column only where a predicate, aggregate or sort needs it:
//!
//! - [`text_expr`] - the column as text
//! - [`numeric_expr`] - `TRY_CAST` to DOUBLE after stripping thousands separators
//! - [`date_expr`] - first non-null of several timestamp parses
//!
//! # Submodules
//!
//! - `predicate` - filter predicates, left-fold combination, free-text search
//! - `chart` - chart data and percentile sample queries
//! - `rows` - raw-row explorer, field statistics and deterministic sampling

pub mod chart;
pub mod predicate;
pub mod rows;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::naming;
use crate::schema::InferredType;

pub use chart::{compile_chart, compile_percentile_samples, CompiledChart};
pub use predicate::{combine_filters, filter_predicate, search_predicate, where_clause};
pub use rows::{RowsQuery, SortDirection, SortSpec};

/// Quote an identifier: wrap in double quotes, doubling embedded ones
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal: wrap in single quotes, doubling embedded ones
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The per-connection dataset view
pub fn dataset_view() -> String {
    quote_ident(naming::DATASET_VIEW)
}

/// Column as text
pub fn text_expr(column: &str) -> String {
    format!("CAST({} AS VARCHAR)", quote_ident(column))
}

/// Column as DOUBLE, NULL when it does not parse
pub fn numeric_expr(column: &str) -> String {
    format!(
        "TRY_CAST(REPLACE({}, ',', '') AS DOUBLE)",
        text_expr(column)
    )
}

/// Date formats tried after the native timestamp cast, in order
pub const DATE_FORMATS: &[&str] = &["%Y%m%d", "%d/%m/%Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Column as TIMESTAMP, using the first parse that succeeds
pub fn date_expr(column: &str) -> String {
    let text = text_expr(column);
    let mut parts = vec![format!("TRY_CAST({} AS TIMESTAMP)", text)];
    parts.extend(
        DATE_FORMATS
            .iter()
            .map(|fmt| format!("TRY_STRPTIME({}, {})", text, quote_literal(fmt))),
    );
    format!("COALESCE({})", parts.join(", "))
}

/// Type-aware expression for sorting or ranging a column
pub fn typed_expr(column: &str, inferred_type: InferredType) -> String {
    match inferred_type {
        InferredType::Number => numeric_expr(column),
        InferredType::Date => date_expr(column),
        _ => text_expr(column),
    }
}

/// `ILIKE` pattern matching `term` anywhere, with LIKE wildcards escaped.
/// Pair with `ESCAPE '\'`.
pub fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    quote_literal(&format!("%{}%", escaped))
}

/// Case-insensitive "contains" predicate on a column
pub fn contains_predicate(column: &str, term: &str) -> String {
    format!(
        "{} ILIKE {} ESCAPE '\\'",
        text_expr(column),
        contains_pattern(term)
    )
}

// ============================================================================
// Value classification
// ============================================================================

/// How a set of raw filter values should be compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Date,
    Text,
}

/// Parse a raw value as a finite number
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Parse a raw value as a timestamp, mirroring the order used by [`date_expr`]
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // Native timestamp forms
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    // %Y%m%d needs exactly eight digits, chrono would otherwise accept shorter years
    DATE_FORMATS
        .iter()
        .filter(|fmt| **fmt != "%Y%m%d" || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())))
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Classify values: all numeric, else all dates, else text
pub fn classify_values<S: AsRef<str>>(values: &[S]) -> ValueKind {
    if values.is_empty() {
        return ValueKind::Text;
    }
    if values.iter().all(|v| parse_number(v.as_ref()).is_some()) {
        ValueKind::Numeric
    } else if values.iter().all(|v| parse_date(v.as_ref()).is_some()) {
        ValueKind::Date
    } else {
        ValueKind::Text
    }
}

/// Render a raw value as a SQL literal of the given kind
pub fn typed_literal(value: &str, kind: ValueKind) -> String {
    match kind {
        ValueKind::Numeric => match parse_number(value) {
            Some(n) => format_number(n),
            None => quote_literal(value),
        },
        ValueKind::Date => match parse_date(value) {
            Some(dt) => format!(
                "TIMESTAMP {}",
                quote_literal(&dt.format("%Y-%m-%d %H:%M:%S").to_string())
            ),
            None => quote_literal(value),
        },
        ValueKind::Text => quote_literal(value),
    }
}

/// Column expression matching a value kind
pub fn kind_expr(column: &str, kind: ValueKind) -> String {
    match kind {
        ValueKind::Numeric => numeric_expr(column),
        ValueKind::Date => date_expr(column),
        ValueKind::Text => text_expr(column),
    }
}

/// Format a finite float as a SQL numeric literal
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
