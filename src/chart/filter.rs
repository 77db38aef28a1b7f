//! Textual filter language
//!
//! Filters arrive as repeated query-string tokens of the form
//! `column|operator|value[,value...][|logicalOperator]`, e.g.
//! `region|Eq|North`, `sales|>=|100|Or`, `date|Between|2024-01-01,2024-03-31`.
//!
//! Parsing never fails fast: every token is checked and each malformed one
//! contributes one message to [`ParsedFilters::errors`].

use super::types::{ChartFilter, FilterOperator, LogicalOperator};

/// Result of parsing a batch of filter tokens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilters {
    /// Well-formed filters, in token order
    pub filters: Vec<ChartFilter>,
    /// One human-readable message per malformed token
    pub errors: Vec<String>,
}

impl ParsedFilters {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse up to `max_filters` filter tokens, collecting all errors.
pub fn parse_filters<S: AsRef<str>>(tokens: &[S], max_filters: usize) -> ParsedFilters {
    let mut parsed = ParsedFilters::default();

    let tokens: Vec<&str> = tokens
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() > max_filters {
        parsed.errors.push(format!(
            "too many filters: {} supplied, at most {} allowed",
            tokens.len(),
            max_filters
        ));
    }

    for token in tokens {
        match parse_filter_token(token) {
            Ok(filter) => parsed.filters.push(filter),
            Err(e) => parsed.errors.push(format!("invalid filter '{}': {}", token, e)),
        }
    }

    parsed
}

/// Parse a single `column|operator|values[|logic]` token
pub fn parse_filter_token(token: &str) -> Result<ChartFilter, String> {
    let parts: Vec<&str> = token.split('|').collect();
    if parts.len() < 3 {
        return Err("expected column|operator|value[|And/Or]".to_string());
    }

    let column = parts[0].trim();
    if column.is_empty() {
        return Err("column name is empty".to_string());
    }

    let operator: FilterOperator = parts[1].parse()?;

    // A trailing And/Or is the combinator; anything else belongs to the value
    let (value_parts, logical_operator) = match parts.split_last() {
        Some((last, rest)) if rest.len() >= 3 => match last.parse::<LogicalOperator>() {
            Ok(logic) => (&rest[2..], logic),
            Err(_) => (&parts[2..], LogicalOperator::And),
        },
        _ => (&parts[2..], LogicalOperator::And),
    };

    let raw_value = value_parts.join("|");
    let values: Vec<String> = raw_value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    operator.check_arity(values.len())?;

    Ok(ChartFilter {
        column: column.to_string(),
        operator,
        values,
        logical_operator,
    })
}
