//! Filter predicates and WHERE clause assembly

use super::{classify_values, contains_predicate, kind_expr, typed_literal};
use crate::chart::{ChartFilter, FilterOperator};

/// Compile one filter into a boolean SQL expression.
///
/// Comparison, `In` and `Between` filters compare numerically when every
/// value is a number, as timestamps when every value is a date, and as plain
/// text otherwise. `Contains` is always a case-insensitive text match.
pub fn filter_predicate(filter: &ChartFilter) -> String {
    if filter.operator == FilterOperator::Contains {
        let term = filter.values.first().map(String::as_str).unwrap_or_default();
        return contains_predicate(&filter.column, term);
    }

    let kind = classify_values(&filter.values);
    let expr = kind_expr(&filter.column, kind);
    let literal = |v: &String| typed_literal(v, kind);

    match filter.operator {
        FilterOperator::In => {
            let list: Vec<String> = filter.values.iter().map(literal).collect();
            format!("{} IN ({})", expr, list.join(", "))
        }
        FilterOperator::Between => {
            // Pairs are disjoint ranges, OR-combined
            let ranges: Vec<String> = filter
                .values
                .chunks(2)
                .filter(|pair| pair.len() == 2)
                .map(|pair| {
                    format!(
                        "({} BETWEEN {} AND {})",
                        expr,
                        literal(&pair[0]),
                        literal(&pair[1])
                    )
                })
                .collect();
            match ranges.len() {
                0 => "FALSE".to_string(),
                1 => ranges.into_iter().next().unwrap_or_default(),
                _ => format!("({})", ranges.join(" OR ")),
            }
        }
        op => {
            let symbol = op.sql_symbol().unwrap_or("=");
            let value = filter.values.first().map(literal).unwrap_or_else(|| "NULL".to_string());
            format!("{} {} {}", expr, symbol, value)
        }
    }
}

/// Combine filters left to right, each joined by its own logical operator.
///
/// `[f1, f2 AND, f3 OR]` compiles to `((f1) AND (f2)) OR (f3)`: filter *i*'s
/// operator decides how it joins everything accumulated before it. The first
/// filter's operator is ignored.
pub fn combine_filters(filters: &[ChartFilter]) -> Option<String> {
    let (first, rest) = filters.split_first()?;
    let mut acc = format!("({})", filter_predicate(first));
    for (idx, filter) in rest.iter().enumerate() {
        acc = format!(
            "{} {} ({})",
            acc,
            filter.logical_operator.sql_keyword(),
            filter_predicate(filter)
        );
        if idx + 1 < rest.len() {
            acc = format!("({})", acc);
        }
    }
    Some(acc)
}

/// Free-text search across every visible column
pub fn search_predicate<S: AsRef<str>>(columns: &[S], term: &str) -> Option<String> {
    let term = term.trim();
    if term.is_empty() || columns.is_empty() {
        return None;
    }
    let parts: Vec<String> = columns
        .iter()
        .map(|c| contains_predicate(c.as_ref(), term))
        .collect();
    Some(format!("({})", parts.join(" OR ")))
}

/// Build a WHERE clause AND-ing each condition; empty when there are none
pub fn where_clause(conditions: &[String]) -> String {
    match conditions.len() {
        0 => String::new(),
        1 => format!(" WHERE {}", conditions[0]),
        _ => {
            let wrapped: Vec<String> = conditions.iter().map(|c| format!("({})", c)).collect();
            format!(" WHERE {}", wrapped.join(" AND "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::LogicalOperator;

    fn filter(column: &str, op: FilterOperator, values: &[&str]) -> ChartFilter {
        ChartFilter::new(column, op, values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_text_equality() {
        let sql = filter_predicate(&filter("region", FilterOperator::Eq, &["North"]));
        assert_eq!(sql, "CAST(\"region\" AS VARCHAR) = 'North'");
    }

    #[test]
    fn test_escaping_in_predicate() {
        let sql = filter_predicate(&filter("a\"b", FilterOperator::Eq, &["O'Brien"]));
        assert_eq!(sql, "CAST(\"a\"\"b\" AS VARCHAR) = 'O''Brien'");
    }

    #[test]
    fn test_numeric_comparison_uses_cast() {
        let sql = filter_predicate(&filter("sales", FilterOperator::Gte, &["100"]));
        assert!(sql.starts_with("TRY_CAST(REPLACE("));
        assert!(sql.ends_with(">= 100"));
    }

    #[test]
    fn test_date_comparison_uses_parser() {
        let sql = filter_predicate(&filter("date", FilterOperator::Lt, &["2024-02-01"]));
        assert!(sql.starts_with("COALESCE("));
        assert!(sql.ends_with("< TIMESTAMP '2024-02-01 00:00:00'"));
    }

    #[test]
    fn test_mixed_values_fall_back_to_text() {
        let sql = filter_predicate(&filter("code", FilterOperator::In, &["10", "A7"]));
        assert_eq!(sql, "CAST(\"code\" AS VARCHAR) IN ('10', 'A7')");
    }

    #[test]
    fn test_between_multiple_ranges() {
        let sql = filter_predicate(&filter(
            "sales",
            FilterOperator::Between,
            &["0", "10", "100", "200"],
        ));
        assert!(sql.starts_with("(("));
        assert!(sql.contains("BETWEEN 0 AND 10)"));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("BETWEEN 100 AND 200)"));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let sql = filter_predicate(&filter("name", FilterOperator::Contains, &["smith"]));
        assert_eq!(sql, "CAST(\"name\" AS VARCHAR) ILIKE '%smith%' ESCAPE '\\'");
    }

    #[test]
    fn test_not_equal_is_plain_comparison() {
        let sql = filter_predicate(&filter("region", FilterOperator::NotEq, &["North"]));
        assert_eq!(sql, "CAST(\"region\" AS VARCHAR) <> 'North'");
        let sql = filter_predicate(&filter("sales", FilterOperator::NotEq, &["10"]));
        assert!(sql.ends_with("<> 10"));
    }

    #[test]
    fn test_left_fold_combination() {
        let filters = vec![
            filter("a", FilterOperator::Eq, &["1x"]),
            filter("b", FilterOperator::Eq, &["2x"]),
            filter("c", FilterOperator::Eq, &["3x"]).with_logical_operator(LogicalOperator::Or),
        ];
        let sql = combine_filters(&filters).unwrap();
        let a = filter_predicate(&filters[0]);
        let b = filter_predicate(&filters[1]);
        let c = filter_predicate(&filters[2]);
        assert_eq!(sql, format!("(({}) AND ({})) OR ({})", a, b, c));
    }

    #[test]
    fn test_two_filters_and_none() {
        let filters = vec![
            filter("a", FilterOperator::Eq, &["x"]).with_logical_operator(LogicalOperator::Or),
            filter("b", FilterOperator::Eq, &["y"]).with_logical_operator(LogicalOperator::Or),
        ];
        let sql = combine_filters(&filters).unwrap();
        assert!(sql.starts_with("(CAST(\"a\""));
        assert!(sql.contains(") OR (CAST(\"b\""));
        assert!(combine_filters(&[]).is_none());
    }

    #[test]
    fn test_search_predicate() {
        let sql = search_predicate(&["name", "city"], "ann").unwrap();
        assert_eq!(
            sql,
            "(CAST(\"name\" AS VARCHAR) ILIKE '%ann%' ESCAPE '\\' OR CAST(\"city\" AS VARCHAR) ILIKE '%ann%' ESCAPE '\\')"
        );
        assert!(search_predicate(&["name"], "  ").is_none());
    }

    #[test]
    fn test_where_clause() {
        assert_eq!(where_clause(&[]), "");
        assert_eq!(where_clause(&["x = 1".to_string()]), " WHERE x = 1");
        assert_eq!(
            where_clause(&["x = 1".to_string(), "y = 2".to_string()]),
            " WHERE (x = 1) AND (y = 2)"
        );
    }
}
