//! Chart data and percentile sample queries
//!
//! Every chart query projects the same aliased columns, in this order:
//! `__insight_x__`, then `__insight_series__` when the chart is grouped, then
//! `__insight_y__` (or `__insight_value__` for percentile samples).

use super::{
    combine_filters, dataset_view, date_expr, numeric_expr, quote_ident, quote_literal, text_expr,
    where_clause,
};
use crate::chart::{Aggregation, ChartQuery, FieldSpec, Role};
use crate::naming;

/// A compiled chart data query
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledChart {
    pub data_sql: String,
    /// Y is aggregated per X bucket (and series)
    pub aggregated: bool,
    /// A series column sits between X and Y
    pub has_series: bool,
}

impl CompiledChart {
    /// Number of projected columns
    pub fn width(&self) -> usize {
        if self.has_series {
            3
        } else {
            2
        }
    }
}

/// X axis expression.
///
/// Time axes truncate to their bin and render as `YYYY-MM-DD`; without a bin
/// they render at day resolution.
pub fn x_expr(x: &FieldSpec) -> String {
    match x.role {
        Role::Time => {
            let ts = date_expr(&x.column);
            let bucketed = match x.bin {
                Some(bin) => format!("DATE_TRUNC({}, {})", quote_literal(bin.date_part()), ts),
                None => ts,
            };
            format!("STRFTIME({}, '%Y-%m-%d')", bucketed)
        }
        Role::Category => text_expr(&x.column),
        Role::Measure => numeric_expr(&x.column),
    }
}

/// Aggregate expression for the Y measure
pub fn y_aggregate(y: &FieldSpec, aggregation: Aggregation) -> String {
    match aggregation {
        // COUNT counts non-empty cells, numeric or not
        Aggregation::Count => format!("COUNT({})", text_expr(&y.column)),
        agg => format!("{}({})", agg.sql_function(), numeric_expr(&y.column)),
    }
}

/// Conditions shared by data and sample queries: filters plus a non-null X
fn base_conditions(query: &ChartQuery) -> Vec<String> {
    let mut conditions = Vec::new();
    if let Some(filters) = combine_filters(&query.filters) {
        conditions.push(filters);
    }
    conditions.push(format!("{} IS NOT NULL", x_expr(&query.x)));
    conditions
}

/// Compile the data query for a resolved chart
pub fn compile_chart(query: &ChartQuery, max_points: usize) -> CompiledChart {
    let view = dataset_view();
    let x_alias = quote_ident(naming::X_COLUMN);
    let series_alias = quote_ident(naming::SERIES_COLUMN);
    let y_alias = quote_ident(naming::Y_COLUMN);
    let x = x_expr(&query.x);
    let series = query.series.as_ref().map(|s| text_expr(&s.column));
    let mut conditions = base_conditions(query);

    let mut select = vec![format!("{} AS {}", x, x_alias)];
    if let Some(s) = &series {
        select.push(format!("{} AS {}", s, series_alias));
    }

    let Some(aggregation) = query.y.aggregation else {
        // Raw pairs in file order
        let y = numeric_expr(&query.y.column);
        conditions.push(format!("{} IS NOT NULL", y));
        select.push(format!("{} AS {}", y, y_alias));
        let data_sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT {}",
            select.join(", "),
            view,
            where_clause(&conditions),
            quote_ident(naming::ROW_NUMBER_COLUMN),
            max_points
        );
        return CompiledChart {
            data_sql,
            aggregated: false,
            has_series: series.is_some(),
        };
    };

    let agg = y_aggregate(&query.y, aggregation);
    select.push(format!("{} AS {}", agg, y_alias));

    let top_n = query.top_n.filter(|n| *n > 0);
    let mut limit = max_points;
    let group_by = if series.is_some() { "1, 2" } else { "1" };
    let mut order_by = group_by.to_string();

    match (&series, top_n) {
        (Some(s), Some(n)) => {
            // Keep the N series values with the largest aggregate
            let mut inner = base_conditions(query);
            inner.push(format!("{} IS NOT NULL", s));
            conditions.push(format!(
                "{} IN (SELECT {} FROM {}{} GROUP BY 1 ORDER BY {} DESC NULLS LAST, 1 LIMIT {})",
                s,
                s,
                view,
                where_clause(&inner),
                agg,
                n
            ));
        }
        (None, Some(n)) if query.x.role == Role::Category => {
            order_by = format!("{} DESC NULLS LAST, 1", y_alias);
            limit = n.min(max_points);
        }
        _ => {}
    }

    let data_sql = format!(
        "SELECT {} FROM {}{} GROUP BY {} ORDER BY {} LIMIT {}",
        select.join(", "),
        view,
        where_clause(&conditions),
        group_by,
        order_by,
        limit
    );

    CompiledChart {
        data_sql,
        aggregated: true,
        has_series: series.is_some(),
    }
}

/// Compile the numeric sample query for percentile overlays.
///
/// Projects X, the series when present and the target column as DOUBLE, under
/// the chart's filters. Rows where the target does not parse are dropped.
pub fn compile_percentile_samples(query: &ChartQuery, target: &str) -> String {
    let value = numeric_expr(target);
    let mut select = vec![format!("{} AS {}", x_expr(&query.x), quote_ident(naming::X_COLUMN))];
    if let Some(series) = &query.series {
        select.push(format!(
            "{} AS {}",
            text_expr(&series.column),
            quote_ident(naming::SERIES_COLUMN)
        ));
    }
    select.push(format!("{} AS {}", value, quote_ident(naming::VALUE_COLUMN)));

    let mut conditions = base_conditions(query);
    conditions.push(format!("{} IS NOT NULL", value));

    format!(
        "SELECT {} FROM {}{}",
        select.join(", "),
        dataset_view(),
        where_clause(&conditions)
    )
}
