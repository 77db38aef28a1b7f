//! Core chart specification types
//!
//! All of these are value types. Applying overrides to a recommendation never
//! mutates it; the resolver builds a fresh `ChartQuery` instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role an axis or series binding plays in the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Time,
    Category,
    Measure,
}

/// Aggregation applied to the Y measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregation {
    /// SQL aggregate function name
    pub fn sql_function(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sum => "Sum",
            Aggregation::Avg => "Average",
            Aggregation::Count => "Count",
            Aggregation::Min => "Min",
            Aggregation::Max => "Max",
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "avg" | "average" | "mean" => Ok(Aggregation::Avg),
            "count" => Ok(Aggregation::Count),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            other => Err(format!(
                "unknown aggregation '{}' (expected Sum, Avg, Count, Min or Max)",
                other
            )),
        }
    }
}

/// Truncation granularity for a time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBin {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeBin {
    /// Date part name understood by `DATE_TRUNC`
    pub fn date_part(&self) -> &'static str {
        match self {
            TimeBin::Day => "day",
            TimeBin::Week => "week",
            TimeBin::Month => "month",
            TimeBin::Quarter => "quarter",
            TimeBin::Year => "year",
        }
    }
}

impl FromStr for TimeBin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(TimeBin::Day),
            "week" => Ok(TimeBin::Week),
            "month" => Ok(TimeBin::Month),
            "quarter" => Ok(TimeBin::Quarter),
            "year" => Ok(TimeBin::Year),
            other => Err(format!(
                "unknown time bin '{}' (expected Day, Week, Month, Quarter or Year)",
                other
            )),
        }
    }
}

/// One axis/series binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub column: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<TimeBin>,
}

impl FieldSpec {
    pub fn new(column: impl Into<String>, role: Role) -> Self {
        Self {
            column: column.into(),
            role,
            aggregation: None,
            bin: None,
        }
    }

    pub fn time(column: impl Into<String>, bin: Option<TimeBin>) -> Self {
        Self {
            bin,
            ..Self::new(column, Role::Time)
        }
    }

    pub fn category(column: impl Into<String>) -> Self {
        Self::new(column, Role::Category)
    }

    pub fn measure(column: impl Into<String>, aggregation: Option<Aggregation>) -> Self {
        Self {
            aggregation,
            ..Self::new(column, Role::Measure)
        }
    }
}

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Between,
    Contains,
}

impl FilterOperator {
    /// Check a value count against the operator's arity rule
    pub fn check_arity(&self, count: usize) -> Result<(), String> {
        match self {
            FilterOperator::Between if count == 0 || count % 2 != 0 => Err(format!(
                "Between requires an even number of values (got {})",
                count
            )),
            FilterOperator::In if count == 0 => {
                Err("In requires at least one value".to_string())
            }
            FilterOperator::Between | FilterOperator::In => Ok(()),
            op if count != 1 => Err(format!(
                "{} requires exactly one value (got {})",
                op, count
            )),
            _ => Ok(()),
        }
    }

    /// SQL comparison symbol for single-value operators
    pub fn sql_symbol(&self) -> Option<&'static str> {
        match self {
            FilterOperator::Eq => Some("="),
            FilterOperator::NotEq => Some("<>"),
            FilterOperator::Gt => Some(">"),
            FilterOperator::Gte => Some(">="),
            FilterOperator::Lt => Some("<"),
            FilterOperator::Lte => Some("<="),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOperator::Eq => "Eq",
            FilterOperator::NotEq => "NotEq",
            FilterOperator::Gt => "Gt",
            FilterOperator::Gte => "Gte",
            FilterOperator::Lt => "Lt",
            FilterOperator::Lte => "Lte",
            FilterOperator::In => "In",
            FilterOperator::Between => "Between",
            FilterOperator::Contains => "Contains",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = match s.trim() {
            "==" => "eq",
            "!=" => "noteq",
            ">" => "gt",
            ">=" => "gte",
            "<" => "lt",
            "<=" => "lte",
            other => other,
        };
        match normalized.to_lowercase().as_str() {
            "eq" => Ok(FilterOperator::Eq),
            "noteq" => Ok(FilterOperator::NotEq),
            "gt" => Ok(FilterOperator::Gt),
            "gte" => Ok(FilterOperator::Gte),
            "lt" => Ok(FilterOperator::Lt),
            "lte" => Ok(FilterOperator::Lte),
            "in" => Ok(FilterOperator::In),
            "between" => Ok(FilterOperator::Between),
            "contains" => Ok(FilterOperator::Contains),
            _ => Err(format!("unknown operator '{}'", s.trim())),
        }
    }
}

/// How a filter combines with the filters before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

impl FromStr for LogicalOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" => Ok(LogicalOperator::And),
            "or" => Ok(LogicalOperator::Or),
            other => Err(format!("unknown logical operator '{}'", other)),
        }
    }
}

/// A structured predicate on one column. Values are raw text; type coercion
/// happens during SQL compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFilter {
    pub column: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

impl ChartFilter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, values: Vec<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            values,
            logical_operator: LogicalOperator::And,
        }
    }

    pub fn with_logical_operator(mut self, logical_operator: LogicalOperator) -> Self {
        self.logical_operator = logical_operator;
        self
    }

    /// Validate the value count against the operator's arity rule
    pub fn validate(&self) -> Result<(), String> {
        self.operator
            .check_arity(self.values.len())
            .map_err(|e| format!("filter on '{}': {}", self.column, e))
    }
}

/// Query portion of a chart recommendation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    pub x: FieldSpec,
    pub y: FieldSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub filters: Vec<ChartFilter>,
}

impl ChartQuery {
    pub fn new(x: FieldSpec, y: FieldSpec) -> Self {
        Self {
            x,
            y,
            series: None,
            top_n: None,
            filters: Vec::new(),
        }
    }

    /// True when the Y measure is aggregated per X bucket
    pub fn is_aggregated(&self) -> bool {
        self.y.aggregation.is_some()
    }
}

/// Chart rendering type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartType {
    Line,
    Bar,
    Area,
    Scatter,
    Pie,
}

/// Rendering target of a recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub library: String,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
}

/// A chart recommendation produced by the scoring subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRecommendation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub reason: String,
    pub chart: ChartMeta,
    pub query: ChartQuery,
    /// Base chart option the rendered axes and series are merged into
    #[serde(default)]
    pub option_template: serde_json::Value,
}

impl ChartRecommendation {
    /// Copy of this recommendation carrying a different query
    pub fn with_query(&self, query: ChartQuery) -> Self {
        Self {
            query,
            ..self.clone()
        }
    }
}
