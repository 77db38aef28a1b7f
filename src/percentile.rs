//! Percentile overlays on executed charts
//!
//! A chart is requested under a view: `Base` renders the plain chart,
//! `Percentile` adds a percentile of a target column, either per X bucket
//! (`Bucket`, replacing each series' values) or over the whole filtered
//! dataset (`Overall`, a constant reference line).
//!
//! Percentiles are continuous quantiles (linear interpolation between the two
//! closest ranks), computed here from the raw numeric samples. Any failure
//! degrades to `supported: false` with a reason; the base chart still renders.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::chart::{ChartQuery, ChartType};
use crate::execute::{series_label, value_as_f64};
use crate::schema::DatasetSchema;
use crate::sql::compile_percentile_samples;
use crate::{InsightError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ViewKind {
    #[default]
    Base,
    Percentile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PercentileMode {
    #[default]
    None,
    Bucket,
    Overall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PercentileKind {
    P5,
    P10,
    P90,
    P95,
}

impl PercentileKind {
    /// Quantile as a fraction in [0, 1]
    pub fn fraction(&self) -> f64 {
        match self {
            PercentileKind::P5 => 0.05,
            PercentileKind::P10 => 0.10,
            PercentileKind::P90 => 0.90,
            PercentileKind::P95 => 0.95,
        }
    }
}

impl fmt::Display for PercentileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PercentileKind::P5 => "P5",
            PercentileKind::P10 => "P10",
            PercentileKind::P90 => "P90",
            PercentileKind::P95 => "P95",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base" => Ok(ViewKind::Base),
            "percentile" => Ok(ViewKind::Percentile),
            other => Err(format!("unknown view '{}' (expected Base or Percentile)", other)),
        }
    }
}

impl FromStr for PercentileMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(PercentileMode::None),
            "bucket" => Ok(PercentileMode::Bucket),
            "overall" => Ok(PercentileMode::Overall),
            other => Err(format!(
                "unknown percentile mode '{}' (expected None, Bucket or Overall)",
                other
            )),
        }
    }
}

impl FromStr for PercentileKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p5" => Ok(PercentileKind::P5),
            "p10" => Ok(PercentileKind::P10),
            "p90" => Ok(PercentileKind::P90),
            "p95" => Ok(PercentileKind::P95),
            other => Err(format!(
                "unknown percentile '{}' (expected P5, P10, P90 or P95)",
                other
            )),
        }
    }
}

/// Requested view configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMeta {
    pub view: ViewKind,
    pub mode: PercentileMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PercentileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ViewMeta {
    /// Canonical form: `Base` carries no percentile settings, `Percentile`
    /// targets the Y column unless told otherwise.
    pub fn normalized(&self, y_column: &str) -> ViewMeta {
        match self.view {
            ViewKind::Base => ViewMeta::default(),
            ViewKind::Percentile => ViewMeta {
                target: Some(
                    self.target
                        .clone()
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| y_column.to_string()),
                ),
                ..self.clone()
            },
        }
    }

    /// Validate against the schema and normalize, canonicalizing the target
    pub fn resolve(&self, schema: &DatasetSchema, y_column: &str) -> Result<ViewMeta> {
        let mut view = self.normalized(y_column);
        if view.view == ViewKind::Base {
            return Ok(view);
        }

        let mut errors = Vec::new();
        if view.kind.is_none() {
            errors.push("percentile view requires a percentile kind (P5, P10, P90 or P95)".to_string());
        }
        if let Some(target) = view.target.take() {
            match schema.find(&target) {
                Some(profile) => view.target = Some(profile.name.clone()),
                None => errors.push(format!("invalid percentile target column: {}", target)),
            }
        }
        if !errors.is_empty() {
            return Err(InsightError::ValidationError(errors));
        }
        Ok(view)
    }
}

/// Outcome of percentile processing, reported with every chart response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileMeta {
    pub supported: bool,
    pub mode: PercentileMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PercentileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PercentileMeta {
    fn from_view(view: &ViewMeta) -> Self {
        Self {
            supported: false,
            mode: view.mode,
            kind: view.kind,
            target: view.target.clone(),
            value: None,
            reason: None,
        }
    }

    fn unsupported(view: &ViewMeta, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::from_view(view)
        }
    }
}

/// What to fetch for a percentile view
#[derive(Debug, Clone, PartialEq)]
pub struct PercentilePlan {
    pub view: ViewMeta,
    /// Sample query, absent when the view cannot be served
    pub sample_sql: Option<String>,
    /// Why the view cannot be served
    pub blocked: Option<String>,
}

/// Plan the sample query for a resolved view; `None` under the `Base` view
pub fn plan(view: &ViewMeta, query: &ChartQuery, chart_type: ChartType) -> Option<PercentilePlan> {
    if view.view == ViewKind::Base {
        return None;
    }
    let target = view.target.as_deref().unwrap_or(&query.y.column);

    let blocked = match view.mode {
        PercentileMode::None => Some("no percentile mode selected".to_string()),
        PercentileMode::Bucket if !query.is_aggregated() => {
            Some("bucket percentiles require an aggregated chart".to_string())
        }
        PercentileMode::Bucket if chart_type == ChartType::Pie => {
            Some("bucket percentiles are not supported for pie charts".to_string())
        }
        PercentileMode::Bucket if chart_type == ChartType::Scatter => {
            Some("bucket percentiles are not supported for scatter charts".to_string())
        }
        _ => None,
    };

    Some(PercentilePlan {
        view: view.clone(),
        sample_sql: match blocked {
            Some(_) => None,
            None => Some(compile_percentile_samples(query, target)),
        },
        blocked,
    })
}

/// Continuous percentile of sorted values, `p` in [0, 1]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let (first, _) = sorted.split_first()?;
    if sorted.len() == 1 {
        return Some(*first);
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Apply fetched samples to a rendered option.
///
/// `samples` is `None` when no query ran, or the sample query's outcome.
pub fn apply(
    plan: &PercentilePlan,
    samples: Option<Result<Vec<Vec<Value>>>>,
    option: &mut Value,
    has_series: bool,
) -> PercentileMeta {
    let view = &plan.view;
    if let Some(reason) = &plan.blocked {
        return PercentileMeta::unsupported(view, reason.clone());
    }
    let rows = match samples {
        Some(Ok(rows)) => rows,
        Some(Err(e)) => {
            warn!(error = %e, "Percentile sample query failed");
            return PercentileMeta::unsupported(view, "percentile sample query failed");
        }
        None => return PercentileMeta::unsupported(view, "no percentile samples were fetched"),
    };
    let (Some(kind), Some(target)) = (view.kind, view.target.as_deref()) else {
        return PercentileMeta::unsupported(view, "percentile kind is missing");
    };
    let no_samples = format!("no numeric samples for '{}'", target);

    match view.mode {
        PercentileMode::Overall => {
            let values = sorted(
                rows.iter()
                    .filter_map(|row| row.last().and_then(value_as_f64))
                    .collect(),
            );
            let Some(value) = percentile(&values, kind.fraction()) else {
                return PercentileMeta::unsupported(view, no_samples);
            };
            append_reference_line(option, kind, target, value);
            PercentileMeta {
                supported: true,
                value: Some(value),
                ..PercentileMeta::from_view(view)
            }
        }
        PercentileMode::Bucket => {
            let categories = bucket_categories(option);
            if categories.is_empty() {
                return PercentileMeta::unsupported(view, "chart has no buckets to replace");
            }
            if apply_buckets(option, &categories, &rows, kind, has_series) {
                PercentileMeta {
                    supported: true,
                    ..PercentileMeta::from_view(view)
                }
            } else {
                PercentileMeta::unsupported(view, no_samples)
            }
        }
        PercentileMode::None => PercentileMeta::unsupported(view, "no percentile mode selected"),
    }
}

fn append_reference_line(option: &mut Value, kind: PercentileKind, target: &str, value: f64) {
    let line = json!({
        "name": format!("{} of {}", kind, target),
        "type": "line",
        "data": [],
        "markLine": {
            "symbol": "none",
            "label": { "formatter": kind.to_string() },
            "data": [{ "name": kind.to_string(), "yAxis": value }]
        }
    });
    match option.get_mut("series").and_then(Value::as_array_mut) {
        Some(series) => series.push(line),
        None => option["series"] = json!([line]),
    }
}

/// X-axis categories of a rendered cartesian option
fn bucket_categories(option: &Value) -> Vec<String> {
    option["xAxis"]["data"]
        .as_array()
        .map(|data| data.iter().map(series_label).collect())
        .unwrap_or_default()
}

/// Replace series data with per-bucket percentiles. Returns false when no
/// bucket had samples.
fn apply_buckets(
    option: &mut Value,
    categories: &[String],
    rows: &[Vec<Value>],
    kind: PercentileKind,
    has_series: bool,
) -> bool {
    let mut buckets: HashMap<(String, Option<String>), Vec<f64>> = HashMap::new();
    for row in rows {
        let Some(value) = row.last().and_then(value_as_f64) else {
            continue;
        };
        let Some(x) = row.first() else { continue };
        let series = if has_series {
            row.get(1).map(series_label)
        } else {
            None
        };
        buckets.entry((series_label(x), series)).or_default().push(value);
    }
    if buckets.is_empty() {
        return false;
    }
    let buckets: HashMap<_, _> = buckets
        .into_iter()
        .map(|(key, values)| (key, sorted(values)))
        .collect();

    if let Some(series) = option.get_mut("series").and_then(Value::as_array_mut) {
        for entry in series.iter_mut() {
            let name = entry["name"].as_str().unwrap_or_default().to_string();
            let group = if has_series { Some(name.clone()) } else { None };
            let data: Vec<Value> = categories
                .iter()
                .map(|x| {
                    buckets
                        .get(&(x.clone(), group.clone()))
                        .and_then(|values| percentile(values, kind.fraction()))
                        .map(Value::from)
                        .unwrap_or(Value::Null)
                })
                .collect();
            entry["data"] = Value::Array(data);
            entry["name"] = Value::String(format!("{} of {}", kind, name));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Aggregation, FieldSpec, TimeBin};
    use crate::schema::{ColumnProfile, InferredType};

    fn schema() -> DatasetSchema {
        DatasetSchema::new(
            "ds",
            vec![
                ColumnProfile::new("date", InferredType::Date, 10),
                ColumnProfile::new("sales", InferredType::Number, 10),
                ColumnProfile::new("profit", InferredType::Number, 10),
            ],
        )
    }

    fn query() -> ChartQuery {
        ChartQuery::new(
            FieldSpec::time("date", Some(TimeBin::Day)),
            FieldSpec::measure("sales", Some(Aggregation::Sum)),
        )
    }

    fn percentile_view(mode: PercentileMode) -> ViewMeta {
        ViewMeta {
            view: ViewKind::Percentile,
            mode,
            kind: Some(PercentileKind::P90),
            target: None,
        }
    }

    #[test]
    fn test_continuous_percentile() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&values, 0.9).unwrap() - 4.6).abs() < 1e-9);
        assert!((percentile(&values, 0.05).unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 0.95), Some(7.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_base_view_drops_percentile_settings() {
        let view = ViewMeta {
            view: ViewKind::Base,
            mode: PercentileMode::Bucket,
            kind: Some(PercentileKind::P5),
            target: Some("profit".to_string()),
        };
        assert_eq!(view.normalized("sales"), ViewMeta::default());
        assert!(plan(&view.normalized("sales"), &query(), ChartType::Line).is_none());
    }

    #[test]
    fn test_percentile_view_validation() {
        let schema = schema();
        let resolved = percentile_view(PercentileMode::Overall)
            .resolve(&schema, "sales")
            .unwrap();
        assert_eq!(resolved.target.as_deref(), Some("sales"));

        let missing_kind = ViewMeta {
            kind: None,
            ..percentile_view(PercentileMode::Overall)
        };
        assert!(matches!(
            missing_kind.resolve(&schema, "sales"),
            Err(InsightError::ValidationError(_))
        ));

        let bad_target = ViewMeta {
            target: Some("nope".to_string()),
            ..percentile_view(PercentileMode::Overall)
        };
        assert!(bad_target.resolve(&schema, "sales").is_err());

        let canonical = ViewMeta {
            target: Some("PROFIT".to_string()),
            ..percentile_view(PercentileMode::Overall)
        };
        assert_eq!(
            canonical.resolve(&schema, "sales").unwrap().target.as_deref(),
            Some("profit")
        );
    }

    #[test]
    fn test_overall_appends_reference_line() {
        let view = percentile_view(PercentileMode::Overall).normalized("sales");
        let plan = plan(&view, &query(), ChartType::Line).unwrap();
        assert!(plan.sample_sql.is_some());

        let rows: Vec<Vec<Value>> = (1..=5).map(|v| vec![json!("2024-01-01"), json!(v as f64)]).collect();
        let mut option = json!({ "series": [{ "name": "Sum of sales", "data": [15.0] }] });
        let meta = apply(&plan, Some(Ok(rows)), &mut option, false);

        assert!(meta.supported);
        assert!((meta.value.unwrap() - 4.6).abs() < 1e-9);
        assert_eq!(option["series"].as_array().unwrap().len(), 2);
        assert!((option["series"][1]["markLine"]["data"][0]["yAxis"].as_f64().unwrap() - 4.6).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_replaces_series_data() {
        let view = percentile_view(PercentileMode::Bucket).normalized("sales");
        let plan = plan(&view, &query(), ChartType::Line).unwrap();
        let rows = vec![
            vec![json!("2024-01-01"), json!("North"), json!(10.0)],
            vec![json!("2024-01-01"), json!("North"), json!(20.0)],
            vec![json!("2024-01-02"), json!("North"), json!(5.0)],
            vec![json!("2024-01-01"), json!("South"), json!(1.0)],
        ];
        let mut option = json!({
            "xAxis": { "data": ["2024-01-01", "2024-01-02"] },
            "series": [
                { "name": "North", "data": [30.0, 5.0] },
                { "name": "South", "data": [1.0, null] }
            ]
        });
        let meta = apply(&plan, Some(Ok(rows)), &mut option, true);

        assert!(meta.supported);
        assert_eq!(option["series"][0]["name"], "P90 of North");
        assert!((option["series"][0]["data"][0].as_f64().unwrap() - 19.0).abs() < 1e-9);
        assert_eq!(option["series"][0]["data"][1], json!(5.0));
        assert_eq!(option["series"][1]["data"], json!([1.0, null]));
    }

    #[test]
    fn test_degraded_outcomes() {
        let bucket = percentile_view(PercentileMode::Bucket).normalized("sales");
        let pie = plan(&bucket, &query(), ChartType::Pie).unwrap();
        assert!(pie.sample_sql.is_none());
        let meta = apply(&pie, None, &mut json!({}), false);
        assert!(!meta.supported);
        assert!(meta.reason.unwrap().contains("pie"));

        let overall = percentile_view(PercentileMode::Overall).normalized("sales");
        let plan = plan(&overall, &query(), ChartType::Line).unwrap();
        let meta = apply(&plan, Some(Ok(vec![])), &mut json!({}), false);
        assert!(!meta.supported);
        assert!(meta.reason.unwrap().contains("no numeric samples"));

        let failed = apply(
            &plan,
            Some(Err(InsightError::InternalError("boom".to_string()))),
            &mut json!({}),
            false,
        );
        assert!(!failed.supported);

        let scatter = super::plan(&bucket, &query(), ChartType::Scatter).unwrap();
        assert!(scatter.sample_sql.is_none());
        assert!(scatter.blocked.unwrap().contains("scatter"));

        let no_mode = percentile_view(PercentileMode::None).normalized("sales");
        let plan = super::plan(&no_mode, &query(), ChartType::Line).unwrap();
        assert_eq!(plan.blocked.as_deref(), Some("no percentile mode selected"));
    }

    #[test]
    fn test_bucket_keeps_base_chart_without_categories() {
        let view = percentile_view(PercentileMode::Bucket).normalized("sales");
        let plan = plan(&view, &query(), ChartType::Line).unwrap();
        let rows = vec![vec![json!("North"), json!(10.0)], vec![json!("South"), json!(4.0)]];
        let base = json!({
            "series": [{ "name": "Sum of sales", "type": "scatter", "data": [["North", 10.0], ["South", 4.0]] }]
        });
        let mut option = base.clone();
        let meta = apply(&plan, Some(Ok(rows)), &mut option, false);

        assert!(!meta.supported);
        assert!(meta.reason.is_some());
        assert_eq!(option, base);
    }
}
