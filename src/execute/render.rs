//! Chart option rendering
//!
//! Turns chart query rows into an ECharts-style option, merged into the
//! recommendation's option template. Template keys survive unless rendering
//! owns them (axis data, series).

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::chart::{ChartRecommendation, ChartType, Role};
use crate::sql::CompiledChart;

/// Display label of a category, series or X value
pub fn series_label(value: &Value) -> String {
    match value {
        Value::Null => "(blank)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Legend name of the Y measure, e.g. "Sum of sales"
pub fn measure_name(recommendation: &ChartRecommendation) -> String {
    let y = &recommendation.query.y;
    match y.aggregation {
        Some(agg) => format!("{} of {}", agg.label(), y.column),
        None => y.column.clone(),
    }
}

/// Render result rows into a chart option
pub fn render_option(
    recommendation: &ChartRecommendation,
    compiled: &CompiledChart,
    rows: &[Vec<Value>],
) -> Value {
    let mut option = match &recommendation.option_template {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if !option.contains_key("title") && !recommendation.title.is_empty() {
        option.insert("title".to_string(), json!({ "text": recommendation.title }));
    }
    option.entry("tooltip").or_insert_with(|| json!({}));

    match recommendation.chart.chart_type {
        ChartType::Pie => render_pie(&mut option, recommendation, compiled, rows),
        ChartType::Scatter => render_scatter(&mut option, recommendation, compiled, rows),
        ChartType::Line | ChartType::Bar | ChartType::Area if !compiled.aggregated => {
            render_scatter(&mut option, recommendation, compiled, rows)
        }
        kind => render_cartesian(&mut option, recommendation, compiled, rows, kind),
    }

    Value::Object(option)
}

/// Template object under `key` with `fields` overlaid
fn merged(option: &Map<String, Value>, key: &str, fields: Value) -> Value {
    let mut base = match option.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(fields) = fields {
        base.extend(fields);
    }
    Value::Object(base)
}

/// Split rows into (x, series, y), series absent for ungrouped charts
fn triples<'r>(
    compiled: &CompiledChart,
    rows: &'r [Vec<Value>],
) -> impl Iterator<Item = (&'r Value, Option<&'r Value>, &'r Value)> {
    let has_series = compiled.has_series;
    rows.iter().filter_map(move |row| {
        if has_series {
            Some((row.first()?, Some(row.get(1)?), row.get(2)?))
        } else {
            Some((row.first()?, None, row.get(1)?))
        }
    })
}

fn render_cartesian(
    option: &mut Map<String, Value>,
    recommendation: &ChartRecommendation,
    compiled: &CompiledChart,
    rows: &[Vec<Value>],
    kind: ChartType,
) {
    // X categories in row order; rows arrive sorted (or ranked for top-N)
    let mut categories: Vec<Value> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    let mut groups: BTreeMap<String, Vec<(usize, Value)>> = BTreeMap::new();
    let default_name = measure_name(recommendation);

    for (x, series, y) in triples(compiled, rows) {
        let key = series_label(x);
        let slot = *index.entry(key).or_insert_with(|| {
            categories.push(x.clone());
            categories.len() - 1
        });
        let name = series.map(series_label).unwrap_or_else(|| default_name.clone());
        groups.entry(name).or_default().push((slot, y.clone()));
    }

    let series_type = match kind {
        ChartType::Bar => "bar",
        _ => "line",
    };
    let series: Vec<Value> = groups
        .into_iter()
        .map(|(name, points)| {
            let mut data = vec![Value::Null; categories.len()];
            for (slot, y) in points {
                data[slot] = y;
            }
            let mut entry = json!({ "name": name, "type": series_type, "data": data });
            if kind == ChartType::Area {
                entry["areaStyle"] = json!({});
            }
            entry
        })
        .collect();

    if compiled.has_series {
        let names: Vec<Value> = series.iter().map(|s| s["name"].clone()).collect();
        let legend = merged(option, "legend", json!({ "data": names }));
        option.insert("legend".to_string(), legend);
    }

    let x_axis = merged(
        option,
        "xAxis",
        json!({ "type": "category", "data": categories, "name": recommendation.query.x.column }),
    );
    let y_axis = merged(
        option,
        "yAxis",
        json!({ "type": "value", "name": default_name }),
    );
    option.insert("xAxis".to_string(), x_axis);
    option.insert("yAxis".to_string(), y_axis);
    option.insert("series".to_string(), Value::Array(series));
}

fn render_scatter(
    option: &mut Map<String, Value>,
    recommendation: &ChartRecommendation,
    compiled: &CompiledChart,
    rows: &[Vec<Value>],
) {
    let default_name = measure_name(recommendation);
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (x, series, y) in triples(compiled, rows) {
        let name = series.map(series_label).unwrap_or_else(|| default_name.clone());
        groups
            .entry(name)
            .or_default()
            .push(Value::Array(vec![x.clone(), y.clone()]));
    }

    let series: Vec<Value> = groups
        .into_iter()
        .map(|(name, data)| json!({ "name": name, "type": "scatter", "data": data }))
        .collect();

    let x_type = match recommendation.query.x.role {
        Role::Measure => "value",
        _ => "category",
    };
    let x_axis = merged(
        option,
        "xAxis",
        json!({ "type": x_type, "name": recommendation.query.x.column }),
    );
    let y_axis = merged(
        option,
        "yAxis",
        json!({ "type": "value", "name": default_name }),
    );
    option.insert("xAxis".to_string(), x_axis);
    option.insert("yAxis".to_string(), y_axis);
    option.insert("series".to_string(), Value::Array(series));
}

fn render_pie(
    option: &mut Map<String, Value>,
    recommendation: &ChartRecommendation,
    compiled: &CompiledChart,
    rows: &[Vec<Value>],
) {
    let data: Vec<Value> = triples(compiled, rows)
        .map(|(x, series, y)| {
            let name = match series {
                Some(s) => format!("{} ({})", series_label(x), series_label(s)),
                None => series_label(x),
            };
            json!({ "name": name, "value": y })
        })
        .collect();

    option.remove("xAxis");
    option.remove("yAxis");
    option.insert(
        "series".to_string(),
        json!([{ "name": measure_name(recommendation), "type": "pie", "data": data }]),
    );
}
