//! Per-column statistics for the raw-row explorer
//!
//! Distinct and blank counts, the most frequent values and, for wide numeric
//! or date columns, counts over equal-width ranges between the column's
//! minimum and maximum.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Settings;
use crate::execute::{series_label, value_as_f64, value_as_i64, EngineSession};
use crate::schema::{ColumnProfile, InferredType};
use crate::sql::rows::{field_summary_sql, range_bounds_sql, range_counts_sql, top_values_sql};
use crate::Result;

/// Columns with more distinct values than this also get range buckets
pub const RANGE_DISTINCT_THRESHOLD: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

/// One range bucket; `from`/`to` are epoch seconds for dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBucket {
    pub label: String,
    pub from: f64,
    pub to: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFieldStats {
    pub column: String,
    pub inferred_type: InferredType,
    pub distinct_count: u64,
    pub null_count: u64,
    pub top_values: Vec<ValueCount>,
    pub top_ranges: Vec<RangeBucket>,
}

/// Split `[min, max]` into `bins` equal-width, gap-free ranges.
///
/// The last range ends exactly at `max`. A degenerate span yields one range.
pub fn range_edges(min: f64, max: f64, bins: usize) -> Vec<(f64, f64)> {
    if !(min < max) || bins <= 1 {
        return vec![(min, max)];
    }
    let width = (max - min) / bins as f64;
    let edge = |i: usize| if i == bins { max } else { min + width * i as f64 };
    (0..bins).map(|i| (edge(i), edge(i + 1))).collect()
}

fn format_bound(value: f64, inferred_type: InferredType) -> String {
    if inferred_type == InferredType::Date {
        return DateTime::from_timestamp(value.floor() as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| value.to_string());
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn range_label(from: f64, to: f64, inferred_type: InferredType) -> String {
    format!(
        "{} - {}",
        format_bound(from, inferred_type),
        format_bound(to, inferred_type)
    )
}

/// Keep the `limit` fullest buckets, returned in range order
pub fn select_top_ranges(mut buckets: Vec<RangeBucket>, limit: usize) -> Vec<RangeBucket> {
    if buckets.len() > limit {
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then(a.from.total_cmp(&b.from)));
        buckets.truncate(limit);
        buckets.sort_by(|a, b| a.from.total_cmp(&b.from));
    }
    buckets
}

/// Compute statistics for `profile` over the rows matching `conditions`
pub fn compute(
    session: &EngineSession,
    profile: &ColumnProfile,
    conditions: &[String],
    settings: &Settings,
) -> Result<RawFieldStats> {
    let column = profile.name.as_str();

    let summary = session.fetch(&field_summary_sql(column, conditions), 2)?;
    let (distinct_count, null_count) = summary
        .first()
        .map(|row| {
            let count = |i: usize| row.get(i).and_then(value_as_i64).unwrap_or(0).max(0) as u64;
            (count(0), count(1))
        })
        .unwrap_or((0, 0));

    let top_values = session
        .fetch(
            &top_values_sql(column, conditions, settings.raw_top_values_limit()),
            2,
        )?
        .into_iter()
        .map(|row| ValueCount {
            value: row.first().map(series_label).unwrap_or_default(),
            count: row.get(1).and_then(value_as_i64).unwrap_or(0).max(0) as u64,
        })
        .collect();

    let top_ranges = if distinct_count > RANGE_DISTINCT_THRESHOLD && profile.inferred_type.is_rangeable() {
        match compute_ranges(session, profile, conditions, settings) {
            Ok(ranges) => ranges,
            Err(e) => {
                warn!(column = %column, error = %e, "Range binning failed");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    Ok(RawFieldStats {
        column: profile.name.clone(),
        inferred_type: profile.inferred_type,
        distinct_count,
        null_count,
        top_values,
        top_ranges,
    })
}

fn compute_ranges(
    session: &EngineSession,
    profile: &ColumnProfile,
    conditions: &[String],
    settings: &Settings,
) -> Result<Vec<RangeBucket>> {
    let column = profile.name.as_str();
    let kind = profile.inferred_type;

    let bounds = session.fetch(&range_bounds_sql(column, kind, conditions), 2)?;
    let (Some(min), Some(max)) = (
        bounds.first().and_then(|r| r.first()).and_then(value_as_f64),
        bounds.first().and_then(|r| r.get(1)).and_then(value_as_f64),
    ) else {
        // No parseable values
        return Ok(Vec::new());
    };

    let edges = range_edges(min, max, settings.range_bin_count());
    let width = if edges.len() > 1 {
        (max - min) / edges.len() as f64
    } else {
        0.0
    };

    let mut buckets: Vec<RangeBucket> = edges
        .iter()
        .map(|&(from, to)| RangeBucket {
            label: range_label(from, to, kind),
            from,
            to,
            count: 0,
        })
        .collect();

    let counts = session.fetch(
        &range_counts_sql(column, kind, conditions, min, width, buckets.len()),
        2,
    )?;
    for row in counts {
        let index = row.first().and_then(value_as_i64).unwrap_or(0).max(0) as usize;
        let count = row.get(1).and_then(value_as_i64).unwrap_or(0).max(0) as u64;
        if let Some(bucket) = buckets.get_mut(index.min(edges.len() - 1)) {
            bucket.count += count;
        }
    }

    Ok(select_top_ranges(buckets, settings.raw_top_ranges_limit()))
}
