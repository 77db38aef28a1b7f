//! Engine configuration.
//!
//! Settings are an explicit struct passed into the service, compiler, executor
//! and cache constructors. Raw fields hold whatever the operator supplied;
//! every accessor clamps to the supported range at read time, so a bad config
//! file can never push a limit outside what the engine is built for.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{InsightError, Result};

/// Engine limits and toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Maximum filter tokens per request
    pub max_filters: usize,
    /// Number of top values in raw field statistics
    pub raw_top_values_limit: usize,
    /// Number of top ranges in raw field statistics
    pub raw_top_ranges_limit: usize,
    /// Number of min-max buckets used for range statistics
    pub range_bin_count: usize,
    /// Fixed cap on group-by distinct values (None = `max(20, 5% of sample)`)
    pub group_by_max_distinct: Option<u64>,
    /// Engine query timeout
    pub query_timeout_seconds: u64,
    /// Result cache time-to-live
    pub cache_ttl_seconds: u64,
    /// Largest page the raw-row explorer will return
    pub max_page_size: usize,
    /// Cap on rows returned by a chart data query
    pub max_chart_points: usize,
    /// Attach generated SQL to results and errors (debug diagnostics only)
    pub include_generated_sql: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_filters: 3,
            raw_top_values_limit: 10,
            raw_top_ranges_limit: 5,
            range_bin_count: 8,
            group_by_max_distinct: None,
            query_timeout_seconds: 30,
            cache_ttl_seconds: 600,
            max_page_size: 500,
            max_chart_points: 5000,
            include_generated_sql: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            InsightError::InternalError(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            InsightError::InternalError(format!(
                "Failed to parse config {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn max_filters(&self) -> usize {
        self.max_filters.clamp(1, 10)
    }

    pub fn raw_top_values_limit(&self) -> usize {
        self.raw_top_values_limit.clamp(3, 50)
    }

    pub fn raw_top_ranges_limit(&self) -> usize {
        self.raw_top_ranges_limit.clamp(3, 20)
    }

    pub fn range_bin_count(&self) -> usize {
        self.range_bin_count.clamp(4, 20)
    }

    pub fn group_by_max_distinct(&self) -> Option<u64> {
        self.group_by_max_distinct.map(|cap| cap.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds.max(1))
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size.clamp(1, 10_000)
    }

    pub fn max_chart_points(&self) -> usize {
        self.max_chart_points.clamp(10, 100_000)
    }
}
