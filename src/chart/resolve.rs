//! Override application and schema validation
//!
//! The resolver merges a base recommendation with runtime overrides. It never
//! touches the base: with no overrides the original is handed back borrowed,
//! otherwise a new recommendation carrying a freshly built query is returned.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::types::{Aggregation, ChartFilter, ChartRecommendation, FieldSpec, Role, TimeBin};
use crate::config::Settings;
use crate::schema::{ColumnProfile, DatasetSchema, InferredType};
use crate::{InsightError, Result};

/// Minimum group-by cardinality cap, regardless of sample size
pub const MIN_GROUP_BY_CAP: u64 = 20;

/// Fraction of the profiled sample a group-by column may have as distinct values
pub const GROUP_BY_SAMPLE_FRACTION: f64 = 0.05;

/// Runtime overrides of a recommendation's query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartOverrides {
    pub aggregation: Option<Aggregation>,
    pub time_bin: Option<TimeBin>,
    pub y_column: Option<String>,
    pub group_by: Option<String>,
    /// Caller-supplied cap on group-by distinct values
    pub group_by_max_distinct: Option<u64>,
    pub filters: Vec<ChartFilter>,
}

impl ChartOverrides {
    pub fn is_empty(&self) -> bool {
        self.aggregation.is_none()
            && self.time_bin.is_none()
            && self.y_column.is_none()
            && self.group_by.is_none()
            && self.filters.is_empty()
    }
}

/// Validates overrides against a dataset schema and applies them
pub struct QueryResolver<'a> {
    schema: &'a DatasetSchema,
    settings: &'a Settings,
}

impl<'a> QueryResolver<'a> {
    pub fn new(schema: &'a DatasetSchema, settings: &'a Settings) -> Self {
        Self { schema, settings }
    }

    /// Distinct-value cap for a group-by column
    pub fn group_by_cap(&self, caller_cap: Option<u64>) -> u64 {
        caller_cap
            .or_else(|| self.settings.group_by_max_distinct())
            .unwrap_or_else(|| {
                let scaled = (self.schema.sample_size() as f64 * GROUP_BY_SAMPLE_FRACTION) as u64;
                scaled.max(MIN_GROUP_BY_CAP)
            })
    }

    /// Resolve a recommendation against overrides.
    ///
    /// All violations are collected before failing, so the caller can report
    /// every offending input in one response.
    pub fn resolve<'r>(
        &self,
        recommendation: &'r ChartRecommendation,
        overrides: &ChartOverrides,
    ) -> Result<Cow<'r, ChartRecommendation>> {
        let mut errors = Vec::new();

        // 1. Every referenced column must exist
        let mut unknown: Vec<&str> = Vec::new();
        let y_column = overrides.y_column.as_deref().map(|name| (name, self.schema.find(name)));
        let group_by = overrides.group_by.as_deref().map(|name| (name, self.schema.find(name)));
        let filter_columns: Vec<(&str, Option<&ColumnProfile>)> = overrides
            .filters
            .iter()
            .map(|f| (f.column.as_str(), self.schema.find(&f.column)))
            .collect();

        for (name, found) in y_column.iter().chain(group_by.iter()).chain(filter_columns.iter()) {
            if found.is_none() && !unknown.contains(name) {
                unknown.push(*name);
            }
        }
        if !unknown.is_empty() {
            errors.push(format!("invalid column(s): {}", unknown.join(", ")));
        }

        // 2. Y override must be numeric
        if let Some((_, Some(profile))) = y_column {
            if profile.inferred_type != InferredType::Number {
                errors.push(format!(
                    "column '{}' is not numeric and cannot be used as the Y axis",
                    profile.name
                ));
            }
        }

        // 3. Group-by cardinality guard
        if let Some((_, Some(profile))) = group_by {
            let cap = self.group_by_cap(overrides.group_by_max_distinct);
            if profile.distinct_count > cap {
                errors.push(format!(
                    "column '{}' has high cardinality ({} distinct values, at most {} allowed for grouping)",
                    profile.name, profile.distinct_count, cap
                ));
            }
        }

        // Filters may arrive typed (JSON) rather than through the token parser
        let max_filters = self.settings.max_filters();
        if overrides.filters.len() > max_filters {
            errors.push(format!(
                "too many filters: {} supplied, at most {} allowed",
                overrides.filters.len(),
                max_filters
            ));
        }
        errors.extend(overrides.filters.iter().filter_map(|f| f.validate().err()));

        if overrides.time_bin.is_some() && recommendation.query.x.role != Role::Time {
            errors.push(format!(
                "time bin requires a time axis, but '{}' is not one",
                recommendation.query.x.column
            ));
        }

        if !errors.is_empty() {
            return Err(InsightError::ValidationError(errors));
        }

        // 4. Apply
        if overrides.is_empty() {
            return Ok(Cow::Borrowed(recommendation));
        }

        let base = &recommendation.query;
        let mut query = base.clone();

        if let Some(bin) = overrides.time_bin {
            query.x = FieldSpec {
                bin: Some(bin),
                ..base.x.clone()
            };
        }

        if overrides.aggregation.is_some() || y_column.is_some() {
            let column = match y_column {
                Some((_, Some(profile))) => profile.name.clone(),
                _ => base.y.column.clone(),
            };
            query.y = FieldSpec {
                column,
                aggregation: overrides.aggregation.or(base.y.aggregation),
                ..base.y.clone()
            };
        }

        if let Some((_, Some(profile))) = group_by {
            query.series = Some(FieldSpec::category(profile.name.clone()));
        }

        if !overrides.filters.is_empty() {
            query.filters = overrides
                .filters
                .iter()
                .zip(filter_columns.iter())
                .map(|(filter, (_, profile))| ChartFilter {
                    column: profile
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| filter.column.clone()),
                    ..filter.clone()
                })
                .collect();
        }

        Ok(Cow::Owned(recommendation.with_query(query)))
    }
}
