//! Request-level entry points
//!
//! [`ChartService`] owns the catalog, the result cache, the executor and the
//! settings. Requests are otherwise independent: each one opens its own
//! engine session, and the cache is the only state they share.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cache::{fingerprint, CacheKey, ResultCache};
use crate::catalog::DatasetCatalog;
use crate::chart::{
    parse_filters, Aggregation, ChartFilter, ChartOverrides, QueryResolver, TimeBin,
};
use crate::config::Settings;
use crate::execute::{render_option, EngineSession, QueryExecutor};
use crate::field_stats::{self, RawFieldStats};
use crate::naming;
use crate::percentile::{
    self, PercentileKind, PercentileMeta, PercentileMode, ViewKind, ViewMeta,
};
use crate::schema::{ColumnProfile, DatasetSchema};
use crate::sql::{compile_chart, RowsQuery, SortSpec};
use crate::{InsightError, Result};

/// Page size used when a raw-rows request does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Runtime parameters of a chart execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartRequest {
    pub aggregation: Option<Aggregation>,
    pub time_bin: Option<TimeBin>,
    pub y_column: Option<String>,
    pub group_by: Option<String>,
    pub group_by_max_distinct: Option<u64>,
    /// Filter tokens, `column|operator|values[|And/Or]`
    pub filters: Vec<String>,
    pub view: ViewKind,
    pub percentile_mode: PercentileMode,
    pub percentile_kind: Option<PercentileKind>,
    pub percentile_target: Option<String>,
}

impl ChartRequest {
    pub fn view_meta(&self) -> ViewMeta {
        ViewMeta {
            view: self.view,
            mode: self.percentile_mode,
            kind: self.percentile_kind,
            target: self.percentile_target.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartExecutionResult {
    /// Rendered chart option
    pub option: Value,
    /// Rows returned by the chart query
    pub row_count: usize,
    pub duck_db_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartExecutionResponse {
    pub dataset_id: String,
    pub recommendation_id: String,
    pub execution_result: ChartExecutionResult,
    pub percentiles: PercentileMeta,
    pub view: ViewMeta,
    pub query_hash: String,
    pub cache_hit: bool,
    pub total_execution_ms: u64,
}

/// One page of the raw-row explorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRowsRequest {
    /// 1-based page number
    pub page: usize,
    pub page_size: Option<usize>,
    /// Sort tokens: `column`, `column:asc` or `column:desc`
    pub sort: Vec<String>,
    pub filters: Vec<String>,
    pub search: Option<String>,
    pub field_stats_column: Option<String>,
}

impl Default for RawRowsRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
            sort: Vec::new(),
            filters: Vec::new(),
            search: None,
            field_stats_column: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRowsResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count_total: u64,
    pub page: usize,
    pub page_size: usize,
    /// The requested page size exceeded the maximum and was reduced
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_stats: Option<RawFieldStats>,
}

/// Chart resolution, execution and raw-row access over a dataset catalog
pub struct ChartService {
    catalog: Arc<dyn DatasetCatalog>,
    cache: Arc<ResultCache>,
    executor: QueryExecutor,
    settings: Settings,
}

impl ChartService {
    pub fn new(catalog: impl DatasetCatalog + 'static, settings: Settings) -> Self {
        let cache = Arc::new(ResultCache::new(settings.cache_ttl()));
        Self::with_cache(Arc::new(catalog), cache, settings)
    }

    /// Build a service sharing an existing cache
    pub fn with_cache(
        catalog: Arc<dyn DatasetCatalog>,
        cache: Arc<ResultCache>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            cache,
            executor: QueryExecutor::from_settings(&settings),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Resolve a recommendation with runtime overrides, execute it and cache
    /// the response under its fingerprint.
    pub async fn resolve_and_execute(
        &self,
        dataset_id: &str,
        recommendation_id: &str,
        request: &ChartRequest,
    ) -> Result<ChartExecutionResponse> {
        let started = Instant::now();
        let schema = self.catalog.schema(dataset_id)?;
        let base = self.catalog.recommendation(dataset_id, recommendation_id)?;

        let parsed = parse_filters(&request.filters, self.settings.max_filters());
        if !parsed.is_ok() {
            return Err(InsightError::ValidationError(parsed.errors));
        }
        let overrides = ChartOverrides {
            aggregation: request.aggregation,
            time_bin: request.time_bin,
            y_column: request.y_column.clone(),
            group_by: request.group_by.clone(),
            group_by_max_distinct: request.group_by_max_distinct,
            filters: parsed.filters,
        };

        let resolved = QueryResolver::new(&schema, &self.settings).resolve(&base, &overrides)?;
        let view = request
            .view_meta()
            .resolve(&schema, &resolved.query.y.column)?;
        let query_hash = fingerprint(dataset_id, &resolved, &view);
        let key = CacheKey::new(dataset_id, recommendation_id, query_hash.as_str());

        if let Some(mut hit) = self.cache.get(&key) {
            hit.total_execution_ms = elapsed_ms(started);
            info!(
                dataset = %dataset_id,
                recommendation = %recommendation_id,
                query_hash = %query_hash,
                "Serving chart from cache"
            );
            return Ok(hit);
        }

        let compiled = compile_chart(&resolved.query, self.settings.max_chart_points());
        let plan = percentile::plan(&view, &resolved.query, resolved.chart.chart_type);
        let source = self.catalog.dataset_path(dataset_id)?;

        let data_sql = compiled.data_sql.clone();
        let width = compiled.width();
        let sample_sql = plan.as_ref().and_then(|p| p.sample_sql.clone());
        let timed = self
            .executor
            .run(source, move |session| {
                let rows = session.fetch(&data_sql, width)?;
                // A failed sample query only degrades the percentile overlay
                let samples = sample_sql.map(|sql| session.fetch(&sql, width));
                Ok((rows, samples))
            })
            .await?;
        let (rows, samples) = timed.value;

        let mut option = render_option(&resolved, &compiled, &rows);
        let percentiles = match &plan {
            Some(plan) => percentile::apply(plan, samples, &mut option, compiled.has_series),
            None => PercentileMeta::default(),
        };

        let response = ChartExecutionResponse {
            dataset_id: dataset_id.to_string(),
            recommendation_id: recommendation_id.to_string(),
            execution_result: ChartExecutionResult {
                option,
                row_count: rows.len(),
                duck_db_ms: timed.duckdb_ms,
                generated_sql: self
                    .settings
                    .include_generated_sql
                    .then(|| compiled.data_sql.clone()),
            },
            percentiles,
            view,
            query_hash,
            cache_hit: false,
            total_execution_ms: elapsed_ms(started),
        };

        info!(
            dataset = %dataset_id,
            recommendation = %recommendation_id,
            rows = response.execution_result.row_count,
            duckdb_ms = timed.duckdb_ms,
            "Chart executed"
        );

        self.cache.set(key, response.clone());
        Ok(response)
    }

    /// One page of filtered, searched and sorted rows, optionally with
    /// statistics for one column. Bypasses the result cache.
    pub async fn get_raw_rows(
        &self,
        dataset_id: &str,
        request: &RawRowsRequest,
    ) -> Result<RawRowsResponse> {
        let schema = self.catalog.schema(dataset_id)?;
        let columns = visible_columns(&schema);

        let parsed = parse_filters(&request.filters, self.settings.max_filters());
        let mut errors = parsed.errors;
        let mut unknown: Vec<String> = Vec::new();

        let filters = canonical_filters(&schema, parsed.filters, &mut unknown);

        let mut sort = Vec::new();
        for token in request.sort.iter().filter(|t| !t.trim().is_empty()) {
            match token.parse::<SortSpec>() {
                Ok(spec) => match schema.find(&spec.column) {
                    Some(profile) => sort.push(SortSpec::new(profile.name.clone(), spec.direction)),
                    None => note_unknown(&mut unknown, spec.column),
                },
                Err(e) => errors.push(e),
            }
        }

        let stats_column = match request.field_stats_column.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => match schema.find(name) {
                Some(profile) => Some(profile.clone()),
                None => {
                    note_unknown(&mut unknown, name.to_string());
                    None
                }
            },
            _ => None,
        };

        if !unknown.is_empty() {
            errors.insert(0, format!("invalid column(s): {}", unknown.join(", ")));
        }
        if !errors.is_empty() {
            return Err(InsightError::ValidationError(errors));
        }

        let page = request.page.max(1);
        let requested = request.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let page_size = requested.min(self.settings.max_page_size());
        let truncated = requested > page_size;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        if columns.is_empty() {
            return Ok(RawRowsResponse {
                columns: names,
                rows: Vec::new(),
                row_count_total: 0,
                page,
                page_size,
                truncated,
                field_stats: None,
            });
        }

        let source = self.catalog.dataset_path(dataset_id)?;
        let search = request.search.clone();
        let settings = self.settings.clone();
        let offset = (page - 1).saturating_mul(page_size);
        let job_names = names.clone();

        let timed = self
            .executor
            .run(source, move |session| {
                let query = RowsQuery {
                    columns: &columns,
                    filters: &filters,
                    search: search.as_deref(),
                    sort: &sort,
                };
                let total = session.fetch_one_i64(&query.count_sql())?.max(0) as u64;
                let rows = session.fetch(&query.page_sql(page_size, offset), columns.len())?;
                let stats = stats_column.and_then(|profile| {
                    field_stats_or_warn(session, &profile, &query.conditions(), &settings)
                });
                Ok((total, to_objects(&job_names, rows), stats))
            })
            .await?;
        let (row_count_total, rows, field_stats) = timed.value;

        info!(
            dataset = %dataset_id,
            page,
            page_size,
            rows = rows.len(),
            total = row_count_total,
            "Raw rows fetched"
        );

        Ok(RawRowsResponse {
            columns: names,
            rows,
            row_count_total,
            page,
            page_size,
            truncated,
            field_stats,
        })
    }

    /// Deterministic sample of at most `cap` rows, used by formula discovery.
    ///
    /// Empty `columns` means every column. The same file and arguments always
    /// return the same rows in the same order.
    pub async fn sample_rows(
        &self,
        dataset_id: &str,
        columns: &[String],
        filters: &[String],
        cap: usize,
    ) -> Result<Vec<Map<String, Value>>> {
        let schema = self.catalog.schema(dataset_id)?;
        let parsed = parse_filters(filters, self.settings.max_filters());
        let mut errors = parsed.errors;
        let mut unknown = Vec::new();

        let selected: Vec<ColumnProfile> = if columns.is_empty() {
            visible_columns(&schema)
        } else {
            columns
                .iter()
                .filter_map(|name| match schema.find(name) {
                    Some(profile) => Some(profile.clone()),
                    None => {
                        note_unknown(&mut unknown, name.clone());
                        None
                    }
                })
                .collect()
        };
        let filters = canonical_filters(&schema, parsed.filters, &mut unknown);

        if !unknown.is_empty() {
            errors.insert(0, format!("invalid column(s): {}", unknown.join(", ")));
        }
        if !errors.is_empty() {
            return Err(InsightError::ValidationError(errors));
        }
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let source = self.catalog.dataset_path(dataset_id)?;
        let names: Vec<String> = selected.iter().map(|c| c.name.clone()).collect();
        let cap = cap.max(1);
        let timed = self
            .executor
            .run(source, move |session| {
                let query = RowsQuery {
                    filters: &filters,
                    ..RowsQuery::new(&selected)
                };
                let rows = session.fetch(&query.sample_sql(cap), selected.len())?;
                Ok(to_objects(&names, rows))
            })
            .await?;
        Ok(timed.value)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Dataset columns, minus any engine-generated ones
fn visible_columns(schema: &DatasetSchema) -> Vec<ColumnProfile> {
    schema
        .columns
        .iter()
        .filter(|c| !naming::is_synthetic_column(&c.name))
        .cloned()
        .collect()
}

/// Record an unknown column once, keeping first-seen order
fn note_unknown(unknown: &mut Vec<String>, name: String) {
    if !unknown.contains(&name) {
        unknown.push(name);
    }
}

/// Rewrite filter columns to their schema spelling, collecting unknown ones
fn canonical_filters(
    schema: &DatasetSchema,
    filters: Vec<ChartFilter>,
    unknown: &mut Vec<String>,
) -> Vec<ChartFilter> {
    filters
        .into_iter()
        .filter_map(|filter| match schema.find(&filter.column) {
            Some(profile) => Some(ChartFilter {
                column: profile.name.clone(),
                ..filter
            }),
            None => {
                note_unknown(unknown, filter.column);
                None
            }
        })
        .collect()
}

fn field_stats_or_warn(
    session: &EngineSession,
    profile: &ColumnProfile,
    conditions: &[String],
    settings: &Settings,
) -> Option<RawFieldStats> {
    match field_stats::compute(session, profile, conditions, settings) {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(column = %profile.name, error = %e, "Field statistics failed");
            None
        }
    }
}

fn to_objects(names: &[String], rows: Vec<Vec<Value>>) -> Vec<Map<String, Value>> {
    rows.into_iter()
        .map(|row| names.iter().cloned().zip(row).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sales_catalog;
    use crate::catalog::FsCatalog;
    use serde_json::json;

    fn service(root: &tempfile::TempDir) -> ChartService {
        ChartService::new(FsCatalog::new(root.path()), Settings::default())
    }

    fn north_by_region() -> ChartRequest {
        ChartRequest {
            group_by: Some("region".to_string()),
            filters: vec!["region|Eq|North".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_base_chart() {
        let root = sales_catalog("sales");
        let response = service(&root)
            .resolve_and_execute("sales", "rec_001", &ChartRequest::default())
            .await
            .unwrap();

        let option = &response.execution_result.option;
        assert_eq!(
            option["xAxis"]["data"],
            json!(["2024-01-01", "2024-01-02", "2024-01-03"])
        );
        assert_eq!(option["series"][0]["name"], "Sum of sales");
        assert_eq!(option["series"][0]["data"], json!([150.0, 1280.0, 30.0]));
        assert_eq!(response.execution_result.row_count, 3);
        assert!(response.execution_result.generated_sql.is_none());
        assert!(!response.cache_hit);
        assert!(!response.percentiles.supported);
        assert!(response.percentiles.reason.is_none());
    }

    #[tokio::test]
    async fn test_group_by_with_filter_end_to_end() {
        let root = sales_catalog("sales");
        let service = service(&root);

        let filtered = service
            .resolve_and_execute("sales", "rec_001", &north_by_region())
            .await
            .unwrap();
        let series = filtered.execution_result.option["series"].as_array().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0]["name"], "North");
        assert_eq!(filtered.execution_result.option["legend"]["data"], json!(["North"]));

        let unfiltered = service
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    filters: Vec::new(),
                    ..north_by_region()
                },
            )
            .await
            .unwrap();
        assert_ne!(filtered.query_hash, unfiltered.query_hash);
        assert_eq!(
            unfiltered.execution_result.option["series"].as_array().unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_repeat_request_hits_cache() {
        let root = sales_catalog("sales");
        let service = service(&root);

        let first = service
            .resolve_and_execute("sales", "rec_001", &north_by_region())
            .await
            .unwrap();
        let second = service
            .resolve_and_execute("sales", "rec_001", &north_by_region())
            .await
            .unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.query_hash, second.query_hash);
        assert_eq!(first.execution_result, second.execution_result);
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_are_collected() {
        let root = sales_catalog("sales");
        let err = service(&root)
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    group_by: Some("country".to_string()),
                    y_column: Some("region".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            InsightError::ValidationError(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("country"));
                assert!(errors[1].contains("not numeric"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = service(&root)
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    filters: vec!["sales|Between|1,2,3".to_string(), "x|Eq".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::ValidationError(ref e) if e.len() == 2));
    }

    #[tokio::test]
    async fn test_unknown_recommendation() {
        let root = sales_catalog("sales");
        let err = service(&root)
            .resolve_and_execute("sales", "rec_404", &ChartRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_escaped_values_execute() {
        let root = sales_catalog("sales");
        let response = service(&root)
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    filters: vec![
                        "region|Eq|O'Brien".to_string(),
                        "region|Contains|50%_\"x|Or".to_string(),
                    ],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.execution_result.row_count, 0);
    }

    #[tokio::test]
    async fn test_overall_percentile() {
        let root = sales_catalog("sales");
        let response = service(&root)
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    view: ViewKind::Percentile,
                    percentile_mode: PercentileMode::Overall,
                    percentile_kind: Some(PercentileKind::P90),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // sales: 30, 50, 80, 100, 1200
        let meta = &response.percentiles;
        assert!(meta.supported);
        assert_eq!(meta.target.as_deref(), Some("sales"));
        assert!((meta.value.unwrap() - 760.0).abs() < 1e-6);
        assert_eq!(response.view.target.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn test_date_filters_execute() {
        let root = sales_catalog("sales");
        let service = service(&root);

        let response = service
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    filters: vec!["date|Between|2024-01-01,2024-01-02".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let option = &response.execution_result.option;
        assert_eq!(option["xAxis"]["data"], json!(["2024-01-01", "2024-01-02"]));
        assert_eq!(option["series"][0]["data"], json!([150.0, 1280.0]));

        let rows = service
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    filters: vec!["date|Between|2024-01-01,2024-01-02".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.row_count_total, 4);

        let later = service
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    filters: vec!["date|Gt|2024-01-02".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(later.row_count_total, 2);
        assert!(later.rows.iter().all(|r| r["date"] == json!("2024-01-03")));
    }

    #[tokio::test]
    async fn test_coarse_time_bins_execute() {
        let root = sales_catalog("sales");
        let service = service(&root);

        // 2024-01-01 is a Monday, so every bin folds the three days together
        for bin in [TimeBin::Week, TimeBin::Month, TimeBin::Quarter, TimeBin::Year] {
            let response = service
                .resolve_and_execute(
                    "sales",
                    "rec_001",
                    &ChartRequest {
                        time_bin: Some(bin),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let option = &response.execution_result.option;
            assert_eq!(option["xAxis"]["data"], json!(["2024-01-01"]), "{:?}", bin);
            assert_eq!(option["series"][0]["data"], json!([1460.0]), "{:?}", bin);
        }
    }

    #[tokio::test]
    async fn test_bucket_percentile() {
        let root = sales_catalog("sales");
        let service = service(&root);
        let bucket = ChartRequest {
            view: ViewKind::Percentile,
            percentile_mode: PercentileMode::Bucket,
            percentile_kind: Some(PercentileKind::P90),
            ..Default::default()
        };

        let daily = service
            .resolve_and_execute("sales", "rec_001", &bucket)
            .await
            .unwrap();
        assert!(daily.percentiles.supported);
        let series = &daily.execution_result.option["series"][0];
        assert_eq!(series["name"], "P90 of Sum of sales");
        // Per day: [50, 100], [80, 1200], [30]
        let data: Vec<f64> = series["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(data.len(), 3);
        assert!((data[0] - 95.0).abs() < 1e-6);
        assert!((data[1] - 1088.0).abs() < 1e-6);
        assert!((data[2] - 30.0).abs() < 1e-6);

        let weekly = service
            .resolve_and_execute(
                "sales",
                "rec_001",
                &ChartRequest {
                    time_bin: Some(TimeBin::Week),
                    ..bucket
                },
            )
            .await
            .unwrap();
        assert!(weekly.percentiles.supported);
        let value = weekly.execution_result.option["series"][0]["data"][0]
            .as_f64()
            .unwrap();
        assert!((value - 760.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generated_sql_is_opt_in() {
        let root = sales_catalog("sales");
        let settings = Settings {
            include_generated_sql: true,
            ..Default::default()
        };
        let service = ChartService::new(FsCatalog::new(root.path()), settings);
        let response = service
            .resolve_and_execute("sales", "rec_001", &ChartRequest::default())
            .await
            .unwrap();
        let sql = response.execution_result.generated_sql.unwrap();
        assert!(sql.contains("\"__insight_dataset__\""));
    }

    #[tokio::test]
    async fn test_raw_rows_pagination_and_sort() {
        let root = sales_catalog("sales");
        let service = service(&root);

        let page = service
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    page: 2,
                    page_size: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.columns, vec!["date", "sales", "region"]);
        assert_eq!(page.row_count_total, 6);
        assert_eq!(page.rows.len(), 2);
        assert!(!page.truncated);

        let sorted = service
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    sort: vec!["SALES:desc".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sorted.rows[0]["sales"], json!("1,200"));
        assert_eq!(sorted.rows[5]["sales"], Value::Null);
        assert_eq!(sorted.page_size, DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_raw_rows_filters_search_and_truncation() {
        let root = sales_catalog("sales");
        let response = service(&root)
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    page_size: Some(10_000),
                    filters: vec!["sales|>|60".to_string()],
                    search: Some("nor".to_string()),
                    field_stats_column: Some("region".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(response.truncated);
        assert_eq!(response.page_size, 500);
        assert_eq!(response.row_count_total, 2);
        assert!(response.rows.iter().all(|r| r["region"] == json!("North")));

        let stats = response.field_stats.unwrap();
        assert_eq!(stats.column, "region");
        assert_eq!(stats.top_values[0].value, "North");
        assert_eq!(stats.top_values[0].count, 2);
    }

    #[tokio::test]
    async fn test_raw_rows_rejects_unknown_columns() {
        let root = sales_catalog("sales");
        let err = service(&root)
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    sort: vec!["price:asc".to_string()],
                    filters: vec!["city|Eq|Oslo".to_string()],
                    field_stats_column: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            InsightError::ValidationError(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("city"));
                assert!(errors[0].contains("price"));
                assert!(errors[0].contains("nope"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_columns_are_listed_once() {
        let root = sales_catalog("sales");
        let err = service(&root)
            .get_raw_rows(
                "sales",
                &RawRowsRequest {
                    filters: vec!["city|Eq|Oslo".to_string()],
                    sort: vec!["price:desc".to_string()],
                    field_stats_column: Some("city".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            InsightError::ValidationError(errors) => {
                assert_eq!(errors, vec!["invalid column(s): city, price".to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sample_rows_is_deterministic() {
        let root = sales_catalog("sales");
        let service = service(&root);
        let columns = vec!["sales".to_string(), "region".to_string()];

        let first = service.sample_rows("sales", &columns, &[], 3).await.unwrap();
        let second = service.sample_rows("sales", &columns, &[], 3).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert!(first[0].contains_key("region"));
        assert!(!first[0].contains_key("date"));
    }
}
