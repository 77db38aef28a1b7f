/*!
# InsightEngine - Chart Query Compilation & Execution

Turns a declarative chart recommendation plus optional runtime overrides into
a deterministic, injection-safe DuckDB query over an uploaded CSV, executes it,
post-processes the result and caches the response by fingerprint.

## Example

```rust,ignore
use insight_engine::catalog::FsCatalog;
use insight_engine::config::Settings;
use insight_engine::service::{ChartRequest, ChartService};

let service = ChartService::new(FsCatalog::new("/var/lib/insight"), Settings::default());

let request = ChartRequest {
    group_by: Some("region".to_string()),
    filters: vec!["region|Eq|North".to_string()],
    ..Default::default()
};
let response = service.resolve_and_execute("sales_2024", "rec_001", &request).await?;
println!("{}", response.query_hash);
```

## Architecture

- [`chart`] - chart specification types, the filter language and override resolution
- [`sql`] - SQL generation (escaping, predicates, chart/raw-row/stat queries)
- [`execute`] - DuckDB sessions with timeouts, and chart option rendering
- [`percentile`] - percentile overlays on executed charts
- [`field_stats`] - per-column statistics for the raw-row explorer
- [`cache`] - query fingerprints and the TTL result cache
- [`service`] - the request-level entry points tying it all together
*/

pub mod cache;
pub mod catalog;
pub mod chart;
pub mod config;
pub mod execute;
pub mod field_stats;
pub mod naming;
pub mod percentile;
pub mod schema;
pub mod service;
pub mod sql;

// Re-export key types for convenience
pub use chart::{
    Aggregation, ChartFilter, ChartQuery, ChartRecommendation, FieldSpec, FilterOperator,
    LogicalOperator, Role, TimeBin,
};
pub use config::Settings;
pub use schema::{ColumnProfile, DatasetSchema, InferredType};
pub use service::{ChartExecutionResponse, ChartRequest, ChartService, RawRowsRequest};

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum InsightError {
    #[error("Validation error: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query execution error: {message}")]
    ExecutionError {
        message: String,
        /// The SQL that failed, for non-production diagnostics
        sql: Option<String>,
    },

    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl InsightError {
    /// Shorthand for a validation failure with a single message
    pub fn invalid(message: impl Into<String>) -> Self {
        InsightError::ValidationError(vec![message.into()])
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
