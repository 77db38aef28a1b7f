/*!
InsightEngine REST API Server

Exposes chart execution and the raw-row explorer over HTTP for datasets in a
catalog directory.

## Usage

```bash
insight-rest --root /var/lib/insight --host 127.0.0.1 --port 3334
```

## Endpoints

- `POST /api/v1/datasets/:dataset/charts/:recommendation/execute` - Resolve and execute a chart
- `POST /api/v1/datasets/:dataset/rows` - Page through raw rows, with optional field statistics
- `POST /api/v1/datasets/:dataset/sample` - Deterministic row sample
- `GET /api/v1/health` - Health check
- `GET /api/v1/version` - Version information
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use insight_engine::catalog::FsCatalog;
use insight_engine::service::{ChartExecutionResponse, RawRowsResponse};
use insight_engine::{
    ChartRequest, ChartService, InsightError, RawRowsRequest, Settings, VERSION,
};

/// CLI arguments for the REST API server
#[derive(Parser)]
#[command(name = "insight-rest")]
#[command(about = "InsightEngine REST API Server")]
#[command(version = VERSION)]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind to
    #[arg(long, default_value = "3334")]
    port: u16,

    /// CORS allowed origins (comma-separated)
    #[arg(long, default_value = "*")]
    cors_origin: String,

    /// Catalog root: <root>/<dataset>/{data.csv,schema.json,recommendations.json}
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<ChartService>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the sample endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SampleRequest {
    columns: Vec<String>,
    filters: Vec<String>,
    cap: Option<usize>,
}

const DEFAULT_SAMPLE_CAP: usize = 200;

/// Successful API response
#[derive(Debug, Serialize)]
struct ApiSuccess<T> {
    status: String,
    data: T,
}

impl<T> ApiSuccess<T> {
    fn new(data: T) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            data,
        })
    }
}

/// Error API response
#[derive(Debug, Serialize)]
struct ApiError {
    status: String,
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    /// Every validation message, for validation errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
    /// Failing SQL, only when generated SQL is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Version response
#[derive(Debug, Serialize)]
struct VersionResponse {
    version: String,
    features: Vec<String>,
}

// ============================================================================
// Error Handling
// ============================================================================

/// Custom error type for API responses
struct ApiErrorResponse {
    status: StatusCode,
    error: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let json = Json(self.error);
        (self.status, json).into_response()
    }
}

impl ApiErrorResponse {
    fn new(err: InsightError, include_sql: bool) -> Self {
        let (status, error_type) = match &err {
            InsightError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            InsightError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            InsightError::ExecutionError { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ExecutionError")
            }
            InsightError::Timeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Timeout"),
            InsightError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let message = err.to_string();
        let (details, sql) = match err {
            InsightError::ValidationError(errors) => (errors, None),
            InsightError::ExecutionError { sql, .. } if include_sql => (Vec::new(), sql),
            _ => (Vec::new(), None),
        };

        ApiErrorResponse {
            status,
            error: ApiError {
                status: "error".to_string(),
                error: ErrorDetails {
                    message,
                    error_type: error_type.to_string(),
                    details,
                    sql,
                },
            },
        }
    }
}

impl AppState {
    fn error(&self, err: InsightError) -> ApiErrorResponse {
        ApiErrorResponse::new(err, self.service.settings().include_generated_sql)
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

/// POST /api/v1/datasets/:dataset/charts/:recommendation/execute
async fn execute_handler(
    State(state): State<AppState>,
    Path((dataset_id, recommendation_id)): Path<(String, String)>,
    Json(request): Json<ChartRequest>,
) -> Result<Json<ApiSuccess<ChartExecutionResponse>>, ApiErrorResponse> {
    info!(
        dataset = %dataset_id,
        recommendation = %recommendation_id,
        filters = request.filters.len(),
        "Executing chart"
    );
    let response = state
        .service
        .resolve_and_execute(&dataset_id, &recommendation_id, &request)
        .await
        .map_err(|e| state.error(e))?;
    Ok(ApiSuccess::new(response))
}

/// POST /api/v1/datasets/:dataset/rows
async fn rows_handler(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
    Json(request): Json<RawRowsRequest>,
) -> Result<Json<ApiSuccess<RawRowsResponse>>, ApiErrorResponse> {
    let response = state
        .service
        .get_raw_rows(&dataset_id, &request)
        .await
        .map_err(|e| state.error(e))?;
    Ok(ApiSuccess::new(response))
}

/// POST /api/v1/datasets/:dataset/sample
async fn sample_handler(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
    Json(request): Json<SampleRequest>,
) -> Result<Json<ApiSuccess<Vec<serde_json::Map<String, serde_json::Value>>>>, ApiErrorResponse> {
    let rows = state
        .service
        .sample_rows(
            &dataset_id,
            &request.columns,
            &request.filters,
            request.cap.unwrap_or(DEFAULT_SAMPLE_CAP),
        )
        .await
        .map_err(|e| state.error(e))?;
    Ok(ApiSuccess::new(rows))
}

/// GET /api/v1/health - Health check
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
    })
}

/// GET /api/v1/version - Version information
async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION.to_string(),
        features: vec!["duckdb".to_string(), "echarts".to_string()],
    })
}

/// Root handler
async fn root_handler() -> &'static str {
    "InsightEngine REST API Server - See /api/v1/health for status"
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route(
            "/api/v1/datasets/:dataset/charts/:recommendation/execute",
            post(execute_handler),
        )
        .route("/api/v1/datasets/:dataset/rows", post(rows_handler))
        .route("/api/v1/datasets/:dataset/sample", post(sample_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/version", get(version_handler))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insight_rest=info,insight_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    info!(root = %cli.root.display(), "Serving datasets");

    let service = Arc::new(ChartService::new(FsCatalog::new(&cli.root), settings));

    // Periodically drop expired chart results
    let cache = Arc::clone(service.cache());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cache.ttl());
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired chart results");
            }
        }
    });

    // Configure CORS
    let cors = if cli.cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    } else {
        let origins: Vec<_> = cli
            .cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    };

    let app = router(AppState { service })
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

    info!("Starting InsightEngine REST API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn fixture() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("sales");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("data.csv"),
            "date,sales,region\n2024-01-01,100,North\n2024-01-01,50,South\n2024-01-02,80,North\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("schema.json"),
            r#"{"datasetId": "sales", "columns": [
                {"name": "date", "inferredType": "Date", "distinctCount": 2, "sampleSize": 3},
                {"name": "sales", "inferredType": "Number", "distinctCount": 3, "sampleSize": 3},
                {"name": "region", "inferredType": "Category", "distinctCount": 2, "sampleSize": 3}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("recommendations.json"),
            r#"[{"id": "rec_001", "title": "Sales", "chart": {"library": "echarts", "type": "Bar"},
                "query": {"x": {"column": "date", "role": "Time", "bin": "Day"},
                          "y": {"column": "sales", "role": "Measure", "aggregation": "Sum"}}}]"#,
        )
        .unwrap();
        root
    }

    fn create_test_app(root: &tempfile::TempDir) -> Router {
        let service = ChartService::new(FsCatalog::new(root.path()), Settings::default());
        router(AppState {
            service: Arc::new(service),
        })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_execute_endpoint() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(post_json(
                "/api/v1/datasets/sales/charts/rec_001/execute",
                r#"{"groupBy": "region", "filters": ["region|Eq|North"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["cacheHit"], false);
        assert_eq!(json["data"]["executionResult"]["option"]["series"][0]["name"], "North");
        assert_eq!(json["data"]["queryHash"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_validation_error_is_bad_request() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(post_json(
                "/api/v1/datasets/sales/charts/rec_001/execute",
                r#"{"groupBy": "country", "filters": ["sales|Between|1"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "ValidationError");
        assert!(json["error"]["details"].is_array());
    }

    #[tokio::test]
    async fn test_unknown_recommendation_is_not_found() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(post_json(
                "/api/v1/datasets/sales/charts/rec_999/execute",
                "{}",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rows_endpoint() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(post_json(
                "/api/v1/datasets/sales/rows",
                r#"{"pageSize": 2, "sort": ["sales:desc"], "fieldStatsColumn": "region"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["rowCountTotal"], 3);
        assert_eq!(json["data"]["rows"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"]["rows"][0]["sales"], "100");
        assert_eq!(json["data"]["fieldStats"]["topValues"][0]["value"], "North");
    }

    #[tokio::test]
    async fn test_sample_endpoint() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(post_json(
                "/api/v1/datasets/sales/sample",
                r#"{"columns": ["region"], "cap": 2}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let root = fixture();
        let response = create_test_app(&root)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["version"].is_string());
    }

    #[test]
    fn test_execution_error_hides_sql_by_default() {
        let error = ApiErrorResponse::new(
            InsightError::ExecutionError {
                message: "Binder Error".to_string(),
                sql: Some("SELECT 1".to_string()),
            },
            false,
        );
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.error.error.sql.is_none());

        let verbose = ApiErrorResponse::new(
            InsightError::ExecutionError {
                message: "Binder Error".to_string(),
                sql: Some("SELECT 1".to_string()),
            },
            true,
        );
        assert_eq!(verbose.error.error.sql.as_deref(), Some("SELECT 1"));
    }
}
