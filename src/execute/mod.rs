//! Query execution against an embedded DuckDB engine
//!
//! Every request opens its own in-memory connection, registers the dataset
//! view over the CSV and runs its queries on the blocking pool under a
//! timeout. Nothing is pooled or shared between requests.

pub mod render;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duckdb::types::ValueRef;
use duckdb::{Connection, InterruptHandle};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::naming;
use crate::sql::{quote_ident, quote_literal};
use crate::{InsightError, Result};

pub use render::{render_option, series_label};

/// Value produced by an engine job, with the time spent in the engine
#[derive(Debug, Clone)]
pub struct Timed<T> {
    pub value: T,
    pub duckdb_ms: u64,
}

/// Runs engine jobs on the blocking pool with a timeout
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.max(Duration::from_secs(1)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.query_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a session over `source` and run `job` in it.
    ///
    /// If the timeout expires, or the returned future is dropped first, the
    /// running engine query is interrupted and the session refuses further
    /// queries. A timeout yields [`InsightError::Timeout`].
    pub async fn run<T, F>(&self, source: PathBuf, job: F) -> Result<Timed<T>>
    where
        T: Send + 'static,
        F: FnOnce(&EngineSession) -> Result<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel::<Interrupter>();
        let mut guard = InterruptOnDrop::new(receiver);

        let handle = tokio::task::spawn_blocking(move || -> Result<Timed<T>> {
            let started = Instant::now();
            let session = EngineSession::open(&source)?;
            if sender.send(session.interrupter()).is_err() {
                // Caller already gone
                return Err(interrupted_error(None));
            }
            let value = job(&session)?;
            Ok(Timed {
                value,
                duckdb_ms: started.elapsed().as_millis() as u64,
            })
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(join_error)) => {
                guard.disarm();
                Err(InsightError::InternalError(format!(
                    "engine task failed: {}",
                    join_error
                )))
            }
            Err(_) => {
                warn!(timeout_s = self.timeout.as_secs(), "Query timed out, interrupting");
                guard.interrupt();
                Err(InsightError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

/// Interrupts a session from outside its blocking thread
pub struct Interrupter {
    handle: Arc<InterruptHandle>,
    interrupted: Arc<AtomicBool>,
}

impl Interrupter {
    /// Abort the running query and fail every later one
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.handle.interrupt();
    }
}

/// Interrupts the session of an in-flight job unless disarmed
struct InterruptOnDrop {
    receiver: oneshot::Receiver<Interrupter>,
    armed: bool,
}

impl InterruptOnDrop {
    fn new(receiver: oneshot::Receiver<Interrupter>) -> Self {
        Self {
            receiver,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn interrupt(&mut self) {
        self.armed = false;
        // A job that has not sent its interrupter yet sees the closed channel and bails out
        self.receiver.close();
        if let Ok(interrupter) = self.receiver.try_recv() {
            interrupter.interrupt();
        }
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("Engine job abandoned, interrupting");
            self.interrupt();
        }
    }
}

fn interrupted_error(sql: Option<&str>) -> InsightError {
    InsightError::ExecutionError {
        message: "query interrupted".to_string(),
        sql: sql.map(str::to_string),
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// One DuckDB connection with the dataset view registered
pub struct EngineSession {
    conn: Connection,
    interrupted: Arc<AtomicBool>,
}

impl EngineSession {
    /// Open an in-memory connection and register the dataset view over `source`
    pub fn open(source: &Path) -> Result<Self> {
        if !source.is_file() {
            return Err(InsightError::NotFound(format!(
                "dataset file '{}'",
                source.display()
            )));
        }

        let conn = Connection::open_in_memory().map_err(|e| InsightError::ExecutionError {
            message: format!("failed to open engine: {}", e),
            sql: None,
        })?;

        let create_view = format!(
            "CREATE VIEW {} AS SELECT *, ROW_NUMBER() OVER () AS {} FROM read_csv({}, header = true, all_varchar = true)",
            quote_ident(naming::DATASET_VIEW),
            quote_ident(naming::ROW_NUMBER_COLUMN),
            quote_literal(&source.to_string_lossy())
        );
        conn.execute_batch(&create_view)
            .map_err(|e| engine_error(&create_view, e))?;

        Ok(Self {
            conn,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle for interrupting this session from another thread
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            handle: self.conn.interrupt_handle(),
            interrupted: Arc::clone(&self.interrupted),
        }
    }

    /// Run a query and materialize the first `width` columns of every row
    pub fn fetch(&self, sql: &str, width: usize) -> Result<Vec<Vec<Value>>> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(interrupted_error(Some(sql)));
        }
        debug!(sql = %sql, "Executing query");
        let mut stmt = self.conn.prepare(sql).map_err(|e| engine_error(sql, e))?;
        let mut rows = stmt.query([]).map_err(|e| engine_error(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| engine_error(sql, e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| engine_error(sql, e))?;
                values.push(value_to_json(value));
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Run a query and return its single integer (e.g. a `COUNT(*)`)
    pub fn fetch_one_i64(&self, sql: &str) -> Result<i64> {
        let rows = self.fetch(sql, 1)?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(value_as_i64)
            .ok_or_else(|| InsightError::ExecutionError {
                message: "expected a single integer result".to_string(),
                sql: Some(sql.to_string()),
            })
    }
}

fn engine_error(sql: &str, e: duckdb::Error) -> InsightError {
    InsightError::ExecutionError {
        message: e.to_string(),
        sql: Some(sql.to_string()),
    }
}

/// Convert a DuckDB value to JSON. Non-finite floats become null.
pub fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(i.to_string()),
        },
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::Float(f) => float_to_json(f as f64),
        ValueRef::Double(f) => float_to_json(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        other => Value::String(format!("{:?}", other)),
    }
}

fn float_to_json(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Numeric view of a JSON cell
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

/// Integer view of a JSON cell
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
