//! Read statistics.
//!
//! A [`MetricsCollector`] is a cheap, cloneable handle on shared counters.
//! Hand the same collector to every worker of a partitioned read to get
//! totals for the whole dataset.
//!
//! # Example
//!
//! ```no_run
//! use shardcsv::metrics::{MetricsCollector, ROWS_READ};
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! metrics.record_start();
//! metrics.increment_counter(ROWS_READ, 10);
//! metrics.record_end();
//!
//! metrics.log_summary();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const ROWS_READ: &str = "rows_read";
pub const BYTES_READ: &str = "bytes_read";
pub const OBJECTS_OPENED: &str = "objects_opened";
pub const HEADERS_SKIPPED: &str = "headers_skipped";
pub const PARTIAL_ROWS_SKIPPED: &str = "partial_rows_skipped";
pub const CONVERSION_ERRORS: &str = "conversion_errors";

/// A metric reported next to the built-in counters.
pub trait Metric: Send + Sync + Any {
    fn name(&self) -> &str;

    /// The current value of this metric as a JSON value.
    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Thread-safe container of read metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

struct MetricsCollectorInner {
    counters: HashMap<String, u64>,
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsCollectorInner {
                counters: HashMap::new(),
                metrics: HashMap::new(),
                start_time: None,
                end_time: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsCollectorInner> {
        self.inner.lock().expect("metrics mutex poisoned")
    }

    /// Register a custom metric, replacing any metric of the same name.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    /// Record the start of a read. Only the first call counts.
    pub fn record_start(&self) {
        self.lock().start_time.get_or_insert_with(Instant::now);
    }

    /// Record the end of a read. The last call counts.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    pub fn increment_counter(&self, name: &str, value: u64) {
        *self.lock().counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    /// Current value of a counter, 0 if it was never touched.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// Get all metrics as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut metrics_json = serde_json::Map::new();

        for (name, count) in &inner.counters {
            metrics_json.insert(name.clone(), json!({ "value": count }));
        }

        for (name, metric) in &inner.metrics {
            let mut metric_obj = serde_json::Map::new();
            metric_obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                metric_obj.insert("description".to_string(), json!(desc));
            }
            metrics_json.insert(name.clone(), Value::Object(metric_obj));
        }

        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            metrics_json.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": end.saturating_duration_since(start).as_millis(),
                    "description": "Wall-clock read time in milliseconds",
                }),
            );
        }
        drop(inner);
        Value::Object(metrics_json)
    }

    /// Log every counter at `info` level.
    pub fn log_summary(&self) {
        let elapsed_ms = self.elapsed().map(|d| d.as_millis());
        let inner = self.lock();
        let mut counters: Vec<_> = inner.counters.iter().collect();
        counters.sort_by_key(|(name, _)| *name);

        tracing::info!(?elapsed_ms, "read metrics");
        for (name, value) in counters {
            tracing::info!(metric = %name, value, "read metric");
        }
        for (name, metric) in &inner.metrics {
            tracing::info!(metric = %name, value = %metric.value(), "read metric");
        }
    }

    /// Save all metrics to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows emitted by each worker of a partitioned read, in worker order.
///
/// Uneven counts point at skewed row sizes across the dataset.
pub struct WorkerRowsMetric {
    rows: Vec<u64>,
}

impl WorkerRowsMetric {
    pub const NAME: &'static str = "rows_per_worker";

    #[must_use]
    pub fn new(rows: Vec<u64>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[u64] {
        &self.rows
    }
}

impl Metric for WorkerRowsMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn value(&self) -> Value {
        json!(self.rows)
    }

    fn description(&self) -> Option<&str> {
        Some("Rows emitted by each worker")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
