//! Partitioned reads on the rayon thread pool.
//!
//! Every worker is an independent [`CsvInput`] configured alike and told its
//! index; the partition plan does the rest. Rows are returned per worker, in
//! worker order, so concatenating them gives the dataset in stream order.

use crate::config::CsvInputConfig;
use crate::error::Result;
use crate::input::CsvInput;
use crate::metrics::{MetricsCollector, WorkerRowsMetric};
use crate::row::Row;
use crate::storage::ObjectStore;
use rayon::prelude::*;
use std::sync::Arc;

/// Read the configured objects with `workers` parallel workers.
///
/// * `workers`: optional worker count. If `None`, defaults to `num_cpus()`.
///
/// # Errors
///
/// Returns the first error raised by any worker.
///
/// # Feature
/// Requires the `parallel-io` feature.
pub fn read_partitioned(
    config: &CsvInputConfig,
    store: Arc<dyn ObjectStore>,
    workers: Option<usize>,
) -> Result<Vec<Vec<Row>>> {
    read_partitioned_with_metrics(config, store, workers, None)
}

/// Like [`read_partitioned`], with every worker reporting to `metrics`.
///
/// # Errors
///
/// Returns the first error raised by any worker.
pub fn read_partitioned_with_metrics(
    config: &CsvInputConfig,
    store: Arc<dyn ObjectStore>,
    workers: Option<usize>,
    metrics: Option<MetricsCollector>,
) -> Result<Vec<Vec<Row>>> {
    config.validate()?;
    let worker_count = workers.unwrap_or_else(num_cpus::get).max(1);
    let config = CsvInputConfig {
        running_in_parallel: true,
        ..config.clone()
    };

    tracing::info!(workers = worker_count, objects = config.filenames.len(), "starting partitioned read");

    let mut results: Vec<(usize, Vec<Row>)> = (0..worker_count)
        .into_par_iter()
        .map(|worker| {
            let mut input = CsvInput::new(config.clone(), Arc::clone(&store))?.with_worker(worker, worker_count);
            if let Some(metrics) = &metrics {
                input = input.with_metrics(metrics.clone());
            }
            let rows = input.rows().collect::<Result<Vec<_>>>()?;
            Ok((worker, rows))
        })
        .collect::<Result<Vec<_>>>()?;

    results.sort_by_key(|(worker, _)| *worker);
    if let Some(metrics) = &metrics {
        let rows = results.iter().map(|(_, rows)| rows.len() as u64).collect();
        metrics.register(Box::new(WorkerRowsMetric::new(rows)));
    }
    Ok(results.into_iter().map(|(_, rows)| rows).collect())
}
