use std::future::Future;

use crate::contracts::error::ExportError;
use crate::contracts::ExportBatch;

/// Sink that ships one export batch to a remote collector.
///
/// # Behavior
/// - One call per collection tick, never overlapping (the scheduler serializes calls)
/// - Failures are returned, not retried; the caller logs and drops the batch
/// - Nothing is buffered across calls
pub trait MetricExporter: Send + Sync {
    /// Serializes and delivers a batch.
    fn export(&self, batch: &ExportBatch) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Short identifier used in log lines (e.g., "otlp-http").
    fn name(&self) -> &'static str;
}
