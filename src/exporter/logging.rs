use crate::contracts::{ExportBatch, ExportError, MetricExporter, ReadingValue};

/// Exporter that writes each reading to the tracing log instead of the network.
///
/// Useful when no collector is reachable (local development, headless runs).
#[derive(Debug, Default, Clone)]
pub struct LoggingExporter;

impl MetricExporter for LoggingExporter {
    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        for reading in &batch.readings {
            match &reading.value {
                ReadingValue::Sum(total) => tracing::info!(
                    instrument = %reading.instrument.name,
                    labels = ?reading.labels,
                    total = total,
                    "counter"
                ),
                ReadingValue::Gauge(value) => tracing::info!(
                    instrument = %reading.instrument.name,
                    value = value,
                    "gauge"
                ),
                ReadingValue::Histogram(h) => tracing::info!(
                    instrument = %reading.instrument.name,
                    labels = ?reading.labels,
                    count = h.count,
                    sum = h.sum,
                    "histogram"
                ),
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

/// Exporter that accepts and discards every batch.
#[derive(Debug, Default, Clone)]
pub struct NoopExporter;

impl MetricExporter for NoopExporter {
    async fn export(&self, _batch: &ExportBatch) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::LabelSet;
    use crate::metrics::MetricsRegistry;

    #[tokio::test]
    async fn test_logging_exporter_accepts_every_kind() {
        let registry = MetricsRegistry::new();
        registry
            .counter("requests_total", "Requests")
            .unwrap()
            .increment(&LabelSet::new().with("status", "200"));
        registry
            .histogram("page_load_time", "Load")
            .unwrap()
            .record(120.0, &LabelSet::new());
        registry
            .observable_gauge("app_status", "Status")
            .unwrap()
            .register_callback(|| 1.0)
            .unwrap();

        let batch = registry.collect();
        assert_eq!(batch.len(), 3);
        assert!(LoggingExporter.export(&batch).await.is_ok());
        assert!(NoopExporter.export(&batch).await.is_ok());
        assert_eq!(LoggingExporter.name(), "logging");
    }
}
