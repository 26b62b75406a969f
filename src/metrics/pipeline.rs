use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{Histogram, InstrumentDescriptor};
use crate::contracts::{HistogramSnapshot, InstrumentKind, LabelSet};

const EXPORT_DURATION_BOUNDARIES: [f64; 10] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 5_000.0,
];

/// Metrics describing the export pipeline itself.
///
/// Kept outside the registry so the pipeline never exports (or recurses into)
/// its own bookkeeping.
pub struct PipelineMetrics {
    /// Timer ticks that fired
    pub ticks_total: AtomicU64,
    /// Ticks skipped because an export was still in flight
    pub ticks_skipped_total: AtomicU64,
    /// Batches handed to the exporter
    pub exports_total: AtomicU64,
    /// Batches the exporter failed to deliver
    pub export_failures_total: AtomicU64,
    /// Readings delivered successfully
    pub readings_exported_total: AtomicU64,
    /// Histogram of export durations in milliseconds
    pub export_duration_ms: Histogram,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_skipped_total: AtomicU64::new(0),
            exports_total: AtomicU64::new(0),
            export_failures_total: AtomicU64::new(0),
            readings_exported_total: AtomicU64::new(0),
            export_duration_ms: Histogram::new(
                InstrumentDescriptor::new(
                    "pipeline_export_duration",
                    InstrumentKind::Histogram,
                    "Duration of metric exports",
                )
                .with_unit("ms"),
                &EXPORT_DURATION_BOUNDARIES,
            ),
        }
    }
}

impl PipelineMetrics {
    #[inline]
    pub fn record_tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped_tick(&self) {
        self.ticks_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the result of one export call.
    pub fn record_export(&self, readings: usize, duration: Duration, succeeded: bool) {
        self.exports_total.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.readings_exported_total
                .fetch_add(readings as u64, Ordering::Relaxed);
        } else {
            self.export_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.export_duration_ms
            .record_duration_ms(duration, &LabelSet::new());
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped_total.load(Ordering::Relaxed)
    }

    pub fn exports(&self) -> u64 {
        self.exports_total.load(Ordering::Relaxed)
    }

    pub fn export_failures(&self) -> u64 {
        self.export_failures_total.load(Ordering::Relaxed)
    }

    pub fn readings_exported(&self) -> u64 {
        self.readings_exported_total.load(Ordering::Relaxed)
    }

    pub fn export_duration(&self) -> Option<HistogramSnapshot> {
        self.export_duration_ms.snapshot(&LabelSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_export_splits_success_and_failure() {
        let m = PipelineMetrics::default();
        m.record_export(4, Duration::from_millis(3), true);
        m.record_export(9, Duration::from_millis(30), false);

        assert_eq!(m.exports(), 2);
        assert_eq!(m.export_failures(), 1);
        assert_eq!(m.readings_exported(), 4);
        assert_eq!(m.export_duration().unwrap().count, 2);
    }
}
