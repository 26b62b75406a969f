//! Thread-safe explicit-bucket histogram.
//!
//! Each label set owns a series of lock-free atomics: an `f64` sum, min/max,
//! and one counter per bucket. The count is the bucket total. Buckets use
//! inclusive upper bounds and are kept non-cumulative, which is the shape the OTLP wire format expects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use super::InstrumentDescriptor;
use crate::contracts::{HistogramSnapshot, LabelSet, Reading, ReadingValue};

/// Default bucket boundaries (OTLP SDK defaults, milliseconds-oriented).
pub const DEFAULT_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1_000.0, 2_500.0, 5_000.0,
    7_500.0, 10_000.0,
];

/// One histogram series.
#[derive(Debug)]
struct HistogramSeries {
    sum_bits: AtomicU64,
    min_bits: AtomicU64,
    max_bits: AtomicU64,
    /// `boundaries.len() + 1` slots; the last one is the overflow bucket.
    buckets: Box<[AtomicU64]>,
}

impl HistogramSeries {
    fn new(bucket_slots: usize) -> Self {
        Self {
            sum_bits: AtomicU64::new(0f64.to_bits()),
            min_bits: AtomicU64::new(f64::INFINITY.to_bits()),
            max_bits: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
            buckets: (0..bucket_slots).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Sum and min/max are published before the bucket, so any observation a
    /// snapshot counts is already reflected in them.
    #[inline]
    fn observe(&self, bucket: usize, value: f64) {
        update_f64(&self.sum_bits, |sum| sum + value);
        update_f64(&self.min_bits, |min| min.min(value));
        update_f64(&self.max_bits, |max| max.max(value));
        self.buckets[bucket].fetch_add(1, Ordering::Release);
    }

    fn count(&self) -> u64 {
        self.buckets.iter().map(|b| b.load(Ordering::Acquire)).sum()
    }

    fn snapshot(&self, boundaries: &[f64]) -> HistogramSnapshot {
        let bucket_counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.load(Ordering::Acquire))
            .collect();
        let count = bucket_counts.iter().sum();
        let (min, max) = if count == 0 {
            (None, None)
        } else {
            (
                Some(f64::from_bits(self.min_bits.load(Ordering::Relaxed))),
                Some(f64::from_bits(self.max_bits.load(Ordering::Relaxed))),
            )
        };

        HistogramSnapshot {
            count,
            sum: f64::from_bits(self.sum_bits.load(Ordering::Relaxed)),
            min,
            max,
            boundaries: boundaries.to_vec(),
            bucket_counts,
        }
    }
}

/// Compare-and-swap loop applying `f` to an `f64` stored as bits.
#[inline]
fn update_f64(cell: &AtomicU64, f: impl Fn(f64) -> f64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = f(f64::from_bits(current)).to_bits();
        if next == current {
            return;
        }
        match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

/// Distribution-recording instrument.
#[derive(Debug)]
pub struct Histogram {
    descriptor: InstrumentDescriptor,
    boundaries: Vec<f64>,
    series: DashMap<LabelSet, HistogramSeries>,
}

impl Histogram {
    /// Creates a histogram; boundaries are sorted, de-duplicated and stripped
    /// of non-finite values.
    pub(crate) fn new(descriptor: InstrumentDescriptor, boundaries: &[f64]) -> Self {
        let mut boundaries: Vec<f64> =
            boundaries.iter().copied().filter(|b| b.is_finite()).collect();
        boundaries.sort_by(|a, b| a.total_cmp(b));
        boundaries.dedup();

        Self {
            descriptor,
            boundaries,
            series: DashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Records one observation. Non-finite values are dropped.
    #[inline]
    pub fn record(&self, value: f64, labels: &LabelSet) {
        if !value.is_finite() {
            tracing::debug!(
                instrument = %self.descriptor.name,
                value = value,
                "Dropping non-finite histogram observation"
            );
            return;
        }

        let bucket = self.boundaries.partition_point(|&bound| bound < value);
        if let Some(series) = self.series.get(labels) {
            series.observe(bucket, value);
            return;
        }
        let slots = self.boundaries.len() + 1;
        self.series
            .entry(labels.clone())
            .or_insert_with(|| HistogramSeries::new(slots))
            .observe(bucket, value);
    }

    /// Records a duration in milliseconds.
    #[inline]
    pub fn record_duration_ms(&self, duration: Duration, labels: &LabelSet) {
        self.record(duration.as_secs_f64() * 1_000.0, labels);
    }

    /// Records a duration in seconds.
    #[inline]
    pub fn record_duration_secs(&self, duration: Duration, labels: &LabelSet) {
        self.record(duration.as_secs_f64(), labels);
    }

    /// Returns a snapshot of one series, if it exists.
    pub fn snapshot(&self, labels: &LabelSet) -> Option<HistogramSnapshot> {
        self.series
            .get(labels)
            .map(|series| series.snapshot(&self.boundaries))
    }

    /// Observations recorded for an exact label set.
    pub fn count(&self, labels: &LabelSet) -> u64 {
        self.series
            .get(labels)
            .map(|series| series.count())
            .unwrap_or(0)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub(crate) fn collect(&self, timestamp_ms: u64) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self
            .series
            .iter()
            .map(|entry| {
                self.descriptor.reading(
                    entry.key().clone(),
                    ReadingValue::Histogram(entry.value().snapshot(&self.boundaries)),
                    timestamp_ms,
                )
            })
            .collect();
        readings.sort_by(|a, b| a.labels.cmp(&b.labels));
        readings
    }
}
