//! Monotonic counter with one independent total per label set.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::InstrumentDescriptor;
use crate::contracts::{LabelSet, Reading, ReadingValue};

/// Monotonically increasing instrument.
///
/// Each distinct label set is a separate series retained for the lifetime of
/// the counter, so label values must come from a bounded set of call sites.
/// Increments are lock-free once a series exists.
pub struct Counter {
    descriptor: InstrumentDescriptor,
    series: DashMap<LabelSet, AtomicU64>,
}

impl Counter {
    pub(crate) fn new(descriptor: InstrumentDescriptor) -> Self {
        Self {
            descriptor,
            series: DashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Adds `delta` to the series for `labels`.
    ///
    /// Totals saturate at `u64::MAX` instead of wrapping.
    #[inline]
    pub fn add(&self, delta: u64, labels: &LabelSet) {
        if let Some(total) = self.series.get(labels) {
            saturating_add(&total, delta);
            return;
        }
        saturating_add(&self.series.entry(labels.clone()).or_default(), delta);
    }

    /// Adds one to the series for `labels`.
    #[inline]
    pub fn increment(&self, labels: &LabelSet) {
        self.add(1, labels);
    }

    /// Current total for an exact label set (0 if the series does not exist).
    pub fn value(&self, labels: &LabelSet) -> u64 {
        self.series
            .get(labels)
            .map(|total| total.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over every series.
    pub fn total(&self) -> u64 {
        self.series
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .fold(0u64, u64::saturating_add)
    }

    /// Number of distinct label sets seen so far.
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
                    ReadingValue::Sum(entry.value().load(Ordering::Relaxed)),
                    timestamp_ms,
                )
            })
            .collect();
        readings.sort_by(|a, b| a.labels.cmp(&b.labels));
        readings
    }
}

#[inline]
fn saturating_add(total: &AtomicU64, delta: u64) {
    // fetch_update only fails when the closure returns None, which it never does
    let _ = total.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_add(delta))
    });
}
