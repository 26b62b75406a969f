//! Process-wide table of named instruments.
//!
//! The registry is an explicitly constructed object shared through `Arc`.
//! Instruments are created once per name; later lookups return the same `Arc`.
//! Series updates are lock-free atomics inside each instrument, the name table
//! itself is a sharded concurrent map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::histogram::DEFAULT_BOUNDARIES;
use super::{Counter, Histogram, InstrumentDescriptor, ObservableGauge};
use crate::contracts::{current_timestamp_ms, ExportBatch, InstrumentKind, TelemetryError};

/// Handle to a registered instrument.
#[derive(Clone)]
pub enum Instrument {
    Counter(Arc<Counter>),
    Histogram(Arc<Histogram>),
    ObservableGauge(Arc<ObservableGauge>),
}

impl Instrument {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::Histogram(_) => InstrumentKind::Histogram,
            Instrument::ObservableGauge(_) => InstrumentKind::ObservableGauge,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor().name.as_str()
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        match self {
            Instrument::Counter(c) => c.descriptor(),
            Instrument::Histogram(h) => h.descriptor(),
            Instrument::ObservableGauge(g) => g.descriptor(),
        }
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Instrument::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Instrument::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<ObservableGauge>> {
        match self {
            Instrument::ObservableGauge(g) => Some(g),
            _ => None,
        }
    }

    /// True when both handles point at the same instrument.
    pub fn same_instrument(&self, other: &Instrument) -> bool {
        match (self, other) {
            (Instrument::Counter(a), Instrument::Counter(b)) => Arc::ptr_eq(a, b),
            (Instrument::Histogram(a), Instrument::Histogram(b)) => Arc::ptr_eq(a, b),
            (Instrument::ObservableGauge(a), Instrument::ObservableGauge(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn collect(&self, timestamp_ms: u64) -> Vec<crate::contracts::Reading> {
        match self {
            Instrument::Counter(c) => c.collect(timestamp_ms),
            Instrument::Histogram(h) => h.collect(timestamp_ms),
            Instrument::ObservableGauge(g) => g.collect(timestamp_ms),
        }
    }
}

struct Registered {
    /// Registration order; batches only include instruments below the tick's cutoff.
    seq: u64,
    instrument: Instrument,
}

/// Central registry for all telemetry instruments.
pub struct MetricsRegistry {
    instruments: DashMap<String, Registered>,
    next_seq: AtomicU64,
    start_ms: u64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            instruments: DashMap::new(),
            next_seq: AtomicU64::new(0),
            start_ms: current_timestamp_ms(),
        }
    }

    /// Returns the instrument registered under `name`, creating it if needed.
    ///
    /// Idempotent by `(name, kind)`. Requesting an existing name with a
    /// different kind fails with [`TelemetryError::MetricKindConflict`].
    pub fn get_or_create(
        &self,
        name: &str,
        kind: InstrumentKind,
        description: &str,
    ) -> Result<Instrument, TelemetryError> {
        self.register(
            InstrumentDescriptor::new(name, kind, description),
            &DEFAULT_BOUNDARIES,
        )
    }

    /// Registers an instrument from a full descriptor.
    ///
    /// `boundaries` only applies to histograms and only when the histogram is
    /// created by this call.
    pub fn register(
        &self,
        descriptor: InstrumentDescriptor,
        boundaries: &[f64],
    ) -> Result<Instrument, TelemetryError> {
        match self.instruments.entry(descriptor.name.clone()) {
            Entry::Occupied(entry) => {
                let existing = entry.get().instrument.kind();
                if existing != descriptor.kind {
                    return Err(TelemetryError::MetricKindConflict {
                        name: descriptor.name,
                        existing,
                        requested: descriptor.kind,
                    });
                }
                Ok(entry.get().instrument.clone())
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    instrument = %descriptor.name,
                    kind = %descriptor.kind,
                    "Registering instrument"
                );
                let instrument = match descriptor.kind {
                    InstrumentKind::Counter => {
                        Instrument::Counter(Arc::new(Counter::new(descriptor)))
                    }
                    InstrumentKind::Histogram => {
                        Instrument::Histogram(Arc::new(Histogram::new(descriptor, boundaries)))
                    }
                    InstrumentKind::ObservableGauge => {
                        Instrument::ObservableGauge(Arc::new(ObservableGauge::new(descriptor)))
                    }
                };
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                entry.insert(Registered {
                    seq,
                    instrument: instrument.clone(),
                });
                Ok(instrument)
            }
        }
    }

    /// Returns (or creates) a counter.
    pub fn counter(&self, name: &str, description: &str) -> Result<Arc<Counter>, TelemetryError> {
        let instrument = self.get_or_create(name, InstrumentKind::Counter, description)?;
        instrument
            .as_counter()
            .cloned()
            .ok_or_else(|| conflict(name, &instrument, InstrumentKind::Counter))
    }

    /// Returns (or creates) a histogram with the default boundaries.
    pub fn histogram(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<Histogram>, TelemetryError> {
        self.histogram_with(
            InstrumentDescriptor::new(name, InstrumentKind::Histogram, description),
            &DEFAULT_BOUNDARIES,
        )
    }

    /// Returns (or creates) a histogram with a unit and explicit boundaries.
    pub fn histogram_with(
        &self,
        descriptor: InstrumentDescriptor,
        boundaries: &[f64],
    ) -> Result<Arc<Histogram>, TelemetryError> {
        let name = descriptor.name.clone();
        let descriptor = InstrumentDescriptor {
            kind: InstrumentKind::Histogram,
            ..descriptor
        };
        let instrument = self.register(descriptor, boundaries)?;
        instrument
            .as_histogram()
            .cloned()
            .ok_or_else(|| conflict(&name, &instrument, InstrumentKind::Histogram))
    }

    /// Returns (or creates) an observable gauge.
    pub fn observable_gauge(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<ObservableGauge>, TelemetryError> {
        let instrument = self.get_or_create(name, InstrumentKind::ObservableGauge, description)?;
        instrument
            .as_gauge()
            .cloned()
            .ok_or_else(|| conflict(name, &instrument, InstrumentKind::ObservableGauge))
    }

    /// Looks up an instrument without creating it.
    pub fn get(&self, name: &str) -> Option<Instrument> {
        self.instruments
            .get(name)
            .map(|entry| entry.instrument.clone())
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Assembles one export batch.
    ///
    /// Only instruments registered before this call started are read; gauge
    /// callbacks run after the name table has been released, so a callback
    /// may itself use the registry.
    pub fn collect(&self) -> ExportBatch {
        let cutoff = self.next_seq.load(Ordering::SeqCst);
        let mut instruments: Vec<(u64, Instrument)> = self
            .instruments
            .iter()
            .filter(|entry| entry.seq < cutoff)
            .map(|entry| (entry.seq, entry.instrument.clone()))
            .collect();
        instruments.sort_by_key(|(seq, _)| *seq);

        let timestamp_ms = current_timestamp_ms();
        let readings = instruments
            .iter()
            .flat_map(|(_, instrument)| instrument.collect(timestamp_ms))
            .collect();

        ExportBatch {
            readings,
            start_ms: self.start_ms,
            collected_at_ms: timestamp_ms,
        }
    }
}

fn conflict(name: &str, found: &Instrument, requested: InstrumentKind) -> TelemetryError {
    TelemetryError::MetricKindConflict {
        name: name.to_string(),
        existing: found.kind(),
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{LabelSet, ReadingValue};

    #[test]
    fn test_same_name_and_kind_returns_same_instrument() {
        let registry = MetricsRegistry::new();
        let a = registry
            .get_or_create("error_count", InstrumentKind::Counter, "Errors")
            .unwrap();
        let b = registry
            .get_or_create("error_count", InstrumentKind::Counter, "Other description")
            .unwrap();

        assert!(a.same_instrument(&b));
        assert_eq!(b.descriptor().description, "Errors");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_typed_lookup_returns_same_arc() {
        let registry = MetricsRegistry::new();
        let a = registry.counter("button_click_count", "Clicks").unwrap();
        let b = registry.counter("button_click_count", "Clicks").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_kind_conflict_fails_fast() {
        let registry = MetricsRegistry::new();
        registry.counter("page_load_time", "Load").unwrap();

        let err = registry.histogram("page_load_time", "Load").unwrap_err();
        match err {
            TelemetryError::MetricKindConflict {
                name,
                existing,
                requested,
            } => {
                assert_eq!(name, "page_load_time");
                assert_eq!(existing, InstrumentKind::Counter);
                assert_eq!(requested, InstrumentKind::Histogram);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            registry.get_or_create("page_load_time", InstrumentKind::ObservableGauge, ""),
            Err(TelemetryError::MetricKindConflict { .. })
        ));
    }

    #[test]
    fn test_collect_reads_every_kind_in_registration_order() {
        let registry = MetricsRegistry::new();
        let counter = registry.counter("requests_total", "Requests").unwrap();
        let histogram = registry.histogram("render_time", "Render").unwrap();
        let gauge = registry.observable_gauge("app_status", "Status").unwrap();

        counter.add(3, &LabelSet::new());
        histogram.record(12.0, &LabelSet::new());
        gauge.register_callback(|| 1.0).unwrap();

        let batch = registry.collect();
        let names: Vec<&str> = batch
            .readings
            .iter()
            .map(|r| r.instrument.name.as_str())
            .collect();
        assert_eq!(names, vec!["requests_total", "render_time", "app_status"]);
        assert!(matches!(batch.readings[1].value, ReadingValue::Histogram(_)));
        assert_eq!(batch.gauge_value("app_status"), Some(1.0));
        assert!(batch.collected_at_ms >= batch.start_ms);
    }

    #[test]
    fn test_instrument_registered_from_gauge_callback_waits_for_next_tick() {
        let registry = Arc::new(MetricsRegistry::new());
        let gauge = registry.observable_gauge("app_status", "Status").unwrap();
        let inner = Arc::clone(&registry);
        gauge
            .register_callback(move || {
                if let Ok(late) = inner.counter("late_counter", "Registered mid-collection") {
                    late.increment(&LabelSet::new());
                }
                1.0
            })
            .unwrap();

        let first = registry.collect();
        assert_eq!(first.readings_for("late_counter").count(), 0);

        let second = registry.collect();
        assert_eq!(second.readings_for("late_counter").count(), 1);
    }

    #[test]
    fn test_empty_instruments_produce_no_readings() {
        let registry = MetricsRegistry::new();
        registry.counter("unused", "Never incremented").unwrap();
        registry.observable_gauge("no_callback", "No callback").unwrap();
        assert!(registry.collect().is_empty());
    }
}
