use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Kind of a registered instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstrumentKind {
    Counter,
    Histogram,
    ObservableGauge,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::ObservableGauge => "observable_gauge",
        };
        f.write_str(name)
    }
}

/// Process-wide identity of an instrument: `(name, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstrumentId {
    pub name: String,
    pub kind: InstrumentKind,
}

/// Key/value tags distinguishing series within one instrument.
///
/// Backed by a sorted map, so two label sets compare equal iff every key and
/// value matches regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a label, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a label.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Point-in-time state of one histogram series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// `None` when no observation has been recorded.
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Upper bounds of the explicit buckets.
    pub boundaries: Vec<f64>,
    /// Per-bucket (non-cumulative) counts; one longer than `boundaries`,
    /// the last entry being the overflow bucket.
    pub bucket_counts: Vec<u64>,
}

/// Value carried by a reading, shaped by the instrument kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReadingValue {
    /// Monotonic counter total.
    Sum(u64),
    Histogram(HistogramSnapshot),
    /// Value produced by a gauge callback at collection time.
    Gauge(f64),
}

/// Immutable snapshot of one instrument series at export time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub instrument: InstrumentId,
    pub description: String,
    pub unit: Option<String>,
    pub labels: LabelSet,
    pub value: ReadingValue,
    /// Unix time of the collection, in milliseconds.
    pub timestamp_ms: u64,
}

/// Ordered sequence of readings produced by one collection tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportBatch {
    pub readings: Vec<Reading>,
    /// Unix time the registry started accumulating, in milliseconds.
    pub start_ms: u64,
    /// Unix time the batch was assembled, in milliseconds.
    pub collected_at_ms: u64,
}

impl ExportBatch {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Returns all readings of the named instrument.
    pub fn readings_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Reading> + 'a {
        self.readings
            .iter()
            .filter(move |r| r.instrument.name == name)
    }

    /// Returns the counter total for an exact label set, if present.
    pub fn counter_value(&self, name: &str, labels: &LabelSet) -> Option<u64> {
        self.readings_for(name).find_map(|r| match &r.value {
            ReadingValue::Sum(v) if &r.labels == labels => Some(*v),
            _ => None,
        })
    }

    /// Returns the first gauge value recorded for the named instrument.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.readings_for(name).find_map(|r| match r.value {
            ReadingValue::Gauge(v) => Some(v),
            _ => None,
        })
    }
}

/// Current Unix time in milliseconds (0 if the clock is before the epoch).
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
