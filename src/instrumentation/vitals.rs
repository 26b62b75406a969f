//! Web-vitals bridge.
//!
//! The host environment (browser shim, synthetic monitor, test) owns the
//! actual measurements and exposes them through a [`VitalSource`]. The bridge
//! subscribes once per signal and turns every report into a histogram
//! observation labelled `{name, rating}`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::contracts::{InstrumentKind, LabelSet, TelemetryError};
use crate::metrics::{Histogram, InstrumentDescriptor, MetricsRegistry};

/// Bucket boundaries for the unitless layout-shift score.
const CLS_BOUNDARIES: [f64; 8] = [0.0, 0.025, 0.05, 0.1, 0.15, 0.25, 0.5, 1.0];
/// Bucket boundaries for millisecond-valued vitals.
const TIMING_BOUNDARIES: [f64; 12] = [
    0.0, 50.0, 100.0, 200.0, 500.0, 800.0, 1000.0, 1800.0, 2500.0, 3000.0, 4000.0, 10000.0,
];

/// The five core web-vitals signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WebVital {
    /// Largest contentful paint
    Lcp,
    /// Interaction to next paint
    Inp,
    /// Cumulative layout shift
    Cls,
    /// First contentful paint
    Fcp,
    /// Time to first byte
    Ttfb,
}

impl WebVital {
    pub const ALL: [WebVital; 5] = [
        WebVital::Lcp,
        WebVital::Inp,
        WebVital::Cls,
        WebVital::Fcp,
        WebVital::Ttfb,
    ];

    /// Short signal name used in labels.
    pub fn name(&self) -> &'static str {
        match self {
            WebVital::Lcp => "LCP",
            WebVital::Inp => "INP",
            WebVital::Cls => "CLS",
            WebVital::Fcp => "FCP",
            WebVital::Ttfb => "TTFB",
        }
    }

    pub fn instrument_name(&self) -> &'static str {
        match self {
            WebVital::Lcp => "web_vitals_lcp",
            WebVital::Inp => "web_vitals_inp",
            WebVital::Cls => "web_vitals_cls",
            WebVital::Fcp => "web_vitals_fcp",
            WebVital::Ttfb => "web_vitals_ttfb",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            WebVital::Cls => "1",
            _ => "ms",
        }
    }

    /// `(good, poor)` thresholds: `<= good` is good, `> poor` is poor.
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            WebVital::Lcp => (2500.0, 4000.0),
            WebVital::Inp => (200.0, 500.0),
            WebVital::Cls => (0.1, 0.25),
            WebVital::Fcp => (1800.0, 3000.0),
            WebVital::Ttfb => (800.0, 1800.0),
        }
    }

    /// Rates a measured value against this signal's thresholds.
    pub fn rate(&self, value: f64) -> Rating {
        let (good, poor) = self.thresholds();
        if value <= good {
            Rating::Good
        } else if value <= poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }

    fn boundaries(&self) -> &'static [f64] {
        match self {
            WebVital::Cls => &CLS_BOUNDARIES,
            _ => &TIMING_BOUNDARIES,
        }
    }
}

impl fmt::Display for WebVital {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement delivered by a [`VitalSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalReport {
    pub vital: WebVital,
    pub value: f64,
    /// Rating supplied by the host; derived from thresholds when absent.
    pub rating: Option<Rating>,
}

impl VitalReport {
    pub fn new(vital: WebVital, value: f64) -> Self {
        Self {
            vital,
            value,
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn effective_rating(&self) -> Rating {
        self.rating.unwrap_or_else(|| self.vital.rate(self.value))
    }
}

pub type VitalCallback = Arc<dyn Fn(VitalReport) + Send + Sync>;

/// Something that can deliver web-vitals measurements.
pub trait VitalSource: Send + Sync {
    /// Whether this source can ever report `vital`.
    fn supports(&self, vital: WebVital) -> bool;

    /// Registers the callback for `vital`; returns `false` if unsupported.
    fn subscribe(&self, vital: WebVital, callback: VitalCallback) -> bool;
}

#[derive(Default)]
struct Slot {
    callback: Option<VitalCallback>,
    pending: Vec<VitalReport>,
}

/// Host-driven source: measurements are pushed in with [`report`](Self::report).
///
/// Reports that arrive before anyone subscribes are kept and replayed on
/// subscription, the way buffered performance observers behave.
pub struct BufferedVitalSource {
    supported: Vec<WebVital>,
    slots: DashMap<WebVital, Slot>,
}

impl Default for BufferedVitalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedVitalSource {
    /// A source supporting all five signals.
    pub fn new() -> Self {
        Self::supporting(&WebVital::ALL)
    }

    /// A source supporting only some signals (an older runtime, say).
    pub fn supporting(vitals: &[WebVital]) -> Self {
        Self {
            supported: vitals.to_vec(),
            slots: DashMap::new(),
        }
    }

    /// Delivers one measurement. Unsupported signals are dropped.
    pub fn report(&self, report: VitalReport) {
        if !self.supports(report.vital) {
            tracing::trace!(vital = %report.vital, "Dropping unsupported vital");
            return;
        }

        let callback = {
            let mut slot = self.slots.entry(report.vital).or_default();
            let callback = slot.callback.clone();
            if callback.is_none() {
                slot.pending.push(report);
            }
            callback
        };
        if let Some(callback) = callback {
            callback(report);
        }
    }
}

impl VitalSource for BufferedVitalSource {
    fn supports(&self, vital: WebVital) -> bool {
        self.supported.contains(&vital)
    }

    fn subscribe(&self, vital: WebVital, callback: VitalCallback) -> bool {
        if !self.supports(vital) {
            return false;
        }

        let pending = {
            let mut slot = self.slots.entry(vital).or_default();
            slot.callback = Some(Arc::clone(&callback));
            std::mem::take(&mut slot.pending)
        };
        for report in pending {
            callback(report);
        }
        true
    }
}

/// Records web-vitals reports into one histogram per signal.
pub struct WebVitalsBridge {
    histograms: HashMap<WebVital, Arc<Histogram>>,
    subscribed: DashMap<WebVital, ()>,
    started: AtomicBool,
}

impl WebVitalsBridge {
    /// Creates the five histograms.
    pub fn new(registry: &MetricsRegistry) -> Result<Self, TelemetryError> {
        let mut histograms = HashMap::with_capacity(WebVital::ALL.len());
        for vital in WebVital::ALL {
            let descriptor = InstrumentDescriptor::new(
                vital.instrument_name(),
                InstrumentKind::Histogram,
                format!("Web vital {} measurement", vital.name()),
            )
            .with_unit(vital.unit());
            histograms.insert(vital, registry.histogram_with(descriptor, vital.boundaries())?);
        }

        Ok(Self {
            histograms,
            subscribed: DashMap::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Subscribes once to every signal the source supports.
    ///
    /// Returns the number of new subscriptions; later calls return 0.
    pub fn start_collection<S>(self: &Arc<Self>, source: &S) -> usize
    where
        S: VitalSource + ?Sized,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Web vitals collection already started");
            return 0;
        }

        let mut count = 0;
        for vital in WebVital::ALL {
            let bridge = Arc::clone(self);
            let callback: VitalCallback = Arc::new(move |report| bridge.record(report));
            if source.subscribe(vital, callback) {
                self.subscribed.insert(vital, ());
                count += 1;
            } else {
                tracing::debug!(vital = %vital, "Web vital not supported by source");
            }
        }

        tracing::info!(subscribed = count, "Web vitals collection started");
        count
    }

    /// Records one measurement.
    pub fn record(&self, report: VitalReport) {
        let Some(histogram) = self.histograms.get(&report.vital) else {
            return;
        };
        let labels = LabelSet::new()
            .with("name", report.vital.name())
            .with("rating", report.effective_rating().as_str());
        histogram.record(report.value, &labels);
    }

    pub fn is_subscribed(&self, vital: WebVital) -> bool {
        self.subscribed.contains_key(&vital)
    }

    /// Signals without an active subscription, in canonical order.
    pub fn unsubscribed(&self) -> Vec<WebVital> {
        WebVital::ALL
            .into_iter()
            .filter(|vital| !self.is_subscribed(*vital))
            .collect()
    }

    pub fn histogram(&self, vital: WebVital) -> Option<&Arc<Histogram>> {
        self.histograms.get(&vital)
    }
}
