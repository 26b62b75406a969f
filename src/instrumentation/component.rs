//! Component lifecycle hooks as explicit begin/end spans.
//!
//! `mount()` opens a span; `render_complete()` records the render time once;
//! `unmount()` (or dropping the span) records the session duration and a
//! memory snapshot. Usable from any UI framework or headless host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::contracts::{InstrumentKind, LabelSet, TelemetryError};
use crate::metrics::{Counter, Histogram, InstrumentDescriptor, MetricsRegistry};

/// Bucket boundaries for memory snapshots in MB.
const MEMORY_BOUNDARIES: [f64; 10] = [
    16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0,
];

/// Point-in-time memory introspection.
pub trait MemoryProbe: Send + Sync {
    /// Resident memory in MB, or `None` when the runtime exposes none.
    fn resident_mb(&self) -> Option<f64>;
}

/// Reads the resident set size of the current process.
///
/// Only implemented on Linux (`VmRSS` in `/proc/self/status`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    #[cfg(target_os = "linux")]
    fn resident_mb(&self) -> Option<f64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss_mb(&status)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_mb(&self) -> Option<f64> {
        None
    }
}

/// Probe for hosts without memory introspection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn resident_mb(&self) -> Option<f64> {
        None
    }
}

/// Extracts `VmRSS` (reported in kB) from a `/proc/<pid>/status` document.
fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: f64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb / 1024.0)
}

/// Instruments for one component, named `{prefix}_render_time` and so on.
pub struct ComponentInstrumentation {
    labels: LabelSet,
    render_time: Arc<Histogram>,
    session_duration: Arc<Histogram>,
    memory_usage: Arc<Histogram>,
    visits: Arc<Counter>,
    memory: Arc<dyn MemoryProbe>,
}

impl ComponentInstrumentation {
    /// Registers (or reuses) the four instruments for a component.
    pub fn new(
        registry: &MetricsRegistry,
        prefix: &str,
        component: &str,
    ) -> Result<Self, TelemetryError> {
        let ms_histogram = |suffix: &str, description: String| {
            registry.histogram_with(
                InstrumentDescriptor::new(
                    format!("{prefix}_{suffix}"),
                    InstrumentKind::Histogram,
                    description,
                )
                .with_unit("ms"),
                &crate::metrics::DEFAULT_BOUNDARIES,
            )
        };

        Ok(Self {
            labels: LabelSet::new().with("component", component),
            render_time: ms_histogram("render_time", format!("Render time for {component}"))?,
            session_duration: ms_histogram(
                "session_duration",
                format!("Duration of user session in {component}"),
            )?,
            memory_usage: registry.histogram_with(
                InstrumentDescriptor::new(
                    format!("{prefix}_memory_usage"),
                    InstrumentKind::Histogram,
                    format!("Memory usage for {component} in MB"),
                )
                .with_unit("MB"),
                &MEMORY_BOUNDARIES,
            )?,
            visits: registry.counter(
                &format!("{prefix}_page_visit_counter"),
                &format!("Number of visits to {component}"),
            )?,
            memory: Arc::new(ProcessMemoryProbe),
        })
    }

    /// Replaces the memory probe.
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = probe;
        self
    }

    pub fn component(&self) -> &str {
        self.labels.get("component").unwrap_or_default()
    }

    /// Starts a render and session span.
    pub fn mount(self: &Arc<Self>) -> ComponentSpan {
        tracing::trace!(component = self.component(), "Component mounted");
        ComponentSpan {
            instrumentation: Arc::clone(self),
            mounted_at: Instant::now(),
            rendered: false,
            finished: false,
        }
    }

    /// Counts one visit.
    pub fn track_visit(&self) {
        self.visits.increment(&self.labels);
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn render_time(&self) -> &Arc<Histogram> {
        &self.render_time
    }

    pub fn session_duration(&self) -> &Arc<Histogram> {
        &self.session_duration
    }

    pub fn memory_usage(&self) -> &Arc<Histogram> {
        &self.memory_usage
    }

    pub fn visits(&self) -> u64 {
        self.visits.value(&self.labels)
    }
}

/// One mounted component instance.
pub struct ComponentSpan {
    instrumentation: Arc<ComponentInstrumentation>,
    mounted_at: Instant,
    rendered: bool,
    finished: bool,
}

impl ComponentSpan {
    /// Records the render time; only the first call records.
    pub fn render_complete(&mut self) -> Option<Duration> {
        if self.rendered {
            return None;
        }
        self.rendered = true;

        let elapsed = self.mounted_at.elapsed();
        let inst = &self.instrumentation;
        inst.render_time.record_duration_ms(elapsed, &inst.labels);
        Some(elapsed)
    }

    /// Ends the session; returns its duration.
    pub fn unmount(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        self.finished = true;
        let elapsed = self.mounted_at.elapsed();
        let inst = &self.instrumentation;
        inst.session_duration.record_duration_ms(elapsed, &inst.labels);

        match inst.memory.resident_mb() {
            Some(mb) => inst.memory_usage.record(mb, &inst.labels),
            None => tracing::trace!(
                component = inst.component(),
                "No memory introspection available"
            ),
        }

        tracing::trace!(
            component = inst.component(),
            session_ms = elapsed.as_millis() as u64,
            "Component unmounted"
        );
        elapsed
    }
}

impl Drop for ComponentSpan {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}
