//! Metric instruments and the registry that owns them.
//!
//! All series updates use lock-free atomics inside concurrent maps, so
//! instruments can be shared freely between tasks and threads.

pub mod counter;
pub mod descriptor;
pub mod gauge;
pub mod histogram;
pub mod pipeline;
pub mod registry;

pub use counter::Counter;
pub use descriptor::InstrumentDescriptor;
pub use gauge::ObservableGauge;
pub use histogram::{Histogram, DEFAULT_BOUNDARIES};
pub use pipeline::PipelineMetrics;
pub use registry::{Instrument, MetricsRegistry};
