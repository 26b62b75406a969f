//! Adapters that turn application activity into registry observations.

pub mod app;
pub mod component;
pub mod http;
pub mod vitals;

pub use app::{AppInstrumentation, DependencyChecker};
pub use component::{
    ComponentInstrumentation, ComponentSpan, MemoryProbe, NoMemoryProbe, ProcessMemoryProbe,
};
pub use http::{HttpFault, HttpInstrumentation, InstrumentedClient};
pub use vitals::{
    BufferedVitalSource, Rating, VitalCallback, VitalReport, VitalSource, WebVital,
    WebVitalsBridge,
};
