pub mod config;
pub mod context;
pub mod contracts;
pub mod exporter;
pub mod instrumentation;
pub mod interception;
pub mod metrics;
pub mod scheduler;

pub use config::TelemetryConfig;
pub use context::Telemetry;
