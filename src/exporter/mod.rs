mod logging;
mod otlp;
pub mod wire;

pub use logging::{LoggingExporter, NoopExporter};
pub use otlp::OtlpHttpExporter;
