pub mod batch;
pub mod error;
pub mod exporter;
pub mod scheduler;

pub use batch::{
    current_timestamp_ms, ExportBatch, HistogramSnapshot, InstrumentId, InstrumentKind, LabelSet,
    Reading, ReadingValue,
};
pub use error::{ExportError, LockResultExt, TelemetryError};
pub use exporter::MetricExporter;
pub use scheduler::{CollectionScheduler, FlushOutcome, SchedulerState};
