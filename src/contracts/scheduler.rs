use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::contracts::error::TelemetryError;

/// Lifecycle of a collection scheduler: `Idle → Running → Stopped`.
///
/// `Stopped → Running` is allowed; a restarted scheduler resumes exporting
/// the same instrument set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Periodic driver that moves readings from the registry to an exporter.
///
/// # Behavior
/// - Each tick enumerates the registry, pulls gauge callbacks, and exports one batch
/// - Ticks never overlap; a tick that finds an export in flight is skipped
/// - `stop` cancels the timer without waiting for an in-flight export
pub trait CollectionScheduler: Send + Sync {
    /// Starts the periodic timer. Starting a running scheduler is a no-op.
    fn start(
        &self,
        interval: Duration,
    ) -> impl Future<Output = Result<(), TelemetryError>> + Send;

    /// Cancels the timer. Stopping twice is a no-op.
    fn stop(&self) -> impl Future<Output = Result<(), TelemetryError>> + Send;

    /// Runs one export cycle outside the timer cadence.
    ///
    /// Never fails: the outcome reports whether the batch reached the collector.
    fn flush_now(&self) -> impl Future<Output = FlushOutcome> + Send;

    /// Current lifecycle state.
    fn state(&self) -> SchedulerState;
}

/// Completion signal of a manual flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The batch reached the collector.
    Exported { readings: usize },
    /// There was nothing to send.
    Empty,
    /// The exporter reported a failure; the batch was dropped.
    Failed { reason: String },
    /// The flush did not complete within its time bound.
    TimedOut,
}

impl FlushOutcome {
    /// True when no data was lost by this flush.
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Exported { .. } | FlushOutcome::Empty)
    }
}

impl fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushOutcome::Exported { readings } => write!(f, "exported {} readings", readings),
            FlushOutcome::Empty => f.write_str("nothing to export"),
            FlushOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            FlushOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}
