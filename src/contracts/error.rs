use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;

use crate::contracts::InstrumentKind;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metric kind conflict: '{name}' is registered as {existing}, requested as {requested}")]
    MetricKindConflict {
        name: String,
        existing: InstrumentKind,
        requested: InstrumentKind,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Failure to deliver one batch to the collector. Logged and dropped, never retried.
#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Collector responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Export timed out after {0:?}")]
    Timeout(Duration),
}

/// Extension trait for converting lock errors to TelemetryError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a TelemetryError.
    fn map_lock_err(self) -> Result<T, TelemetryError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, TelemetryError> {
        self.map_err(|e| TelemetryError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, TelemetryError> {
        self.map_err(|e| TelemetryError::LockPoisoned(e.to_string()))
    }
}
