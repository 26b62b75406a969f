use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use super::InstrumentDescriptor;
use crate::contracts::{LabelSet, LockResultExt, Reading, ReadingValue, TelemetryError};

type GaugeCallback = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Instrument whose value is pulled from a callback at collection time.
///
/// Values are never pushed. Registering a new callback replaces the previous one.
pub struct ObservableGauge {
    descriptor: InstrumentDescriptor,
    callback: RwLock<Option<GaugeCallback>>,
}

impl ObservableGauge {
    pub(crate) fn new(descriptor: InstrumentDescriptor) -> Self {
        Self {
            descriptor,
            callback: RwLock::new(None),
        }
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Registers the callback observed at the next collection.
    pub fn register_callback<F>(&self, callback: F) -> Result<(), TelemetryError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let mut slot = self.callback.write().map_lock_err()?;
        *slot = Some(Arc::new(callback));
        Ok(())
    }

    /// Invokes the current callback, if any.
    ///
    /// A panicking callback yields `None` for this observation.
    pub fn observe(&self) -> Option<f64> {
        // Clone out of the lock so a callback can re-register without deadlocking.
        let callback = match self.callback.read().map_lock_err() {
            Ok(slot) => slot.clone(),
            Err(e) => {
                tracing::warn!(
                    instrument = %self.descriptor.name,
                    error = %e,
                    "Gauge callback unavailable"
                );
                None
            }
        }?;
        let value = match catch_unwind(AssertUnwindSafe(|| callback())) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(instrument = %self.descriptor.name, "Gauge callback panicked");
                return None;
            }
        };
        if value.is_finite() {
            Some(value)
        } else {
            tracing::debug!(
                instrument = %self.descriptor.name,
                "Gauge callback returned a non-finite value"
            );
            None
        }
    }

    pub(crate) fn collect(&self, timestamp_ms: u64) -> Vec<Reading> {
        self.observe()
            .map(|value| {
                vec![self
                    .descriptor
                    .reading(LabelSet::new(), ReadingValue::Gauge(value), timestamp_ms)]
            })
            .unwrap_or_default()
    }
}
