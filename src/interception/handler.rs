//! Process-wide error and warning handler.
//!
//! The handler is the last line of defense: it is called from panic hooks,
//! from logging layers and from failed API calls, so it never panics, never
//! returns an error and never re-enters itself on the same thread.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::events::{label_value, ErrorEvent, WarningEvent};
use super::layer::WarningCaptureLayer;
use crate::contracts::{LabelSet, TelemetryError};
use crate::metrics::{Counter, MetricsRegistry};

pub const ERROR_COUNTER: &str = "error_count";
pub const WARNING_COUNTER: &str = "warning_count";

thread_local! {
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the handler for its lifetime.
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        IN_HANDLER.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentryGuard)
            }
        })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_HANDLER.with(|flag| flag.set(false));
    }
}

/// True while the current thread is running an interception handler.
pub(crate) fn in_handler() -> bool {
    IN_HANDLER.with(Cell::get)
}

/// Converts uncaught errors and warnings into counted events.
pub struct ErrorInterceptor {
    error_counter: Arc<Counter>,
    warning_counter: Arc<Counter>,
    warning_layer_installed: AtomicBool,
}

impl ErrorInterceptor {
    /// Creates the handler and its two counters.
    ///
    /// Fails only if the counter names are already taken by another kind.
    pub fn new(registry: &MetricsRegistry) -> Result<Self, TelemetryError> {
        Ok(Self {
            error_counter: registry.counter(ERROR_COUNTER, "Number of errors in the application")?,
            warning_counter: registry
                .counter(WARNING_COUNTER, "Number of warnings in the application")?,
            warning_layer_installed: AtomicBool::new(false),
        })
    }

    /// Counts an error labelled `{error: kind}` and logs it.
    pub fn handle_error(&self, event: ErrorEvent) {
        let Some(_guard) = ReentryGuard::enter() else {
            tracing::debug!(kind = %event.kind, "Nested error ignored inside handler");
            return;
        };

        let labels = LabelSet::new().with("error", label_value(&event.kind));
        if catch_unwind(AssertUnwindSafe(|| self.error_counter.increment(&labels))).is_err() {
            tracing::debug!(kind = %event.kind, "Failed to count error");
        }

        tracing::error!(
            kind = %event.kind,
            origin = %event.origin,
            message = %event.message,
            "An error occurred"
        );
    }

    /// Counts a warning labelled `{warning: message}`.
    ///
    /// The developer-visible output is left to the logging pipeline, so this
    /// only logs at `debug`.
    pub fn handle_warning(&self, event: WarningEvent) {
        let Some(_guard) = ReentryGuard::enter() else {
            return;
        };

        let labels = LabelSet::new().with("warning", label_value(&event.message));
        if catch_unwind(AssertUnwindSafe(|| self.warning_counter.increment(&labels))).is_err() {
            tracing::debug!(message = %event.message, "Failed to count warning");
            return;
        }

        tracing::debug!(
            origin = %event.origin,
            message = %event.message,
            "Warning detected"
        );
    }

    /// Returns the warning-capture layer the first time it is called, `None` afterwards.
    ///
    /// `Option<Layer>` is itself a layer, so the result can always be composed
    /// into a subscriber; a second installation simply adds nothing.
    pub fn warning_layer(self: &Arc<Self>) -> Option<WarningCaptureLayer> {
        if self
            .warning_layer_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(WarningCaptureLayer::new(Arc::clone(self)))
        } else {
            tracing::debug!("Warning capture layer already installed");
            None
        }
    }

    /// Errors counted for one kind.
    pub fn error_count(&self, kind: &str) -> u64 {
        self.error_counter
            .value(&LabelSet::new().with("error", label_value(kind)))
    }

    /// Warnings counted for one message.
    pub fn warning_count(&self, message: &str) -> u64 {
        self.warning_counter
            .value(&LabelSet::new().with("warning", label_value(message)))
    }

    pub fn errors_total(&self) -> u64 {
        self.error_counter.total()
    }

    pub fn warnings_total(&self) -> u64 {
        self.warning_counter.total()
    }
}
