//! Error interception: counts uncaught errors, panics and logged warnings.

pub mod events;
mod handler;
mod layer;
mod panic;

pub use events::{ErrorEvent, WarningEvent, UNKNOWN_ERROR, UNKNOWN_WARNING};
pub use handler::{ErrorInterceptor, ERROR_COUNTER, WARNING_COUNTER};
pub use layer::WarningCaptureLayer;
pub use panic::{install_panic_hook, PANIC_KIND};
