use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::events::ErrorEvent;
use super::handler::ErrorInterceptor;

/// Error kind recorded for panics.
pub const PANIC_KIND: &str = "Panic";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Routes panics into the interceptor, then to the previously installed hook.
///
/// The hook is process-wide and installed at most once; returns `false` when
/// a hook from this crate is already in place.
pub fn install_panic_hook(interceptor: Arc<ErrorInterceptor>) -> bool {
    if INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::debug!("Panic hook already installed");
        return false;
    }

    let next = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        interceptor.handle_error(panic_event(info));
        next(info);
    }));
    true
}

fn panic_event(info: &PanicHookInfo<'_>) -> ErrorEvent {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default();

    let origin = match info.location() {
        Some(location) => format!("{}:{}", location.file(), location.line()),
        None => std::thread::current().name().unwrap_or("unnamed").to_string(),
    };

    ErrorEvent::new(Some(PANIC_KIND), message, origin)
}
