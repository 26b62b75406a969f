use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::events::WarningEvent;
use super::handler::{in_handler, ErrorInterceptor};

/// Targets whose warnings are never counted: the export pipeline logs its own
/// failures at WARN and counting those would feed the pipeline back into itself.
const IGNORED_TARGETS: &[&str] = &[
    "metrics_web::scheduler",
    "metrics_web::exporter",
    "metrics_web::interception::handler",
];

/// Tracing layer that counts every WARN event as an application warning.
///
/// The layer only observes; other layers in the same subscriber (the fmt
/// layer, for instance) still receive and print the event.
pub struct WarningCaptureLayer {
    interceptor: Arc<ErrorInterceptor>,
}

impl WarningCaptureLayer {
    pub(crate) fn new(interceptor: Arc<ErrorInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for WarningCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::WARN || in_handler() {
            return;
        }

        let target = metadata.target();
        if IGNORED_TARGETS.iter().any(|prefix| target.starts_with(prefix)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.interceptor
            .handle_warning(WarningEvent::new(visitor.message.as_deref(), target));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::events::UNKNOWN_WARNING;
    use crate::metrics::MetricsRegistry;
    use tracing_subscriber::prelude::*;

    fn interceptor() -> Arc<ErrorInterceptor> {
        let registry = MetricsRegistry::new();
        Arc::new(ErrorInterceptor::new(&registry).unwrap())
    }

    #[test]
    fn test_warn_events_are_counted_by_message() {
        let interceptor = interceptor();
        let subscriber = tracing_subscriber::registry().with(interceptor.warning_layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("deprecated API");
            tracing::warn!("deprecated API");
            tracing::warn!(code = 7, "slow image");
        });

        assert_eq!(interceptor.warning_count("deprecated API"), 2);
        assert_eq!(interceptor.warning_count("slow image"), 1);
    }

    #[test]
    fn test_other_levels_are_ignored() {
        let interceptor = interceptor();
        let subscriber = tracing_subscriber::registry().with(interceptor.warning_layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello");
            tracing::error!("not a warning");
            tracing::debug!("noise");
        });

        assert_eq!(interceptor.warnings_total(), 0);
    }

    #[test]
    fn test_warning_without_message_is_unknown() {
        let interceptor = interceptor();
        let subscriber = tracing_subscriber::registry().with(interceptor.warning_layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(code = 42);
        });

        assert_eq!(interceptor.warning_count(UNKNOWN_WARNING), 1);
    }

    #[test]
    fn test_pipeline_targets_are_not_counted() {
        let interceptor = interceptor();
        let subscriber = tracing_subscriber::registry().with(interceptor.warning_layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(
                target: "metrics_web::scheduler",
                "Metric export failed; dropping batch"
            );
            tracing::warn!(target: "metrics_web::exporter::otlp", "collector down");
        });

        assert_eq!(interceptor.warnings_total(), 0);
    }

    #[test]
    fn test_installing_twice_counts_once() {
        let interceptor = interceptor();
        let subscriber = tracing_subscriber::registry()
            .with(interceptor.warning_layer())
            .with(interceptor.warning_layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("only once");
        });

        assert_eq!(interceptor.warning_count("only once"), 1);
    }
}
