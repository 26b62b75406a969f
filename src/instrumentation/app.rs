//! Application-level instruments: page loads, clicks, liveness and wiring checks.

use std::sync::Arc;
use std::time::Duration;

use super::vitals::WebVitalsBridge;
use crate::contracts::{InstrumentKind, LabelSet, TelemetryError};
use crate::metrics::{
    Counter, Histogram, InstrumentDescriptor, MetricsRegistry, ObservableGauge, DEFAULT_BOUNDARIES,
};

pub const PAGE_LOAD_HISTOGRAM: &str = "page_load_time";
pub const CLICK_COUNTER: &str = "button_click_count";
pub const APP_STATUS_GAUGE: &str = "app_status";
pub const DEPENDENCY_ISSUES_COUNTER: &str = "dependency_issues";

pub struct AppInstrumentation {
    page_load: Arc<Histogram>,
    clicks: Arc<Counter>,
    status: Arc<ObservableGauge>,
    dependency_issues: Arc<Counter>,
}

impl AppInstrumentation {
    pub fn new(registry: &MetricsRegistry) -> Result<Self, TelemetryError> {
        Ok(Self {
            page_load: registry.histogram_with(
                InstrumentDescriptor::new(
                    PAGE_LOAD_HISTOGRAM,
                    InstrumentKind::Histogram,
                    "Page load time",
                )
                .with_unit("ms"),
                &DEFAULT_BOUNDARIES,
            )?,
            clicks: registry.counter(CLICK_COUNTER, "Number of button clicks")?,
            status: registry.observable_gauge(
                APP_STATUS_GAUGE,
                "Application status: 1 while active, 0 once inactive",
            )?,
            dependency_issues: registry
                .counter(DEPENDENCY_ISSUES_COUNTER, "Number of dependency issues detected")?,
        })
    }

    pub fn record_page_load(&self, route: &str, duration: Duration) {
        self.page_load
            .record_duration_ms(duration, &LabelSet::new().with("route", route));
    }

    pub fn track_click(&self, action: &str) {
        self.clicks.increment(&LabelSet::new().with("action", action));
    }

    /// Reports the application as active (gauge observes 1).
    pub fn mark_active(&self) -> Result<(), TelemetryError> {
        self.status.register_callback(|| 1.0)
    }

    /// Reports the application as inactive (gauge observes 0).
    pub fn mark_inactive(&self) -> Result<(), TelemetryError> {
        self.status.register_callback(|| 0.0)
    }

    /// Current gauge value, if a status has been reported.
    pub fn status(&self) -> Option<f64> {
        self.status.observe()
    }

    /// Counts and logs each issue.
    pub fn report_dependency_issues(&self, issues: &[String]) {
        for issue in issues {
            tracing::warn!(issue = %issue, "Dependency issue detected");
            self.dependency_issues
                .increment(&LabelSet::new().with("issue", issue.as_str()));
        }
    }

    pub fn clicks(&self, action: &str) -> u64 {
        self.clicks.value(&LabelSet::new().with("action", action))
    }

    pub fn page_loads(&self, route: &str) -> u64 {
        self.page_load.count(&LabelSet::new().with("route", route))
    }

    pub fn dependency_issue_count(&self) -> u64 {
        self.dependency_issues.total()
    }
}

/// Verifies that every core web-vitals signal is wired to the bridge.
pub struct DependencyChecker;

impl DependencyChecker {
    /// One issue per signal without an active subscription.
    pub fn check(bridge: &WebVitalsBridge) -> Vec<String> {
        bridge
            .unsubscribed()
            .into_iter()
            .map(|vital| format!("{} is not subscribed", vital.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::vitals::{BufferedVitalSource, WebVital};

    fn app() -> (Arc<MetricsRegistry>, AppInstrumentation) {
        let registry = Arc::new(MetricsRegistry::new());
        let app = AppInstrumentation::new(&registry).unwrap();
        (registry, app)
    }

    #[test]
    fn test_status_follows_latest_mark() {
        let (registry, app) = app();
        assert_eq!(app.status(), None);

        app.mark_active().unwrap();
        assert_eq!(app.status(), Some(1.0));
        app.mark_inactive().unwrap();
        assert_eq!(app.status(), Some(0.0));

        let batch = registry.collect();
        assert_eq!(batch.gauge_value(APP_STATUS_GAUGE), Some(0.0));
    }

    #[test]
    fn test_clicks_and_page_loads() {
        let (_registry, app) = app();
        app.track_click("button_click");
        app.track_click("button_click");
        app.record_page_load("/pokemon", Duration::from_millis(850));

        assert_eq!(app.clicks("button_click"), 2);
        assert_eq!(app.page_loads("/pokemon"), 1);
        assert_eq!(app.page_loads("/dating"), 0);
    }

    #[test]
    fn test_dependency_issues_are_counted() {
        let (_registry, app) = app();
        app.report_dependency_issues(&[
            "LCP is not subscribed".into(),
            "CLS is not subscribed".into(),
        ]);
        assert_eq!(app.dependency_issue_count(), 2);
    }

    #[test]
    fn test_checker_lists_unsubscribed_vitals() {
        let registry = MetricsRegistry::new();
        let bridge = Arc::new(WebVitalsBridge::new(&registry).unwrap());
        assert_eq!(DependencyChecker::check(&bridge).len(), 5);

        let source = BufferedVitalSource::supporting(&[
            WebVital::Lcp,
            WebVital::Inp,
            WebVital::Cls,
            WebVital::Fcp,
        ]);
        bridge.start_collection(&source);
        assert_eq!(
            DependencyChecker::check(&bridge),
            vec!["TTFB is not subscribed".to_string()]
        );
    }
}
