//! The telemetry context: one explicitly constructed object owning the
//! registry, the scheduler and the interception layer.
//!
//! Create one per process at startup and share it through `Arc`.

use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::contracts::{CollectionScheduler, FlushOutcome, MetricExporter, TelemetryError};
use crate::exporter::OtlpHttpExporter;
use crate::instrumentation::{
    AppInstrumentation, ComponentInstrumentation, DependencyChecker, HttpInstrumentation,
    InstrumentedClient, VitalSource, WebVitalsBridge,
};
use crate::interception::{install_panic_hook, ErrorInterceptor, WarningCaptureLayer};
use crate::metrics::MetricsRegistry;
use crate::scheduler::PeriodicScheduler;

pub struct Telemetry<E>
where
    E: MetricExporter + 'static,
{
    config: TelemetryConfig,
    registry: Arc<MetricsRegistry>,
    errors: Arc<ErrorInterceptor>,
    scheduler: PeriodicScheduler<E>,
    app: AppInstrumentation,
    http: Arc<HttpInstrumentation>,
    vitals: Arc<WebVitalsBridge>,
}

impl Telemetry<OtlpHttpExporter> {
    /// Builds a context exporting to the configured OTLP collector.
    pub fn otlp(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let exporter = OtlpHttpExporter::new(&config)?;
        Self::new(config, exporter)
    }
}

impl<E> Telemetry<E>
where
    E: MetricExporter + 'static,
{
    /// Builds a context around any exporter (a no-op or recording one in tests).
    pub fn new(config: TelemetryConfig, exporter: E) -> Result<Self, TelemetryError> {
        config.validate()?;

        let registry = Arc::new(MetricsRegistry::new());
        let errors = Arc::new(ErrorInterceptor::new(&registry)?);
        let app = AppInstrumentation::new(&registry)?;
        let http = Arc::new(HttpInstrumentation::new(&registry, Arc::clone(&errors))?);
        let vitals = Arc::new(WebVitalsBridge::new(&registry)?);
        let scheduler = PeriodicScheduler::new(
            Arc::clone(&registry),
            Arc::new(exporter),
            config.flush_timeout,
        );

        tracing::debug!(
            collector = %config.collector_url,
            service = %config.service_name,
            interval_ms = config.export_interval.as_millis() as u64,
            "Telemetry initialized"
        );

        Ok(Self {
            config,
            registry,
            errors,
            scheduler,
            app,
            http,
            vitals,
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn errors(&self) -> &Arc<ErrorInterceptor> {
        &self.errors
    }

    pub fn scheduler(&self) -> &PeriodicScheduler<E> {
        &self.scheduler
    }

    pub fn app(&self) -> &AppInstrumentation {
        &self.app
    }

    pub fn http(&self) -> &Arc<HttpInstrumentation> {
        &self.http
    }

    pub fn web_vitals(&self) -> &Arc<WebVitalsBridge> {
        &self.vitals
    }

    /// Marks the app active and starts periodic export.
    pub async fn start(&self) -> Result<(), TelemetryError> {
        self.app.mark_active()?;
        self.scheduler.start(self.config.export_interval).await
    }

    /// Instruments for one component, e.g. `component("pokemon", "PokemonComponent")`.
    pub fn component(
        &self,
        prefix: &str,
        name: &str,
    ) -> Result<Arc<ComponentInstrumentation>, TelemetryError> {
        ComponentInstrumentation::new(&self.registry, prefix, name).map(Arc::new)
    }

    /// JSON client whose calls are timed and counted.
    pub fn http_client(&self) -> Result<InstrumentedClient, TelemetryError> {
        InstrumentedClient::new(Arc::clone(&self.http), self.config.export_timeout)
    }

    /// Subscribes to a vitals source, then counts any signal left unwired.
    pub fn start_web_vitals<S>(&self, source: &S) -> Vec<String>
    where
        S: VitalSource + ?Sized,
    {
        self.vitals.start_collection(source);
        let issues = DependencyChecker::check(&self.vitals);
        if !issues.is_empty() {
            self.app.report_dependency_issues(&issues);
        }
        issues
    }

    /// Layer counting WARN events; `None` when already handed out.
    pub fn warning_layer(&self) -> Option<WarningCaptureLayer> {
        self.errors.warning_layer()
    }

    /// Routes panics into the error counter. Returns `false` if already installed.
    pub fn install_panic_hook(&self) -> bool {
        install_panic_hook(Arc::clone(&self.errors))
    }

    /// Shutdown path: report inactive, flush once (bounded), stop the timer.
    ///
    /// Never fails; the outcome says whether the final batch went out.
    pub async fn before_unload(&self) -> FlushOutcome {
        if let Err(e) = self.app.mark_inactive() {
            tracing::error!(error = %e, "Failed to mark application inactive");
        }

        let outcome = self.scheduler.flush_now().await;
        if outcome.is_success() {
            tracing::info!(outcome = %outcome, "Final flush complete");
        } else {
            tracing::error!(outcome = %outcome, "Final flush did not complete");
        }

        if let Err(e) = self.scheduler.stop().await {
            tracing::error!(error = %e, "Failed to stop scheduler");
        }
        outcome
    }
}
