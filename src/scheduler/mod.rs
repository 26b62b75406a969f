use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::contracts::{
    CollectionScheduler, FlushOutcome, LockResultExt, MetricExporter, SchedulerState,
    TelemetryError,
};
use crate::metrics::{MetricsRegistry, PipelineMetrics};

/// One started timer task.
struct RunHandle {
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Wakes the task so it observes the shutdown flag immediately
    wake: Arc<Notify>,
    /// Kept so the task is owned; never awaited by `stop`
    _task: JoinHandle<()>,
}

impl RunHandle {
    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

struct Lifecycle {
    state: SchedulerState,
    run: Option<RunHandle>,
}

/// Collection scheduler driving periodic exports on the tokio runtime.
pub struct PeriodicScheduler<E>
where
    E: MetricExporter + 'static,
{
    registry: Arc<MetricsRegistry>,
    exporter: Arc<E>,
    flush_timeout: Duration,
    /// Serializes exports: timer ticks `try_lock` and skip, manual flushes wait.
    export_gate: Arc<AsyncMutex<()>>,
    pipeline: Arc<PipelineMetrics>,
    lifecycle: RwLock<Lifecycle>,
}

impl<E> PeriodicScheduler<E>
where
    E: MetricExporter + 'static,
{
    /// Creates an idle scheduler.
    pub fn new(registry: Arc<MetricsRegistry>, exporter: Arc<E>, flush_timeout: Duration) -> Self {
        Self {
            registry,
            exporter,
            flush_timeout,
            export_gate: Arc::new(AsyncMutex::new(())),
            pipeline: Arc::new(PipelineMetrics::default()),
            lifecycle: RwLock::new(Lifecycle {
                state: SchedulerState::Idle,
                run: None,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn exporter(&self) -> &Arc<E> {
        &self.exporter
    }

    /// Counters describing ticks and exports performed so far.
    pub fn pipeline_metrics(&self) -> &Arc<PipelineMetrics> {
        &self.pipeline
    }

    /// Reads the registry and hands one batch to the exporter.
    ///
    /// Export failures are logged and the batch is dropped.
    async fn export_cycle(
        registry: &MetricsRegistry,
        exporter: &E,
        pipeline: &PipelineMetrics,
    ) -> FlushOutcome {
        let batch = registry.collect();
        if batch.is_empty() {
            tracing::trace!("No readings to export");
            return FlushOutcome::Empty;
        }

        let readings = batch.len();
        let started = Instant::now();
        let result = exporter.export(&batch).await;
        let elapsed = started.elapsed();
        pipeline.record_export(readings, elapsed, result.is_ok());

        match result {
            Ok(()) => {
                tracing::debug!(
                    exporter = exporter.name(),
                    readings = readings,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Exported metric batch"
                );
                FlushOutcome::Exported { readings }
            }
            Err(e) => {
                tracing::warn!(
                    exporter = exporter.name(),
                    readings = readings,
                    error = %e,
                    "Metric export failed; dropping batch"
                );
                FlushOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl<E> CollectionScheduler for PeriodicScheduler<E>
where
    E: MetricExporter + 'static,
{
    async fn start(&self, interval: Duration) -> Result<(), TelemetryError> {
        if interval.is_zero() {
            return Err(TelemetryError::Config(
                "export interval must be positive".into(),
            ));
        }

        let mut lifecycle = self.lifecycle.write().map_lock_err()?;
        if lifecycle.state == SchedulerState::Running {
            tracing::debug!("Scheduler already running");
            return Ok(());
        }

        let registry = Arc::clone(&self.registry);
        let exporter = Arc::clone(&self.exporter);
        let pipeline = Arc::clone(&self.pipeline);
        let gate = Arc::clone(&self.export_gate);
        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let task_shutdown = Arc::clone(&shutdown);
        let task_wake = Arc::clone(&wake);

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                "Metric export task started"
            );

            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // Wait for either the next tick or a stop request
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = task_wake.notified() => {},
                }

                if task_shutdown.load(Ordering::SeqCst) {
                    break;
                }

                pipeline.record_tick();
                let _guard = match Arc::clone(&gate).try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        pipeline.record_skipped_tick();
                        tracing::warn!("Previous export still in flight; skipping tick");
                        continue;
                    }
                };

                Self::export_cycle(&registry, &exporter, &pipeline).await;
            }

            tracing::info!("Metric export task stopped");
        });

        lifecycle.run = Some(RunHandle {
            shutdown,
            wake,
            _task: task,
        });
        lifecycle.state = SchedulerState::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TelemetryError> {
        let mut lifecycle = self.lifecycle.write().map_lock_err()?;
        if let Some(run) = lifecycle.run.take() {
            run.signal_shutdown();
            lifecycle.state = SchedulerState::Stopped;
            tracing::info!("Scheduler stopped");
        }
        Ok(())
    }

    async fn flush_now(&self) -> FlushOutcome {
        let cycle = async {
            let _guard = self.export_gate.lock().await;
            Self::export_cycle(&self.registry, &self.exporter, &self.pipeline).await
        };

        match tokio::time::timeout(self.flush_timeout, cycle).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.flush_timeout.as_millis() as u64,
                    "Manual flush did not complete in time"
                );
                FlushOutcome::TimedOut
            }
        }
    }

    fn state(&self) -> SchedulerState {
        self.lifecycle
            .read()
            .map(|lifecycle| lifecycle.state)
            .unwrap_or(SchedulerState::Stopped)
    }
}

impl<E> Drop for PeriodicScheduler<E>
where
    E: MetricExporter + 'static,
{
    fn drop(&mut self) {
        if let Ok(lifecycle) = self.lifecycle.get_mut() {
            if let Some(run) = lifecycle.run.take() {
                run.signal_shutdown();
            }
        }
    }
}
