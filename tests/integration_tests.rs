use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing_subscriber::prelude::*;

use metrics_web::contracts::{CollectionScheduler, FlushOutcome, LabelSet, SchedulerState};
use metrics_web::exporter::OtlpHttpExporter;
use metrics_web::metrics::MetricsRegistry;
use metrics_web::scheduler::PeriodicScheduler;
use metrics_web::{Telemetry, TelemetryConfig};

// =============================================================================
// Mock collector
// =============================================================================

type Received = Arc<Mutex<Vec<Value>>>;

#[derive(Clone)]
struct CollectorState {
    received: Received,
    status: StatusCode,
}

async fn collect(State(state): State<CollectorState>, Json(body): Json<Value>) -> StatusCode {
    state.received.lock().unwrap().push(body);
    state.status
}

/// Starts an OTLP collector on an ephemeral port; returns its metrics URL.
async fn spawn_collector(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let state = CollectorState {
        received: Arc::clone(&received),
        status,
    };
    let app = Router::new()
        .route("/v1/metrics", post(collect))
        .route("/api/pokemon", get(|| async { Json(json!({"name": "pikachu"})) }))
        .route("/api/missing", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1/metrics"), received)
}

fn config(url: &str) -> TelemetryConfig {
    TelemetryConfig {
        collector_url: url.to_string(),
        export_interval: Duration::from_millis(50),
        export_timeout: Duration::from_secs(2),
        flush_timeout: Duration::from_secs(2),
        ..TelemetryConfig::default()
    }
}

fn scheduler(url: &str, registry: Arc<MetricsRegistry>) -> PeriodicScheduler<OtlpHttpExporter> {
    let config = config(url);
    let exporter = OtlpHttpExporter::new(&config).unwrap();
    PeriodicScheduler::new(registry, Arc::new(exporter), config.flush_timeout)
}

fn metrics(request: &Value) -> Vec<Value> {
    request["resourceMetrics"][0]["scopeMetrics"][0]["metrics"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

fn metric<'a>(metrics: &'a [Value], name: &str) -> Option<&'a Value> {
    metrics.iter().find(|m| m["name"] == name)
}

fn attribute<'a>(point: &'a Value, key: &str) -> Option<&'a str> {
    point["attributes"]
        .as_array()?
        .iter()
        .find(|kv| kv["key"] == key)?["value"]["stringValue"]
        .as_str()
}

async fn wait_for_requests(received: &Received, count: usize) -> bool {
    for _ in 0..100 {
        if received.lock().unwrap().len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// =============================================================================
// Export scenarios
// =============================================================================

#[tokio::test]
async fn test_counter_series_reach_collector() {
    let (url, received) = spawn_collector(StatusCode::OK).await;
    let registry = Arc::new(MetricsRegistry::new());
    let requests = registry.counter("requests_total", "Requests served").unwrap();

    let ok = LabelSet::new().with("status", "200");
    let failed = LabelSet::new().with("status", "500");
    requests.add(1, &ok);
    requests.add(1, &ok);
    requests.add(1, &failed);

    let scheduler = scheduler(&url, registry);
    assert_eq!(
        scheduler.flush_now().await,
        FlushOutcome::Exported { readings: 2 }
    );

    let requests = received.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let metrics = metrics(&requests[0]);
    let total = metric(&metrics, "requests_total").expect("requests_total exported");
    let points = total["sum"]["dataPoints"].as_array().unwrap();
    assert_eq!(points.len(), 2);

    let value_for = |status: &str| {
        points
            .iter()
            .find(|p| attribute(p, "status") == Some(status))
            .map(|p| p["asInt"].as_str().unwrap().to_string())
    };
    assert_eq!(value_for("200").as_deref(), Some("2"));
    assert_eq!(value_for("500").as_deref(), Some("1"));
    assert_eq!(total["sum"]["isMonotonic"], true);
}

#[tokio::test]
async fn test_periodic_export_reaches_collector() {
    let (url, received) = spawn_collector(StatusCode::OK).await;
    let registry = Arc::new(MetricsRegistry::new());
    registry
        .counter("ticks_seen", "Ticks")
        .unwrap()
        .increment(&LabelSet::new());

    let scheduler = scheduler(&url, registry);
    scheduler.start(Duration::from_millis(50)).await.unwrap();
    assert!(wait_for_requests(&received, 2).await, "expected periodic exports");
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_then_start_resumes_export() {
    let (url, received) = spawn_collector(StatusCode::OK).await;
    let registry = Arc::new(MetricsRegistry::new());
    registry
        .counter("resumed", "Resumed")
        .unwrap()
        .increment(&LabelSet::new());

    let scheduler = scheduler(&url, Arc::clone(&registry));
    scheduler.start(Duration::from_millis(50)).await.unwrap();
    assert!(wait_for_requests(&received, 1).await);

    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_stop = received.lock().unwrap().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(received.lock().unwrap().len(), after_stop);

    scheduler.start(Duration::from_millis(50)).await.unwrap();
    assert!(wait_for_requests(&received, after_stop + 2).await);
    scheduler.stop().await.unwrap();

    // Same instrument set before and after the restart
    let requests = received.lock().unwrap();
    for request in requests.iter() {
        let names: Vec<_> = metrics(request)
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["resumed".to_string()]);
    }
}

#[tokio::test]
async fn test_flush_to_closed_port_reports_failure() {
    let registry = Arc::new(MetricsRegistry::new());
    registry
        .counter("requests_total", "Requests")
        .unwrap()
        .increment(&LabelSet::new());

    let scheduler = scheduler("http://127.0.0.1:9/v1/metrics", registry);
    let outcome = scheduler.flush_now().await;
    assert!(matches!(outcome, FlushOutcome::Failed { .. }), "{outcome:?}");
    assert_eq!(scheduler.pipeline_metrics().export_failures(), 1);
}

#[tokio::test]
async fn test_collector_error_status_reports_failure() {
    let (url, received) = spawn_collector(StatusCode::INTERNAL_SERVER_ERROR).await;
    let registry = Arc::new(MetricsRegistry::new());
    registry
        .counter("requests_total", "Requests")
        .unwrap()
        .increment(&LabelSet::new());

    let scheduler = scheduler(&url, registry);
    match scheduler.flush_now().await {
        FlushOutcome::Failed { reason } => assert!(reason.contains("500"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(received.lock().unwrap().len(), 1);
}

// =============================================================================
// Context scenarios
// =============================================================================

#[tokio::test]
async fn test_before_unload_sends_inactive_status() {
    let (url, received) = spawn_collector(StatusCode::OK).await;
    let telemetry = Telemetry::otlp(config(&url)).unwrap();
    telemetry.start().await.unwrap();

    let outcome = telemetry.before_unload().await;
    assert!(matches!(outcome, FlushOutcome::Exported { .. }), "{outcome:?}");

    let requests = received.lock().unwrap();
    let last = requests.last().unwrap();
    let status = metric(&metrics(last), "app_status").cloned().unwrap();
    assert_eq!(status["gauge"]["dataPoints"][0]["asDouble"], 0.0);
}

#[tokio::test]
async fn test_instrumented_client_counts_status_codes() {
    let (url, _received) = spawn_collector(StatusCode::OK).await;
    let base = url.trim_end_matches("/v1/metrics").to_string();
    let telemetry = Telemetry::otlp(config(&url)).unwrap();
    let client = telemetry.http_client().unwrap();

    let pokemon_url = format!("{base}/api/pokemon");
    let body: Value = client.get_json(&pokemon_url).await.unwrap();
    assert_eq!(body["name"], "pikachu");

    let missing_url = format!("{base}/api/missing");
    let fault = client.get_json::<Value>(&missing_url).await.unwrap_err();
    assert_eq!(fault.status, Some(404));

    let labels = |status: &str, url: &str| {
        LabelSet::new()
            .with("method", "GET")
            .with("status", status)
            .with("url", url)
    };
    let http = telemetry.http();
    assert_eq!(http.status_counter().value(&labels("200", &pokemon_url)), 1);
    assert_eq!(http.status_counter().value(&labels("404", &missing_url)), 1);
    assert_eq!(http.duration_histogram().count(&labels("404", &missing_url)), 1);
    assert_eq!(telemetry.errors().error_count("HttpErrorResponse"), 1);
}

#[test]
fn test_warning_interceptor_installed_twice_counts_once() {
    let telemetry = Telemetry::new(TelemetryConfig::default(), metrics_web::exporter::NoopExporter)
        .unwrap();
    let subscriber = tracing_subscriber::registry()
        .with(telemetry.warning_layer())
        .with(telemetry.warning_layer());

    tracing::subscriber::with_default(subscriber, || {
        tracing::warn!("image without dimensions");
    });

    assert_eq!(telemetry.errors().warnings_total(), 1);
    assert_eq!(telemetry.errors().warning_count("image without dimensions"), 1);
}
