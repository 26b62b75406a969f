//! Outgoing HTTP call instrumentation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::contracts::{InstrumentKind, LabelSet, TelemetryError};
use crate::interception::{ErrorEvent, ErrorInterceptor};
use crate::metrics::{Counter, Histogram, InstrumentDescriptor, MetricsRegistry};

pub const DURATION_HISTOGRAM: &str = "http_request_duration_seconds";
pub const STATUS_COUNTER: &str = "http_request_status_count";
/// Error kind reported for failed calls.
pub const HTTP_ERROR_KIND: &str = "HttpErrorResponse";
/// Status label used when a failure carries no status code.
pub const UNKNOWN_STATUS: &str = "unknown";

const DURATION_BOUNDARIES: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Upper bound for the response body kept in a fault message.
const MAX_FAULT_BODY: usize = 256;

/// A failed HTTP call: transport error, non-2xx status, or undecodable body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HttpFault {
    pub status: Option<u16>,
    pub message: String,
}

impl HttpFault {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        Self::new(error.status().map(|s| s.as_u16()), error.to_string())
    }
}

/// Records a duration histogram and a status counter per call.
///
/// Duration is recorded on success and on failure alike, so failed calls
/// contribute to latency.
pub struct HttpInstrumentation {
    duration: Arc<Histogram>,
    status: Arc<Counter>,
    errors: Arc<ErrorInterceptor>,
}

impl HttpInstrumentation {
    pub fn new(
        registry: &MetricsRegistry,
        errors: Arc<ErrorInterceptor>,
    ) -> Result<Self, TelemetryError> {
        let duration = registry.histogram_with(
            InstrumentDescriptor::new(
                DURATION_HISTOGRAM,
                InstrumentKind::Histogram,
                "Duration of HTTP requests in seconds",
            )
            .with_unit("s"),
            &DURATION_BOUNDARIES,
        )?;
        let status = registry.counter(STATUS_COUNTER, "HTTP responses by status code")?;

        Ok(Self {
            duration,
            status,
            errors,
        })
    }

    /// Awaits `call`, recording its duration and outcome.
    ///
    /// The call yields the response status alongside its value. Failures are
    /// forwarded to the error interceptor before being returned.
    pub async fn observe<T, F>(&self, method: &str, url: &str, call: F) -> Result<T, HttpFault>
    where
        F: Future<Output = Result<(u16, T), HttpFault>>,
    {
        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();

        match result {
            Ok((status, value)) => {
                self.record(method, url, Some(status), elapsed);
                Ok(value)
            }
            Err(fault) => {
                self.errors.handle_error(ErrorEvent::new(
                    Some(HTTP_ERROR_KIND),
                    fault.message.clone(),
                    url,
                ));
                self.record(method, url, fault.status, elapsed);
                Err(fault)
            }
        }
    }

    /// Records one completed call.
    pub fn record(&self, method: &str, url: &str, status: Option<u16>, elapsed: Duration) {
        let status = status.map_or_else(|| UNKNOWN_STATUS.to_string(), |s| s.to_string());
        let labels = LabelSet::new()
            .with("method", method)
            .with("status", status)
            .with("url", url);
        self.status.increment(&labels);
        self.duration.record_duration_secs(elapsed, &labels);
    }

    pub fn duration_histogram(&self) -> &Arc<Histogram> {
        &self.duration
    }

    pub fn status_counter(&self) -> &Arc<Counter> {
        &self.status
    }
}

/// JSON HTTP client whose calls go through [`HttpInstrumentation`].
#[derive(Clone)]
pub struct InstrumentedClient {
    client: reqwest::Client,
    http: Arc<HttpInstrumentation>,
}

impl InstrumentedClient {
    pub fn new(http: Arc<HttpInstrumentation>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, http })
    }

    /// `GET url`, decoding a JSON body.
    pub async fn get_json<T>(&self, url: &str) -> Result<T, HttpFault>
    where
        T: DeserializeOwned,
    {
        self.send("GET", url, self.client.get(url)).await
    }

    /// `POST url` with a JSON body, decoding a JSON response.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, HttpFault>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send("POST", url, self.client.post(url).json(body)).await
    }

    async fn send<T>(
        &self,
        method: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, HttpFault>
    where
        T: DeserializeOwned,
    {
        self.http
            .observe(method, url, async move {
                let response = request.send().await.map_err(HttpFault::from_reqwest)?;
                let status = response.status();

                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let body = truncate(&body, MAX_FAULT_BODY);
                    return Err(HttpFault::new(
                        Some(status.as_u16()),
                        format!("{method} {url} returned {status}: {body}"),
                    ));
                }

                let value = response.json::<T>().await.map_err(|e| {
                    HttpFault::new(Some(status.as_u16()), format!("invalid response body: {e}"))
                })?;
                Ok((status.as_u16(), value))
            })
            .await
    }
}

fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut cut = max;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    &value[..cut]
}
