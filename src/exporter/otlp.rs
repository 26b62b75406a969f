use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use super::wire::ExportMetricsServiceRequest;
use crate::config::TelemetryConfig;
use crate::contracts::{ExportBatch, ExportError, MetricExporter, TelemetryError};

/// Longest collector response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Exporter posting OTLP/HTTP JSON to a collector (e.g. `http://host:4318/v1/metrics`).
#[derive(Clone)]
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    endpoint: String,
    service_name: String,
    timeout: Duration,
}

impl OtlpHttpExporter {
    /// Creates an exporter from the telemetry configuration.
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.export_timeout)
            .build()
            .map_err(|e| TelemetryError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.collector_url.clone(),
            service_name: config.service_name.clone(),
            timeout: config.export_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MetricExporter for OtlpHttpExporter {
    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        let request = ExportMetricsServiceRequest::from_batch(batch, &self.service_name);
        let body =
            serde_json::to_vec(&request).map_err(|e| ExportError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::Timeout(self.timeout)
                } else {
                    ExportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ExportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            readings = batch.len(),
            status = status.as_u16(),
            "Exported metric batch"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "otlp-http"
    }
}
