//! Telemetry configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::contracts::TelemetryError;

/// Configuration for the telemetry pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Collector endpoint receiving OTLP/HTTP JSON batches
    pub collector_url: String,
    /// Interval between export ticks
    pub export_interval: Duration,
    /// Value of the `service.name` resource attribute
    pub service_name: String,
    /// Upper bound for a single export request
    pub export_timeout: Duration,
    /// Upper bound for the manual flush on the shutdown path
    pub flush_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://localhost:4318/v1/metrics".into(),
            export_interval: Duration::from_millis(1_000),
            service_name: "angular-app".into(),
            export_timeout: Duration::from_millis(5_000),
            flush_timeout: Duration::from_millis(2_000),
        }
    }
}

/// Recognized options object, e.g. `{"collectorUrl": "...", "exportIntervalMs": 1000}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigOptions {
    collector_url: Option<String>,
    export_interval_ms: Option<u64>,
    service_name: Option<String>,
    export_timeout_ms: Option<u64>,
    flush_timeout_ms: Option<u64>,
}

impl TelemetryConfig {
    /// Creates a TelemetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `METRICS_WEB_COLLECTOR_URL`: Collector endpoint
    ///   (default: http://localhost:4318/v1/metrics)
    /// - `METRICS_WEB_EXPORT_INTERVAL_MS`: Export interval in ms (default: 1000)
    /// - `METRICS_WEB_SERVICE_NAME`: Service name label (default: angular-app)
    /// - `METRICS_WEB_EXPORT_TIMEOUT_MS`: Per-request timeout in ms (default: 5000)
    /// - `METRICS_WEB_FLUSH_TIMEOUT_MS`: Shutdown flush bound in ms (default: 2000)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            collector_url: std::env::var("METRICS_WEB_COLLECTOR_URL")
                .unwrap_or(default.collector_url),
            export_interval: env_millis("METRICS_WEB_EXPORT_INTERVAL_MS")
                .unwrap_or(default.export_interval),
            service_name: std::env::var("METRICS_WEB_SERVICE_NAME")
                .unwrap_or(default.service_name),
            export_timeout: env_millis("METRICS_WEB_EXPORT_TIMEOUT_MS")
                .unwrap_or(default.export_timeout),
            flush_timeout: env_millis("METRICS_WEB_FLUSH_TIMEOUT_MS")
                .unwrap_or(default.flush_timeout),
        }
    }

    /// Parses the JSON options object; missing options keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        let options: ConfigOptions =
            serde_json::from_str(json).map_err(|e| TelemetryError::Config(e.to_string()))?;
        let default = Self::default();
        let config = Self {
            collector_url: options.collector_url.unwrap_or(default.collector_url),
            export_interval: options
                .export_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.export_interval),
            service_name: options.service_name.unwrap_or(default.service_name),
            export_timeout: options
                .export_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.export_timeout),
            flush_timeout: options
                .flush_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.flush_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive an exporter.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        let url = self.collector_url.trim();
        if url.is_empty() {
            return Err(TelemetryError::Config("collector URL is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TelemetryError::Config(format!(
                "collector URL must be http(s): {}",
                url
            )));
        }
        if self.export_interval.is_zero() {
            return Err(TelemetryError::Config("export interval must be positive".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Config("service name is empty".into()));
        }
        Ok(())
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.collector_url, "http://localhost:4318/v1/metrics");
        assert_eq!(config.export_interval, Duration::from_millis(1000));
        assert_eq!(config.service_name, "angular-app");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json_overrides_recognized_options() {
        let config = TelemetryConfig::from_json(
            r#"{"collectorUrl": "http://collector:4318/v1/metrics", "exportIntervalMs": 15000, "serviceName": "dating-app"}"#,
        )
        .unwrap();
        assert_eq!(config.collector_url, "http://collector:4318/v1/metrics");
        assert_eq!(config.export_interval, Duration::from_secs(15));
        assert_eq!(config.service_name, "dating-app");
        assert_eq!(config.flush_timeout, TelemetryConfig::default().flush_timeout);
    }

    #[test]
    fn test_config_from_json_rejects_unknown_and_invalid() {
        assert!(matches!(
            TelemetryConfig::from_json(r#"{"collectorURL": "http://x"}"#),
            Err(TelemetryError::Config(_))
        ));
        assert!(matches!(
            TelemetryConfig::from_json(r#"{"exportIntervalMs": 0}"#),
            Err(TelemetryError::Config(_))
        ));
        assert!(matches!(
            TelemetryConfig::from_json(r#"{"collectorUrl": "ftp://collector"}"#),
            Err(TelemetryError::Config(_))
        ));
        assert!(matches!(
            TelemetryConfig::from_json(r#"{"serviceName": "  "}"#),
            Err(TelemetryError::Config(_))
        ));
    }
}
