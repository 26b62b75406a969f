//! OTLP/HTTP JSON encoding of an export batch.
//!
//! Mirrors the protobuf JSON mapping of `ExportMetricsServiceRequest`:
//! camelCase field names, 64-bit integers as strings, enums as numbers.

use serde::Serialize;

use crate::contracts::{ExportBatch, HistogramSnapshot, LabelSet, Reading, ReadingValue};

/// `AGGREGATION_TEMPORALITY_CUMULATIVE`
const TEMPORALITY_CUMULATIVE: i32 = 2;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsServiceRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

#[derive(Debug, Serialize)]
pub struct ScopeMetrics {
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Serialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Metric {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Histogram(Histogram),
    Gauge(Gauge),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: i32,
    pub is_monotonic: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub data_points: Vec<HistogramDataPoint>,
    pub aggregation_temporality: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    #[serde(flatten)]
    pub value: NumberValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberValue {
    AsInt(String),
    AsDouble(f64),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    pub count: String,
    pub sum: f64,
    pub bucket_counts: Vec<String>,
    pub explicit_bounds: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ExportMetricsServiceRequest {
    /// Encodes a batch under a single resource and instrumentation scope.
    ///
    /// Consecutive readings of the same instrument (the registry emits them
    /// grouped) become data points of one metric.
    pub fn from_batch(batch: &ExportBatch, service_name: &str) -> Self {
        let start = millis_to_nanos(batch.start_ms);
        let mut metrics: Vec<Metric> = Vec::new();

        for reading in &batch.readings {
            let time = millis_to_nanos(reading.timestamp_ms);
            match metrics.last_mut() {
                Some(metric) if metric.name == reading.instrument.name => {
                    push_point(&mut metric.data, reading, &start, &time);
                }
                _ => metrics.push(new_metric(reading, &start, &time)),
            }
        }

        Self {
            resource_metrics: vec![ResourceMetrics {
                resource: Resource {
                    attributes: vec![string_attribute("service.name", service_name)],
                },
                scope_metrics: vec![ScopeMetrics {
                    scope: Scope {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                    metrics,
                }],
            }],
        }
    }
}

fn new_metric(reading: &Reading, start: &str, time: &str) -> Metric {
    let mut data = match reading.value {
        ReadingValue::Sum(_) => MetricData::Sum(Sum {
            data_points: Vec::new(),
            aggregation_temporality: TEMPORALITY_CUMULATIVE,
            is_monotonic: true,
        }),
        ReadingValue::Histogram(_) => MetricData::Histogram(Histogram {
            data_points: Vec::new(),
            aggregation_temporality: TEMPORALITY_CUMULATIVE,
        }),
        ReadingValue::Gauge(_) => MetricData::Gauge(Gauge {
            data_points: Vec::new(),
        }),
    };
    push_point(&mut data, reading, start, time);

    Metric {
        name: reading.instrument.name.clone(),
        description: reading.description.clone(),
        unit: reading.unit.clone(),
        data,
    }
}

fn push_point(data: &mut MetricData, reading: &Reading, start: &str, time: &str) {
    let attributes = attributes(&reading.labels);
    match (data, &reading.value) {
        (MetricData::Sum(sum), ReadingValue::Sum(value)) => sum.data_points.push(NumberDataPoint {
            attributes,
            start_time_unix_nano: start.to_string(),
            time_unix_nano: time.to_string(),
            value: NumberValue::AsInt(value.to_string()),
        }),
        (MetricData::Gauge(gauge), ReadingValue::Gauge(value)) => {
            gauge.data_points.push(NumberDataPoint {
                attributes,
                start_time_unix_nano: start.to_string(),
                time_unix_nano: time.to_string(),
                value: NumberValue::AsDouble(*value),
            })
        }
        (MetricData::Histogram(histogram), ReadingValue::Histogram(snapshot)) => histogram
            .data_points
            .push(histogram_point(attributes, start, time, snapshot)),
        _ => tracing::debug!(
            instrument = %reading.instrument.name,
            "Skipping reading whose value does not match its metric type"
        ),
    }
}

fn histogram_point(
    attributes: Vec<KeyValue>,
    start: &str,
    time: &str,
    snapshot: &HistogramSnapshot,
) -> HistogramDataPoint {
    HistogramDataPoint {
        attributes,
        start_time_unix_nano: start.to_string(),
        time_unix_nano: time.to_string(),
        count: snapshot.count.to_string(),
        sum: snapshot.sum,
        bucket_counts: snapshot.bucket_counts.iter().map(u64::to_string).collect(),
        explicit_bounds: snapshot.boundaries.clone(),
        min: snapshot.min,
        max: snapshot.max,
    }
}

fn attributes(labels: &LabelSet) -> Vec<KeyValue> {
    labels.iter().map(|(k, v)| string_attribute(k, v)).collect()
}

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: AnyValue {
            string_value: value.to_string(),
        },
    }
}

fn millis_to_nanos(ms: u64) -> String {
    (u128::from(ms) * 1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::metrics::MetricsRegistry;

    #[test]
    fn test_counter_series_share_one_metric() {
        let registry = MetricsRegistry::new();
        let counter = registry.counter("requests_total", "Requests").unwrap();
        counter.add(2, &LabelSet::from([("status", "200")]));
        counter.add(1, &LabelSet::from([("status", "500")]));

        let request = ExportMetricsServiceRequest::from_batch(&registry.collect(), "angular-app");
        let value = serde_json::to_value(&request).unwrap();

        let resource = &value["resourceMetrics"][0];
        assert_eq!(
            resource["resource"]["attributes"][0],
            json!({"key": "service.name", "value": {"stringValue": "angular-app"}})
        );
        let metrics = resource["scopeMetrics"][0]["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 1);
        let sum = &metrics[0]["sum"];
        assert_eq!(sum["aggregationTemporality"], 2);
        assert_eq!(sum["isMonotonic"], true);
        assert_eq!(sum["dataPoints"][0]["asInt"], "2");
        assert_eq!(sum["dataPoints"][1]["asInt"], "1");
        assert_eq!(
            sum["dataPoints"][1]["attributes"][0]["value"]["stringValue"],
            "500"
        );
    }

    #[test]
    fn test_histogram_and_gauge_encoding() {
        let registry = MetricsRegistry::new();
        registry
            .histogram("render_time", "Render")
            .unwrap()
            .record(12.5, &LabelSet::new());
        registry
            .observable_gauge("app_status", "Status")
            .unwrap()
            .register_callback(|| 1.0)
            .unwrap();

        let request = ExportMetricsServiceRequest::from_batch(&registry.collect(), "svc");
        let value = serde_json::to_value(&request).unwrap();
        let metrics = &value["resourceMetrics"][0]["scopeMetrics"][0]["metrics"];

        let point = &metrics[0]["histogram"]["dataPoints"][0];
        assert_eq!(point["count"], "1");
        assert_eq!(point["sum"], 12.5);
        assert_eq!(point["min"], 12.5);
        assert_eq!(
            point["bucketCounts"].as_array().unwrap().len(),
            point["explicitBounds"].as_array().unwrap().len() + 1
        );
        assert_eq!(metrics[1]["gauge"]["dataPoints"][0]["asDouble"], 1.0);
        assert!(metrics[1].get("unit").is_none());
    }

    #[test]
    fn test_timestamps_are_nanosecond_strings() {
        assert_eq!(millis_to_nanos(1_700_000_000_123), "1700000000123000000");
    }
}
