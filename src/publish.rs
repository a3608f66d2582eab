//! Metric publishing.
//!
//! One datapoint per cycle goes to CloudWatch `PutMetricData`. Failures are
//! logged with whatever diagnostics the service returned and then dropped;
//! they never end the run.
//!
//! CHANGELOG:
//! - 10/18/2026 - Log HTTP status and request id on failure (Phase 2)
//! - 10/18/2026 - Initial implementation (Phase 1)

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudwatch::config::http::HttpResponse;
use aws_sdk_cloudwatch::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatch::operation::put_metric_data::PutMetricDataError;
use aws_sdk_cloudwatch::operation::RequestId;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

use crate::config::MetricSettings;

/// CloudWatch unit for queue sizes.
pub const COUNT_UNIT: &str = "Count";

/// A single (namespace, name, timestamp, unit, value) submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDatapoint {
    pub namespace: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub unit: &'static str,
    pub value: f64,
}

impl MetricDatapoint {
    /// Count datapoint for `total`, stamped now.
    pub fn count(metric: &MetricSettings, total: i64) -> Self {
        Self::count_at(metric, total, Utc::now())
    }

    pub fn count_at(metric: &MetricSettings, total: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            namespace: metric.namespace.clone(),
            name: metric.name.clone(),
            timestamp,
            unit: COUNT_UNIT,
            value: total as f64,
        }
    }
}

/// A failed publish, with whatever the service told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishError {
    pub code: Option<String>,
    pub message: String,
    pub status: Option<u16>,
    pub request_id: Option<String>,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{}: ", code)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }
        if let Some(id) = &self.request_id {
            write!(f, " [request id {}]", id)?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishError {}

impl From<SdkError<PutMetricDataError, HttpResponse>> for PublishError {
    fn from(err: SdkError<PutMetricDataError, HttpResponse>) -> Self {
        Self {
            code: err.code().map(str::to_string),
            message: err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
            status: err.raw_response().map(|resp| resp.status().as_u16()),
            request_id: err.request_id().map(str::to_string),
        }
    }
}

/// Destination for datapoints.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn put(&self, datapoint: &MetricDatapoint) -> Result<(), PublishError>;
}

/// `PutMetricData` against CloudWatch.
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchSink {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl MetricSink for CloudWatchSink {
    async fn put(&self, datapoint: &MetricDatapoint) -> Result<(), PublishError> {
        let datum = MetricDatum::builder()
            .metric_name(&datapoint.name)
            .timestamp(AwsDateTime::from_millis(datapoint.timestamp.timestamp_millis()))
            .unit(StandardUnit::from(datapoint.unit))
            .value(datapoint.value)
            .build();

        let output = self
            .client
            .put_metric_data()
            .namespace(&datapoint.namespace)
            .metric_data(datum)
            .send()
            .await?;
        debug!(response = ?output, "PutMetricData response");
        Ok(())
    }
}

/// Send `datapoint` and log the outcome. Returns whether it was accepted.
pub async fn publish<S: MetricSink + ?Sized>(sink: &S, datapoint: &MetricDatapoint) -> bool {
    match sink.put(datapoint).await {
        Ok(()) => {
            debug!(
                namespace = %datapoint.namespace,
                metric = %datapoint.name,
                value = datapoint.value,
                "published metric"
            );
            true
        }
        Err(e) => {
            error!(
                code = e.code.as_deref(),
                message = %e.message,
                status = e.status,
                request_id = e.request_id.as_deref(),
                "failed to publish metric"
            );
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use chrono::TimeZone;

    fn settings() -> MetricSettings {
        MetricSettings {
            name: "redis-queue-size".to_string(),
            namespace: "Tropo Logstash ASG".to_string(),
        }
    }

    #[test]
    fn test_count_datapoint() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let dp = MetricDatapoint::count_at(&settings(), 15, ts);
        assert_eq!(dp.value, 15.0);
        assert_eq!(dp.unit, "Count");
        assert_eq!(dp.name, "redis-queue-size");
        assert_eq!(dp.namespace, "Tropo Logstash ASG");
        assert_eq!(dp.timestamp, ts);
    }

    #[test]
    fn test_count_is_stamped_now() {
        let before = Utc::now();
        let dp = MetricDatapoint::count(&settings(), 0);
        assert!(dp.timestamp >= before && dp.timestamp <= Utc::now());
    }

    #[test]
    fn test_count_unit_is_a_cloudwatch_unit() {
        assert_eq!(StandardUnit::from(COUNT_UNIT), StandardUnit::Count);
    }

    #[test]
    fn test_publish_error_display() {
        let err = PublishError {
            code: Some("Throttling".to_string()),
            message: "Rate exceeded".to_string(),
            status: Some(400),
            request_id: Some("abc-123".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Throttling: Rate exceeded (status 400) [request id abc-123]"
        );

        let bare = PublishError {
            message: "dispatch failure".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.to_string(), "dispatch failure");
    }

    #[tokio::test]
    async fn test_publish_success() {
        let sink = RecordingSink::default();
        let dp = MetricDatapoint::count(&settings(), 15);
        assert!(publish(&sink, &dp).await);
        assert_eq!(sink.received(), vec![dp]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported_not_raised() {
        let sink = RecordingSink::failing(PublishError {
            code: Some("AccessDenied".to_string()),
            message: "not authorized".to_string(),
            ..Default::default()
        });
        let dp = MetricDatapoint::count(&settings(), 3);
        assert!(!publish(&sink, &dp).await);
        assert_eq!(sink.received().len(), 1);
    }
}
