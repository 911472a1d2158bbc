use crate::error::AuditError;
use async_trait::async_trait;

use bigdecimal::{BigDecimal, ToPrimitive};
use rusoto_cloudwatch::{
    CloudWatch, CloudWatchClient, Datapoint, Dimension, GetMetricStatisticsInput,
};

use crate::time_range::TimeRange;
use std::ops::Add;
use tracing::debug;

const NAMESPACE: &str = "AWS/Lambda";
const INVOCATIONS: &str = "Invocations";
const FUNCTION_DIMENSION: &str = "FunctionName";
const SUM_STATISTIC: &str = "Sum";

#[async_trait]
pub trait InvocationCounter: Send + Sync {
    /// Total invocations of `function_name` within `time_range`.
    async fn invocations(
        &self,
        function_name: &str,
        time_range: &TimeRange,
    ) -> Result<f64, AuditError>;
}

pub struct CloudWatchMetricsClient {
    client: CloudWatchClient,
}

#[async_trait]
impl InvocationCounter for CloudWatchMetricsClient {
    async fn invocations(
        &self,
        function_name: &str,
        time_range: &TimeRange,
    ) -> Result<f64, AuditError> {
        let metrics = self
            .client
            .get_metric_statistics(GetMetricStatisticsInput {
                start_time: time_range.start_timestamp(),
                end_time: time_range.end_timestamp(),
                metric_name: INVOCATIONS.to_string(),
                namespace: NAMESPACE.to_string(),
                dimensions: Some(vec![Dimension {
                    name: FUNCTION_DIMENSION.to_string(),
                    value: function_name.to_string(),
                }]),
                period: period(time_range),
                statistics: Some(vec![SUM_STATISTIC.to_string()]),
                ..Default::default()
            })
            .await
            .map_err(|e| AuditError::api("GetMetricStatistics", e))?;
        let total = sum_data_points(metrics.datapoints)?;
        debug!(function = function_name, invocations = total, "summed invocations");
        Ok(total)
    }
}

impl CloudWatchMetricsClient {
    pub fn new_with_client(client: CloudWatchClient) -> Self {
        CloudWatchMetricsClient { client }
    }
}

/// One period covering the whole range, rounded up to a whole minute.
fn period(time_range: &TimeRange) -> i64 {
    (time_range.seconds() + 59) / 60 * 60
}

/// Adds up the `Sum` statistic of every data point. Invocations are counts,
/// so each sum is rounded to a whole number first.
fn sum_data_points(data_points: Option<Vec<Datapoint>>) -> Result<f64, AuditError> {
    let mut total = BigDecimal::from(0);
    for data_point in data_points.unwrap_or_default() {
        let sum = data_point
            .sum
            .map(|sum| BigDecimal::from(sum.round() as i64))
            .ok_or(AuditError::NoneValue)?;
        total = total.add(sum);
    }
    total.to_f64().ok_or(AuditError::ToPrimitive)
}
