use crate::error::AuditError;
use async_trait::async_trait;
use rusoto_s3::{PutObjectRequest, S3Client, S3};
use rusoto_sns::{PublishInput, Sns, SnsClient};
use std::fs;
use std::path::Path;
use tracing::info;

const CONTENT_TYPE: &str = "text/csv";
const SUBJECT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    pub uri: String,
    pub console_url: String,
}

impl ReportLocation {
    pub fn new(bucket: &str, key: &str) -> Self {
        ReportLocation {
            uri: format!("s3://{bucket}/{key}"),
            console_url: format!("https://s3.console.aws.amazon.com/s3/object/{bucket}/{key}"),
        }
    }
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn put_report(&self, key: &str, body: Vec<u8>) -> Result<ReportLocation, AuditError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AuditError>;
}

pub struct S3ReportSink {
    client: S3Client,
    bucket: String,
}

impl S3ReportSink {
    pub fn new_with_client(client: S3Client, bucket: String) -> Self {
        S3ReportSink { client, bucket }
    }
}

#[async_trait]
impl ReportSink for S3ReportSink {
    async fn put_report(&self, key: &str, body: Vec<u8>) -> Result<ReportLocation, AuditError> {
        let size = body.len();
        self.client
            .put_object(PutObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                body: Some(body.into()),
                content_type: Some(CONTENT_TYPE.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| AuditError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: e.to_string(),
            })?;
        info!(bucket = %self.bucket, key, size, "uploaded report");
        Ok(ReportLocation::new(&self.bucket, key))
    }
}

pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new_with_client(client: SnsClient, topic_arn: String) -> Self {
        SnsNotifier { client, topic_arn }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AuditError> {
        let result = self
            .client
            .publish(PublishInput {
                message: message.to_string(),
                subject: Some(truncate(subject, SUBJECT_LIMIT)),
                topic_arn: Some(self.topic_arn.clone()),
                ..Default::default()
            })
            .await
            .map_err(|e| AuditError::Notify(e.to_string()))?;
        info!(
            topic = %self.topic_arn,
            message_id = result.message_id.as_deref().unwrap_or("unknown"),
            "published notification"
        );
        Ok(())
    }
}

/// Writes the rendered report to `path`, replacing any previous file.
pub fn write_local(path: &Path, bytes: &[u8]) -> Result<(), AuditError> {
    fs::write(path, bytes)?;
    info!(path = %path.display(), size = bytes.len(), "wrote report");
    Ok(())
}

fn truncate(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

/// Subject and body of the message sent after a report run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub report: String,
    pub counts: Vec<(String, usize)>,
    pub failed: Vec<String>,
    pub location: Option<ReportLocation>,
}

impl Notification {
    pub fn subject(&self) -> String {
        let total: usize = self.counts.iter().map(|(_, count)| count).sum();
        let status = if self.failed.is_empty() {
            "complete"
        } else {
            "partial"
        };
        format!("{} report {}: {} resources", self.report, status, total)
    }

    pub fn body(&self) -> String {
        let mut lines = vec![format!("{} report", self.report), String::new()];
        for (label, count) in self.counts.iter() {
            lines.push(format!("{label}: {count}"));
        }
        if !self.failed.is_empty() {
            lines.push(String::new());
            lines.push(format!("Failed: {}", self.failed.join(", ")));
        }
        lines.push(String::new());
        match self.location.as_ref() {
            Some(location) => {
                lines.push(format!("Report: {}", location.uri));
                lines.push(format!("Console: {}", location.console_url));
            }
            None => lines.push("Report: not uploaded".to_string()),
        }
        lines.join("\n")
    }
}
