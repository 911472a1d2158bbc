//! Certificate inventory with days remaining until expiry.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use rusoto_acm::{
    Acm, AcmClient, CertificateDetail, DescribeCertificateRequest, ListCertificatesRequest,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AuditError;
use crate::report::render_table;
use crate::resource::SENTINEL;

const PAGE_SIZE: i64 = 100;
const SECONDS_PER_DAY: i64 = 86_400;
const DATE_FORMAT: &str = "%Y-%m-%d";
const CERTIFICATE_HEADER: [&str; 8] = [
    "CertificateArn",
    "DomainName",
    "Status",
    "Type",
    "IssuedAt",
    "NotBefore",
    "NotAfter",
    "DaysToExpiry",
];

#[async_trait]
pub trait CertificateDirectory: Send + Sync {
    async fn list_certificate_arns(&self) -> Result<Vec<String>, AuditError>;
    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, AuditError>;
}

pub struct AcmCertificateClient {
    client: AcmClient,
}

impl AcmCertificateClient {
    pub fn new_with_client(client: AcmClient) -> Self {
        AcmCertificateClient { client }
    }
}

#[async_trait]
impl CertificateDirectory for AcmCertificateClient {
    async fn list_certificate_arns(&self) -> Result<Vec<String>, AuditError> {
        let mut arns = vec![];
        let mut next_token = None;
        loop {
            let result = self
                .client
                .list_certificates(ListCertificatesRequest {
                    next_token: next_token.take(),
                    max_items: Some(PAGE_SIZE),
                    ..Default::default()
                })
                .await
                .map_err(|e| AuditError::api("ListCertificates", e))?;
            arns.extend(
                result
                    .certificate_summary_list
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|summary| summary.certificate_arn),
            );
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = arns.len(), "listed certificates");
        Ok(arns)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, AuditError> {
        self.client
            .describe_certificate(DescribeCertificateRequest {
                certificate_arn: arn.to_string(),
            })
            .await
            .map_err(|e| AuditError::api("DescribeCertificate", e))?
            .certificate
            .ok_or(AuditError::NoneValue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRow {
    pub arn: String,
    pub domain_name: String,
    pub status: String,
    pub certificate_type: String,
    pub issued_at: String,
    pub not_before: String,
    pub not_after: String,
    pub days_to_expiry: Option<i64>,
}

fn epoch(seconds: Option<f64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|seconds| Utc.timestamp_opt(seconds.floor() as i64, 0).single())
}

fn date_or_sentinel(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || SENTINEL.to_string(),
        |time| time.format(DATE_FORMAT).to_string(),
    )
}

fn or_sentinel(value: Option<String>) -> String {
    value.unwrap_or_else(|| SENTINEL.to_string())
}

impl CertificateRow {
    /// Days to expiry are whole days rounded down, so a certificate that
    /// expired an hour ago reports -1.
    pub fn new(arn: String, detail: CertificateDetail, now: DateTime<Utc>) -> Self {
        let not_after = epoch(detail.not_after);
        CertificateRow {
            arn,
            domain_name: or_sentinel(detail.domain_name),
            status: or_sentinel(detail.status),
            certificate_type: or_sentinel(detail.type_),
            issued_at: date_or_sentinel(epoch(detail.issued_at)),
            not_before: date_or_sentinel(epoch(detail.not_before)),
            not_after: date_or_sentinel(not_after),
            days_to_expiry: not_after
                .map(|not_after| (not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)),
        }
    }
}

#[derive(Debug, Default)]
pub struct CertificateReport {
    pub rows: Vec<CertificateRow>,
    /// ARNs whose description could not be read.
    pub failures: Vec<String>,
}

impl CertificateReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub fn render_certificates(report: &CertificateReport) -> Vec<u8> {
    let days: Vec<String> = report
        .rows
        .iter()
        .map(|row| {
            row.days_to_expiry
                .map_or_else(|| SENTINEL.to_string(), |days| days.to_string())
        })
        .collect();
    render_table(
        CERTIFICATE_HEADER.iter().copied(),
        report.rows.iter().zip(days.iter()).map(|(row, days)| {
            vec![
                row.arn.as_str(),
                row.domain_name.as_str(),
                row.status.as_str(),
                row.certificate_type.as_str(),
                row.issued_at.as_str(),
                row.not_before.as_str(),
                row.not_after.as_str(),
                days.as_str(),
            ]
        }),
    )
}

pub struct CertificateAuditor {
    directory: Arc<dyn CertificateDirectory>,
    max_concurrency: usize,
}

impl CertificateAuditor {
    pub fn new(directory: Arc<dyn CertificateDirectory>, max_concurrency: usize) -> Self {
        CertificateAuditor {
            directory,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Describes every listed certificate, keeping listing order. A failed
    /// listing fails the run; a failed description only drops that row.
    pub async fn collect(&self, now: DateTime<Utc>) -> Result<CertificateReport, AuditError> {
        let arns = self.directory.list_certificate_arns().await?;
        let described: Vec<_> = stream::iter(arns)
            .map(|arn| async move {
                let detail = self.directory.describe_certificate(&arn).await;
                (arn, detail)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut report = CertificateReport::default();
        for (arn, detail) in described {
            match detail {
                Ok(detail) => report.rows.push(CertificateRow::new(arn, detail, now)),
                Err(error) => {
                    warn!(certificate = %arn, error = %error, "skipping certificate");
                    report.failures.push(arn);
                }
            }
        }
        info!(
            count = report.rows.len(),
            failed = report.failures.len(),
            "described certificates"
        );
        Ok(report)
    }
}
