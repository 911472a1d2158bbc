//! Invocation entry: routes an incoming event to one of the reports or the
//! lifecycle tagger and builds the JSON response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::certificates::{render_certificates, CertificateAuditor, CertificateDirectory};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::functions::FunctionDirectory;
use crate::iam::IamDirectory;
use crate::idle::{render_idle, summary, IdleFinder};
use crate::inventory::{Ec2Inventory, ResourceTagger};
use crate::metrics::InvocationCounter;
use crate::report::{render, report_key};
use crate::sink::{write_local, Notification, Notifier, ReportSink};
use crate::tagging::{ActivityEvent, LifecycleTagger, TaggingOutcome};

const SCHEDULED_SOURCE: &str = "aws.events";
const AUDIT_REPORT_NAME: &str = "resource-audit";
const IDLE_REPORT_NAME: &str = "idle-resources";
const CERTIFICATE_REPORT_NAME: &str = "acm-certificates";
const CERTIFICATE_COUNT_LABEL: &str = "Certificate";
const STATUS_OK: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Audit,
    Idle,
    Certificates,
}

impl ReportKind {
    fn as_str(self) -> &'static str {
        match self {
            ReportKind::Audit => "audit",
            ReportKind::Idle => "idle",
            ReportKind::Certificates => "certificates",
        }
    }
}

/// Scheduled or manual trigger asking for a report.
#[derive(Debug, Default, Deserialize)]
pub struct ReportEvent {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub report: Option<String>,
}

#[derive(Debug)]
pub enum Invocation {
    Tagging(ActivityEvent),
    Report { kind: ReportKind, scheduled: bool },
}

/// Decides what an event asks for. Events carrying `detail.eventName` are
/// API activity; anything else is a report request.
pub fn route(event: Value) -> Result<Invocation, AuditError> {
    if event.pointer("/detail/eventName").is_some() {
        let activity: ActivityEvent =
            serde_json::from_value(event).map_err(|e| AuditError::Event(e.to_string()))?;
        return Ok(Invocation::Tagging(activity));
    }
    let request: ReportEvent = if event.is_null() {
        ReportEvent::default()
    } else {
        serde_json::from_value(event).map_err(|e| AuditError::Event(e.to_string()))?
    };
    let kind = match request.report.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("audit") => ReportKind::Audit,
        Some("idle") => ReportKind::Idle,
        Some("certificates") => ReportKind::Certificates,
        Some(other) => {
            return Err(AuditError::Event(format!(
                "unknown report '{other}', expected 'audit', 'idle' or 'certificates'"
            )))
        }
    };
    Ok(Invocation::Report {
        kind,
        scheduled: request.source.as_deref() == Some(SCHEDULED_SOURCE),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub status_code: u16,
    pub report: &'static str,
    pub counts: BTreeMap<String, usize>,
    pub failed: Vec<String>,
    pub local_path: String,
    pub location: Option<String>,
    pub console_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingResponse {
    pub status_code: u16,
    pub report: &'static str,
    #[serde(flatten)]
    pub outcome: TaggingOutcome,
}

/// Client handles the application runs against.
pub struct Clients {
    pub inventory: Arc<dyn Ec2Inventory>,
    pub tagger: Arc<dyn ResourceTagger>,
    pub iam: Arc<dyn IamDirectory>,
    pub functions: Arc<dyn FunctionDirectory>,
    pub metrics: Arc<dyn InvocationCounter>,
    pub certificates: Arc<dyn CertificateDirectory>,
    pub report_sink: Option<Arc<dyn ReportSink>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

pub struct App {
    config: AuditConfig,
    aggregator: Aggregator,
    idle_finder: IdleFinder,
    certificate_auditor: CertificateAuditor,
    tagger: LifecycleTagger,
    report_sink: Option<Arc<dyn ReportSink>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl App {
    pub fn new(config: AuditConfig, clients: Clients) -> Self {
        App {
            aggregator: Aggregator::new(clients.inventory.clone()),
            idle_finder: IdleFinder::new(
                clients.inventory,
                clients.iam,
                clients.functions,
                clients.metrics,
                config.idle_lookback_days,
                config.max_concurrent_lookups,
            ),
            certificate_auditor: CertificateAuditor::new(
                clients.certificates,
                config.max_concurrent_lookups,
            ),
            tagger: LifecycleTagger::new(
                clients.tagger,
                config.creator_tag_name.clone(),
                config.retention_days,
            ),
            report_sink: clients.report_sink,
            notifier: clients.notifier,
            config,
        }
    }

    pub async fn handle(&self, event: Value, now: DateTime<Utc>) -> Result<Value, AuditError> {
        let response = match route(event)? {
            Invocation::Tagging(activity) => {
                let today = now.naive_utc().date();
                let outcome = self.tagger.tag_event(&activity, today).await?;
                to_value(&TaggingResponse {
                    status_code: STATUS_OK,
                    report: "tagging",
                    outcome,
                })?
            }
            Invocation::Report { kind, scheduled } => {
                let trigger = if scheduled { "scheduled" } else { "manual" };
                info!(report = kind.as_str(), trigger, "report requested");
                let response = match kind {
                    ReportKind::Audit => self.audit(now).await?,
                    ReportKind::Idle => self.idle(now).await?,
                    ReportKind::Certificates => self.certificates(now).await?,
                };
                to_value(&response)?
            }
        };
        Ok(response)
    }

    async fn audit(&self, now: DateTime<Utc>) -> Result<ReportResponse, AuditError> {
        let collection = self
            .aggregator
            .collect(&self.config.resource_types, now.naive_utc().date())
            .await;
        let counted = collection.counts();
        let failed: Vec<String> = collection
            .failures
            .iter()
            .map(|failure| failure.kind.to_string())
            .collect();
        if collection.is_partial() {
            warn!(failed = ?failed, "audit report is partial");
        }
        let counts = self
            .config
            .resource_types
            .iter()
            .filter(|kind| !failed.contains(&kind.to_string()))
            .map(|kind| (kind.to_string(), counted.get(kind).copied().unwrap_or(0)))
            .collect();

        let bytes = render(&collection.records);
        self.deliver(
            ReportKind::Audit,
            AUDIT_REPORT_NAME,
            &self.config.report_output_path,
            bytes,
            counts,
            failed,
            now,
        )
        .await
    }

    async fn idle(&self, now: DateTime<Utc>) -> Result<ReportResponse, AuditError> {
        let report = self.idle_finder.find(now).await;
        let counts = summary(&report)
            .into_iter()
            .map(|(category, count)| (category.to_string(), count))
            .collect();
        let failed: Vec<String> = report
            .failures
            .iter()
            .map(|failure| failure.category.to_string())
            .collect();
        if report.is_partial() {
            warn!(failed = ?failed, "idle report is partial");
        }

        let bytes = render_idle(&report);
        self.deliver(
            ReportKind::Idle,
            IDLE_REPORT_NAME,
            &self.config.idle_output_path,
            bytes,
            counts,
            failed,
            now,
        )
        .await
    }

    async fn certificates(&self, now: DateTime<Utc>) -> Result<ReportResponse, AuditError> {
        let report = self.certificate_auditor.collect(now).await?;
        if report.is_partial() {
            warn!(failed = ?report.failures, "certificate report is partial");
        }
        let counts = vec![(CERTIFICATE_COUNT_LABEL.to_string(), report.rows.len())];

        let bytes = render_certificates(&report);
        self.deliver(
            ReportKind::Certificates,
            CERTIFICATE_REPORT_NAME,
            &self.config.certificate_output_path,
            bytes,
            counts,
            report.failures,
            now,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        kind: ReportKind,
        name: &str,
        local_path: &Path,
        bytes: Vec<u8>,
        counts: Vec<(String, usize)>,
        failed: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<ReportResponse, AuditError> {
        write_local(local_path, &bytes)?;

        let location = match self.report_sink.as_ref() {
            Some(sink) => {
                let key = report_key(&self.config.report_key_prefix, name, now);
                Some(sink.put_report(&key, bytes).await?)
            }
            None => None,
        };

        if let Some(notifier) = self.notifier.as_ref() {
            let notification = Notification {
                report: kind.as_str().to_string(),
                counts: counts.clone(),
                failed: failed.clone(),
                location: location.clone(),
            };
            notifier
                .notify(&notification.subject(), &notification.body())
                .await?;
        }

        Ok(ReportResponse {
            status_code: STATUS_OK,
            report: kind.as_str(),
            counts: counts.into_iter().collect(),
            failed,
            local_path: local_path.display().to_string(),
            location: location.as_ref().map(|l| l.uri.clone()),
            console_url: location.map(|l| l.console_url),
        })
    }
}

fn to_value<T: Serialize>(response: &T) -> Result<Value, AuditError> {
    serde_json::to_value(response).map_err(|e| AuditError::Render(e.to_string()))
}
