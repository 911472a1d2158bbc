//! Lifecycle tags for resources announced by API-activity events.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::AuditError;
use crate::inventory::ResourceTagger;
use crate::normalize::{EXPIRY_DATE_FORMAT, EXPIRY_TAG};

const DELETE_ON_TAG: &str = "DeleteOn";
const RETENTION_TAG: &str = "Retention";
const ROOT_CREATOR: &str = "root";

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEvent {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub detail: ActivityDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetail {
    pub event_name: String,
    #[serde(default)]
    pub user_identity: Option<UserIdentity>,
    #[serde(default)]
    pub response_elements: Option<Value>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(rename = "type")]
    pub identity_type: Option<String>,
    pub arn: Option<String>,
    pub principal_id: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedKind {
    Instance,
    Volume,
    Snapshot,
    Image,
    SecurityGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub kind: CreatedKind,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingOutcome {
    pub event_name: String,
    pub creator: Option<String>,
    pub tagged: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Who performed the call, derived from the event's caller identity.
pub fn creator(identity: &UserIdentity) -> Option<String> {
    let last_segment = || {
        identity
            .arn
            .as_deref()
            .and_then(|arn| arn.rsplit('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    };
    match identity.identity_type.as_deref() {
        Some("AssumedRole") => last_segment(),
        Some("IAMUser") => identity.user_name.clone().or_else(last_segment),
        Some("Root") => Some(ROOT_CREATOR.to_string()),
        _ => identity.principal_id.clone(),
    }
}

fn string_at(value: &Value, pointer: &str) -> Result<String, AuditError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuditError::Event(format!("missing {pointer} in responseElements")))
}

/// `value` as a list, accepting a lone object in place of a one-item array.
fn items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => vec![],
        Some(item) => vec![item],
    }
}

/// Resources created by `event_name`, or `None` for an event this tagger
/// does not handle.
pub fn created_resources(
    event_name: &str,
    elements: &Value,
) -> Option<Result<Vec<CreatedResource>, AuditError>> {
    let single = |kind: CreatedKind, pointer: &str| {
        string_at(elements, pointer).map(|id| vec![CreatedResource { kind, id }])
    };
    // An empty list means the response shape is not the one we know.
    let listed = |kind: CreatedKind,
                  lists: &[&str],
                  pointer: &str|
     -> Result<Vec<CreatedResource>, AuditError> {
        let found = lists
            .iter()
            .map(|list| items(elements.pointer(list)))
            .find(|found| !found.is_empty())
            .ok_or_else(|| {
                AuditError::Event(format!("no {} in responseElements", lists.join(" or ")))
            })?;
        found
            .into_iter()
            .map(|item| string_at(item, pointer).map(|id| CreatedResource { kind, id }))
            .collect()
    };
    let resources = match event_name {
        "RunInstances" => listed(CreatedKind::Instance, &["/instancesSet/items"], "/instanceId"),
        "CreateVolume" => single(CreatedKind::Volume, "/volumeId"),
        "CreateSnapshot" => single(CreatedKind::Snapshot, "/snapshotId"),
        "CreateSnapshots" => listed(
            CreatedKind::Snapshot,
            &["/CreateSnapshotsResponse/snapshotSet/item", "/snapshotSet/item"],
            "/snapshotId",
        ),
        "CreateImage" => single(CreatedKind::Image, "/imageId"),
        "CreateSecurityGroup" => single(CreatedKind::SecurityGroup, "/groupId"),
        _ => return None,
    };
    Some(resources)
}

/// `ExpiryDate`, `DeleteOn` and `Retention` for a snapshot created on `today`.
pub fn retention_tags(
    today: NaiveDate,
    retention_days: u32,
) -> Result<Vec<(String, String)>, AuditError> {
    let expiry = today
        .checked_add_signed(Duration::days(i64::from(retention_days)))
        .ok_or_else(|| {
            AuditError::Config(format!("retention of {retention_days} days is out of range"))
        })?
        .format(EXPIRY_DATE_FORMAT)
        .to_string();
    Ok(vec![
        (EXPIRY_TAG.to_string(), expiry.clone()),
        (DELETE_ON_TAG.to_string(), expiry),
        (RETENTION_TAG.to_string(), format!("{retention_days}days")),
    ])
}

pub struct LifecycleTagger {
    tagger: Arc<dyn ResourceTagger>,
    creator_tag: String,
    retention_days: u32,
}

impl LifecycleTagger {
    pub fn new(tagger: Arc<dyn ResourceTagger>, creator_tag: String, retention_days: u32) -> Self {
        LifecycleTagger {
            tagger,
            creator_tag,
            retention_days,
        }
    }

    /// Applies missing lifecycle tags to every resource `event` created.
    /// Tags already present are left alone, so a redelivered event is a
    /// no-op. Per-resource failures are collected in the outcome.
    pub async fn tag_event(
        &self,
        event: &ActivityEvent,
        today: NaiveDate,
    ) -> Result<TaggingOutcome, AuditError> {
        let detail = &event.detail;
        let identity = detail.user_identity.clone().unwrap_or_default();
        let mut outcome = TaggingOutcome {
            event_name: detail.event_name.clone(),
            creator: creator(&identity),
            ..TaggingOutcome::default()
        };
        info!(
            event = %detail.event_name,
            creator = outcome.creator.as_deref().unwrap_or("unknown"),
            identity_type = identity.identity_type.as_deref().unwrap_or("unknown"),
            "received activity event"
        );

        let elements = match detail.response_elements.as_ref() {
            Some(elements) if !elements.is_null() => elements,
            _ => {
                error!(
                    event = %detail.event_name,
                    error_code = detail.error_code.as_deref().unwrap_or("none"),
                    error_message = detail.error_message.as_deref().unwrap_or("none"),
                    "no responseElements in event"
                );
                return Ok(outcome);
            }
        };

        let resources = match created_resources(&detail.event_name, elements) {
            Some(resources) => resources?,
            None => {
                warn!(event = %detail.event_name, "ignoring unsupported event");
                return Ok(outcome);
            }
        };

        let creator = outcome.creator.clone();
        for resource in resources {
            let missing = self.missing_tags(&resource, creator.as_deref(), today).await;
            match missing {
                Ok(tags) if tags.is_empty() => outcome.skipped.push(resource.id),
                Ok(tags) => {
                    let ids = vec![resource.id.clone()];
                    match self.tagger.create_tags(&ids, &tags).await {
                        Ok(()) => {
                            info!(resource = %resource.id, count = tags.len(), "tagged resource");
                            outcome.tagged.push(resource.id);
                        }
                        Err(e) => {
                            warn!(resource = %resource.id, error = %e, "failed to tag resource");
                            outcome.failed.push(resource.id);
                        }
                    }
                }
                Err(e) => {
                    warn!(resource = %resource.id, error = %e, "failed to read tags");
                    outcome.failed.push(resource.id);
                }
            }
        }
        Ok(outcome)
    }

    async fn missing_tags(
        &self,
        resource: &CreatedResource,
        creator: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<(String, String)>, AuditError> {
        let existing = self.tagger.tags_of(&resource.id).await?;
        let present = |key: &str| existing.get(key).map_or(false, |value| !value.is_empty());

        let mut tags = vec![];
        if let Some(creator) = creator {
            if !present(&self.creator_tag) {
                tags.push((self.creator_tag.clone(), creator.to_string()));
            }
        }
        if resource.kind == CreatedKind::Snapshot && !present(EXPIRY_TAG) {
            tags.extend(retention_tags(today, self.retention_days)?);
        }
        Ok(tags)
    }
}
