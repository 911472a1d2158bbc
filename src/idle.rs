//! Cleanup candidates found by simple threshold heuristics.
//!
//! Every category is collected independently. A category whose listing
//! fails contributes no entries and is recorded in
//! [`IdleReport::failures`]; per-item lookups inside a category (role
//! policies, function metrics, access keys) that fail only skip that item.

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use rusoto_ec2::Instance;
use std::collections::HashSet;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AuditError;
use crate::functions::FunctionDirectory;
use crate::iam::IamDirectory;
use crate::inventory::Ec2Inventory;
use crate::metrics::InvocationCounter;
use crate::normalize::{expiry_status, EXPIRY_DATE_FORMAT, EXPIRY_TAG};
use crate::report::render_table;
use crate::resource::{tag_value, SENTINEL};
use crate::time_range::TimeRange;

const IDLE_HEADER: [&str; 5] = ["Category", "ResourceID", "Name", "Detail", "CreatedDate"];
const DEFAULT_GROUP: &str = "default";
const INACTIVE: &str = "Inactive";
const EXPIRY_HORIZON_DAYS: i64 = 90;
const GONE_STATES: [&str; 2] = ["shutting-down", "terminated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdleCategory {
    IdleVolume,
    SnapshotExpiry,
    OrphanedSnapshot,
    StoppedInstance,
    UnusedSecurityGroup,
    RoleWithoutPolicies,
    IdleFunction,
    InactiveAccessKey,
}

impl IdleCategory {
    pub const ALL: [IdleCategory; 8] = [
        IdleCategory::IdleVolume,
        IdleCategory::SnapshotExpiry,
        IdleCategory::OrphanedSnapshot,
        IdleCategory::StoppedInstance,
        IdleCategory::UnusedSecurityGroup,
        IdleCategory::RoleWithoutPolicies,
        IdleCategory::IdleFunction,
        IdleCategory::InactiveAccessKey,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IdleCategory::IdleVolume => "Idle Volume",
            IdleCategory::SnapshotExpiry => "Snapshot Expiry",
            IdleCategory::OrphanedSnapshot => "Orphaned Snapshot",
            IdleCategory::StoppedInstance => "Stopped Instance",
            IdleCategory::UnusedSecurityGroup => "Unused Security Group",
            IdleCategory::RoleWithoutPolicies => "Role Without Policies",
            IdleCategory::IdleFunction => "Idle Function",
            IdleCategory::InactiveAccessKey => "Inactive Access Key",
        }
    }
}

impl Display for IdleCategory {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleEntry {
    pub category: IdleCategory,
    pub resource_id: String,
    pub name: String,
    pub detail: String,
    pub created_date: String,
}

impl IdleEntry {
    fn new(category: IdleCategory, resource_id: Option<&str>) -> Self {
        IdleEntry {
            category,
            resource_id: resource_id.unwrap_or(SENTINEL).to_string(),
            name: SENTINEL.to_string(),
            detail: SENTINEL.to_string(),
            created_date: SENTINEL.to_string(),
        }
    }

    fn name(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.name = name.to_string();
        }
        self
    }

    fn detail<V: Into<String>>(mut self, detail: Option<V>) -> Self {
        if let Some(detail) = detail {
            self.detail = detail.into();
        }
        self
    }

    fn created(mut self, created_date: Option<&str>) -> Self {
        if let Some(created_date) = created_date {
            self.created_date = created_date.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFailure {
    pub category: IdleCategory,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct IdleReport {
    pub entries: Vec<IdleEntry>,
    pub failures: Vec<CategoryFailure>,
}

impl IdleReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Entry count of every category that was collected, in category order.
pub fn summary(report: &IdleReport) -> Vec<(IdleCategory, usize)> {
    let failed: HashSet<IdleCategory> = report.failures.iter().map(|f| f.category).collect();
    IdleCategory::ALL
        .iter()
        .filter(|category| !failed.contains(*category))
        .map(|category| {
            let count = report
                .entries
                .iter()
                .filter(|entry| entry.category == *category)
                .count();
            (*category, count)
        })
        .collect()
}

fn state_name(instance: &Instance) -> Option<&str> {
    instance.state.as_ref().and_then(|state| state.name.as_deref())
}

/// What is wrong with a snapshot's `ExpiryDate` tag, if anything. Missing
/// and malformed tags are flagged, as are dates beyond the horizon.
fn expiry_issue(tag: Option<&str>, today: NaiveDate) -> Option<String> {
    match expiry_status(tag, today) {
        "N/A" => Some(format!("{EXPIRY_TAG} tag missing")),
        "Invalid Format" => Some(format!(
            "invalid {EXPIRY_TAG} '{}', expected YYYY-MM-DD",
            tag.unwrap_or_default().trim()
        )),
        _ => {
            let date = NaiveDate::parse_from_str(tag?.trim(), EXPIRY_DATE_FORMAT).ok()?;
            let days_ahead = (date - today).num_days();
            if days_ahead > EXPIRY_HORIZON_DAYS {
                Some(format!("{EXPIRY_TAG} {date} is {days_ahead} days ahead"))
            } else {
                None
            }
        }
    }
}

pub fn render_idle(report: &IdleReport) -> Vec<u8> {
    render_table(
        IDLE_HEADER.iter().copied(),
        report.entries.iter().map(|entry| {
            vec![
                entry.category.label(),
                entry.resource_id.as_str(),
                entry.name.as_str(),
                entry.detail.as_str(),
                entry.created_date.as_str(),
            ]
        }),
    )
}

pub struct IdleFinder {
    inventory: Arc<dyn Ec2Inventory>,
    iam: Arc<dyn IamDirectory>,
    functions: Arc<dyn FunctionDirectory>,
    metrics: Arc<dyn InvocationCounter>,
    lookback_days: u32,
    max_concurrency: usize,
}

impl IdleFinder {
    pub fn new(
        inventory: Arc<dyn Ec2Inventory>,
        iam: Arc<dyn IamDirectory>,
        functions: Arc<dyn FunctionDirectory>,
        metrics: Arc<dyn InvocationCounter>,
        lookback_days: u32,
        max_concurrency: usize,
    ) -> Self {
        IdleFinder {
            inventory,
            iam,
            functions,
            metrics,
            lookback_days,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn find(&self, now: DateTime<Utc>) -> IdleReport {
        let mut report = IdleReport::default();
        for category in IdleCategory::ALL.iter() {
            match self.category(*category, now).await {
                Ok(entries) => {
                    info!(category = %category, count = entries.len(), "found idle resources");
                    report.entries.extend(entries);
                }
                Err(error) => {
                    warn!(category = %category, error = %error, "skipping idle category");
                    report.failures.push(CategoryFailure {
                        category: *category,
                        error: error.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn category(
        &self,
        category: IdleCategory,
        now: DateTime<Utc>,
    ) -> Result<Vec<IdleEntry>, AuditError> {
        let today = now.naive_utc().date();
        match category {
            IdleCategory::IdleVolume => self.idle_volumes().await,
            IdleCategory::SnapshotExpiry => self.snapshot_expiry_issues(today).await,
            IdleCategory::OrphanedSnapshot => self.orphaned_snapshots(today).await,
            IdleCategory::StoppedInstance => self.stopped_instances().await,
            IdleCategory::UnusedSecurityGroup => self.unused_security_groups().await,
            IdleCategory::RoleWithoutPolicies => self.roles_without_policies().await,
            IdleCategory::IdleFunction => self.idle_functions(now).await,
            IdleCategory::InactiveAccessKey => self.inactive_access_keys().await,
        }
    }

    async fn idle_volumes(&self) -> Result<Vec<IdleEntry>, AuditError> {
        Ok(self
            .inventory
            .list_volumes()
            .await?
            .into_iter()
            .filter(|volume| volume.state.as_deref() == Some("available"))
            .map(|volume| {
                let detail = format!(
                    "{} GiB {}",
                    volume.size.map_or_else(|| SENTINEL.to_string(), |s| s.to_string()),
                    volume.volume_type.as_deref().unwrap_or(SENTINEL)
                );
                IdleEntry::new(IdleCategory::IdleVolume, volume.volume_id.as_deref())
                    .name(tag_value(volume.tags.as_deref(), "Name"))
                    .detail(Some(detail))
                    .created(volume.create_time.as_deref())
            })
            .collect())
    }

    async fn snapshot_expiry_issues(&self, today: NaiveDate) -> Result<Vec<IdleEntry>, AuditError> {
        Ok(self
            .inventory
            .list_snapshots()
            .await?
            .into_iter()
            .filter_map(|snapshot| {
                let tags = snapshot.tags.as_deref();
                let issue = expiry_issue(tag_value(tags, EXPIRY_TAG), today)?;
                Some(
                    IdleEntry::new(IdleCategory::SnapshotExpiry, snapshot.snapshot_id.as_deref())
                        .name(tag_value(tags, "Name"))
                        .detail(Some(issue))
                        .created(snapshot.start_time.as_deref()),
                )
            })
            .collect())
    }

    /// Untagged snapshots whose source volume is gone and whose description
    /// names no live instance.
    async fn orphaned_snapshots(&self, today: NaiveDate) -> Result<Vec<IdleEntry>, AuditError> {
        let snapshots = self.inventory.list_snapshots().await?;
        let volumes: HashSet<String> = self
            .inventory
            .list_volumes()
            .await?
            .into_iter()
            .filter_map(|volume| volume.volume_id)
            .collect();
        let instances: Vec<String> = self
            .inventory
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| {
                state_name(instance).map_or(true, |state| !GONE_STATES.contains(&state))
            })
            .filter_map(|instance| instance.instance_id)
            .map(|id| id.to_lowercase())
            .collect();

        Ok(snapshots
            .into_iter()
            .filter(|snapshot| {
                expiry_status(tag_value(snapshot.tags.as_deref(), EXPIRY_TAG), today) == "N/A"
            })
            .filter(|snapshot| {
                snapshot
                    .volume_id
                    .as_ref()
                    .map_or(true, |id| !volumes.contains(id))
            })
            .filter(|snapshot| {
                let description = snapshot
                    .description
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                !instances.iter().any(|id| description.contains(id.as_str()))
            })
            .map(|snapshot| {
                let detail = format!(
                    "volume {} no longer exists",
                    snapshot.volume_id.as_deref().unwrap_or(SENTINEL)
                );
                IdleEntry::new(IdleCategory::OrphanedSnapshot, snapshot.snapshot_id.as_deref())
                    .name(tag_value(snapshot.tags.as_deref(), "Name"))
                    .detail(Some(detail))
                    .created(snapshot.start_time.as_deref())
            })
            .collect())
    }

    async fn stopped_instances(&self) -> Result<Vec<IdleEntry>, AuditError> {
        Ok(self
            .inventory
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| state_name(instance) == Some("stopped"))
            .map(|instance| {
                IdleEntry::new(IdleCategory::StoppedInstance, instance.instance_id.as_deref())
                    .name(tag_value(instance.tags.as_deref(), "Name"))
                    .detail(instance.instance_type)
                    .created(instance.launch_time.as_deref())
            })
            .collect())
    }

    async fn unused_security_groups(&self) -> Result<Vec<IdleEntry>, AuditError> {
        let groups = self.inventory.list_security_groups().await?;
        let interfaces = self.inventory.list_network_interfaces().await?;
        let referenced: HashSet<String> = interfaces
            .into_iter()
            .flat_map(|interface| interface.groups.unwrap_or_default())
            .filter_map(|group| group.group_id)
            .collect();
        Ok(groups
            .into_iter()
            .filter(|group| group.group_name.as_deref() != Some(DEFAULT_GROUP))
            .filter(|group| {
                group
                    .group_id
                    .as_ref()
                    .map_or(false, |id| !referenced.contains(id))
            })
            .map(|group| {
                IdleEntry::new(IdleCategory::UnusedSecurityGroup, group.group_id.as_deref())
                    .name(group.group_name.as_deref())
                    .detail(group.description)
            })
            .collect())
    }

    async fn roles_without_policies(&self) -> Result<Vec<IdleEntry>, AuditError> {
        let roles = self.iam.list_roles().await?;
        let checked: Vec<_> = stream::iter(roles)
            .map(|role| async move {
                let has_policies = self.iam.role_has_policies(&role.role_name).await;
                (role, has_policies)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut entries = vec![];
        for (role, has_policies) in checked {
            match has_policies {
                Ok(true) => {}
                Ok(false) => entries.push(
                    IdleEntry::new(IdleCategory::RoleWithoutPolicies, Some(role.role_id.as_str()))
                        .name(Some(role.role_name.as_str()))
                        .detail(Some(role.arn))
                        .created(Some(role.create_date.as_str())),
                ),
                Err(error) => {
                    warn!(role = %role.role_name, error = %error, "skipping role policy check")
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn idle_functions(&self, now: DateTime<Utc>) -> Result<Vec<IdleEntry>, AuditError> {
        let functions = self.functions.list_functions().await?;
        let range = TimeRange::lookback(now, self.lookback_days)?;
        let range = &range;
        let counted: Vec<_> = stream::iter(functions)
            .map(|function| async move {
                let total = match function.function_name.as_deref() {
                    Some(name) => self.metrics.invocations(name, range).await,
                    None => Err(AuditError::NoneValue),
                };
                (function, total)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut entries = vec![];
        for (function, total) in counted {
            match total {
                Ok(total) if total == 0.0 => entries.push(
                    IdleEntry::new(IdleCategory::IdleFunction, function.function_arn.as_deref())
                        .name(function.function_name.as_deref())
                        .detail(function.runtime)
                        .created(function.last_modified.as_deref()),
                ),
                Ok(_) => {}
                Err(error) => warn!(
                    function = function.function_name.as_deref().unwrap_or(SENTINEL),
                    error = %error,
                    "skipping function metric lookup"
                ),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn inactive_access_keys(&self) -> Result<Vec<IdleEntry>, AuditError> {
        let users = self.iam.list_users().await?;
        let listed: Vec<_> = stream::iter(users)
            .map(|user| async move {
                let keys = self.iam.list_access_keys(&user.user_name).await;
                (user, keys)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut entries = vec![];
        for (user, keys) in listed {
            match keys {
                Ok(keys) => entries.extend(
                    keys.into_iter()
                        .filter(|key| key.status.as_deref() == Some(INACTIVE))
                        .map(|key| {
                            IdleEntry::new(
                                IdleCategory::InactiveAccessKey,
                                key.access_key_id.as_deref(),
                            )
                            .name(Some(user.user_name.as_str()))
                            .detail(key.status)
                            .created(key.create_date.as_deref())
                        }),
                ),
                Err(error) => {
                    warn!(user = %user.user_name, error = %error, "skipping access key listing")
                }
            }
        }
        entries.sort_by(|a, b| (&a.name, &a.resource_id).cmp(&(&b.name, &b.resource_id)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::aggregator::tests::{sample_inventory, FakeInventory};
    use crate::error::{ApiErrorKind, AuditError};
    use crate::functions::FunctionDirectory;
    use crate::iam::IamDirectory;
    use crate::idle::{render_idle, summary, IdleCategory, IdleFinder, IdleReport};
    use crate::metrics::InvocationCounter;
    use crate::resource::ResourceKind;
    use crate::time_range::TimeRange;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rusoto_ec2::{
        GroupIdentifier, Instance, InstanceState, NetworkInterface, SecurityGroup, Snapshot, Tag,
    };
    use rusoto_iam::{AccessKeyMetadata, Role, User};
    use rusoto_lambda::FunctionConfiguration;
    use std::collections::{HashMap, HashSet};
    use std::str::FromStr;
    use std::sync::Arc;

    fn denied() -> AuditError {
        AuditError::Api {
            operation: "List",
            kind: ApiErrorKind::PermissionDenied,
            message: "AccessDenied".to_string(),
        }
    }

    #[derive(Default)]
    struct FakeIam {
        roles: Vec<(&'static str, Result<bool, ()>)>,
        keys: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
        failing_users: HashSet<&'static str>,
        failing_roles: bool,
    }

    #[async_trait]
    impl IamDirectory for FakeIam {
        async fn list_roles(&self) -> Result<Vec<Role>, AuditError> {
            if self.failing_roles {
                return Err(denied());
            }
            Ok(self
                .roles
                .iter()
                .map(|(name, _)| Role {
                    role_name: name.to_string(),
                    role_id: format!("AROA-{name}"),
                    arn: format!("arn:aws:iam::123456789012:role/{name}"),
                    create_date: "2020-01-01T00:00:00Z".to_string(),
                    ..Role::default()
                })
                .collect())
        }

        async fn role_has_policies(&self, role_name: &str) -> Result<bool, AuditError> {
            self.roles
                .iter()
                .find(|(name, _)| *name == role_name)
                .and_then(|(_, result)| result.ok())
                .ok_or_else(denied)
        }

        async fn list_users(&self) -> Result<Vec<User>, AuditError> {
            let mut names: Vec<&str> = self.keys.keys().copied().collect();
            names.sort();
            Ok(names
                .into_iter()
                .map(|name| User {
                    user_name: name.to_string(),
                    ..User::default()
                })
                .collect())
        }

        async fn list_access_keys(
            &self,
            user_name: &str,
        ) -> Result<Vec<AccessKeyMetadata>, AuditError> {
            if self.failing_users.contains(user_name) {
                return Err(denied());
            }
            Ok(self
                .keys
                .get(user_name)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(id, status)| AccessKeyMetadata {
                    access_key_id: Some(id.to_string()),
                    status: Some(status.to_string()),
                    user_name: Some(user_name.to_string()),
                    create_date: Some("2021-03-04T00:00:00Z".to_string()),
                })
                .collect())
        }
    }

    struct FakeFunctions(Vec<&'static str>);

    #[async_trait]
    impl FunctionDirectory for FakeFunctions {
        async fn list_functions(&self) -> Result<Vec<FunctionConfiguration>, AuditError> {
            Ok(self
                .0
                .iter()
                .map(|name| FunctionConfiguration {
                    function_name: Some(name.to_string()),
                    function_arn: Some(format!("arn:aws:lambda:us-east-1:123456789012:function:{name}")),
                    runtime: Some("python3.9".to_string()),
                    ..FunctionConfiguration::default()
                })
                .collect())
        }
    }

    /// Invocation totals per function; functions missing from the map fail.
    struct FakeCounter(HashMap<&'static str, f64>);

    #[async_trait]
    impl InvocationCounter for FakeCounter {
        async fn invocations(
            &self,
            function_name: &str,
            _time_range: &TimeRange,
        ) -> Result<f64, AuditError> {
            self.0.get(function_name).copied().ok_or(AuditError::NoneValue)
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_str("2024-06-15T00:00:00.0+00:00").unwrap()
    }

    fn finder(inventory: FakeInventory, iam: FakeIam, counts: HashMap<&'static str, f64>) -> IdleFinder {
        IdleFinder::new(
            Arc::new(inventory),
            Arc::new(iam),
            Arc::new(FakeFunctions(vec!["busy", "quiet", "broken"])),
            Arc::new(FakeCounter(counts)),
            30,
            10,
        )
    }

    fn counts() -> HashMap<&'static str, f64> {
        vec![("busy", 12.0), ("quiet", 0.0)].into_iter().collect()
    }

    fn ids(report: &IdleReport, category: IdleCategory) -> Vec<&str> {
        report
            .entries
            .iter()
            .filter(|entry| entry.category == category)
            .map(|entry| entry.resource_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_find_every_category() {
        let mut inventory = sample_inventory();
        inventory.groups.push(SecurityGroup {
            group_id: Some("sg-default".to_string()),
            group_name: Some("default".to_string()),
            ..SecurityGroup::default()
        });
        let iam = FakeIam {
            roles: vec![("zeta", Ok(false)), ("alpha", Ok(false)), ("used", Ok(true))],
            keys: vec![("bob", vec![("AKIA2", "Inactive"), ("AKIA1", "Active")])]
                .into_iter()
                .collect(),
            ..FakeIam::default()
        };

        let report = finder(inventory, iam, counts()).find(now()).await;

        assert!(!report.is_partial());
        assert_eq!(ids(&report, IdleCategory::IdleVolume), vec!["vol-idle"]);
        assert_eq!(ids(&report, IdleCategory::StoppedInstance), vec!["i-stopped"]);
        assert_eq!(ids(&report, IdleCategory::UnusedSecurityGroup), vec!["sg-1"]);
        assert_eq!(
            ids(&report, IdleCategory::RoleWithoutPolicies),
            vec!["AROA-alpha", "AROA-zeta"]
        );
        assert_eq!(ids(&report, IdleCategory::InactiveAccessKey), vec!["AKIA2"]);
        let idle_functions: Vec<&str> = report
            .entries
            .iter()
            .filter(|entry| entry.category == IdleCategory::IdleFunction)
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(idle_functions, vec!["quiet"]);
    }

    #[tokio::test]
    async fn test_referenced_group_is_not_unused() {
        let mut inventory = sample_inventory();
        inventory.interfaces = vec![NetworkInterface {
            network_interface_id: Some("eni-1".to_string()),
            groups: Some(vec![GroupIdentifier {
                group_id: Some("sg-1".to_string()),
                group_name: Some("web".to_string()),
            }]),
            ..NetworkInterface::default()
        }];

        let report = finder(inventory, FakeIam::default(), counts()).find(now()).await;

        assert!(ids(&report, IdleCategory::UnusedSecurityGroup).is_empty());
    }

    #[tokio::test]
    async fn test_failed_role_lookup_skips_role() {
        let iam = FakeIam {
            roles: vec![("flaky", Err(())), ("orphan", Ok(false))],
            ..FakeIam::default()
        };

        let report = finder(sample_inventory(), iam, counts()).find(now()).await;

        assert_eq!(
            ids(&report, IdleCategory::RoleWithoutPolicies),
            vec!["AROA-orphan"]
        );
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_failed_user_skips_only_that_user() {
        let iam = FakeIam {
            keys: vec![
                ("alice", vec![("AKIA3", "Inactive")]),
                ("bob", vec![("AKIA4", "Inactive")]),
            ]
            .into_iter()
            .collect(),
            failing_users: vec!["alice"].into_iter().collect(),
            ..FakeIam::default()
        };

        let report = finder(sample_inventory(), iam, counts()).find(now()).await;

        assert_eq!(ids(&report, IdleCategory::InactiveAccessKey), vec!["AKIA4"]);
    }

    #[tokio::test]
    async fn test_failed_category_is_isolated() {
        let mut inventory = sample_inventory();
        inventory.failing.insert(ResourceKind::BlockVolume);
        let iam = FakeIam {
            failing_roles: true,
            ..FakeIam::default()
        };

        let report = finder(inventory, iam, counts()).find(now()).await;

        let failed: Vec<IdleCategory> = report.failures.iter().map(|f| f.category).collect();
        assert_eq!(
            failed,
            vec![
                IdleCategory::IdleVolume,
                IdleCategory::OrphanedSnapshot,
                IdleCategory::RoleWithoutPolicies
            ]
        );
        assert_eq!(ids(&report, IdleCategory::StoppedInstance), vec!["i-stopped"]);
        let summary = summary(&report);
        assert_eq!(summary.len(), 5);
        assert_eq!(summary[0], (IdleCategory::SnapshotExpiry, 0));
        assert_eq!(summary[1], (IdleCategory::StoppedInstance, 1));
    }

    fn snapshot(
        id: &str,
        expiry: Option<&str>,
        volume_id: Option<&str>,
        description: Option<&str>,
    ) -> Snapshot {
        Snapshot {
            snapshot_id: Some(id.to_string()),
            volume_id: volume_id.map(str::to_string),
            description: description.map(str::to_string),
            start_time: Some("2024-01-10T00:00:00.000Z".to_string()),
            tags: expiry.map(|value| {
                vec![Tag {
                    key: Some("ExpiryDate".to_string()),
                    value: Some(value.to_string()),
                }]
            }),
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_expiry_issues() {
        let mut inventory = sample_inventory();
        inventory.snapshots = vec![
            snapshot("snap-missing", None, Some("vol-idle"), None),
            snapshot("snap-blank", Some(" "), Some("vol-idle"), None),
            snapshot("snap-invalid", Some("15/06/2024"), None, None),
            snapshot("snap-far", Some("2025-01-01"), None, None),
            snapshot("snap-near", Some("2024-08-01"), None, None),
            snapshot("snap-expired", Some("2024-01-01"), None, None),
        ];

        let report = finder(inventory, FakeIam::default(), counts()).find(now()).await;

        assert_eq!(
            ids(&report, IdleCategory::SnapshotExpiry),
            vec!["snap-missing", "snap-blank", "snap-invalid", "snap-far"]
        );
        let details: Vec<&str> = report
            .entries
            .iter()
            .filter(|entry| entry.category == IdleCategory::SnapshotExpiry)
            .map(|entry| entry.detail.as_str())
            .collect();
        assert_eq!(
            details,
            vec![
                "ExpiryDate tag missing",
                "ExpiryDate tag missing",
                "invalid ExpiryDate '15/06/2024', expected YYYY-MM-DD",
                "ExpiryDate 2025-01-01 is 200 days ahead",
            ]
        );
        assert!(ids(&report, IdleCategory::OrphanedSnapshot).is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_snapshots() {
        let mut inventory = sample_inventory();
        inventory.instances.push(Instance {
            instance_id: Some("i-gone".to_string()),
            state: Some(InstanceState {
                code: Some(48),
                name: Some("terminated".to_string()),
            }),
            ..Instance::default()
        });
        inventory.snapshots = vec![
            snapshot("snap-orphan", None, Some("vol-deleted"), None),
            snapshot("snap-live-volume", None, Some("vol-idle"), None),
            snapshot("snap-tagged", Some("2024-07-01"), Some("vol-deleted"), None),
            snapshot(
                "snap-image",
                None,
                Some("vol-deleted"),
                Some("Created by CreateImage(I-STOPPED) for ami-1"),
            ),
            snapshot(
                "snap-terminated",
                None,
                Some("vol-deleted"),
                Some("Created by CreateImage(i-gone) for ami-2"),
            ),
        ];

        let report = finder(inventory, FakeIam::default(), counts()).find(now()).await;

        assert_eq!(
            ids(&report, IdleCategory::OrphanedSnapshot),
            vec!["snap-orphan", "snap-terminated"]
        );
        let orphan = report
            .entries
            .iter()
            .find(|entry| entry.category == IdleCategory::OrphanedSnapshot)
            .unwrap();
        assert_eq!(orphan.detail, "volume vol-deleted no longer exists");
        assert_eq!(orphan.created_date, "2024-01-10T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_lookback_out_of_range_fails_functions_only() {
        let report = IdleFinder::new(
            Arc::new(sample_inventory()),
            Arc::new(FakeIam::default()),
            Arc::new(FakeFunctions(vec!["quiet"])),
            Arc::new(FakeCounter(counts())),
            u32::MAX,
            10,
        )
        .find(now())
        .await;

        let failed: Vec<IdleCategory> = report.failures.iter().map(|f| f.category).collect();
        assert_eq!(failed, vec![IdleCategory::IdleFunction]);
        assert_eq!(ids(&report, IdleCategory::IdleVolume), vec!["vol-idle"]);
    }

    #[tokio::test]
    async fn test_render_idle() {
        let report = finder(sample_inventory(), FakeIam::default(), counts())
            .find(now())
            .await;

        let output = String::from_utf8(render_idle(&report)).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "Category,ResourceID,Name,Detail,CreatedDate");
        assert_eq!(lines[1], "Idle Volume,vol-idle,N/A,20 GiB N/A,N/A");
        assert_eq!(lines[2], "Stopped Instance,i-stopped,N/A,N/A,N/A");
        assert_eq!(lines.len(), 1 + report.entries.len());
    }
}
