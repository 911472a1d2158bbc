use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AuditError;
use crate::inventory::Ec2Inventory;
use crate::normalize::{normalize, RawResource};
use crate::resource::{ResourceKind, ResourceRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFailure {
    pub kind: ResourceKind,
    pub error: String,
}

/// Result of one aggregation run.
#[derive(Debug, Default)]
pub struct Collection {
    pub records: Vec<ResourceRecord>,
    pub failures: Vec<KindFailure>,
}

impl Collection {
    pub fn counts(&self) -> BTreeMap<ResourceKind, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.iter() {
            *counts.entry(record.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Aggregator {
    inventory: Arc<dyn Ec2Inventory>,
}

impl Aggregator {
    pub fn new(inventory: Arc<dyn Ec2Inventory>) -> Self {
        Aggregator { inventory }
    }

    /// Collects every requested kind in `ResourceKind::ALL` order. A kind
    /// whose listing fails contributes no records and is reported in
    /// `Collection::failures`.
    pub async fn collect(&self, kinds: &BTreeSet<ResourceKind>, today: NaiveDate) -> Collection {
        let mut collection = Collection::default();
        for kind in ResourceKind::ALL.iter().filter(|kind| kinds.contains(*kind)) {
            match self.fetch(*kind).await {
                Ok(raws) => {
                    info!(kind = %kind, count = raws.len(), "collected resources");
                    collection
                        .records
                        .extend(raws.iter().map(|raw| normalize(raw, today)));
                }
                Err(error) => {
                    warn!(
                        kind = %kind,
                        class = ?error.api_kind(),
                        error = %error,
                        "skipping resource kind"
                    );
                    collection.failures.push(KindFailure {
                        kind: *kind,
                        error: error.to_string(),
                    });
                }
            }
        }
        collection
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Vec<RawResource>, AuditError> {
        match kind {
            ResourceKind::ComputeInstance => {
                let instances = self.inventory.list_instances().await?;
                let statuses = self.nested_statuses(kind, self.inventory.instance_statuses()).await;
                Ok(instances
                    .into_iter()
                    .map(|instance| {
                        let status = lookup(&statuses, instance.instance_id.as_deref());
                        RawResource::Instance {
                            instance: Box::new(instance),
                            status,
                        }
                    })
                    .collect())
            }
            ResourceKind::BlockVolume => {
                let volumes = self.inventory.list_volumes().await?;
                let statuses = self.nested_statuses(kind, self.inventory.volume_statuses()).await;
                Ok(volumes
                    .into_iter()
                    .map(|volume| {
                        let status = lookup(&statuses, volume.volume_id.as_deref());
                        RawResource::Volume { volume, status }
                    })
                    .collect())
            }
            ResourceKind::Snapshot => Ok(self
                .inventory
                .list_snapshots()
                .await?
                .into_iter()
                .map(RawResource::Snapshot)
                .collect()),
            ResourceKind::NetworkInterface => Ok(self
                .inventory
                .list_network_interfaces()
                .await?
                .into_iter()
                .map(|interface| RawResource::NetworkInterface(Box::new(interface)))
                .collect()),
            ResourceKind::SecurityGroup => Ok(self
                .inventory
                .list_security_groups()
                .await?
                .into_iter()
                .map(RawResource::SecurityGroup)
                .collect()),
        }
    }

    async fn nested_statuses<F>(&self, kind: ResourceKind, lookup: F) -> Option<HashMap<String, String>>
    where
        F: std::future::Future<Output = Result<HashMap<String, String>, AuditError>>,
    {
        match lookup.await {
            Ok(statuses) => Some(statuses),
            Err(error) => {
                warn!(kind = %kind, error = %error, "status checks unavailable");
                None
            }
        }
    }
}

fn lookup(statuses: &Option<HashMap<String, String>>, id: Option<&str>) -> Result<Option<String>, ()> {
    match statuses {
        Some(statuses) => Ok(id.and_then(|id| statuses.get(id).cloned())),
        None => Err(()),
    }
}
