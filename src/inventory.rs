use async_trait::async_trait;
use rusoto_ec2::{
    CreateTagsRequest, DescribeInstanceStatusRequest, DescribeInstancesRequest,
    DescribeNetworkInterfacesRequest, DescribeSecurityGroupsRequest, DescribeSnapshotsRequest,
    DescribeTagsRequest, DescribeVolumeStatusRequest, DescribeVolumesRequest, Ec2, Ec2Client,
    Filter, Instance, NetworkInterface, SecurityGroup, Snapshot, Tag, Volume,
};
use std::collections::HashMap;
use tracing::debug;

use crate::error::AuditError;

const PAGE_SIZE: i64 = 500;

/// Read side of the EC2 API used by the audit and idle reports.
///
/// Every list call drains pagination before returning.
#[async_trait]
pub trait Ec2Inventory: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>, AuditError>;
    async fn list_volumes(&self) -> Result<Vec<Volume>, AuditError>;
    /// Snapshots owned by the calling account.
    async fn list_snapshots(&self) -> Result<Vec<Snapshot>, AuditError>;
    async fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>, AuditError>;
    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, AuditError>;
    /// Instance status check summary keyed by instance id.
    async fn instance_statuses(&self) -> Result<HashMap<String, String>, AuditError>;
    /// Volume status check summary keyed by volume id.
    async fn volume_statuses(&self) -> Result<HashMap<String, String>, AuditError>;
}

/// Write side of the EC2 tagging API.
#[async_trait]
pub trait ResourceTagger: Send + Sync {
    async fn tags_of(&self, resource_id: &str) -> Result<HashMap<String, String>, AuditError>;
    async fn create_tags(
        &self,
        resource_ids: &[String],
        tags: &[(String, String)],
    ) -> Result<(), AuditError>;
}

pub struct Ec2InventoryClient {
    client: Ec2Client,
}

impl Ec2InventoryClient {
    pub fn new_with_client(client: Ec2Client) -> Self {
        Ec2InventoryClient { client }
    }
}

#[async_trait]
impl Ec2Inventory for Ec2InventoryClient {
    async fn list_instances(&self) -> Result<Vec<Instance>, AuditError> {
        let mut instances = Vec::new();
        let mut next_token = None;
        loop {
            let request = DescribeInstancesRequest {
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeInstancesRequest::default()
            };
            let result = self
                .client
                .describe_instances(request)
                .await
                .map_err(|error| AuditError::api("DescribeInstances", error))?;
            for reservation in result.reservations.unwrap_or_default() {
                instances.extend(reservation.instances.unwrap_or_default());
            }
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = instances.len(), "described instances");
        Ok(instances)
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, AuditError> {
        let mut volumes = Vec::new();
        let mut next_token = None;
        loop {
            let request = DescribeVolumesRequest {
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeVolumesRequest::default()
            };
            let result = self
                .client
                .describe_volumes(request)
                .await
                .map_err(|error| AuditError::api("DescribeVolumes", error))?;
            volumes.extend(result.volumes.unwrap_or_default());
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = volumes.len(), "described volumes");
        Ok(volumes)
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>, AuditError> {
        let mut snapshots = Vec::new();
        let mut next_token = None;
        loop {
            let request = DescribeSnapshotsRequest {
                owner_ids: Some(vec!["self".to_string()]),
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeSnapshotsRequest::default()
            };
            let result = self
                .client
                .describe_snapshots(request)
                .await
                .map_err(|error| AuditError::api("DescribeSnapshots", error))?;
            snapshots.extend(result.snapshots.unwrap_or_default());
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = snapshots.len(), "described snapshots");
        Ok(snapshots)
    }

    async fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>, AuditError> {
        let mut interfaces = Vec::new();
        let mut next_token = None;
        loop {
            let request = DescribeNetworkInterfacesRequest {
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeNetworkInterfacesRequest::default()
            };
            let result = self
                .client
                .describe_network_interfaces(request)
                .await
                .map_err(|error| AuditError::api("DescribeNetworkInterfaces", error))?;
            interfaces.extend(result.network_interfaces.unwrap_or_default());
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = interfaces.len(), "described network interfaces");
        Ok(interfaces)
    }

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, AuditError> {
        let mut groups = Vec::new();
        let mut next_token = None;
        loop {
            let request = DescribeSecurityGroupsRequest {
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeSecurityGroupsRequest::default()
            };
            let result = self
                .client
                .describe_security_groups(request)
                .await
                .map_err(|error| AuditError::api("DescribeSecurityGroups", error))?;
            groups.extend(result.security_groups.unwrap_or_default());
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = groups.len(), "described security groups");
        Ok(groups)
    }

    async fn instance_statuses(&self) -> Result<HashMap<String, String>, AuditError> {
        let mut statuses = HashMap::new();
        let mut next_token = None;
        loop {
            let request = DescribeInstanceStatusRequest {
                include_all_instances: Some(true),
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeInstanceStatusRequest::default()
            };
            let result = self
                .client
                .describe_instance_status(request)
                .await
                .map_err(|error| AuditError::api("DescribeInstanceStatus", error))?;
            for status in result.instance_statuses.unwrap_or_default() {
                let summary = status.instance_status.and_then(|summary| summary.status);
                if let (Some(id), Some(summary)) = (status.instance_id, summary) {
                    statuses.insert(id, summary);
                }
            }
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        Ok(statuses)
    }

    async fn volume_statuses(&self) -> Result<HashMap<String, String>, AuditError> {
        let mut statuses = HashMap::new();
        let mut next_token = None;
        loop {
            let request = DescribeVolumeStatusRequest {
                max_results: Some(PAGE_SIZE),
                next_token: next_token.take(),
                ..DescribeVolumeStatusRequest::default()
            };
            let result = self
                .client
                .describe_volume_status(request)
                .await
                .map_err(|error| AuditError::api("DescribeVolumeStatus", error))?;
            for item in result.volume_statuses.unwrap_or_default() {
                let summary = item.volume_status.and_then(|info| info.status);
                if let (Some(id), Some(summary)) = (item.volume_id, summary) {
                    statuses.insert(id, summary);
                }
            }
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        Ok(statuses)
    }
}

#[async_trait]
impl ResourceTagger for Ec2InventoryClient {
    async fn tags_of(&self, resource_id: &str) -> Result<HashMap<String, String>, AuditError> {
        let mut tags = HashMap::new();
        let mut next_token = None;
        loop {
            let request = DescribeTagsRequest {
                filters: Some(vec![Filter {
                    name: Some("resource-id".to_string()),
                    values: Some(vec![resource_id.to_string()]),
                }]),
                next_token: next_token.take(),
                ..DescribeTagsRequest::default()
            };
            let result = self
                .client
                .describe_tags(request)
                .await
                .map_err(|error| AuditError::api("DescribeTags", error))?;
            for tag in result.tags.unwrap_or_default() {
                if let Some(key) = tag.key {
                    tags.insert(key, tag.value.unwrap_or_default());
                }
            }
            next_token = result.next_token.filter(|token| !token.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        Ok(tags)
    }

    async fn create_tags(
        &self,
        resource_ids: &[String],
        tags: &[(String, String)],
    ) -> Result<(), AuditError> {
        let request = CreateTagsRequest {
            resources: resource_ids.to_vec(),
            tags: tags
                .iter()
                .map(|(key, value)| Tag {
                    key: Some(key.clone()),
                    value: Some(value.clone()),
                })
                .collect(),
            ..CreateTagsRequest::default()
        };
        self.client
            .create_tags(request)
            .await
            .map_err(|error| AuditError::api("CreateTags", error))
    }
}
