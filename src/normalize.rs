//! Per-kind mapping of EC2 shapes onto the shared report columns.

use chrono::{DateTime, NaiveDate};
use rusoto_ec2::{GroupIdentifier, Instance, NetworkInterface, SecurityGroup, Snapshot, Tag, Volume};

use crate::resource::{tag_value, Column, ResourceKind, ResourceRecord, NOT_AVAILABLE};

pub const EXPIRY_TAG: &str = "ExpiryDate";
pub const EXPIRY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Tag keys copied into the tag columns of every record.
const TAG_COLUMNS: [(Column, &str); 5] = [
    (Column::Name, "Name"),
    (Column::Application, "Application"),
    (Column::Environment, "Environment"),
    (Column::CreatedBy, "CreatedBy"),
    (Column::ManagedBy, "ManagedBy"),
];

/// A listed item together with the outcome of its nested status lookup.
///
/// `status` is `Err(())` when the status lookup itself failed, `Ok(None)`
/// when it succeeded without an entry for this item.
#[derive(Debug, Clone)]
pub enum RawResource {
    Instance {
        instance: Box<Instance>,
        status: Result<Option<String>, ()>,
    },
    Volume {
        volume: Volume,
        status: Result<Option<String>, ()>,
    },
    Snapshot(Snapshot),
    NetworkInterface(Box<NetworkInterface>),
    SecurityGroup(SecurityGroup),
}

impl RawResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RawResource::Instance { .. } => ResourceKind::ComputeInstance,
            RawResource::Volume { .. } => ResourceKind::BlockVolume,
            RawResource::Snapshot(_) => ResourceKind::Snapshot,
            RawResource::NetworkInterface(_) => ResourceKind::NetworkInterface,
            RawResource::SecurityGroup(_) => ResourceKind::SecurityGroup,
        }
    }
}

/// Builds the record for one listed item. `today` drives the snapshot
/// `Expired` column.
pub fn normalize(raw: &RawResource, today: NaiveDate) -> ResourceRecord {
    match raw {
        RawResource::Instance { instance, status } => normalize_instance(instance, status),
        RawResource::Volume { volume, status } => normalize_volume(volume, status),
        RawResource::Snapshot(snapshot) => normalize_snapshot(snapshot, today),
        RawResource::NetworkInterface(interface) => normalize_network_interface(interface),
        RawResource::SecurityGroup(group) => normalize_security_group(group),
    }
}

/// Expiry state of a snapshot's `ExpiryDate` tag relative to `today`.
pub fn expiry_status(tag: Option<&str>, today: NaiveDate) -> &'static str {
    match tag.map(str::trim).filter(|value| !value.is_empty() && *value != "-") {
        None => "N/A",
        Some(value) => match NaiveDate::parse_from_str(value, EXPIRY_DATE_FORMAT) {
            Ok(date) if date < today => "Yes",
            Ok(_) => "No",
            Err(_) => "Invalid Format",
        },
    }
}

fn with_tags(kind: ResourceKind, resource_id: Option<&str>, tags: Option<&[Tag]>) -> ResourceRecord {
    let mut record = ResourceRecord::template(kind);
    record.set_opt(Column::ResourceId, resource_id);
    for (column, key) in TAG_COLUMNS.iter() {
        record.set_opt(*column, tag_value(tags, key));
    }
    record
}

fn status_value(status: &Result<Option<String>, ()>) -> Option<String> {
    match status {
        Ok(status) => status.clone(),
        Err(()) => Some(NOT_AVAILABLE.to_string()),
    }
}

/// `YYYY-MM-DD HH:MM`, or the raw value when it is not RFC 3339.
fn short_timestamp(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| value.to_string())
}

fn iso_timestamp(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|_| value.to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn group_names(groups: Option<&Vec<GroupIdentifier>>) -> Option<String> {
    let names: Vec<&str> = groups
        .map(|groups| {
            groups
                .iter()
                .filter_map(|group| group.group_name.as_deref().or(group.group_id.as_deref()))
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

fn normalize_instance(instance: &Instance, status: &Result<Option<String>, ()>) -> ResourceRecord {
    let mut record = with_tags(
        ResourceKind::ComputeInstance,
        instance.instance_id.as_deref(),
        instance.tags.as_deref(),
    );
    let platform = match instance.platform.as_deref() {
        Some(platform) if platform.eq_ignore_ascii_case("windows") => "Windows",
        _ => "Linux/UNIX",
    };
    record
        .set_opt(
            Column::AvailabilityZone,
            instance
                .placement
                .as_ref()
                .and_then(|placement| placement.availability_zone.as_deref()),
        )
        .set_opt(
            Column::InstanceState,
            instance.state.as_ref().and_then(|state| state.name.as_deref()),
        )
        .set_opt(Column::InstanceType, instance.instance_type.as_deref())
        .set_opt(Column::PrivateIp, instance.private_ip_address.as_deref())
        .set_opt(Column::PublicIpv4Address, instance.public_ip_address.as_deref())
        .set_opt(
            Column::PublicIpv4Dns,
            instance.public_dns_name.as_deref().filter(|dns| !dns.is_empty()),
        )
        .set_opt(
            Column::Monitoring,
            instance.monitoring.as_ref().and_then(|monitoring| monitoring.state.as_deref()),
        )
        .set_opt(Column::SecurityGroups, group_names(instance.security_groups.as_ref()))
        .set_opt(Column::KeyName, instance.key_name.as_deref())
        .set_opt(Column::LaunchTime, instance.launch_time.as_deref().map(iso_timestamp))
        .set(Column::Platform, platform)
        .set_opt(Column::SubnetId, instance.subnet_id.as_deref())
        .set_opt(Column::VpcId, instance.vpc_id.as_deref())
        .set_opt(Column::StatusCheck, status_value(status));
    record
}

fn normalize_volume(volume: &Volume, status: &Result<Option<String>, ()>) -> ResourceRecord {
    let mut record = with_tags(
        ResourceKind::BlockVolume,
        volume.volume_id.as_deref(),
        volume.tags.as_deref(),
    );
    let attachments = volume.attachments.as_deref().unwrap_or_default();
    let attached = if attachments.is_empty() {
        "Not Attached"
    } else {
        "Attached"
    };
    record
        .set_opt(Column::AvailabilityZone, volume.availability_zone.as_deref())
        .set(Column::VolumeStatus, attached)
        .set_opt(Column::VolumeIops, volume.iops)
        .set_opt(
            Column::VolumeSnapshotId,
            volume.snapshot_id.as_deref().filter(|id| !id.is_empty()),
        )
        .set_opt(Column::VolumeCreatedDate, volume.create_time.as_deref().map(short_timestamp))
        .set_opt(Column::VolumeState, volume.state.as_deref())
        .set(Column::OptimizerFinding, NOT_AVAILABLE)
        .set_opt(Column::VolumeType, volume.volume_type.as_deref())
        .set_opt(Column::StatusCheck, status_value(status))
        .set_opt(Column::VolumeThroughput, volume.throughput)
        .set_opt(Column::VolumeSize, volume.size)
        .set_opt(
            Column::AttachedResourceId,
            attachments
                .first()
                .and_then(|attachment| attachment.instance_id.as_deref()),
        )
        .set(Column::Encryption, yes_no(volume.encrypted.unwrap_or(false)));
    record
}

fn normalize_snapshot(snapshot: &Snapshot, today: NaiveDate) -> ResourceRecord {
    let tags = snapshot.tags.as_deref();
    let mut record = with_tags(ResourceKind::Snapshot, snapshot.snapshot_id.as_deref(), tags);
    let expiry = tag_value(tags, EXPIRY_TAG);
    let started = snapshot.start_time.as_deref().map(short_timestamp);
    record
        .set(Column::Expired, expiry_status(expiry, today))
        .set_opt(Column::ExpiryDate, expiry)
        .set_opt(Column::SnapshotState, snapshot.state.as_deref())
        .set_opt(Column::VolumeCreatedDate, started.clone())
        .set_opt(Column::SnapshotStartTime, started)
        .set_opt(Column::SnapshotVolumeId, snapshot.volume_id.as_deref())
        .set_opt(Column::SnapshotInstanceId, tag_value(tags, "InstanceId"))
        .set_opt(Column::FullSnapshotSize, snapshot.volume_size)
        .set_opt(Column::Progress, snapshot.progress.as_deref())
        .set_opt(Column::VolumeSize, snapshot.volume_size)
        .set(Column::Encryption, yes_no(snapshot.encrypted.unwrap_or(false)));
    record
}

fn normalize_network_interface(interface: &NetworkInterface) -> ResourceRecord {
    let mut record = with_tags(
        ResourceKind::NetworkInterface,
        interface.network_interface_id.as_deref(),
        interface.tag_set.as_deref(),
    );
    let association = interface.association.as_ref();
    let attachment = interface.attachment.as_ref();
    let attachment_status = attachment.and_then(|attachment| attachment.status.as_deref());
    record
        .set_opt(Column::AvailabilityZone, interface.availability_zone.as_deref())
        .set_opt(Column::PrivateIp, interface.private_ip_address.as_deref())
        .set_opt(
            Column::PublicIpv4Address,
            association.and_then(|association| association.public_ip.as_deref()),
        )
        .set_opt(
            Column::AllocationId,
            association.and_then(|association| association.allocation_id.as_deref()),
        )
        .set_opt(Column::SubnetId, interface.subnet_id.as_deref())
        .set_opt(Column::VpcId, interface.vpc_id.as_deref())
        .set_opt(Column::RequesterId, interface.requester_id.as_deref())
        .set_opt(Column::AttachedSecurityGroups, group_names(interface.groups.as_ref()))
        .set_opt(Column::NetworkInterfaceState, interface.status.as_deref())
        .set_opt(Column::AttachmentStatus, attachment_status)
        .set_opt(
            Column::AttachmentId,
            attachment.and_then(|attachment| attachment.attachment_id.as_deref()),
        )
        .set_opt(Column::EniAttachmentStatus, attachment_status)
        .set_opt(Column::InterfaceType, interface.interface_type.as_deref())
        .set_opt(
            Column::Description,
            interface.description.as_deref().filter(|text| !text.is_empty()),
        );
    record
}

fn normalize_security_group(group: &SecurityGroup) -> ResourceRecord {
    let tags = group.tags.as_deref();
    let mut record = with_tags(ResourceKind::SecurityGroup, group.group_id.as_deref(), tags);
    let inbound = group.ip_permissions.as_ref().map_or(0, Vec::len);
    let outbound = group.ip_permissions_egress.as_ref().map_or(0, Vec::len);
    if tag_value(tags, "Name").is_none() {
        record.set_opt(Column::Name, group.group_name.as_deref());
    }
    record
        .set_opt(Column::Description, group.description.as_deref())
        .set_opt(Column::VpcId, group.vpc_id.as_deref())
        .set(Column::InboundRulesCount, inbound.to_string())
        .set(Column::OutboundRulesCount, outbound.to_string());
    record
}

#[cfg(test)]
mod tests {
    use crate::normalize::{expiry_status, normalize, RawResource};
    use crate::resource::{header, Column, ResourceKind, NOT_AVAILABLE, SENTINEL};
    use chrono::NaiveDate;
    use rusoto_ec2::{
        Instance, InstanceState, IpPermission, NetworkInterface, NetworkInterfaceAttachment,
        SecurityGroup, Snapshot, Tag, Volume, VolumeAttachment,
    };

    const VOLUME_ONLY: [Column; 6] = [
        Column::VolumeStatus,
        Column::VolumeIops,
        Column::VolumeSize,
        Column::VolumeType,
        Column::OptimizerFinding,
        Column::AttachedResourceId,
    ];

    const SNAPSHOT_ONLY: [Column; 5] = [
        Column::SnapshotState,
        Column::SnapshotStartTime,
        Column::SnapshotVolumeId,
        Column::Expired,
        Column::ExpiryDate,
    ];

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn tag(key: &str, value: &str) -> Tag {
        Tag {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn snapshot_with_expiry(expiry: Option<&str>) -> RawResource {
        RawResource::Snapshot(Snapshot {
            snapshot_id: Some("snap-0123".to_string()),
            state: Some("completed".to_string()),
            start_time: Some("2024-05-01T10:30:00.000Z".to_string()),
            volume_size: Some(8),
            tags: expiry.map(|value| vec![tag("ExpiryDate", value)]),
            ..Snapshot::default()
        })
    }

    #[test]
    fn test_stopped_instance_without_tags() {
        let raw = RawResource::Instance {
            instance: Box::new(Instance {
                instance_id: Some("i-0abc".to_string()),
                state: Some(InstanceState {
                    code: Some(80),
                    name: Some("stopped".to_string()),
                }),
                ..Instance::default()
            }),
            status: Ok(None),
        };

        let record = normalize(&raw, today());

        assert_eq!(record.get(Column::ResourceType), "Compute Instance");
        assert_eq!(record.get(Column::ResourceId), "i-0abc");
        assert_eq!(record.get(Column::Name), SENTINEL);
        assert_eq!(record.get(Column::InstanceState), "stopped");
        assert_eq!(record.get(Column::Platform), "Linux/UNIX");
        for column in VOLUME_ONLY.iter().chain(SNAPSHOT_ONLY.iter()) {
            assert_eq!(record.get(*column), SENTINEL, "{:?}", column);
        }
    }

    #[test]
    fn test_instance_status_lookup_failure() {
        let raw = RawResource::Instance {
            instance: Box::new(Instance {
                instance_id: Some("i-0abc".to_string()),
                platform: Some("windows".to_string()),
                launch_time: Some("2024-01-02T03:04:05.000Z".to_string()),
                ..Instance::default()
            }),
            status: Err(()),
        };

        let record = normalize(&raw, today());

        assert_eq!(record.get(Column::StatusCheck), NOT_AVAILABLE);
        assert_eq!(record.get(Column::Platform), "Windows");
        assert_eq!(record.get(Column::LaunchTime), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_volume_uses_first_attachment() {
        let raw = RawResource::Volume {
            volume: Volume {
                volume_id: Some("vol-1".to_string()),
                size: Some(100),
                iops: Some(3000),
                encrypted: Some(true),
                create_time: Some("2023-11-20T08:15:00.000Z".to_string()),
                attachments: Some(vec![
                    VolumeAttachment {
                        instance_id: Some("i-first".to_string()),
                        ..VolumeAttachment::default()
                    },
                    VolumeAttachment {
                        instance_id: Some("i-second".to_string()),
                        ..VolumeAttachment::default()
                    },
                ]),
                tags: Some(vec![tag("name", "data")]),
                ..Volume::default()
            },
            status: Ok(Some("ok".to_string())),
        };

        let record = normalize(&raw, today());

        assert_eq!(record.get(Column::ResourceType), "Block Volume");
        assert_eq!(record.get(Column::Name), "data");
        assert_eq!(record.get(Column::VolumeStatus), "Attached");
        assert_eq!(record.get(Column::AttachedResourceId), "i-first");
        assert_eq!(record.get(Column::VolumeSize), "100");
        assert_eq!(record.get(Column::Encryption), "Yes");
        assert_eq!(record.get(Column::VolumeCreatedDate), "2023-11-20 08:15");
        assert_eq!(record.get(Column::StatusCheck), "ok");
        assert_eq!(record.get(Column::OptimizerFinding), NOT_AVAILABLE);
        assert_eq!(record.get(Column::InstanceState), SENTINEL);
    }

    #[test]
    fn test_security_group_rule_counts() {
        let raw = RawResource::SecurityGroup(SecurityGroup {
            group_id: Some("sg-1".to_string()),
            group_name: Some("web".to_string()),
            ip_permissions: Some(vec![IpPermission::default(); 3]),
            ip_permissions_egress: Some(vec![]),
            ..SecurityGroup::default()
        });

        let record = normalize(&raw, today());

        assert_eq!(record.get(Column::InboundRulesCount), "3");
        assert_eq!(record.get(Column::OutboundRulesCount), "0");
        assert_eq!(record.get(Column::Name), "web");
    }

    #[test]
    fn test_network_interface_attachment() {
        let raw = RawResource::NetworkInterface(Box::new(NetworkInterface {
            network_interface_id: Some("eni-1".to_string()),
            status: Some("in-use".to_string()),
            attachment: Some(NetworkInterfaceAttachment {
                attachment_id: Some("eni-attach-1".to_string()),
                status: Some("attached".to_string()),
                ..NetworkInterfaceAttachment::default()
            }),
            ..NetworkInterface::default()
        }));

        let record = normalize(&raw, today());

        assert_eq!(record.get(Column::NetworkInterfaceState), "in-use");
        assert_eq!(record.get(Column::AttachmentStatus), "attached");
        assert_eq!(record.get(Column::EniAttachmentStatus), "attached");
        assert_eq!(record.get(Column::AttachmentId), "eni-attach-1");
        assert_eq!(record.get(Column::InboundRulesCount), SENTINEL);
    }

    #[test]
    fn test_snapshot_expiry_states() {
        let cases = [
            (Some("2024-06-14"), "Yes"),
            (Some("2024-06-15"), "No"),
            (Some("2025-01-01"), "No"),
            (Some("15/06/2024"), "Invalid Format"),
            (Some("  "), "N/A"),
            (Some("-"), "N/A"),
            (None, "N/A"),
        ];
        for (tag, expected) in cases.iter() {
            let record = normalize(&snapshot_with_expiry(*tag), today());
            assert_eq!(record.get(Column::Expired), *expected, "{:?}", tag);
        }
        assert_eq!(expiry_status(Some("not-a-date"), today()), "Invalid Format");
    }

    #[test]
    fn test_every_kind_has_full_header() {
        let raws = vec![
            RawResource::Instance {
                instance: Box::new(Instance::default()),
                status: Ok(None),
            },
            RawResource::Volume {
                volume: Volume::default(),
                status: Err(()),
            },
            snapshot_with_expiry(None),
            RawResource::NetworkInterface(Box::new(NetworkInterface::default())),
            RawResource::SecurityGroup(SecurityGroup::default()),
        ];
        let expected: Vec<&str> = header().collect();
        for raw in raws.iter() {
            let record = normalize(raw, today());
            let columns: Vec<&str> = record.iter().map(|(column, _)| column.name()).collect();
            assert_eq!(columns, expected);
            assert_eq!(record.kind(), raw.kind());
        }
        assert_eq!(
            normalize(&raws[2], today()).get(Column::ResourceType),
            ResourceKind::Snapshot.label()
        );
    }
}
