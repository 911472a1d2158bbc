//! Report schema shared by every resource kind.
//!
//! A [`ResourceRecord`] always carries every [`Column`], in header order.
//! Records start from a template where every cell holds [`SENTINEL`] and
//! each kind overlays only the columns it knows about.

use crate::error::AuditError;
use rusoto_ec2::Tag;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Placeholder for a column that has no meaning for a record's kind.
pub const SENTINEL: &str = "N/A";

/// Placeholder for a value whose nested lookup failed.
pub const NOT_AVAILABLE: &str = "NotAvailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ComputeInstance,
    BlockVolume,
    Snapshot,
    NetworkInterface,
    SecurityGroup,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::ComputeInstance,
        ResourceKind::BlockVolume,
        ResourceKind::Snapshot,
        ResourceKind::NetworkInterface,
        ResourceKind::SecurityGroup,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::ComputeInstance => "Compute Instance",
            ResourceKind::BlockVolume => "Block Volume",
            ResourceKind::Snapshot => "Snapshot",
            ResourceKind::NetworkInterface => "Network Interface",
            ResourceKind::SecurityGroup => "Security Group",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compute instance" | "ec2" | "instance" => Ok(ResourceKind::ComputeInstance),
            "block volume" | "ebs" | "volume" => Ok(ResourceKind::BlockVolume),
            "snapshot" => Ok(ResourceKind::Snapshot),
            "network interface" | "eni" => Ok(ResourceKind::NetworkInterface),
            "security group" | "sg" => Ok(ResourceKind::SecurityGroup),
            other => Err(AuditError::Config(format!("unknown resource type '{other}'"))),
        }
    }
}

macro_rules! columns {
    ($($variant:ident => $name:expr,)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Column {
            $($variant,)+
        }

        impl Column {
            pub const ALL: [Column; COLUMN_COUNT] = [$(Column::$variant,)+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Column::$variant => $name,)+
                }
            }
        }
    };
}

pub const COLUMN_COUNT: usize = 52;

columns! {
    ResourceType => "ResourceType",
    ResourceId => "ResourceID",
    Name => "Name",
    Application => "Application",
    Environment => "Environment",
    CreatedBy => "CreatedBy",
    ManagedBy => "ManagedBy",
    AvailabilityZone => "AvailabilityZone",
    VolumeStatus => "VolumeStatus",
    VolumeIops => "VolumeIOPS",
    OptimizerFinding => "OptimizerFinding",
    VolumeSnapshotId => "VolumeSnapshotID",
    VolumeCreatedDate => "VolumeCreatedDate",
    VolumeState => "VolumeState",
    VolumeSize => "VolumeSize",
    Encryption => "Encryption",
    VolumeType => "VolumeType",
    RequesterId => "RequesterID",
    AttachmentStatus => "AttachmentStatus",
    VolumeThroughput => "VolumeThroughput",
    AttachedResourceId => "AttachedResourceID",
    InterfaceType => "InterfaceType",
    NetworkInterfaceState => "NetworkInterfaceState",
    InstanceState => "InstanceState",
    InstanceType => "InstanceType",
    PrivateIp => "PrivateIP",
    SubnetId => "SubnetID",
    Platform => "Platform",
    AttachmentId => "AttachmentID",
    KeyName => "KeyName",
    Monitoring => "Monitoring",
    LaunchTime => "LaunchTime",
    PublicIpv4Address => "PublicIPv4 Address",
    SnapshotVolumeId => "SnapshotVolumeID",
    VpcId => "VPCID",
    SnapshotState => "SnapshotState",
    SnapshotStartTime => "SnapshotStartTime",
    ExpiryDate => "ExpiryDate",
    PublicIpv4Dns => "PublicIPv4 DNS",
    AlarmStatus => "AlarmStatus",
    StatusCheck => "StatusCheck",
    InboundRulesCount => "InboundRulesCount",
    OutboundRulesCount => "OutboundRulesCount",
    Expired => "Expired",
    Description => "Description",
    EniAttachmentStatus => "ENIAttachmentStatus",
    AttachedSecurityGroups => "AttachedSecurityGroups",
    SnapshotInstanceId => "SnapshotInstanceID",
    SecurityGroups => "SecurityGroups",
    FullSnapshotSize => "FullSnapshotSize",
    Progress => "Progress",
    AllocationId => "AllocationID",
}

impl Column {
    fn index(self) -> usize {
        self as usize
    }

    fn ordered() -> &'static [Column] {
        &Column::ALL
    }
}

/// Column names in header order.
pub fn header() -> impl Iterator<Item = &'static str> {
    Column::ordered().iter().map(|column| column.name())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    kind: ResourceKind,
    values: Vec<String>,
}

impl ResourceRecord {
    /// A record of `kind` whose cells all hold the sentinel except `ResourceType`.
    pub fn template(kind: ResourceKind) -> Self {
        let mut values = vec![SENTINEL.to_string(); COLUMN_COUNT];
        values[Column::ResourceType.index()] = kind.label().to_string();
        ResourceRecord { kind, values }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn set<V: Into<String>>(&mut self, column: Column, value: V) -> &mut Self {
        self.values[column.index()] = value.into();
        self
    }

    /// Sets `column` when `value` is present, leaving the sentinel otherwise.
    pub fn set_opt<V: ToString>(&mut self, column: Column, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.values[column.index()] = value.to_string();
        }
        self
    }

    pub fn get(&self, column: Column) -> &str {
        &self.values[column.index()]
    }

    /// Cells in header order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &str)> {
        Column::ordered().iter().copied().zip(self.values())
    }
}

/// Case-insensitive lookup of a tag value.
pub fn tag_value<'a>(tags: Option<&'a [Tag]>, key: &str) -> Option<&'a str> {
    tags.unwrap_or_default()
        .iter()
        .find(|tag| {
            tag.key
                .as_deref()
                .map_or(false, |k| k.eq_ignore_ascii_case(key))
        })
        .and_then(|tag| tag.value.as_deref())
}
