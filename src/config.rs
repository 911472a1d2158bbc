//! Runtime configuration read from environment variables.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AuditError;
use crate::resource::ResourceKind;

const DEFAULT_REPORT_PATH: &str = "/tmp/AWS_resource_Reporting_audit.csv";
const DEFAULT_IDLE_PATH: &str = "/tmp/AWS_idle_resources.csv";
const DEFAULT_CERTIFICATE_PATH: &str = "/tmp/AWS_acm_certificates.csv";
const DEFAULT_KEY_PREFIX: &str = "reports";
const DEFAULT_CREATOR_TAG: &str = "CreatedBy";
const MAX_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    pub report_output_path: PathBuf,
    pub idle_output_path: PathBuf,
    pub certificate_output_path: PathBuf,
    pub bucket_name: Option<String>,
    pub report_key_prefix: String,
    pub sns_topic_arn: Option<String>,
    pub resource_types: BTreeSet<ResourceKind>,
    pub retention_days: u32,
    pub creator_tag_name: String,
    pub idle_lookback_days: u32,
    pub max_concurrent_lookups: usize,
    pub log_level: String,
    pub log_format: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            report_output_path: PathBuf::from(DEFAULT_REPORT_PATH),
            idle_output_path: PathBuf::from(DEFAULT_IDLE_PATH),
            certificate_output_path: PathBuf::from(DEFAULT_CERTIFICATE_PATH),
            bucket_name: None,
            report_key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            sns_topic_arn: None,
            resource_types: ResourceKind::ALL.iter().copied().collect(),
            retention_days: 30,
            creator_tag_name: DEFAULT_CREATOR_TAG.to_owned(),
            idle_lookback_days: 30,
            max_concurrent_lookups: 10,
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self, AuditError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for
    /// unset or blank variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuditError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut config = AuditConfig::default();

        if let Some(path) = var("REPORT_OUTPUT_PATH") {
            config.report_output_path = PathBuf::from(path);
        }
        if let Some(path) = var("IDLE_OUTPUT_PATH") {
            config.idle_output_path = PathBuf::from(path);
        }
        if let Some(path) = var("CERTIFICATE_OUTPUT_PATH") {
            config.certificate_output_path = PathBuf::from(path);
        }
        config.bucket_name = var("BUCKET_NAME");
        if let Some(prefix) = var("REPORT_KEY_PREFIX") {
            config.report_key_prefix = prefix;
        }
        config.sns_topic_arn = var("SNS_TOPIC_ARN");
        if let Some(kinds) = var("RESOURCE_TYPES") {
            config.resource_types = parse_kinds(&kinds)?;
        }
        if let Some(days) = var("RETENTION_DAYS") {
            config.retention_days = parse_days("RETENTION_DAYS", &days)?;
        }
        if let Some(name) = var("CREATOR_TAG_NAME") {
            config.creator_tag_name = name;
        }
        if let Some(days) = var("IDLE_LOOKBACK_DAYS") {
            config.idle_lookback_days = parse_days("IDLE_LOOKBACK_DAYS", &days)?;
        }
        if let Some(limit) = var("MAX_CONCURRENT_LOOKUPS") {
            config.max_concurrent_lookups = parse_number("MAX_CONCURRENT_LOOKUPS", &limit)?;
            if config.max_concurrent_lookups == 0 {
                return Err(AuditError::Config(
                    "MAX_CONCURRENT_LOOKUPS must be at least 1".to_owned(),
                ));
            }
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.log_format = format;
        }
        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, AuditError> {
    value
        .parse::<T>()
        .map_err(|_| AuditError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}

fn parse_days(key: &str, value: &str) -> Result<u32, AuditError> {
    let days: u32 = parse_number(key, value)?;
    if days > MAX_DAYS {
        return Err(AuditError::Config(format!(
            "{key} must be at most {MAX_DAYS} days, got {days}"
        )));
    }
    Ok(days)
}

fn parse_kinds(value: &str) -> Result<BTreeSet<ResourceKind>, AuditError> {
    let kinds = value
        .split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(ResourceKind::from_str)
        .collect::<Result<BTreeSet<_>, _>>()?;
    if kinds.is_empty() {
        return Err(AuditError::Config("RESOURCE_TYPES names no resource type".to_owned()));
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use crate::config::AuditConfig;
    use crate::error::AuditError;
    use crate::resource::ResourceKind;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_from(vars: &[(&str, &str)]) -> Result<AuditConfig, AuditError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuditConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AuditConfig::default());
        assert_eq!(
            config.report_output_path,
            PathBuf::from("/tmp/AWS_resource_Reporting_audit.csv")
        );
        assert_eq!(config.resource_types.len(), 5);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.max_concurrent_lookups, 10);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("BUCKET_NAME", "audit-bucket"),
            ("SNS_TOPIC_ARN", "arn:aws:sns:us-east-1:123456789012:audit"),
            ("RESOURCE_TYPES", "ec2, sg"),
            ("RETENTION_DAYS", "7"),
            ("IDLE_LOOKBACK_DAYS", "36500"),
            ("CREATOR_TAG_NAME", "Owner"),
            ("LOG_FORMAT", "pretty"),
            ("CERTIFICATE_OUTPUT_PATH", "/tmp/certs.csv"),
        ])
        .unwrap();
        assert_eq!(config.bucket_name.as_deref(), Some("audit-bucket"));
        assert!(config.sns_topic_arn.is_some());
        assert_eq!(
            config.resource_types.into_iter().collect::<Vec<_>>(),
            vec![ResourceKind::ComputeInstance, ResourceKind::SecurityGroup]
        );
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.idle_lookback_days, 36_500);
        assert_eq!(config.creator_tag_name, "Owner");
        assert_eq!(config.log_format, "pretty");
        assert_eq!(config.certificate_output_path, PathBuf::from("/tmp/certs.csv"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("BUCKET_NAME", "  "), ("RETENTION_DAYS", "")]).unwrap();
        assert_eq!(config.bucket_name, None);
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            config_from(&[("RETENTION_DAYS", "-1")]),
            Err(AuditError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("RESOURCE_TYPES", "ec2,bucket")]),
            Err(AuditError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("MAX_CONCURRENT_LOOKUPS", "0")]),
            Err(AuditError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("RESOURCE_TYPES", ",")]),
            Err(AuditError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_day_counts_past_limit() {
        assert!(matches!(
            config_from(&[("RETENTION_DAYS", "36501")]),
            Err(AuditError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("IDLE_LOOKBACK_DAYS", "4294967295")]),
            Err(AuditError::Config(_))
        ));
    }
}
