use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use trashcan_error::{ErrorCodes, TrashcanError};
use trashcan_storage::types::{NodeRefParseError, QNameParseError};
use trashcan_storage::{model, NodeRef, QName, RetryConfig};

const DEFAULT_CONFIG_PATH: &str = "./trashcan_cleaner_config.yaml";

#[derive(Debug, Error)]
pub enum CleanerConfigError {
    #[error("Invalid protected type: {0}")]
    InvalidTypeName(#[from] QNameParseError),
    #[error("Invalid skip node reference: {0}")]
    InvalidNodeRef(#[from] NodeRefParseError),
}

impl TrashcanError for CleanerConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrashcanCleanerConfig {
    #[serde(default = "TrashcanCleanerConfig::default_service_name")]
    pub service_name: String,
    #[serde(default = "TrashcanCleanerConfig::default_log_filter")]
    pub log_filter: String,
    /// Archived items older than this many days are purged. Zero or
    /// negative switches purging off entirely.
    #[serde(default = "TrashcanCleanerConfig::default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "TrashcanCleanerConfig::default_page_size")]
    pub page_size: usize,
    #[serde(default = "TrashcanCleanerConfig::default_max_batch_size")]
    pub max_batch_size: usize,
    /// Qualified type names (written `{namespace}local-name`) that must
    /// never be deleted. The site container type is always included.
    #[serde(default)]
    pub protected_types: Vec<String>,
    /// Comma-separated node references to leave alone. Empty entries and
    /// unresolved `$`-placeholders are ignored.
    #[serde(default)]
    pub skip_node_refs: String,
    #[serde(default = "TrashcanCleanerConfig::default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    #[serde(default = "TrashcanCleanerConfig::default_sweep_interval_mins")]
    pub sweep_interval_mins: u64,
    #[serde(default = "TrashcanCleanerConfig::default_max_run_time_secs")]
    pub max_run_time_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl TrashcanCleanerConfig {
    fn default_service_name() -> String {
        "trashcan-cleaner".to_string()
    }

    fn default_log_filter() -> String {
        "info".to_string()
    }

    fn default_retention_days() -> i64 {
        7
    }

    fn default_page_size() -> usize {
        3
    }

    fn default_max_batch_size() -> usize {
        500
    }

    fn default_lease_ttl_ms() -> u64 {
        30_000
    }

    fn default_sweep_interval_mins() -> u64 {
        60
    }

    fn default_max_run_time_secs() -> u64 {
        // Four hours of wall clock per sweep.
        14_400
    }

    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from_path(path: &str) -> Self {
        // Figment doesn't support environment variables with underscores,
        // so we map and replace them ourselves.
        let mut f = figment::Figment::from(
            Env::prefixed("TRASHCAN_").map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        let res = f.extract();
        match res {
            Ok(config) => config,
            Err(e) => panic!("Error loading config: {}", e),
        }
    }

    /// The effective protected type set: the site container type plus
    /// whatever the deployment adds.
    pub fn protected_types(&self) -> Result<Vec<QName>, CleanerConfigError> {
        let mut types = vec![model::type_site()];
        for raw in &self.protected_types {
            let qname: QName = raw.parse()?;
            if !types.contains(&qname) {
                types.push(qname);
            }
        }
        Ok(types)
    }

    pub fn skip_node_refs(&self) -> Result<HashSet<NodeRef>, CleanerConfigError> {
        let mut nodes = HashSet::new();
        for raw in self.skip_node_refs.split(',') {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('$') {
                continue;
            }
            nodes.insert(raw.parse::<NodeRef>()?);
        }
        Ok(nodes)
    }
}

impl Default for TrashcanCleanerConfig {
    fn default() -> Self {
        TrashcanCleanerConfig {
            service_name: Self::default_service_name(),
            log_filter: Self::default_log_filter(),
            retention_days: Self::default_retention_days(),
            page_size: Self::default_page_size(),
            max_batch_size: Self::default_max_batch_size(),
            protected_types: Vec::new(),
            skip_node_refs: String::new(),
            lease_ttl_ms: Self::default_lease_ttl_ms(),
            sweep_interval_mins: Self::default_sweep_interval_mins(),
            max_run_time_secs: Self::default_max_run_time_secs(),
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrashcanCleanerConfig::default();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.page_size, 3);
        assert_eq!(config.max_batch_size, 500);
        assert_eq!(config.lease_ttl_ms, 30_000);
        assert_eq!(config.sweep_interval_mins, 60);
        assert_eq!(config.max_run_time_secs, 14_400);
        assert!(config.skip_node_refs().unwrap().is_empty());
    }

    #[test]
    fn test_site_type_is_always_protected() {
        let mut config = TrashcanCleanerConfig {
            protected_types: vec![
                "{urn:trashcan:model:content:1.0}folder".to_string(),
                model::type_site().to_string(),
            ],
            ..Default::default()
        };
        let types = config.protected_types().unwrap();
        assert_eq!(types[0], model::type_site());
        // The duplicate site entry is dropped.
        assert_eq!(types.len(), 2);

        config.protected_types.clear();
        assert_eq!(config.protected_types().unwrap(), vec![model::type_site()]);
    }

    #[test]
    fn test_skip_refs_ignore_placeholders_and_blanks() {
        let a = NodeRef::new();
        let b = NodeRef::new();
        let config = TrashcanCleanerConfig {
            skip_node_refs: format!("{}, ,${{trashcan.skip}},{}", a, b),
            ..Default::default()
        };
        let nodes = config.skip_node_refs().unwrap();
        assert_eq!(nodes, HashSet::from([a, b]));
    }

    #[test]
    fn test_malformed_skip_ref_is_an_error() {
        let config = TrashcanCleanerConfig {
            skip_node_refs: "workspace://not-a-node".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.skip_node_refs(),
            Err(CleanerConfigError::InvalidNodeRef(_))
        ));
    }

    #[test]
    fn test_load_from_yaml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "trashcan_cleaner_config.yaml",
                r#"
                retention_days: 30
                page_size: 10
                "#,
            )?;
            jail.set_env("TRASHCAN_MAX_BATCH_SIZE", "100");
            let config = TrashcanCleanerConfig::load_from_path("trashcan_cleaner_config.yaml");
            assert_eq!(config.retention_days, 30);
            assert_eq!(config.page_size, 10);
            assert_eq!(config.max_batch_size, 100);
            // Untouched fields keep their defaults.
            assert_eq!(config.lease_ttl_ms, 30_000);
            Ok(())
        });
    }
}
