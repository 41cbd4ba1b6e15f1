use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

const SLOT_PREFIX: &str = "peerflow_slot_";
const PUBLICATION_PREFIX: &str = "peerflow_pub_";

/// Connection settings for a Postgres peer (source or destination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Option<String>,
}

/// How the raw-table sink bulk-loads a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// The destination's native COPY path.
    BulkCopy,
    /// Staged Avro OCF files (object storage, warehouse staging).
    StagedAvro,
}

/// Whether normalization folds raw rows into user tables or leaves the raw
/// log append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    Append,
    Upsert,
}

#[derive(Debug, Error)]
pub enum MirrorConfigError {
    #[error("invalid job name: `{0}`, expected [a-z0-9_]+")]
    InvalidJobName(String),

    #[error("table name mapping must not be empty")]
    EmptyTableMapping,
}

impl MirrorConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Configuration of one mirror job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub job_name: String,
    /// Source qualified name → destination qualified name.
    pub table_name_mapping: HashMap<String, String>,
    #[serde(default = "default_sync_mode")]
    pub cdc_sync_mode: SyncMode,
    #[serde(default)]
    pub do_initial_copy: bool,
    #[serde(default)]
    pub override_replication_slot_name: Option<String>,
    #[serde(default)]
    pub override_publication_name: Option<String>,
    #[serde(default = "default_write_mode")]
    pub write_mode: WriteMode,
}

fn default_sync_mode() -> SyncMode {
    SyncMode::BulkCopy
}

fn default_write_mode() -> WriteMode {
    WriteMode::Upsert
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), MirrorConfigError> {
        if !is_valid_job_name(&self.job_name) {
            return Err(MirrorConfigError::InvalidJobName(self.job_name.clone()));
        }
        if self.table_name_mapping.is_empty() {
            return Err(MirrorConfigError::EmptyTableMapping);
        }
        Ok(())
    }

    pub fn slot_name(&self) -> String {
        self.override_replication_slot_name
            .clone()
            .unwrap_or_else(|| format!("{SLOT_PREFIX}{}", self.job_name))
    }

    pub fn publication_name(&self) -> String {
        self.override_publication_name
            .clone()
            .unwrap_or_else(|| format!("{PUBLICATION_PREFIX}{}", self.job_name))
    }
}

pub fn is_valid_job_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Bounds for one `pull`.
#[derive(Debug, Clone, Copy)]
pub struct PullBounds {
    /// Stop once this many records are buffered, at the next commit boundary.
    pub max_records: usize,
    /// Return whatever completed transactions exist after this long.
    pub max_wait: Duration,
    /// Return an empty batch after this long with nothing buffered.
    pub idle_timeout: Duration,
}

impl PullBounds {
    pub fn new(max_records: usize, max_wait: Duration, idle_timeout: Duration) -> Self {
        PullBounds {
            max_records,
            max_wait,
            idle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(job_name: &str) -> MirrorConfig {
        MirrorConfig {
            job_name: job_name.to_string(),
            table_name_mapping: HashMap::from([(
                "public.users".to_string(),
                "public.users".to_string(),
            )]),
            cdc_sync_mode: SyncMode::BulkCopy,
            do_initial_copy: false,
            override_replication_slot_name: None,
            override_publication_name: None,
            write_mode: WriteMode::Upsert,
        }
    }

    #[test]
    fn job_names_are_restricted() {
        assert!(is_valid_job_name("my_mirror_01"));
        assert!(!is_valid_job_name(""));
        assert!(!is_valid_job_name("My_Mirror"));
        assert!(!is_valid_job_name("has-dash"));
        assert!(!is_valid_job_name("has.dot"));
    }

    #[test]
    fn validation_covers_name_and_mapping() {
        assert!(minimal_config("ok_name").validate().is_ok());
        assert!(matches!(
            minimal_config("Bad Name").validate(),
            Err(MirrorConfigError::InvalidJobName(_))
        ));

        let mut empty = minimal_config("ok_name");
        empty.table_name_mapping.clear();
        assert!(matches!(
            empty.validate(),
            Err(MirrorConfigError::EmptyTableMapping)
        ));
    }

    #[test]
    fn derived_names_use_the_job_prefixes() {
        let config = minimal_config("orders_mirror");
        assert_eq!(config.slot_name(), "peerflow_slot_orders_mirror");
        assert_eq!(config.publication_name(), "peerflow_pub_orders_mirror");

        let mut overridden = minimal_config("orders_mirror");
        overridden.override_replication_slot_name = Some("custom_slot".to_string());
        assert_eq!(overridden.slot_name(), "custom_slot");
    }

    #[test]
    fn config_defaults_deserialize() {
        let config: MirrorConfig = serde_json::from_value(serde_json::json!({
            "job_name": "defaults",
            "table_name_mapping": {"public.a": "public.a"},
        }))
        .unwrap();
        assert_eq!(config.cdc_sync_mode, SyncMode::BulkCopy);
        assert_eq!(config.write_mode, WriteMode::Upsert);
        assert!(!config.do_initial_copy);

        let config: MirrorConfig = serde_json::from_value(serde_json::json!({
            "job_name": "modes",
            "table_name_mapping": {"public.a": "public.a"},
            "cdc_sync_mode": "staged-avro",
            "write_mode": "append",
        }))
        .unwrap();
        assert_eq!(config.cdc_sync_mode, SyncMode::StagedAvro);
        assert_eq!(config.write_mode, WriteMode::Append);
    }
}
