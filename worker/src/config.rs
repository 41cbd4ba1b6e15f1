use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use peerflow::destination::s3::S3Config;
use peerflow::mirror::{MirrorConfig, PgConnectionConfig};

/// Directory containing configuration files.
const CONFIGURATION_DIR: &str = "configuration";
/// Name of the base configuration file.
const BASE_CONFIG_FILE: &str = "base.yaml";
/// Prefix for environment variable overrides, e.g.
/// `APP_SOURCE__HOST=db.internal`.
const ENV_PREFIX: &str = "APP";

#[derive(Debug, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_records() -> usize {
    10_000
}

fn default_max_wait_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    10
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            max_records: default_max_records(),
            max_wait_secs: default_max_wait_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationSettings {
    Postgres(PgConnectionConfig),
    S3(S3Config),
}

#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    pub source: PgConnectionConfig,
    pub destination: DestinationSettings,
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub batch: BatchSettings,
}

pub fn load() -> Result<WorkerConfig, ConfigError> {
    let base_path = Path::new(CONFIGURATION_DIR).join(BASE_CONFIG_FILE);

    Config::builder()
        .add_source(File::from(base_path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
}
