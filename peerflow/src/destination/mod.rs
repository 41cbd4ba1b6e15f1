use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::records::{items_to_json, Checkpoint, Record, RecordBatch};
use crate::table::{ParseTableNameError, TableSchema};

pub mod postgres;
pub mod s3;

pub const RECORD_TYPE_INSERT: i16 = 0;
pub const RECORD_TYPE_UPDATE: i16 = 1;
pub const RECORD_TYPE_DELETE: i16 = 2;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("table name error: {0}")]
    TableName(#[from] ParseTableNameError),

    #[error("bulk load row count mismatch: expected {expected} rows, loaded {loaded}")]
    RowCountMismatch { expected: u64, loaded: u64 },

    #[error("object storage error: {0}")]
    Storage(#[from] ::s3::error::S3Error),

    #[error("object storage credentials error: {0}")]
    Credentials(#[from] awscreds::error::CredentialsError),

    #[error("invalid object storage region: {0}")]
    InvalidRegion(String),

    #[error("invalid object storage url: {0}, expected s3://bucket/prefix")]
    InvalidStorageUrl(String),

    #[error("object storage returned status {status} for {op} {key}")]
    StorageStatus {
        op: &'static str,
        key: String,
        status: u16,
    },

    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is not supported by this destination")]
    Unsupported(&'static str),
}

impl DestinationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DestinationError::TableName(_)
            | DestinationError::InvalidRegion(_)
            | DestinationError::InvalidStorageUrl(_)
            | DestinationError::Unsupported(_) => ErrorKind::Validation,
            DestinationError::RowCountMismatch { .. }
            | DestinationError::Avro(_)
            | DestinationError::Json(_) => ErrorKind::Data,
            DestinationError::Postgres(_)
            | DestinationError::Storage(_)
            | DestinationError::Credentials(_)
            | DestinationError::StorageStatus { .. } => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub first_checkpoint: Checkpoint,
    pub last_checkpoint: Checkpoint,
    pub num_records: u64,
    pub sync_batch_id: i64,
    pub table_rows: HashMap<String, u64>,
}

impl SyncResponse {
    /// The response for a batch with nothing to sync. The batch id is not
    /// consumed.
    pub fn empty(sync_batch_id: i64) -> Self {
        SyncResponse {
            first_checkpoint: 0,
            last_checkpoint: 0,
            num_records: 0,
            sync_batch_id,
            table_rows: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeResponse {
    pub done: bool,
    pub start_batch_id: i64,
    pub end_batch_id: i64,
}

/// The capability set every destination connector implements. Adding a new
/// destination means implementing exactly this set.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn needs_setup_metadata(&self) -> Result<bool, DestinationError>;

    async fn setup_metadata(&self) -> Result<(), DestinationError>;

    async fn create_raw_table(&self, job_name: &str) -> Result<(), DestinationError>;

    async fn get_table_schema(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, TableSchema>, DestinationError>;

    async fn setup_normalized_tables(
        &self,
        schemas: &HashMap<String, TableSchema>,
    ) -> Result<(), DestinationError>;

    async fn sync_records(
        &self,
        job_name: &str,
        batch: &RecordBatch,
    ) -> Result<SyncResponse, DestinationError>;

    async fn normalize_records(&self, job_name: &str) -> Result<NormalizeResponse, DestinationError>;

    async fn get_last_sync_batch_id(&self, job_name: &str) -> Result<i64, DestinationError>;

    async fn get_last_offset(&self, job_name: &str) -> Result<Option<Checkpoint>, DestinationError>;

    async fn sync_flow_cleanup(&self, job_name: &str) -> Result<(), DestinationError>;
}

/// One raw-table row, shared by the COPY and staged-Avro bulk paths. The
/// field layout mirrors the raw table's public on-disk schema.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub uid: String,
    pub timestamp_ns: i64,
    pub dest_table: String,
    pub data: serde_json::Value,
    pub record_type: i16,
    pub match_data: serde_json::Value,
    pub unchanged_toast_columns: String,
}

impl RawRow {
    pub fn from_record(record: &Record) -> RawRow {
        let (data, record_type, match_data, unchanged_toast_columns) = match record {
            Record::Insert(insert) => (
                items_to_json(&insert.items),
                RECORD_TYPE_INSERT,
                json!({}),
                String::new(),
            ),
            Record::Update(update) => (
                items_to_json(&update.new_items),
                RECORD_TYPE_UPDATE,
                items_to_json(&update.old_items),
                // BTreeSet iteration gives the lexicographic ordering the
                // raw-table contract requires
                update
                    .unchanged_toast_columns
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Record::Delete(delete) => {
                let data = items_to_json(&delete.items);
                (data.clone(), RECORD_TYPE_DELETE, data, String::new())
            }
        };

        RawRow {
            uid: Uuid::new_v4().to_string(),
            timestamp_ns: wall_clock_nanos(),
            dest_table: record.dest_table().to_string(),
            data,
            record_type,
            match_data,
            unchanged_toast_columns,
        }
    }
}

pub fn raw_rows_for_batch(batch: &RecordBatch) -> Vec<RawRow> {
    batch.records.iter().map(RawRow::from_record).collect()
}

fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}
