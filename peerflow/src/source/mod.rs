use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::ErrorKind;
use crate::mirror::{MirrorConfig, MirrorConfigError, PgConnectionConfig};
use crate::records::Checkpoint;
use crate::table::{ParseTableNameError, TableId, TableName, TableSchema};

use self::cdc::CdcEventError;
use self::client::{PgSourceClient, SourceClientError};

pub mod cdc;
pub mod client;
pub mod pull;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("mirror config error: {0}")]
    Config(#[from] MirrorConfigError),

    #[error("table name error: {0}")]
    TableName(#[from] ParseTableNameError),

    #[error("source client error: {0}")]
    Client(#[from] SourceClientError),

    #[error("cdc event error: {0}")]
    Cdc(#[from] CdcEventError),

    #[error("source table {0} does not exist")]
    MissingTable(String),

    #[error("replication slot {0} does not exist")]
    MissingSlot(String),

    #[error("slot {slot} exists but publication {publication} does not; recreate both together")]
    SlotWithoutPublication { slot: String, publication: String },

    #[error("do_initial_copy requires a setup signal")]
    MissingInitialCopySignal,

    #[error("initial copy coordinator went away before acknowledging")]
    InitialCopySignalDropped,

    #[error("replication stream closed unexpectedly")]
    StreamClosed,

    #[error("standby status update failed: {0}")]
    StatusUpdate(#[from] cdc::StatusUpdateError),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Config(_) | SourceError::TableName(_) => ErrorKind::Validation,
            SourceError::MissingInitialCopySignal => ErrorKind::Validation,
            SourceError::MissingTable(_)
            | SourceError::MissingSlot(_)
            | SourceError::SlotWithoutPublication { .. } => ErrorKind::Precondition,
            SourceError::Cdc(_) => ErrorKind::Data,
            SourceError::InitialCopySignalDropped => ErrorKind::Cancelled,
            SourceError::Client(_) | SourceError::StreamClosed | SourceError::StatusUpdate(_) => {
                ErrorKind::Transient
            }
        }
    }
}

/// Published through the setup signal once the slot exists, so a coordinator
/// can run the snapshot-based initial copy before streaming begins.
#[derive(Debug)]
pub struct SlotCreatedInfo {
    pub slot_name: String,
    pub snapshot_name: Option<String>,
    pub start_lsn: Checkpoint,
}

/// Handshake between `setup_replication` and the initial-copy coordinator:
/// the slot info goes out, setup blocks until the copy is acknowledged.
pub struct SetupSignal {
    pub slot_created: oneshot::Sender<SlotCreatedInfo>,
    pub initial_copy_done: oneshot::Receiver<()>,
}

/// The source half of a mirror: owns the general and replication
/// connections and the mirror's slot/publication lifecycle.
pub struct PgSource {
    client: PgSourceClient,
    config: MirrorConfig,
}

impl PgSource {
    pub async fn connect(
        options: &PgConnectionConfig,
        config: MirrorConfig,
    ) -> Result<PgSource, SourceError> {
        config.validate()?;
        let client = PgSourceClient::connect(options).await?;
        Ok(PgSource { client, config })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &PgSourceClient {
        &self.client
    }

    /// Creates the slot and publication for this mirror if they do not exist
    /// yet. With `do_initial_copy` set, blocks after slot creation until the
    /// caller acknowledges that the snapshot-based copy finished.
    pub async fn setup_replication(
        &self,
        signal: Option<SetupSignal>,
    ) -> Result<(), SourceError> {
        let slot_name = self.config.slot_name();
        let publication_name = self.config.publication_name();

        let slot = self.client.get_slot(&slot_name).await?;
        let publication_exists = self.client.publication_exists(&publication_name).await?;

        if slot.is_some() && !publication_exists {
            // the operator must recreate both together, otherwise streaming
            // would silently lose the publication's table filter
            return Err(SourceError::SlotWithoutPublication {
                slot: slot_name,
                publication: publication_name,
            });
        }

        if !publication_exists {
            let tables = self
                .config
                .table_name_mapping
                .keys()
                .map(|name| TableName::parse(name))
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .create_publication(&publication_name, &tables)
                .await?;
        }

        if slot.is_none() {
            let created = self.client.create_slot(&slot_name).await?;

            if self.config.do_initial_copy {
                let signal = signal.ok_or(SourceError::MissingInitialCopySignal)?;
                signal
                    .slot_created
                    .send(SlotCreatedInfo {
                        slot_name: slot_name.clone(),
                        snapshot_name: created.snapshot_name,
                        start_lsn: created.consistent_point.into(),
                    })
                    .map_err(|_| SourceError::InitialCopySignalDropped)?;
                info!(slot_name, "waiting for initial copy to complete");
                signal
                    .initial_copy_done
                    .await
                    .map_err(|_| SourceError::InitialCopySignalDropped)?;
            }
        }

        Ok(())
    }

    /// Verifies every mapped source table exists, returning its relation id.
    pub async fn ensure_pullability(&self) -> Result<HashMap<String, TableId>, SourceError> {
        let mut relation_ids = HashMap::new();
        for source_table in self.config.table_name_mapping.keys() {
            let table = TableName::parse(source_table)?;
            let relation_id = self
                .client
                .relation_id(&table)
                .await?
                .ok_or_else(|| SourceError::MissingTable(source_table.clone()))?;
            relation_ids.insert(source_table.clone(), relation_id);
        }
        Ok(relation_ids)
    }

    /// Introspects every mapped source table, keyed by destination name.
    /// The discovered primary keys drive destination table creation and
    /// normalization.
    pub async fn get_table_schemas(
        &self,
    ) -> Result<HashMap<String, TableSchema>, SourceError> {
        let mut schemas = HashMap::new();
        for (source_table, dest_table) in &self.config.table_name_mapping {
            let table = TableName::parse(source_table)?;
            let schema = self
                .client
                .table_schema(&table)
                .await?
                .ok_or_else(|| SourceError::MissingTable(source_table.clone()))?;
            schemas.insert(dest_table.clone(), schema);
        }
        Ok(schemas)
    }

    pub async fn current_wal_lsn(&self) -> Result<Checkpoint, SourceError> {
        Ok(self.client.current_wal_lsn().await?.into())
    }

    /// Releases both source connections. The slot and publication stay
    /// behind for the next pull.
    pub fn close(self) {
        info!(job_name = %self.config.job_name, "closing source connections");
        drop(self.client);
    }

    /// Drops this mirror's publication and replication slot.
    pub async fn pull_flow_cleanup(&self) -> Result<(), SourceError> {
        self.client
            .drop_replication_artifacts(&self.config.slot_name(), &self.config.publication_name())
            .await?;
        info!(job_name = %self.config.job_name, "dropped replication slot and publication");
        Ok(())
    }
}
