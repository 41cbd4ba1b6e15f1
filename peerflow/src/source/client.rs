use std::time::Duration;

use thiserror::Error;
use tokio_postgres::{
    config::ReplicationMode, replication::LogicalReplicationStream, types::PgLsn, Client, Config,
    NoTls, SimpleQueryMessage, SimpleQueryRow,
};
use tracing::{info, warn};

use crate::escape::{quote_identifier, quote_literal};
use crate::mirror::PgConnectionConfig;
use crate::table::{ColumnSchema, TableId, TableName, TableSchema};
use crate::values::ValueKind;

const SLOT_CREATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SourceClientError {
    #[error("postgres error: {0}")]
    TokioPostgres(#[from] tokio_postgres::Error),

    #[error("column {0} is missing from {1}")]
    MissingColumn(&'static str, &'static str),

    #[error("oid column is not a valid u32")]
    OidColumnNotU32,

    #[error("not a valid lsn")]
    InvalidLsn,

    #[error("CREATE_REPLICATION_SLOT returned no row")]
    FailedToCreateSlot,

    #[error("timed out creating replication slot after {}s", SLOT_CREATION_TIMEOUT.as_secs())]
    SlotCreationTimeout,
}

pub struct SlotInfo {
    pub confirmed_flush_lsn: PgLsn,
}

pub struct CreatedSlot {
    pub consistent_point: PgLsn,
    /// Name of the exported consistent snapshot, for snapshot-based initial
    /// copies.
    pub snapshot_name: Option<String>,
}

/// The two source-side connections of a mirror: a general client for
/// introspection and DDL, and a dedicated replication client. The
/// replication connection only ever speaks the simple query protocol.
pub struct PgSourceClient {
    client: Client,
    repl_client: Client,
}

impl PgSourceClient {
    pub async fn connect(options: &PgConnectionConfig) -> Result<PgSourceClient, SourceClientError> {
        let mut config = Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .dbname(&options.name)
            .user(&options.username);
        if let Some(password) = &options.password {
            config.password(password);
        }

        info!(host = %options.host, dbname = %options.name, "connecting to source postgres");
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("source connection error: {e}");
            }
        });

        let mut repl_config = config.clone();
        repl_config
            .replication_mode(ReplicationMode::Logical)
            .options("-c bytea_output=hex");
        let (repl_client, repl_connection) = repl_config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = repl_connection.await {
                warn!("replication connection error: {e}");
            }
        });

        Ok(PgSourceClient {
            client,
            repl_client,
        })
    }

    fn first_row(messages: &[SimpleQueryMessage]) -> Option<&SimpleQueryRow> {
        messages.iter().find_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
    }

    pub async fn get_slot(&self, slot_name: &str) -> Result<Option<SlotInfo>, SourceClientError> {
        let query = format!(
            "select confirmed_flush_lsn from pg_replication_slots where slot_name = {};",
            quote_literal(slot_name)
        );
        let messages = self.client.simple_query(&query).await?;

        let Some(row) = Self::first_row(&messages) else {
            return Ok(None);
        };

        let confirmed_flush_lsn = match row.get("confirmed_flush_lsn") {
            Some(lsn) => lsn.parse().map_err(|_| SourceClientError::InvalidLsn)?,
            // a slot that never confirmed anything starts from zero
            None => PgLsn::from(0),
        };

        Ok(Some(SlotInfo {
            confirmed_flush_lsn,
        }))
    }

    pub async fn publication_exists(&self, publication: &str) -> Result<bool, SourceClientError> {
        let query = format!(
            "select 1 from pg_publication where pubname = {};",
            quote_literal(publication)
        );
        let messages = self.client.simple_query(&query).await?;
        Ok(Self::first_row(&messages).is_some())
    }

    pub async fn create_publication(
        &self,
        publication: &str,
        tables: &[TableName],
    ) -> Result<(), SourceClientError> {
        let table_list = tables
            .iter()
            .map(|t| t.as_quoted_identifier())
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "CREATE PUBLICATION {} FOR TABLE {};",
            quote_identifier(publication),
            table_list
        );
        self.client.simple_query(&query).await?;
        info!(publication, "created publication");
        Ok(())
    }

    /// Creates a logical slot with the pgoutput plugin on the replication
    /// connection. The returned consistent point is where streaming starts
    /// for a brand-new mirror; the snapshot name feeds initial copies.
    pub async fn create_slot(&self, slot_name: &str) -> Result<CreatedSlot, SourceClientError> {
        let query = format!(
            r#"CREATE_REPLICATION_SLOT {} LOGICAL pgoutput"#,
            quote_identifier(slot_name)
        );

        let messages = tokio::time::timeout(
            SLOT_CREATION_TIMEOUT,
            self.repl_client.simple_query(&query),
        )
        .await
        .map_err(|_| SourceClientError::SlotCreationTimeout)??;

        let row = Self::first_row(&messages).ok_or(SourceClientError::FailedToCreateSlot)?;
        let consistent_point = row
            .get("consistent_point")
            .ok_or(SourceClientError::MissingColumn(
                "consistent_point",
                "create_replication_slot",
            ))?
            .parse()
            .map_err(|_| SourceClientError::InvalidLsn)?;
        let snapshot_name = row.get("snapshot_name").map(str::to_string);

        info!(slot_name, %consistent_point, "created replication slot");
        Ok(CreatedSlot {
            consistent_point,
            snapshot_name,
        })
    }

    /// Starts streaming from the slot. With no publication the stream is
    /// unfiltered, which only happens on the degraded missing-publication
    /// path.
    pub async fn start_replication(
        &self,
        slot_name: &str,
        publication: Option<&str>,
        start_lsn: PgLsn,
    ) -> Result<LogicalReplicationStream, SourceClientError> {
        let options = match publication {
            Some(publication) => format!(
                r#"("proto_version" '1', "publication_names" {})"#,
                quote_literal(publication)
            ),
            None => r#"("proto_version" '1')"#.to_string(),
        };
        let query = format!(
            r#"START_REPLICATION SLOT {} LOGICAL {} {}"#,
            quote_identifier(slot_name),
            start_lsn,
            options
        );

        let copy_stream = self
            .repl_client
            .copy_both_simple::<bytes::Bytes>(&query)
            .await?;

        Ok(LogicalReplicationStream::new(copy_stream))
    }

    pub async fn relation_id(&self, table: &TableName) -> Result<Option<TableId>, SourceClientError> {
        let query = format!(
            "select c.oid
               from pg_catalog.pg_class c
               join pg_catalog.pg_namespace n on c.relnamespace = n.oid
              where n.nspname = {} and c.relname = {};",
            quote_literal(&table.schema),
            quote_literal(&table.name)
        );
        let messages = self.client.simple_query(&query).await?;

        match Self::first_row(&messages) {
            Some(row) => {
                let oid = row
                    .get(0)
                    .ok_or(SourceClientError::MissingColumn("oid", "pg_class"))?
                    .parse::<u32>()
                    .map_err(|_| SourceClientError::OidColumnNotU32)?;
                Ok(Some(oid))
            }
            None => Ok(None),
        }
    }

    /// Column schemas of a source table, with the primary key discovered
    /// through `pg_index`.
    pub async fn column_schemas(
        &self,
        table_id: TableId,
    ) -> Result<Vec<ColumnSchema>, SourceClientError> {
        let query = format!(
            "select a.attname,
                    a.atttypid,
                    a.attnotnull,
                    coalesce(a.attnum = any(i.indkey), false) as is_primary
               from pg_catalog.pg_attribute a
               left join pg_catalog.pg_index i
                      on i.indrelid = a.attrelid and i.indisprimary
              where a.attrelid = {table_id}
                and a.attnum > 0
                and not a.attisdropped
              order by a.attnum;"
        );

        let mut column_schemas = vec![];
        for message in self.client.simple_query(&query).await? {
            let SimpleQueryMessage::Row(row) = message else {
                continue;
            };

            let name = row
                .get("attname")
                .ok_or(SourceClientError::MissingColumn("attname", "pg_attribute"))?
                .to_string();
            let type_oid = row
                .get("atttypid")
                .ok_or(SourceClientError::MissingColumn("atttypid", "pg_attribute"))?
                .parse::<u32>()
                .map_err(|_| SourceClientError::OidColumnNotU32)?;
            let nullable = row
                .get("attnotnull")
                .ok_or(SourceClientError::MissingColumn(
                    "attnotnull",
                    "pg_attribute",
                ))?
                == "f";
            let primary = row
                .get("is_primary")
                .ok_or(SourceClientError::MissingColumn("is_primary", "pg_index"))?
                == "t";

            column_schemas.push(ColumnSchema {
                name,
                kind: ValueKind::from_oid(type_oid),
                nullable,
                primary,
            });
        }

        Ok(column_schemas)
    }

    pub async fn table_schema(&self, table: &TableName) -> Result<Option<TableSchema>, SourceClientError> {
        let Some(table_id) = self.relation_id(table).await? else {
            return Ok(None);
        };
        let column_schemas = self.column_schemas(table_id).await?;
        Ok(Some(TableSchema {
            table_id,
            table_name: table.clone(),
            column_schemas,
        }))
    }

    /// Planner-estimated total row count across the given relations.
    pub async fn approx_row_count(&self, table_ids: &[TableId]) -> Result<i64, SourceClientError> {
        if table_ids.is_empty() {
            return Ok(0);
        }

        let id_list = table_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let query =
            format!("select coalesce(sum(reltuples::bigint), 0) from pg_class where oid in ({id_list});");
        let messages = self.client.simple_query(&query).await?;

        let row = Self::first_row(&messages)
            .ok_or(SourceClientError::MissingColumn("sum", "pg_class"))?;
        let count = row
            .get(0)
            .ok_or(SourceClientError::MissingColumn("sum", "pg_class"))?
            .parse::<i64>()
            .unwrap_or(0);
        Ok(count)
    }

    pub async fn current_wal_lsn(&self) -> Result<PgLsn, SourceClientError> {
        let messages = self.client.simple_query("select pg_current_wal_lsn();").await?;
        let row = Self::first_row(&messages).ok_or(SourceClientError::MissingColumn(
            "pg_current_wal_lsn",
            "pg_current_wal_lsn()",
        ))?;
        row.get(0)
            .ok_or(SourceClientError::MissingColumn(
                "pg_current_wal_lsn",
                "pg_current_wal_lsn()",
            ))?
            .parse()
            .map_err(|_| SourceClientError::InvalidLsn)
    }

    /// Drops the mirror's publication and slot. The slot drop is guarded so
    /// teardown of a half-provisioned mirror still succeeds.
    pub async fn drop_replication_artifacts(
        &self,
        slot_name: &str,
        publication: &str,
    ) -> Result<(), SourceClientError> {
        let drop_publication = format!(
            "DROP PUBLICATION IF EXISTS {};",
            quote_identifier(publication)
        );
        self.client.simple_query(&drop_publication).await?;

        let drop_slot = format!(
            "select pg_drop_replication_slot(slot_name) from pg_replication_slots where slot_name = {};",
            quote_literal(slot_name)
        );
        self.client.simple_query(&drop_slot).await?;

        Ok(())
    }
}
