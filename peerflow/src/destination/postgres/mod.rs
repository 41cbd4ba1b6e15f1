use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{
    binary_copy::BinaryCopyInWriter, types::Type, Client, Config, GenericClient, NoTls,
    Transaction,
};
use tracing::{info, warn};

use crate::destination::{
    raw_rows_for_batch, Destination, DestinationError, NormalizeResponse, SyncResponse,
};
use crate::escape::{fold_to_destination_case, quote_identifier};
use crate::mirror::{PgConnectionConfig, WriteMode};
use crate::records::{Checkpoint, Record, RecordBatch};
use crate::table::{ColumnSchema, TableName, TableSchema};
use crate::values::ValueKind;

use self::merge::{fallback_statements, merge_statement, NormalizedColumn};

pub mod merge;

const INTERNAL_SCHEMA: &str = "_peerdb_internal";
const MIRROR_JOBS_TABLE: &str = "mirror_jobs";
const UNCHANGED_TOAST_TABLE: &str = "batch_unchanged_toast";
const RAW_TABLE_PREFIX: &str = "_peerdb_raw_";

/// MERGE-based normalization needs Postgres 15.
const MIN_MERGE_SERVER_VERSION: i32 = 150_000;

struct JobMetadata {
    sync_batch_id: i64,
    normalize_batch_id: i64,
}

/// Postgres as a mirror destination: raw-table sink, normalizer and job
/// metadata store. Holds one connection for sync and one for normalize so
/// the two phases can overlap; metadata and DDL ride the sync connection.
pub struct PostgresDestination {
    sync_client: Mutex<Client>,
    normalize_client: Mutex<Client>,
    write_mode: WriteMode,
}

impl PostgresDestination {
    pub async fn connect(
        options: &PgConnectionConfig,
        write_mode: WriteMode,
    ) -> Result<PostgresDestination, DestinationError> {
        let mut config = Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .dbname(&options.name)
            .user(&options.username);
        if let Some(password) = &options.password {
            config.password(password);
        }

        info!(host = %options.host, dbname = %options.name, "connecting to destination postgres");
        let sync_client = Self::spawn_connection(&config).await?;
        let normalize_client = Self::spawn_connection(&config).await?;

        Ok(PostgresDestination {
            sync_client: Mutex::new(sync_client),
            normalize_client: Mutex::new(normalize_client),
            write_mode,
        })
    }

    async fn spawn_connection(config: &Config) -> Result<Client, DestinationError> {
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("destination connection error: {e}");
            }
        });
        Ok(client)
    }

    fn raw_table_identifier(job_name: &str) -> String {
        format!("{RAW_TABLE_PREFIX}{job_name}")
    }

    fn qualified_raw_table(job_name: &str) -> String {
        format!(
            "{}.{}",
            quote_identifier(INTERNAL_SCHEMA),
            quote_identifier(&Self::raw_table_identifier(job_name))
        )
    }

    fn qualified_internal(table: &str) -> String {
        format!(
            "{}.{}",
            quote_identifier(INTERNAL_SCHEMA),
            quote_identifier(table)
        )
    }

    async fn job_metadata<C: GenericClient>(
        client: &C,
        job_name: &str,
    ) -> Result<Option<JobMetadata>, DestinationError> {
        let query = format!(
            "SELECT sync_batch_id, normalize_batch_id FROM {} WHERE job_name = $1",
            Self::qualified_internal(MIRROR_JOBS_TABLE)
        );
        let row = client.query_opt(query.as_str(), &[&job_name]).await?;
        Ok(row.map(|row| JobMetadata {
            sync_batch_id: row.get(0),
            normalize_batch_id: row.get(1),
        }))
    }

    async fn last_sync_batch_id<C: GenericClient>(
        client: &C,
        job_name: &str,
    ) -> Result<i64, DestinationError> {
        Ok(Self::job_metadata(client, job_name)
            .await?
            .map(|metadata| metadata.sync_batch_id)
            .unwrap_or(0))
    }

    async fn server_supports_merge<C: GenericClient>(client: &C) -> Result<bool, DestinationError> {
        let row = client
            .query_one("SELECT current_setting('server_version_num')", &[])
            .await?;
        let version: String = row.get(0);
        Ok(version.parse::<i32>().unwrap_or(0) >= MIN_MERGE_SERVER_VERSION)
    }

    /// Union of unchanged-TOAST columns per destination table for batches in
    /// `(start, end]`.
    async fn unchanged_toast_map<C: GenericClient>(
        client: &C,
        job_name: &str,
        start_batch_id: i64,
        end_batch_id: i64,
    ) -> Result<HashMap<String, BTreeSet<String>>, DestinationError> {
        let query = format!(
            "SELECT dst_table, columns FROM {} \
             WHERE job_name = $1 AND batch_id > $2 AND batch_id <= $3",
            Self::qualified_internal(UNCHANGED_TOAST_TABLE)
        );
        let rows = client
            .query(query.as_str(), &[&job_name, &start_batch_id, &end_batch_id])
            .await?;

        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let dst_table: String = row.get(0);
            let columns: String = row.get(1);
            let entry = map.entry(dst_table).or_default();
            for column in columns.split(',').filter(|c| !c.is_empty()) {
                entry.insert(column.to_string());
            }
        }
        Ok(map)
    }

    /// Destination-side column introspection. The returned names and cast
    /// types are authoritative for statement generation.
    async fn normalized_table_columns(
        tx: &Transaction<'_>,
        table: &TableName,
    ) -> Result<Vec<NormalizedColumn>, DestinationError> {
        let rows = tx
            .query(
                "SELECT a.attname,
                        format_type(a.atttypid, a.atttypmod) AS data_type,
                        COALESCE(a.attnum = ANY(i.indkey), false) AS is_primary
                   FROM pg_catalog.pg_attribute a
                   LEFT JOIN pg_catalog.pg_index i
                          ON i.indrelid = a.attrelid AND i.indisprimary
                  WHERE a.attrelid = $1::regclass
                    AND a.attnum > 0
                    AND NOT a.attisdropped
                  ORDER BY a.attnum",
                &[&table.as_quoted_identifier()],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| NormalizedColumn {
                name: row.get(0),
                cast_type: row.get(1),
                primary: row.get(2),
            })
            .collect())
    }

    fn raw_column_types() -> [Type; 8] {
        [
            Type::TEXT,
            Type::INT8,
            Type::TEXT,
            Type::JSONB,
            Type::INT2,
            Type::JSONB,
            Type::INT8,
            Type::TEXT,
        ]
    }

    fn create_table_statement(name: &TableName, schema: &TableSchema) -> String {
        let mut specs: Vec<String> = schema
            .column_schemas
            .iter()
            .map(|column| {
                let mut spec = format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    column.kind.destination_type()
                );
                if !column.nullable {
                    spec.push_str(" NOT NULL");
                }
                spec
            })
            .collect();

        let keys = schema.primary_key_columns();
        if !keys.is_empty() {
            let key_list = keys
                .iter()
                .map(|key| quote_identifier(key))
                .collect::<Vec<_>>()
                .join(", ");
            specs.push(format!("PRIMARY KEY ({key_list})"));
        }

        format!(
            "CREATE TABLE {} ({})",
            name.as_quoted_identifier(),
            specs.join(", ")
        )
    }

    /// Per-table union of unchanged-TOAST columns within one batch, for
    /// every table the batch touches (tables with no updates get an empty
    /// union so the normalizer still visits them).
    fn batch_toast_unions(batch: &RecordBatch) -> HashMap<String, String> {
        let mut unions: HashMap<String, BTreeSet<&str>> = batch
            .table_name_to_row_count
            .keys()
            .map(|table| (table.clone(), BTreeSet::new()))
            .collect();

        for record in &batch.records {
            if let Record::Update(update) = record {
                if let Some(union) = unions.get_mut(&update.dest_table) {
                    union.extend(update.unchanged_toast_columns.iter().map(String::as_str));
                }
            }
        }

        unions
            .into_iter()
            .map(|(table, columns)| {
                let joined = columns.into_iter().collect::<Vec<_>>().join(",");
                (table, joined)
            })
            .collect()
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn needs_setup_metadata(&self) -> Result<bool, DestinationError> {
        let client = self.sync_client.lock().await;
        let query = format!(
            "SELECT to_regclass('{}')::text",
            Self::qualified_internal(MIRROR_JOBS_TABLE)
        );
        let row = client.query_one(query.as_str(), &[]).await?;
        let exists: Option<String> = row.get(0);
        Ok(exists.is_none())
    }

    async fn setup_metadata(&self) -> Result<(), DestinationError> {
        let mut client = self.sync_client.lock().await;
        let tx = client.transaction().await?;

        tx.execute(
            format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(INTERNAL_SCHEMA)).as_str(),
            &[],
        )
        .await?;
        tx.execute(
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 job_name TEXT PRIMARY KEY, \
                 last_offset BIGINT NOT NULL DEFAULT 0, \
                 sync_batch_id BIGINT NOT NULL DEFAULT 0, \
                 normalize_batch_id BIGINT NOT NULL DEFAULT 0)",
                Self::qualified_internal(MIRROR_JOBS_TABLE)
            )
            .as_str(),
            &[],
        )
        .await?;
        tx.execute(
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 job_name TEXT NOT NULL, \
                 batch_id BIGINT NOT NULL, \
                 dst_table TEXT NOT NULL, \
                 columns TEXT NOT NULL DEFAULT '', \
                 PRIMARY KEY (job_name, batch_id, dst_table))",
                Self::qualified_internal(UNCHANGED_TOAST_TABLE)
            )
            .as_str(),
            &[],
        )
        .await?;

        tx.commit().await?;
        info!("created mirror metadata tables");
        Ok(())
    }

    async fn create_raw_table(&self, job_name: &str) -> Result<(), DestinationError> {
        let mut client = self.sync_client.lock().await;
        let tx = client.transaction().await?;
        let raw_table = Self::qualified_raw_table(job_name);

        tx.execute(
            format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(INTERNAL_SCHEMA)).as_str(),
            &[],
        )
        .await?;
        tx.execute(
            format!(
                "CREATE TABLE IF NOT EXISTS {raw_table} (\
                 _uid TEXT NOT NULL, \
                 _timestamp BIGINT NOT NULL, \
                 _dest_table TEXT NOT NULL, \
                 _data JSONB NOT NULL, \
                 _record_type SMALLINT NOT NULL, \
                 _match_data JSONB, \
                 _batch_id BIGINT NOT NULL, \
                 _unchanged_toast_columns TEXT NOT NULL DEFAULT '')"
            )
            .as_str(),
            &[],
        )
        .await?;
        tx.execute(
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {raw_table} (_dest_table, _batch_id)",
                quote_identifier(&format!("{}_batch_idx", Self::raw_table_identifier(job_name)))
            )
            .as_str(),
            &[],
        )
        .await?;

        tx.commit().await?;
        info!(job_name, "created raw table");
        Ok(())
    }

    async fn get_table_schema(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, TableSchema>, DestinationError> {
        let client = self.sync_client.lock().await;
        let mut schemas = HashMap::new();

        for identifier in identifiers {
            let table = TableName::parse(identifier)?;
            let row = client
                .query_opt(
                    "SELECT c.oid
                       FROM pg_catalog.pg_class c
                       JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
                      WHERE n.nspname = $1 AND c.relname = $2",
                    &[&table.schema, &table.name],
                )
                .await?;
            let Some(row) = row else {
                continue;
            };
            let table_id: u32 = row.get(0);

            let columns = client
                .query(
                    "SELECT a.attname,
                            a.atttypid,
                            a.attnotnull,
                            COALESCE(a.attnum = ANY(i.indkey), false) AS is_primary
                       FROM pg_catalog.pg_attribute a
                       LEFT JOIN pg_catalog.pg_index i
                              ON i.indrelid = a.attrelid AND i.indisprimary
                      WHERE a.attrelid = $1
                        AND a.attnum > 0
                        AND NOT a.attisdropped
                      ORDER BY a.attnum",
                    &[&table_id],
                )
                .await?;

            let column_schemas = columns
                .into_iter()
                .map(|row| ColumnSchema {
                    name: row.get(0),
                    kind: ValueKind::from_oid(row.get::<_, u32>(1)),
                    nullable: !row.get::<_, bool>(2),
                    primary: row.get(3),
                })
                .collect();

            schemas.insert(
                identifier.clone(),
                TableSchema {
                    table_id,
                    table_name: table,
                    column_schemas,
                },
            );
        }

        Ok(schemas)
    }

    async fn setup_normalized_tables(
        &self,
        schemas: &HashMap<String, TableSchema>,
    ) -> Result<(), DestinationError> {
        let mut client = self.sync_client.lock().await;
        let tx = client.transaction().await?;

        for (identifier, schema) in schemas {
            let table = TableName::parse(identifier)?;
            let row = tx
                .query_one(
                    "SELECT to_regclass($1)::text",
                    &[&table.as_quoted_identifier()],
                )
                .await?;
            let exists: Option<String> = row.get(0);
            if exists.is_some() {
                info!(table = %table, "normalized table already exists");
                continue;
            }

            tx.execute(Self::create_table_statement(&table, schema).as_str(), &[])
                .await?;
            info!(table = %table, "created normalized table");
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sync_records(
        &self,
        job_name: &str,
        batch: &RecordBatch,
    ) -> Result<SyncResponse, DestinationError> {
        let rows = raw_rows_for_batch(batch);
        let toast_unions = Self::batch_toast_unions(batch);

        let mut client = self.sync_client.lock().await;
        let previous_batch_id = Self::last_sync_batch_id(&*client, job_name).await?;
        if rows.is_empty() {
            return Ok(SyncResponse::empty(previous_batch_id));
        }
        let sync_batch_id = previous_batch_id + 1;

        let tx = client.transaction().await?;
        let raw_table = Self::qualified_raw_table(job_name);

        let loaded = {
            let copy_statement = format!(
                "COPY {raw_table} (_uid, _timestamp, _dest_table, _data, _record_type, \
                 _match_data, _batch_id, _unchanged_toast_columns) FROM STDIN BINARY"
            );
            let sink = tx.copy_in(copy_statement.as_str()).await?;
            let writer = BinaryCopyInWriter::new(sink, &Self::raw_column_types());
            tokio::pin!(writer);

            for row in &rows {
                writer
                    .as_mut()
                    .write(&[
                        &row.uid,
                        &row.timestamp_ns,
                        &row.dest_table,
                        &row.data,
                        &row.record_type,
                        &row.match_data,
                        &sync_batch_id,
                        &row.unchanged_toast_columns,
                    ])
                    .await?;
            }
            writer.finish().await?
        };

        if loaded != rows.len() as u64 {
            // dropping the transaction rolls the copy back
            return Err(DestinationError::RowCountMismatch {
                expected: rows.len() as u64,
                loaded,
            });
        }

        let last_offset = batch.last_checkpoint as i64;
        tx.execute(
            format!(
                "INSERT INTO {} (job_name, last_offset, sync_batch_id, normalize_batch_id) \
                 VALUES ($1, $2, $3, 0) \
                 ON CONFLICT (job_name) DO UPDATE SET \
                 last_offset = GREATEST({}.last_offset, EXCLUDED.last_offset), \
                 sync_batch_id = EXCLUDED.sync_batch_id",
                Self::qualified_internal(MIRROR_JOBS_TABLE),
                quote_identifier(MIRROR_JOBS_TABLE)
            )
            .as_str(),
            &[&job_name, &last_offset, &sync_batch_id],
        )
        .await?;

        let toast_upsert = format!(
            "INSERT INTO {} (job_name, batch_id, dst_table, columns) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (job_name, batch_id, dst_table) DO UPDATE SET columns = EXCLUDED.columns",
            Self::qualified_internal(UNCHANGED_TOAST_TABLE)
        );
        for (dst_table, columns) in &toast_unions {
            tx.execute(
                toast_upsert.as_str(),
                &[&job_name, &sync_batch_id, dst_table, columns],
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            job_name,
            records = rows.len(),
            sync_batch_id,
            "synced records into raw table"
        );
        Ok(SyncResponse {
            first_checkpoint: batch.first_checkpoint,
            last_checkpoint: batch.last_checkpoint,
            num_records: rows.len() as u64,
            sync_batch_id,
            table_rows: batch.table_name_to_row_count.clone(),
        })
    }

    async fn normalize_records(&self, job_name: &str) -> Result<NormalizeResponse, DestinationError> {
        let mut client = self.normalize_client.lock().await;

        let Some(metadata) = Self::job_metadata(&*client, job_name).await? else {
            return Ok(NormalizeResponse {
                done: true,
                start_batch_id: 0,
                end_batch_id: 0,
            });
        };
        let JobMetadata {
            sync_batch_id,
            normalize_batch_id,
        } = metadata;

        if sync_batch_id == normalize_batch_id {
            info!(
                job_name,
                sync_batch_id, normalize_batch_id, "no batches to normalize"
            );
            return Ok(NormalizeResponse {
                done: true,
                start_batch_id: normalize_batch_id,
                end_batch_id: sync_batch_id,
            });
        }

        if self.write_mode == WriteMode::Append {
            // append mode leaves the raw log as the destination surface
            return Ok(NormalizeResponse {
                done: true,
                start_batch_id: normalize_batch_id,
                end_batch_id: sync_batch_id,
            });
        }

        let toast_map =
            Self::unchanged_toast_map(&*client, job_name, normalize_batch_id, sync_batch_id)
                .await?;
        let supports_merge = Self::server_supports_merge(&*client).await?;

        let tx = client.transaction().await?;
        let raw_table = Self::qualified_raw_table(job_name);
        let mut total_rows: u64 = 0;

        for (dst_table, toast_columns) in &toast_map {
            let table = TableName::parse(dst_table)?;
            let columns = Self::normalized_table_columns(&tx, &table).await?;
            let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

            // map source-cased TOAST column names onto the destination's
            // authoritative identifiers
            let folded: BTreeSet<String> = toast_columns
                .iter()
                .filter_map(|column| fold_to_destination_case(column, &column_names))
                .map(str::to_string)
                .collect();

            let statements = if supports_merge {
                vec![merge_statement(&raw_table, &table, &columns, &folded)]
            } else {
                fallback_statements(&raw_table, &table, &columns, &folded)
            };

            for statement in statements {
                total_rows += tx
                    .execute(
                        statement.as_str(),
                        &[&normalize_batch_id, &sync_batch_id, dst_table],
                    )
                    .await?;
            }
        }

        tx.execute(
            format!(
                "UPDATE {} SET normalize_batch_id = $2 WHERE job_name = $1",
                Self::qualified_internal(MIRROR_JOBS_TABLE)
            )
            .as_str(),
            &[&job_name, &sync_batch_id],
        )
        .await?;
        tx.commit().await?;

        info!(job_name, total_rows, "normalized records");
        Ok(NormalizeResponse {
            done: true,
            start_batch_id: normalize_batch_id + 1,
            end_batch_id: sync_batch_id,
        })
    }

    async fn get_last_sync_batch_id(&self, job_name: &str) -> Result<i64, DestinationError> {
        let client = self.sync_client.lock().await;
        Self::last_sync_batch_id(&*client, job_name).await
    }

    async fn get_last_offset(&self, job_name: &str) -> Result<Option<Checkpoint>, DestinationError> {
        let client = self.sync_client.lock().await;
        let query = format!(
            "SELECT last_offset FROM {} WHERE job_name = $1",
            Self::qualified_internal(MIRROR_JOBS_TABLE)
        );
        let row = client.query_opt(query.as_str(), &[&job_name]).await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let last_offset: i64 = row.get(0);
                if last_offset == 0 {
                    // a stored zero means no sync has happened yet
                    warn!(job_name, "zero stored offset, treating as never synced");
                    return Ok(None);
                }
                Ok(Some(last_offset as Checkpoint))
            }
        }
    }

    async fn sync_flow_cleanup(&self, job_name: &str) -> Result<(), DestinationError> {
        let mut client = self.sync_client.lock().await;
        let tx = client.transaction().await?;

        tx.execute(
            format!("DROP TABLE IF EXISTS {}", Self::qualified_raw_table(job_name)).as_str(),
            &[],
        )
        .await?;
        tx.execute(
            format!(
                "DELETE FROM {} WHERE job_name = $1",
                Self::qualified_internal(UNCHANGED_TOAST_TABLE)
            )
            .as_str(),
            &[&job_name],
        )
        .await?;
        tx.execute(
            format!(
                "DELETE FROM {} WHERE job_name = $1",
                Self::qualified_internal(MIRROR_JOBS_TABLE)
            )
            .as_str(),
            &[&job_name],
        )
        .await?;

        tx.commit().await?;
        info!(job_name, "cleaned up raw table and job metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InsertRecord, RecordItems, UpdateRecord};
    use crate::values::Value;

    #[test]
    fn raw_table_names_carry_the_job_name() {
        assert_eq!(
            PostgresDestination::qualified_raw_table("orders_mirror"),
            r#""_peerdb_internal"."_peerdb_raw_orders_mirror""#
        );
    }

    #[test]
    fn create_table_statement_includes_types_and_keys() {
        let table = TableName::parse("public.users").unwrap();
        let schema = TableSchema {
            table_id: 1,
            table_name: table.clone(),
            column_schemas: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    kind: ValueKind::Int8,
                    nullable: false,
                    primary: true,
                },
                ColumnSchema {
                    name: "name".to_string(),
                    kind: ValueKind::Text,
                    nullable: true,
                    primary: false,
                },
            ],
        };

        let statement = PostgresDestination::create_table_statement(&table, &schema);
        assert_eq!(
            statement,
            r#"CREATE TABLE "public"."users" ("id" bigint NOT NULL, "name" text, PRIMARY KEY ("id"))"#
        );
    }

    #[test]
    fn create_table_statement_without_key_has_no_key_clause() {
        let table = TableName::parse("public.log").unwrap();
        let schema = TableSchema {
            table_id: 2,
            table_name: table.clone(),
            column_schemas: vec![ColumnSchema {
                name: "line".to_string(),
                kind: ValueKind::Text,
                nullable: true,
                primary: false,
            }],
        };

        let statement = PostgresDestination::create_table_statement(&table, &schema);
        assert!(!statement.contains("PRIMARY KEY"));
    }

    #[test]
    fn batch_toast_unions_cover_every_table_in_the_batch() {
        let mut batch = RecordBatch::empty(0);
        batch.push(Record::Insert(InsertRecord {
            dest_table: "public.a".to_string(),
            items: RecordItems::from([("id".to_string(), Value::I64(1))]),
            checkpoint: 1,
        }));
        batch.push(Record::Update(UpdateRecord {
            dest_table: "public.b".to_string(),
            new_items: RecordItems::from([("id".to_string(), Value::I64(1))]),
            old_items: RecordItems::new(),
            unchanged_toast_columns: BTreeSet::from(["big".to_string(), "also_big".to_string()]),
            checkpoint: 2,
        }));
        batch.push(Record::Update(UpdateRecord {
            dest_table: "public.b".to_string(),
            new_items: RecordItems::from([("id".to_string(), Value::I64(2))]),
            old_items: RecordItems::new(),
            unchanged_toast_columns: BTreeSet::from(["zz".to_string()]),
            checkpoint: 3,
        }));

        let unions = PostgresDestination::batch_toast_unions(&batch);
        assert_eq!(unions.len(), 2);
        // insert-only tables get an empty union so normalize still visits them
        assert_eq!(unions["public.a"], "");
        assert_eq!(unions["public.b"], "also_big,big,zz");
    }
}
