use std::{
    collections::{BTreeSet, HashMap},
    pin::Pin,
    str::Utf8Error,
    task::{Context, Poll},
    time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH},
};

use futures::{ready, Stream};
use pin_project_lite::pin_project;
use postgres_replication::protocol::{
    DeleteBody, InsertBody, LogicalReplicationMessage, RelationBody, ReplicationMessage, TupleData,
    UpdateBody,
};
use thiserror::Error;
use tokio_postgres::{replication::LogicalReplicationStream, types::PgLsn};

use crate::records::{
    Checkpoint, DeleteRecord, InsertRecord, Record, RecordItems, UpdateRecord,
};
use crate::table::TableId;
use crate::values::{DecodeError, Value, ValueKind, WireFormat};

#[derive(Debug, Error)]
pub enum CdcEventError {
    #[error("value decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid string in replication message: {0}")]
    InvalidStr(#[from] Utf8Error),

    #[error("malformed replication message: {0}")]
    Io(#[from] std::io::Error),

    #[error("no relation message seen for table id {0}")]
    MissingRelation(TableId),

    #[error("delete message carries neither key nor old tuple")]
    MissingTupleInDelete,
}

#[derive(Debug, Clone)]
pub struct RelationColumn {
    pub name: String,
    pub kind: ValueKind,
    pub primary: bool,
}

/// Source-table shape as announced by the stream's Relation messages.
#[derive(Debug, Clone)]
pub struct Relation {
    pub table_id: TableId,
    pub namespace: String,
    pub name: String,
    pub columns: Vec<RelationColumn>,
}

impl Relation {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Decodes tuple messages into records against the relation map announced by
/// the stream. Records are fully materialized here so nothing downstream
/// needs the relation state.
pub struct RecordDecoder {
    table_name_mapping: HashMap<String, String>,
    relations: HashMap<TableId, Relation>,
    dest_tables: HashMap<TableId, String>,
}

impl RecordDecoder {
    pub fn new(table_name_mapping: HashMap<String, String>) -> Self {
        RecordDecoder {
            table_name_mapping,
            relations: HashMap::new(),
            dest_tables: HashMap::new(),
        }
    }

    /// Refreshes the relation map. The publication may announce relations the
    /// mirror does not map; their change messages are dropped at decode time.
    pub fn handle_relation(&mut self, body: &RelationBody) -> Result<(), CdcEventError> {
        let columns = body
            .columns()
            .iter()
            .map(|column| {
                Ok(RelationColumn {
                    name: column.name()?.to_string(),
                    kind: ValueKind::from_oid(column.type_id() as u32),
                    // flag bit 1 marks key membership
                    primary: column.flags() == 1,
                })
            })
            .collect::<Result<Vec<_>, CdcEventError>>()?;

        let relation = Relation {
            table_id: body.rel_id(),
            namespace: body.namespace()?.to_string(),
            name: body.name()?.to_string(),
            columns,
        };

        match self.table_name_mapping.get(&relation.qualified_name()) {
            Some(dest) => {
                self.dest_tables.insert(relation.table_id, dest.clone());
            }
            None => {
                self.dest_tables.remove(&relation.table_id);
            }
        }
        self.relations.insert(relation.table_id, relation);

        Ok(())
    }

    fn relation(&self, table_id: TableId) -> Result<&Relation, CdcEventError> {
        self.relations
            .get(&table_id)
            .ok_or(CdcEventError::MissingRelation(table_id))
    }

    fn dest_table(&self, table_id: TableId) -> Option<&String> {
        self.dest_tables.get(&table_id)
    }

    /// Snapshot of relation-id → destination-table for the batch in flight.
    pub fn table_mapping_snapshot(&self) -> HashMap<TableId, String> {
        self.dest_tables.clone()
    }

    fn decode_tuple(
        &self,
        relation: &Relation,
        tuple_data: &[TupleData],
    ) -> Result<(RecordItems, BTreeSet<String>), CdcEventError> {
        let mut items = RecordItems::new();
        let mut unchanged_toast_columns = BTreeSet::new();

        for (column, datum) in relation.columns.iter().zip(tuple_data) {
            match datum {
                TupleData::Null => {
                    items.insert(column.name.clone(), Value::Null);
                }
                TupleData::UnchangedToast => {
                    unchanged_toast_columns.insert(column.name.clone());
                }
                TupleData::Text(bytes) => {
                    let value = Value::from_wire(column.kind, bytes, WireFormat::Text)?;
                    items.insert(column.name.clone(), value);
                }
                TupleData::Binary(bytes) => {
                    let value = Value::from_wire(column.kind, bytes, WireFormat::Binary)?;
                    items.insert(column.name.clone(), value);
                }
            }
        }

        Ok((items, unchanged_toast_columns))
    }

    /// Returns `None` when the relation is not mapped by this mirror.
    pub fn decode_insert(
        &self,
        body: &InsertBody,
        checkpoint: Checkpoint,
    ) -> Result<Option<Record>, CdcEventError> {
        let Some(dest_table) = self.dest_table(body.rel_id()) else {
            return Ok(None);
        };
        let relation = self.relation(body.rel_id())?;
        let (items, _) = self.decode_tuple(relation, body.tuple().tuple_data())?;

        Ok(Some(Record::Insert(InsertRecord {
            dest_table: dest_table.clone(),
            items,
            checkpoint,
        })))
    }

    pub fn decode_update(
        &self,
        body: &UpdateBody,
        checkpoint: Checkpoint,
    ) -> Result<Option<Record>, CdcEventError> {
        let Some(dest_table) = self.dest_table(body.rel_id()) else {
            return Ok(None);
        };
        let relation = self.relation(body.rel_id())?;

        let (new_items, unchanged_toast_columns) =
            self.decode_tuple(relation, body.new_tuple().tuple_data())?;
        // 'K' sends the old key, 'O' the full old tuple; both decode the same
        let old_items = match body.key_tuple().or(body.old_tuple()) {
            Some(tuple) => self.decode_tuple(relation, tuple.tuple_data())?.0,
            None => RecordItems::new(),
        };

        Ok(Some(Record::Update(UpdateRecord {
            dest_table: dest_table.clone(),
            new_items,
            old_items,
            unchanged_toast_columns,
            checkpoint,
        })))
    }

    pub fn decode_delete(
        &self,
        body: &DeleteBody,
        checkpoint: Checkpoint,
    ) -> Result<Option<Record>, CdcEventError> {
        let Some(dest_table) = self.dest_table(body.rel_id()) else {
            return Ok(None);
        };
        let relation = self.relation(body.rel_id())?;

        let tuple = body
            .key_tuple()
            .or(body.old_tuple())
            .ok_or(CdcEventError::MissingTupleInDelete)?;
        let (items, _) = self.decode_tuple(relation, tuple.tuple_data())?;

        Ok(Some(Record::Delete(DeleteRecord {
            dest_table: dest_table.clone(),
            items,
            checkpoint,
        })))
    }
}

#[derive(Debug, Error)]
pub enum StatusUpdateError {
    #[error("system time error: {0}")]
    SystemTime(#[from] SystemTimeError),

    #[error("postgres error: {0}")]
    TokioPostgres(#[from] tokio_postgres::Error),
}

// seconds between the unix and postgres epochs (2000-01-01)
const POSTGRES_EPOCH_OFFSET_SECS: u64 = 946_684_800;

pin_project! {
    /// The replication socket. Confirming a flushed position through
    /// [`CdcStream::send_status_update`] lets the source recycle WAL up to
    /// that point.
    pub struct CdcStream {
        #[pin]
        stream: LogicalReplicationStream,
        postgres_epoch: SystemTime,
    }
}

impl CdcStream {
    pub fn new(stream: LogicalReplicationStream) -> Self {
        CdcStream {
            stream,
            postgres_epoch: UNIX_EPOCH + Duration::from_secs(POSTGRES_EPOCH_OFFSET_SECS),
        }
    }

    pub async fn send_status_update(
        self: Pin<&mut Self>,
        flushed: PgLsn,
    ) -> Result<(), StatusUpdateError> {
        let this = self.project();
        let timestamp = this.postgres_epoch.elapsed()?.as_micros() as i64;
        this.stream
            .standby_status_update(flushed, flushed, flushed, timestamp, 0)
            .await?;
        Ok(())
    }
}

impl Stream for CdcStream {
    type Item = Result<ReplicationMessage<LogicalReplicationMessage>, tokio_postgres::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        Poll::Ready(ready!(this.stream.poll_next(cx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decoder_with_relation() -> RecordDecoder {
        let mut decoder = RecordDecoder::new(HashMap::from([(
            "public.users".to_string(),
            "public.users_mirror".to_string(),
        )]));
        decoder.relations.insert(
            1,
            Relation {
                table_id: 1,
                namespace: "public".to_string(),
                name: "users".to_string(),
                columns: vec![
                    RelationColumn {
                        name: "id".to_string(),
                        kind: ValueKind::Int8,
                        primary: true,
                    },
                    RelationColumn {
                        name: "payload".to_string(),
                        kind: ValueKind::Text,
                        primary: false,
                    },
                ],
            },
        );
        decoder
            .dest_tables
            .insert(1, "public.users_mirror".to_string());
        decoder
    }

    #[test]
    fn tuples_decode_into_typed_items() {
        let decoder = decoder_with_relation();
        let relation = decoder.relation(1).unwrap();

        let tuple = [
            TupleData::Text(Bytes::from_static(b"7")),
            TupleData::Text(Bytes::from_static(b"hello")),
        ];
        let (items, unchanged) = decoder.decode_tuple(relation, &tuple).unwrap();

        assert_eq!(items["id"], Value::I64(7));
        assert_eq!(items["payload"], Value::String("hello".to_string()));
        assert!(unchanged.is_empty());
    }

    #[test]
    fn unchanged_toast_columns_are_collected_not_decoded() {
        let decoder = decoder_with_relation();
        let relation = decoder.relation(1).unwrap();

        let tuple = [
            TupleData::Text(Bytes::from_static(b"7")),
            TupleData::UnchangedToast,
        ];
        let (items, unchanged) = decoder.decode_tuple(relation, &tuple).unwrap();

        assert_eq!(items.len(), 1);
        assert!(!items.contains_key("payload"));
        assert_eq!(unchanged, BTreeSet::from(["payload".to_string()]));
    }

    #[test]
    fn null_tuples_decode_to_null_values() {
        let decoder = decoder_with_relation();
        let relation = decoder.relation(1).unwrap();

        let tuple = [
            TupleData::Text(Bytes::from_static(b"7")),
            TupleData::Null,
        ];
        let (items, _) = decoder.decode_tuple(relation, &tuple).unwrap();
        assert_eq!(items["payload"], Value::Null);
    }

    #[test]
    fn snapshot_only_contains_mapped_relations() {
        let decoder = decoder_with_relation();
        let snapshot = decoder.table_mapping_snapshot();
        assert_eq!(snapshot, HashMap::from([(1, "public.users_mirror".to_string())]));
    }
}
