use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value as JsonValue};

use crate::table::TableId;
use crate::values::Value;

/// A position in the source's write-ahead log (the Postgres LSN). Confirmed
/// checkpoints let the source recycle log segments up to that point.
pub type Checkpoint = u64;

/// Column name → decoded value. Ordered so the JSON interchange encoding is
/// deterministic.
pub type RecordItems = BTreeMap<String, Value>;

pub fn items_to_json(items: &RecordItems) -> JsonValue {
    let mut object = Map::with_capacity(items.len());
    for (column, value) in items {
        object.insert(column.clone(), value.to_json());
    }
    JsonValue::Object(object)
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRecord {
    pub dest_table: String,
    pub items: RecordItems,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub dest_table: String,
    /// All columns except the ones listed in `unchanged_toast_columns`.
    pub new_items: RecordItems,
    /// Key (or full old) tuple when the source sent one, empty otherwise.
    pub old_items: RecordItems,
    /// Columns whose new-tuple value was the unchanged-TOAST sentinel.
    pub unchanged_toast_columns: BTreeSet<String>,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRecord {
    pub dest_table: String,
    /// Key columns are always present; replica identity full adds the rest.
    pub items: RecordItems,
    pub checkpoint: Checkpoint,
}

/// One decoded change event, carrying the commit position of its enclosing
/// transaction as its checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Insert(InsertRecord),
    Update(UpdateRecord),
    Delete(DeleteRecord),
}

impl Record {
    pub fn dest_table(&self) -> &str {
        match self {
            Record::Insert(r) => &r.dest_table,
            Record::Update(r) => &r.dest_table,
            Record::Delete(r) => &r.dest_table,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Record::Insert(r) => r.checkpoint,
            Record::Update(r) => r.checkpoint,
            Record::Delete(r) => r.checkpoint,
        }
    }
}

/// An ordered batch of records ending on a transaction boundary.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    pub first_checkpoint: Checkpoint,
    pub last_checkpoint: Checkpoint,
    pub table_name_to_row_count: HashMap<String, u64>,
    /// Snapshot of the relation-id → destination-table mapping used while
    /// decoding this batch.
    pub table_mapping: HashMap<TableId, String>,
}

impl RecordBatch {
    /// An empty batch whose checkpoints are unchanged from the caller's last
    /// synced position.
    pub fn empty(last_checkpoint: Checkpoint) -> Self {
        RecordBatch {
            records: Vec::new(),
            first_checkpoint: 0,
            last_checkpoint,
            table_name_to_row_count: HashMap::new(),
            table_mapping: HashMap::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        if self.records.is_empty() {
            self.first_checkpoint = record.checkpoint();
        }
        self.last_checkpoint = self.last_checkpoint.max(record.checkpoint());
        *self
            .table_name_to_row_count
            .entry(record.dest_table().to_string())
            .or_default() += 1;
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(table: &str, checkpoint: Checkpoint) -> Record {
        Record::Insert(InsertRecord {
            dest_table: table.to_string(),
            items: RecordItems::from([("id".to_string(), Value::I64(1))]),
            checkpoint,
        })
    }

    #[test]
    fn items_serialize_in_column_order() {
        let items = RecordItems::from([
            ("zeta".to_string(), Value::I32(1)),
            ("alpha".to_string(), Value::String("x".to_string())),
        ]);
        let json = items_to_json(&items);
        assert_eq!(json, json!({"alpha": "x", "zeta": 1}));
        // BTreeMap ordering makes the serialized text deterministic
        assert_eq!(json.to_string(), r#"{"alpha":"x","zeta":1}"#);
    }

    #[test]
    fn batch_tracks_checkpoints_and_row_counts() {
        let mut batch = RecordBatch::empty(10);
        assert!(batch.is_empty());
        assert_eq!(batch.last_checkpoint, 10);

        batch.push(insert("public.users", 20));
        batch.push(insert("public.users", 20));
        batch.push(insert("public.orders", 30));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.first_checkpoint, 20);
        assert_eq!(batch.last_checkpoint, 30);
        assert_eq!(batch.table_name_to_row_count["public.users"], 2);
        assert_eq!(batch.table_name_to_row_count["public.orders"], 1);
    }

    #[test]
    fn last_checkpoint_never_regresses() {
        let mut batch = RecordBatch::empty(100);
        batch.push(insert("t", 50));
        assert_eq!(batch.last_checkpoint, 100);
    }
}
