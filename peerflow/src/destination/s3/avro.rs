use apache_avro::{Schema, Writer};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::destination::RawRow;

/// One raw change event as written into the per-batch Avro OCF objects.
/// Field names match the raw-table layout; `_data` and `_match_data` carry
/// the interchange JSON as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAvroRecord {
    #[serde(rename = "_uid")]
    pub uid: String,
    #[serde(rename = "_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "_dest_table")]
    pub dest_table: String,
    #[serde(rename = "_data")]
    pub data: String,
    #[serde(rename = "_record_type")]
    pub record_type: i32,
    #[serde(rename = "_match_data")]
    pub match_data: String,
    #[serde(rename = "_batch_id")]
    pub batch_id: i64,
    #[serde(rename = "_unchanged_toast_columns")]
    pub unchanged_toast_columns: String,
}

impl RawAvroRecord {
    pub fn from_raw_row(row: &RawRow, batch_id: i64) -> RawAvroRecord {
        RawAvroRecord {
            uid: row.uid.clone(),
            timestamp: row.timestamp_ns,
            dest_table: row.dest_table.clone(),
            data: row.data.to_string(),
            record_type: i32::from(row.record_type),
            match_data: row.match_data.to_string(),
            batch_id,
            unchanged_toast_columns: row.unchanged_toast_columns.clone(),
        }
    }
}

pub fn raw_record_schema() -> Result<Schema, apache_avro::Error> {
    let schema = json!({
        "type": "record",
        "name": "RawRecord",
        "fields": [
            {"name": "_uid", "type": "string"},
            {"name": "_timestamp", "type": "long"},
            {"name": "_dest_table", "type": "string"},
            {"name": "_data", "type": "string"},
            {"name": "_record_type", "type": "int"},
            {"name": "_match_data", "type": "string"},
            {"name": "_batch_id", "type": "long"},
            {"name": "_unchanged_toast_columns", "type": "string"}
        ]
    });
    Schema::parse(&schema)
}

/// Encodes one batch of raw records as a self-describing Avro OCF payload.
pub fn encode_raw_batch(records: &[RawAvroRecord]) -> Result<Vec<u8>, apache_avro::Error> {
    let schema = raw_record_schema()?;
    let mut writer = Writer::new(&schema, Vec::new());
    for record in records {
        writer.append_ser(record)?;
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::Reader;

    fn record(uid: &str, batch_id: i64) -> RawAvroRecord {
        RawAvroRecord {
            uid: uid.to_string(),
            timestamp: 1_700_000_000_000_000_000,
            dest_table: "public.users".to_string(),
            data: r#"{"id":1}"#.to_string(),
            record_type: 0,
            match_data: "{}".to_string(),
            batch_id,
            unchanged_toast_columns: String::new(),
        }
    }

    #[test]
    fn schema_is_valid_avro() {
        raw_record_schema().unwrap();
    }

    #[test]
    fn encoded_batches_decode_back() {
        let records = vec![record("a", 3), record("b", 3)];
        let payload = encode_raw_batch(&records).unwrap();

        let reader = Reader::new(&payload[..]).unwrap();
        let decoded: Vec<RawAvroRecord> = reader
            .map(|value| apache_avro::from_value(&value.unwrap()).unwrap())
            .collect();

        assert_eq!(decoded, records);
    }

    #[test]
    fn empty_batches_encode_to_a_valid_container() {
        let payload = encode_raw_batch(&[]).unwrap();
        let reader = Reader::new(&payload[..]).unwrap();
        assert_eq!(reader.count(), 0);
    }
}
