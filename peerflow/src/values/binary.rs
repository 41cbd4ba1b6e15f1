use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::FromSql;
use uuid::Uuid;

use super::{numeric::PgNumeric, ArrayValue, DecodeError, Value, ValueKind};

/// Decodes a binary wire value of the given kind via the `FromSql`
/// implementations of the underlying types. Used for binary-mode tuples;
/// the CDC path itself streams text.
pub fn from_binary(kind: ValueKind, raw: &[u8]) -> Result<Value, DecodeError> {
    let typ = kind.postgres_type();
    let value = match kind {
        ValueKind::Bool => Value::Bool(bool::from_sql(&typ, raw)?),
        ValueKind::Int2 => Value::I16(i16::from_sql(&typ, raw)?),
        ValueKind::Int4 => Value::I32(i32::from_sql(&typ, raw)?),
        ValueKind::Int8 => Value::I64(i64::from_sql(&typ, raw)?),
        ValueKind::Oid => Value::U32(u32::from_sql(&typ, raw)?),
        ValueKind::Float4 => Value::F32(f32::from_sql(&typ, raw)?),
        ValueKind::Float8 => Value::F64(f64::from_sql(&typ, raw)?),
        ValueKind::Numeric => Value::Numeric(PgNumeric::from_sql(&typ, raw)?),
        ValueKind::Text => Value::String(String::from_sql(&typ, raw)?),
        ValueKind::Bytea => Value::Bytes(Vec::<u8>::from_sql(&typ, raw)?),
        ValueKind::Uuid => Value::Uuid(Uuid::from_sql(&typ, raw)?),
        ValueKind::Date => Value::Date(NaiveDate::from_sql(&typ, raw)?),
        ValueKind::Time => Value::Time(NaiveTime::from_sql(&typ, raw)?),
        ValueKind::Timestamp => Value::TimeStamp(NaiveDateTime::from_sql(&typ, raw)?),
        ValueKind::TimestampTz => {
            Value::TimeStampTz(DateTime::<FixedOffset>::from_sql(&typ, raw)?.into())
        }
        ValueKind::Json => Value::Json(serde_json::Value::from_sql(&typ, raw)?),
        ValueKind::BoolArray => Value::Array(ArrayValue::Bool(Vec::from_sql(&typ, raw)?)),
        ValueKind::Int2Array => Value::Array(ArrayValue::I16(Vec::from_sql(&typ, raw)?)),
        ValueKind::Int4Array => Value::Array(ArrayValue::I32(Vec::from_sql(&typ, raw)?)),
        ValueKind::Int8Array => Value::Array(ArrayValue::I64(Vec::from_sql(&typ, raw)?)),
        ValueKind::OidArray => Value::Array(ArrayValue::U32(Vec::from_sql(&typ, raw)?)),
        ValueKind::Float4Array => Value::Array(ArrayValue::F32(Vec::from_sql(&typ, raw)?)),
        ValueKind::Float8Array => Value::Array(ArrayValue::F64(Vec::from_sql(&typ, raw)?)),
        ValueKind::NumericArray => Value::Array(ArrayValue::Numeric(Vec::from_sql(&typ, raw)?)),
        ValueKind::TextArray => Value::Array(ArrayValue::String(Vec::from_sql(&typ, raw)?)),
        ValueKind::ByteaArray => Value::Array(ArrayValue::Bytes(Vec::from_sql(&typ, raw)?)),
        ValueKind::UuidArray => Value::Array(ArrayValue::Uuid(Vec::from_sql(&typ, raw)?)),
        ValueKind::DateArray => Value::Array(ArrayValue::Date(Vec::from_sql(&typ, raw)?)),
        ValueKind::TimeArray => Value::Array(ArrayValue::Time(Vec::from_sql(&typ, raw)?)),
        ValueKind::TimestampArray => Value::Array(ArrayValue::TimeStamp(Vec::from_sql(&typ, raw)?)),
        ValueKind::TimestampTzArray => {
            let mut elements = Vec::<Option<DateTime<FixedOffset>>>::from_sql(&typ, raw)?;
            let elements: Vec<Option<DateTime<Utc>>> =
                elements.drain(..).map(|v| v.map(Into::into)).collect();
            Value::Array(ArrayValue::TimeStampTz(elements))
        }
        ValueKind::JsonArray => Value::Array(ArrayValue::Json(Vec::from_sql(&typ, raw)?)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fixed_width_scalars() {
        assert_eq!(
            from_binary(ValueKind::Int2, &3i16.to_be_bytes()).unwrap(),
            Value::I16(3)
        );
        assert_eq!(
            from_binary(ValueKind::Int4, &(-7i32).to_be_bytes()).unwrap(),
            Value::I32(-7)
        );
        assert_eq!(
            from_binary(ValueKind::Int8, &42i64.to_be_bytes()).unwrap(),
            Value::I64(42)
        );
        assert_eq!(
            from_binary(ValueKind::Float8, &1.5f64.to_be_bytes()).unwrap(),
            Value::F64(1.5)
        );
        assert_eq!(from_binary(ValueKind::Bool, &[1]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn decodes_text_and_bytes() {
        assert_eq!(
            from_binary(ValueKind::Text, b"hello").unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(
            from_binary(ValueKind::Bytea, &[0, 1, 2]).unwrap(),
            Value::Bytes(vec![0, 1, 2])
        );
    }

    #[test]
    fn decodes_uuids() {
        let uuid = Uuid::parse_str("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap();
        assert_eq!(
            from_binary(ValueKind::Uuid, uuid.as_bytes()).unwrap(),
            Value::Uuid(uuid)
        );
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        assert!(from_binary(ValueKind::Int8, &[0, 1]).is_err());
    }
}
