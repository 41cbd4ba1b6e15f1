use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{bool::parse_bool, hex, ArrayValue, DecodeError, Value, ValueKind};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

#[derive(Debug, Error)]
pub enum ArrayParseError {
    #[error("array literal too short")]
    InputTooShort,

    #[error("array literal is missing braces")]
    MissingBraces,
}

/// Decodes the text representation of a value of the given kind, as produced
/// by pgoutput with binary mode off.
pub fn from_text(kind: ValueKind, s: &str) -> Result<Value, DecodeError> {
    match kind {
        ValueKind::Bool => Ok(Value::Bool(parse_bool(s)?)),
        ValueKind::Int2 => Ok(Value::I16(s.parse()?)),
        ValueKind::Int4 => Ok(Value::I32(s.parse()?)),
        ValueKind::Int8 => Ok(Value::I64(s.parse()?)),
        ValueKind::Oid => Ok(Value::U32(s.parse()?)),
        ValueKind::Float4 => Ok(Value::F32(s.parse()?)),
        ValueKind::Float8 => Ok(Value::F64(s.parse()?)),
        ValueKind::Numeric => Ok(Value::Numeric(s.parse()?)),
        ValueKind::Text => Ok(Value::String(s.to_string())),
        ValueKind::Bytea => Ok(Value::Bytes(hex::from_bytea_hex(s)?)),
        ValueKind::Uuid => Ok(Value::Uuid(Uuid::parse_str(s)?)),
        ValueKind::Date => Ok(Value::Date(NaiveDate::parse_from_str(s, DATE_FORMAT)?)),
        ValueKind::Time => Ok(Value::Time(NaiveTime::parse_from_str(s, TIME_FORMAT)?)),
        ValueKind::Timestamp => Ok(Value::TimeStamp(parse_timestamp(s)?)),
        ValueKind::TimestampTz => Ok(Value::TimeStampTz(parse_timestamptz(s)?)),
        ValueKind::Json => Ok(Value::Json(serde_json::from_str(s)?)),
        ValueKind::BoolArray => parse_array(s, |s| Ok(Some(parse_bool(s)?)), ArrayValue::Bool),
        ValueKind::Int2Array => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::I16),
        ValueKind::Int4Array => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::I32),
        ValueKind::Int8Array => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::I64),
        ValueKind::OidArray => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::U32),
        ValueKind::Float4Array => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::F32),
        ValueKind::Float8Array => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::F64),
        ValueKind::NumericArray => parse_array(s, |s| Ok(Some(s.parse()?)), ArrayValue::Numeric),
        ValueKind::TextArray => parse_array(s, |s| Ok(Some(s.to_string())), ArrayValue::String),
        ValueKind::ByteaArray => {
            parse_array(s, |s| Ok(Some(hex::from_bytea_hex(s)?)), ArrayValue::Bytes)
        }
        ValueKind::UuidArray => parse_array(s, |s| Ok(Some(Uuid::parse_str(s)?)), ArrayValue::Uuid),
        ValueKind::DateArray => parse_array(
            s,
            |s| Ok(Some(NaiveDate::parse_from_str(s, DATE_FORMAT)?)),
            ArrayValue::Date,
        ),
        ValueKind::TimeArray => parse_array(
            s,
            |s| Ok(Some(NaiveTime::parse_from_str(s, TIME_FORMAT)?)),
            ArrayValue::Time,
        ),
        ValueKind::TimestampArray => {
            parse_array(s, |s| Ok(Some(parse_timestamp(s)?)), ArrayValue::TimeStamp)
        }
        ValueKind::TimestampTzArray => parse_array(
            s,
            |s| Ok(Some(parse_timestamptz(s)?)),
            ArrayValue::TimeStampTz,
        ),
        ValueKind::JsonArray => {
            parse_array(s, |s| Ok(Some(serde_json::from_str(s)?)), ArrayValue::Json)
        }
    }
}

// Postgres column output first, ISO 8601 (the JSON interchange form) second.
fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::<FixedOffset>::parse_from_str(s, TIMESTAMPTZ_FORMAT)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_rfc3339(s))
        .map(Into::into)
}

fn parse_array<P, M, T>(s: &str, mut parse: P, wrap: M) -> Result<Value, DecodeError>
where
    P: FnMut(&str) -> Result<Option<T>, DecodeError>,
    M: FnOnce(Vec<Option<T>>) -> ArrayValue,
{
    if s.len() < 2 {
        return Err(ArrayParseError::InputTooShort.into());
    }

    if !s.starts_with('{') || !s.ends_with('}') {
        return Err(ArrayParseError::MissingBraces.into());
    }

    let mut elements = vec![];
    let body = &s[1..(s.len() - 1)];
    let mut element = String::with_capacity(10);
    let mut in_quotes = false;
    let mut in_escape = false;
    let mut quoted = false;
    let mut chars = body.chars();
    let mut done = body.is_empty();

    while !done {
        loop {
            match chars.next() {
                Some(c) => match c {
                    c if in_escape => {
                        element.push(c);
                        in_escape = false;
                    }
                    '"' => {
                        in_quotes = !in_quotes;
                        quoted = true;
                    }
                    '\\' => in_escape = true,
                    ',' if !in_quotes => break,
                    c => element.push(c),
                },
                None => {
                    done = true;
                    break;
                }
            }
        }
        // an unquoted NULL is the null element; a quoted "NULL" is the string
        let value = if !quoted && element.eq_ignore_ascii_case("null") {
            None
        } else {
            parse(&element)?
        };
        elements.push(value);
        element.clear();
        quoted = false;
    }

    Ok(Value::Array(wrap(elements)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::numeric::PgNumeric;

    #[test]
    fn decodes_scalar_kinds() {
        assert_eq!(from_text(ValueKind::Bool, "t").unwrap(), Value::Bool(true));
        assert_eq!(from_text(ValueKind::Int2, "-3").unwrap(), Value::I16(-3));
        assert_eq!(from_text(ValueKind::Int4, "42").unwrap(), Value::I32(42));
        assert_eq!(
            from_text(ValueKind::Int8, "9000000000").unwrap(),
            Value::I64(9_000_000_000)
        );
        assert_eq!(from_text(ValueKind::Float8, "1.5").unwrap(), Value::F64(1.5));
        assert_eq!(
            from_text(ValueKind::Text, "hello").unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(
            from_text(ValueKind::Bytea, "\\x0102").unwrap(),
            Value::Bytes(vec![1, 2])
        );
    }

    #[test]
    fn decodes_numeric_including_nan() {
        assert_eq!(
            from_text(ValueKind::Numeric, "10.25").unwrap(),
            Value::Numeric("10.25".parse::<PgNumeric>().unwrap())
        );
        let Value::Numeric(nan) = from_text(ValueKind::Numeric, "NaN").unwrap() else {
            panic!("expected numeric");
        };
        assert!(nan.is_nan());
    }

    #[test]
    fn decodes_temporal_kinds() {
        assert!(matches!(
            from_text(ValueKind::Date, "2024-03-01").unwrap(),
            Value::Date(_)
        ));
        assert!(matches!(
            from_text(ValueKind::Time, "10:23:54.123").unwrap(),
            Value::Time(_)
        ));
        assert!(matches!(
            from_text(ValueKind::Timestamp, "2024-03-01 10:23:54.123456").unwrap(),
            Value::TimeStamp(_)
        ));
        assert!(matches!(
            from_text(ValueKind::TimestampTz, "2024-03-01 10:23:54.123456+02").unwrap(),
            Value::TimeStampTz(_)
        ));
        // the interchange form parses too
        assert!(matches!(
            from_text(ValueKind::TimestampTz, "2024-03-01T08:23:54.123456000+00:00").unwrap(),
            Value::TimeStampTz(_)
        ));
    }

    #[test]
    fn decodes_uuid_and_json() {
        assert!(matches!(
            from_text(ValueKind::Uuid, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap(),
            Value::Uuid(_)
        ));
        assert_eq!(
            from_text(ValueKind::Json, r#"{"a":1}"#).unwrap(),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn decodes_array_literals() {
        assert_eq!(
            from_text(ValueKind::Int4Array, "{1,2,NULL,4}").unwrap(),
            Value::Array(ArrayValue::I32(vec![Some(1), Some(2), None, Some(4)]))
        );
        assert_eq!(
            from_text(ValueKind::TextArray, r#"{simple,"with, comma","esc\"aped"}"#).unwrap(),
            Value::Array(ArrayValue::String(vec![
                Some("simple".to_string()),
                Some("with, comma".to_string()),
                Some("esc\"aped".to_string()),
            ]))
        );
        // quoted NULL is the string, bare NULL is the null element
        assert_eq!(
            from_text(ValueKind::TextArray, r#"{NULL,"NULL"}"#).unwrap(),
            Value::Array(ArrayValue::String(vec![None, Some("NULL".to_string())]))
        );
        assert_eq!(
            from_text(ValueKind::BoolArray, "{}").unwrap(),
            Value::Array(ArrayValue::Bool(vec![]))
        );
    }

    #[test]
    fn rejects_malformed_arrays() {
        assert!(from_text(ValueKind::Int4Array, "1,2").is_err());
        assert!(from_text(ValueKind::Int4Array, "{").is_err());
    }
}
