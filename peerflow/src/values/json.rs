use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::json;

use super::{ArrayValue, Value};

/// The raw-table interchange encoding. This is the contract between the sink
/// and the normalizer (and any downstream consumer scanning raw tables), so
/// the canonical forms below must stay stable across versions:
///
/// - numeric: decimal string, `"NaN"` for NaN
/// - uuid: lowercase 8-4-4-4-12
/// - timestamp / timestamptz: RFC 3339 with nanosecond precision
/// - date: `%Y-%m-%d`, time: `%H:%M:%S%.f`
/// - bytes: standard base64
/// - arrays: JSON arrays of element encodings
/// - json: embedded verbatim
/// - non-finite floats: null (JSON has no representation for them)
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::I16(i) => json!(i),
        Value::I32(i) => json!(i),
        Value::I64(i) => json!(i),
        Value::U32(u) => json!(u),
        Value::F32(f) => float_to_json(f64::from(*f)),
        Value::F64(f) => float_to_json(*f),
        Value::Numeric(n) => json!(n.to_string()),
        Value::String(s) => json!(s),
        Value::Bytes(b) => json!(BASE64.encode(b)),
        Value::Uuid(u) => json!(u.to_string()),
        Value::Date(d) => json!(encode_date(d)),
        Value::Time(t) => json!(encode_time(t)),
        Value::TimeStamp(ts) => json!(encode_timestamp(ts)),
        Value::TimeStampTz(ts) => json!(encode_timestamptz(ts)),
        Value::Json(j) => j.clone(),
        Value::Array(array) => array_to_json(array),
    }
}

fn float_to_json(f: f64) -> serde_json::Value {
    match serde_json::Number::from_f64(f) {
        Some(n) => serde_json::Value::Number(n),
        None => serde_json::Value::Null,
    }
}

fn encode_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn encode_time(t: &NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

fn encode_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.9f").to_string()
}

fn encode_timestamptz(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn array_to_json(array: &ArrayValue) -> serde_json::Value {
    fn collect<T, F>(elements: &[Option<T>], encode: F) -> serde_json::Value
    where
        F: Fn(&T) -> serde_json::Value,
    {
        serde_json::Value::Array(
            elements
                .iter()
                .map(|e| match e {
                    Some(v) => encode(v),
                    None => serde_json::Value::Null,
                })
                .collect(),
        )
    }

    match array {
        ArrayValue::Bool(v) => collect(v, |b| json!(b)),
        ArrayValue::I16(v) => collect(v, |i| json!(i)),
        ArrayValue::I32(v) => collect(v, |i| json!(i)),
        ArrayValue::I64(v) => collect(v, |i| json!(i)),
        ArrayValue::U32(v) => collect(v, |u| json!(u)),
        ArrayValue::F32(v) => collect(v, |f| float_to_json(f64::from(*f))),
        ArrayValue::F64(v) => collect(v, |f| float_to_json(*f)),
        ArrayValue::Numeric(v) => collect(v, |n| json!(n.to_string())),
        ArrayValue::String(v) => collect(v, |s| json!(s)),
        ArrayValue::Bytes(v) => collect(v, |b| json!(BASE64.encode(b))),
        ArrayValue::Uuid(v) => collect(v, |u| json!(u.to_string())),
        ArrayValue::Date(v) => collect(v, |d| json!(encode_date(d))),
        ArrayValue::Time(v) => collect(v, |t| json!(encode_time(t))),
        ArrayValue::TimeStamp(v) => collect(v, |ts| json!(encode_timestamp(ts))),
        ArrayValue::TimeStampTz(v) => collect(v, |ts| json!(encode_timestamptz(ts))),
        ArrayValue::Json(v) => collect(v, |j| j.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{numeric::PgNumeric, ValueKind};
    use uuid::Uuid;

    #[test]
    fn scalars_have_native_json_forms() {
        assert_eq!(to_json(&Value::Null), serde_json::Value::Null);
        assert_eq!(to_json(&Value::Bool(true)), json!(true));
        assert_eq!(to_json(&Value::I64(42)), json!(42));
        assert_eq!(to_json(&Value::F64(1.5)), json!(1.5));
        assert_eq!(to_json(&Value::String("x".to_string())), json!("x"));
    }

    #[test]
    fn non_finite_floats_encode_as_null() {
        assert_eq!(to_json(&Value::F64(f64::NAN)), serde_json::Value::Null);
        assert_eq!(to_json(&Value::F64(f64::INFINITY)), serde_json::Value::Null);
    }

    #[test]
    fn canonical_string_forms() {
        let numeric: PgNumeric = "10.500".parse().unwrap();
        assert_eq!(to_json(&Value::Numeric(numeric)), json!("10.500"));

        let uuid = Uuid::parse_str("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11").unwrap();
        assert_eq!(
            to_json(&Value::Uuid(uuid)),
            json!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
        );

        assert_eq!(to_json(&Value::Bytes(vec![1, 2, 3])), json!("AQID"));
    }

    #[test]
    fn timestamps_carry_nanosecond_precision() {
        let Value::TimeStampTz(ts) =
            Value::from_text(ValueKind::TimestampTz, "2024-03-01 10:23:54.123456+00").unwrap()
        else {
            panic!("expected timestamptz");
        };
        assert_eq!(
            to_json(&Value::TimeStampTz(ts)),
            json!("2024-03-01T10:23:54.123456000Z")
        );
    }

    #[test]
    fn arrays_encode_elementwise() {
        assert_eq!(
            to_json(&Value::Array(ArrayValue::I32(vec![Some(1), None, Some(3)]))),
            json!([1, null, 3])
        );
    }

    #[test]
    fn decode_of_encoded_form_round_trips() {
        // decode ∘ encode ∘ decode == decode, modulo documented canonical forms
        let cases = [
            (ValueKind::Numeric, "10.25"),
            (ValueKind::Uuid, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"),
            (ValueKind::Date, "2024-03-01"),
            (ValueKind::Time, "10:23:54.5"),
        ];
        for (kind, wire) in cases {
            let decoded = Value::from_text(kind, wire).unwrap();
            let encoded = to_json(&decoded);
            let reparsed = Value::from_text(kind, encoded.as_str().unwrap()).unwrap();
            assert_eq!(decoded, reparsed, "kind {kind:?}");
        }
    }
}
