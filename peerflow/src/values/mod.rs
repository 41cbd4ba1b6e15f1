use core::str;
use std::{
    num::{ParseFloatError, ParseIntError},
    str::Utf8Error,
};

use bigdecimal::ParseBigDecimalError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::types::Type;
use uuid::Uuid;

use self::{bool::ParseBoolError, hex::ByteaHexParseError, numeric::PgNumeric, text::ArrayParseError};

pub mod binary;
pub mod bool;
pub mod hex;
pub mod json;
pub mod numeric;
pub mod text;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    U32(u32),
    F32(f32),
    F64(f64),
    Numeric(PgNumeric),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeStamp(NaiveDateTime),
    TimeStampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Array(ArrayValue),
}

/// Array values keep per-element nullability, matching how Postgres arrays
/// arrive on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Bool(Vec<Option<bool>>),
    I16(Vec<Option<i16>>),
    I32(Vec<Option<i32>>),
    I64(Vec<Option<i64>>),
    U32(Vec<Option<u32>>),
    F32(Vec<Option<f32>>),
    F64(Vec<Option<f64>>),
    Numeric(Vec<Option<PgNumeric>>),
    String(Vec<Option<String>>),
    Bytes(Vec<Option<Vec<u8>>>),
    Uuid(Vec<Option<Uuid>>),
    Date(Vec<Option<NaiveDate>>),
    Time(Vec<Option<NaiveTime>>),
    TimeStamp(Vec<Option<NaiveDateTime>>),
    TimeStampTz(Vec<Option<DateTime<Utc>>>),
    Json(Vec<Option<serde_json::Value>>),
}

/// The stable kind tag carried across connectors. Unknown source types map
/// to [`ValueKind::Text`] and travel as their Postgres text representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytea,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    BoolArray,
    Int2Array,
    Int4Array,
    Int8Array,
    OidArray,
    Float4Array,
    Float8Array,
    NumericArray,
    TextArray,
    ByteaArray,
    UuidArray,
    DateArray,
    TimeArray,
    TimestampArray,
    TimestampTzArray,
    JsonArray,
}

impl ValueKind {
    /// Maps a type OID to its kind. OIDs this connector does not model
    /// (extension types, composites, enums) fall back to text.
    pub fn from_oid(oid: u32) -> ValueKind {
        match Type::from_oid(oid) {
            Some(typ) => Self::of_type(&typ),
            None => ValueKind::Text,
        }
    }

    pub fn of_type(typ: &Type) -> ValueKind {
        match *typ {
            Type::BOOL => ValueKind::Bool,
            Type::BOOL_ARRAY => ValueKind::BoolArray,
            Type::INT2 => ValueKind::Int2,
            Type::INT2_ARRAY => ValueKind::Int2Array,
            Type::INT4 => ValueKind::Int4,
            Type::INT4_ARRAY => ValueKind::Int4Array,
            Type::INT8 => ValueKind::Int8,
            Type::INT8_ARRAY => ValueKind::Int8Array,
            Type::OID => ValueKind::Oid,
            Type::OID_ARRAY => ValueKind::OidArray,
            Type::FLOAT4 => ValueKind::Float4,
            Type::FLOAT4_ARRAY => ValueKind::Float4Array,
            Type::FLOAT8 => ValueKind::Float8,
            Type::FLOAT8_ARRAY => ValueKind::Float8Array,
            Type::NUMERIC => ValueKind::Numeric,
            Type::NUMERIC_ARRAY => ValueKind::NumericArray,
            Type::BYTEA => ValueKind::Bytea,
            Type::BYTEA_ARRAY => ValueKind::ByteaArray,
            Type::UUID => ValueKind::Uuid,
            Type::UUID_ARRAY => ValueKind::UuidArray,
            Type::DATE => ValueKind::Date,
            Type::DATE_ARRAY => ValueKind::DateArray,
            Type::TIME => ValueKind::Time,
            Type::TIME_ARRAY => ValueKind::TimeArray,
            Type::TIMESTAMP => ValueKind::Timestamp,
            Type::TIMESTAMP_ARRAY => ValueKind::TimestampArray,
            Type::TIMESTAMPTZ => ValueKind::TimestampTz,
            Type::TIMESTAMPTZ_ARRAY => ValueKind::TimestampTzArray,
            Type::JSON | Type::JSONB => ValueKind::Json,
            Type::JSON_ARRAY | Type::JSONB_ARRAY => ValueKind::JsonArray,
            Type::CHAR_ARRAY
            | Type::BPCHAR_ARRAY
            | Type::VARCHAR_ARRAY
            | Type::NAME_ARRAY
            | Type::TEXT_ARRAY => ValueKind::TextArray,
            _ => ValueKind::Text,
        }
    }

    /// A representative Postgres type for this kind, used by the binary
    /// decoder and by bulk-load column descriptors.
    pub fn postgres_type(&self) -> Type {
        match self {
            ValueKind::Bool => Type::BOOL,
            ValueKind::Int2 => Type::INT2,
            ValueKind::Int4 => Type::INT4,
            ValueKind::Int8 => Type::INT8,
            ValueKind::Oid => Type::OID,
            ValueKind::Float4 => Type::FLOAT4,
            ValueKind::Float8 => Type::FLOAT8,
            ValueKind::Numeric => Type::NUMERIC,
            ValueKind::Text => Type::TEXT,
            ValueKind::Bytea => Type::BYTEA,
            ValueKind::Uuid => Type::UUID,
            ValueKind::Date => Type::DATE,
            ValueKind::Time => Type::TIME,
            ValueKind::Timestamp => Type::TIMESTAMP,
            ValueKind::TimestampTz => Type::TIMESTAMPTZ,
            ValueKind::Json => Type::JSONB,
            ValueKind::BoolArray => Type::BOOL_ARRAY,
            ValueKind::Int2Array => Type::INT2_ARRAY,
            ValueKind::Int4Array => Type::INT4_ARRAY,
            ValueKind::Int8Array => Type::INT8_ARRAY,
            ValueKind::OidArray => Type::OID_ARRAY,
            ValueKind::Float4Array => Type::FLOAT4_ARRAY,
            ValueKind::Float8Array => Type::FLOAT8_ARRAY,
            ValueKind::NumericArray => Type::NUMERIC_ARRAY,
            ValueKind::TextArray => Type::TEXT_ARRAY,
            ValueKind::ByteaArray => Type::BYTEA_ARRAY,
            ValueKind::UuidArray => Type::UUID_ARRAY,
            ValueKind::DateArray => Type::DATE_ARRAY,
            ValueKind::TimeArray => Type::TIME_ARRAY,
            ValueKind::TimestampArray => Type::TIMESTAMP_ARRAY,
            ValueKind::TimestampTzArray => Type::TIMESTAMPTZ_ARRAY,
            ValueKind::JsonArray => Type::JSONB_ARRAY,
        }
    }

    /// The SQL type used when creating a destination column of this kind.
    pub fn destination_type(&self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::Int2 => "smallint",
            ValueKind::Int4 => "integer",
            ValueKind::Int8 => "bigint",
            ValueKind::Oid => "oid",
            ValueKind::Float4 => "real",
            ValueKind::Float8 => "double precision",
            ValueKind::Numeric => "numeric",
            ValueKind::Text => "text",
            ValueKind::Bytea => "bytea",
            ValueKind::Uuid => "uuid",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::Timestamp => "timestamp",
            ValueKind::TimestampTz => "timestamptz",
            ValueKind::Json => "jsonb",
            ValueKind::BoolArray => "boolean[]",
            ValueKind::Int2Array => "smallint[]",
            ValueKind::Int4Array => "integer[]",
            ValueKind::Int8Array => "bigint[]",
            ValueKind::OidArray => "oid[]",
            ValueKind::Float4Array => "real[]",
            ValueKind::Float8Array => "double precision[]",
            ValueKind::NumericArray => "numeric[]",
            ValueKind::TextArray => "text[]",
            ValueKind::ByteaArray => "bytea[]",
            ValueKind::UuidArray => "uuid[]",
            ValueKind::DateArray => "date[]",
            ValueKind::TimeArray => "time[]",
            ValueKind::TimestampArray => "timestamp[]",
            ValueKind::TimestampTzArray => "timestamptz[]",
            ValueKind::JsonArray => "jsonb[]",
        }
    }
}

/// Tuple format of the replication stream. pgoutput sends text unless binary
/// mode was requested at START_REPLICATION time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Text,
    Binary,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid utf-8 value: {0}")]
    InvalidStr(#[from] Utf8Error),

    #[error("invalid bool value: {0}")]
    InvalidBool(#[from] ParseBoolError),

    #[error("invalid int value: {0}")]
    InvalidInt(#[from] ParseIntError),

    #[error("invalid float value: {0}")]
    InvalidFloat(#[from] ParseFloatError),

    #[error("invalid numeric value: {0}")]
    InvalidNumeric(#[from] ParseBigDecimalError),

    #[error("invalid bytea value: {0}")]
    InvalidBytea(#[from] ByteaHexParseError),

    #[error("invalid uuid value: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid json value: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid date or time value: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("invalid array value: {0}")]
    InvalidArray(#[from] ArrayParseError),

    #[error("binary decode error: {0:?}")]
    FromSql(#[from] Box<dyn std::error::Error + Sync + Send>),
}

impl Value {
    /// Decodes a wire value of the given kind from tuple bytes.
    pub fn from_wire(kind: ValueKind, bytes: &[u8], format: WireFormat) -> Result<Value, DecodeError> {
        match format {
            WireFormat::Text => Self::from_text(kind, str::from_utf8(bytes)?),
            WireFormat::Binary => binary::from_binary(kind, bytes),
        }
    }

    pub fn from_text(kind: ValueKind, s: &str) -> Result<Value, DecodeError> {
        text::from_text(kind, s)
    }

    /// The stable JSON interchange encoding written into raw tables. See
    /// [`json`] for the canonical forms per kind.
    pub fn to_json(&self) -> serde_json::Value {
        json::to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_oids_map_to_their_kind() {
        assert_eq!(ValueKind::from_oid(Type::BOOL.oid()), ValueKind::Bool);
        assert_eq!(ValueKind::from_oid(Type::INT8.oid()), ValueKind::Int8);
        assert_eq!(ValueKind::from_oid(Type::JSONB.oid()), ValueKind::Json);
        assert_eq!(
            ValueKind::from_oid(Type::TIMESTAMPTZ_ARRAY.oid()),
            ValueKind::TimestampTzArray
        );
    }

    #[test]
    fn unknown_oids_fall_back_to_text() {
        // no built-in type has oid 0; extension types land here too
        assert_eq!(ValueKind::from_oid(0), ValueKind::Text);
        assert_eq!(ValueKind::from_oid(999_999_999), ValueKind::Text);
    }

    #[test]
    fn representative_types_round_trip_through_oids() {
        for kind in [
            ValueKind::Bool,
            ValueKind::Numeric,
            ValueKind::Uuid,
            ValueKind::TimestampTz,
            ValueKind::Int4Array,
        ] {
            assert_eq!(ValueKind::from_oid(kind.postgres_type().oid()), kind);
        }
    }
}
