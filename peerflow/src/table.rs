use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escape::quote_identifier;
use crate::values::ValueKind;

#[derive(Debug, Error)]
#[error("invalid table name: `{0}`, expected schema.table")]
pub struct ParseTableNameError(String);

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: String, name: String) -> Self {
        TableName { schema, name }
    }

    /// Parses a `schema.table` identifier as it appears in mirror
    /// configuration.
    pub fn parse(qualified: &str) -> Result<TableName, ParseTableNameError> {
        let mut parts = qualified.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(schema), Some(name), None) if !schema.is_empty() && !name.is_empty() => {
                Ok(TableName {
                    schema: schema.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ParseTableNameError(qualified.to_string())),
        }
    }

    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Postgres relation id of a source table.
pub type TableId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_id: TableId,
    pub table_name: TableName,
    pub column_schemas: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Columns of the discovered primary key. Empty when the source table has
    /// no declared key, in which case consumers treat every column as key.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.column_schemas
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.column_schemas.iter().any(|c| c.primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_names() {
        let name = TableName::parse("public.events").unwrap();
        assert_eq!(name.schema, "public");
        assert_eq!(name.name, "events");
        assert_eq!(name.as_quoted_identifier(), r#""public"."events""#);
    }

    #[test]
    fn rejects_unqualified_names() {
        assert!(TableName::parse("events").is_err());
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse(".events").is_err());
    }

    #[test]
    fn primary_key_discovery_is_reflected() {
        let schema = TableSchema {
            table_id: 42,
            table_name: TableName::parse("public.users").unwrap(),
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
        assert!(schema.has_primary_key());
        assert_eq!(schema.primary_key_columns(), vec!["id"]);
    }
}
