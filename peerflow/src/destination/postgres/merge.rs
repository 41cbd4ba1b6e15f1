use std::collections::BTreeSet;

use crate::escape::{quote_identifier, quote_literal};
use crate::table::TableName;

/// A destination-table column as introspected at normalize time. The name
/// and cast type are authoritative; `primary` reflects the table's declared
/// primary key.
#[derive(Debug, Clone)]
pub struct NormalizedColumn {
    pub name: String,
    pub cast_type: String,
    pub primary: bool,
}

/// Reduces the raw rows of one table in the batch range `($1, $2]` to the
/// last row per key, ordered by `_timestamp` with insertion order breaking
/// ties on the append-only heap.
fn reduced_rows_subquery(raw_table: &str, columns: &[NormalizedColumn], keys: &[&NormalizedColumn]) -> String {
    let key_exprs = keys
        .iter()
        .map(|column| format!("(_data->>{})", quote_literal(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let extractions = columns
        .iter()
        .map(|column| {
            format!(
                "(_data->>{})::{} AS {}",
                quote_literal(&column.name),
                column.cast_type,
                quote_identifier(&column.name)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT DISTINCT ON ({key_exprs}) {extractions}, _record_type, _unchanged_toast_columns \
         FROM {raw_table} \
         WHERE _dest_table = $3 AND _batch_id > $1 AND _batch_id <= $2 \
         ORDER BY {key_exprs}, _timestamp DESC, ctid DESC"
    )
}

fn key_columns(columns: &[NormalizedColumn]) -> Vec<&NormalizedColumn> {
    let declared: Vec<&NormalizedColumn> = columns.iter().filter(|c| c.primary).collect();
    if !declared.is_empty() {
        return declared;
    }
    // no declared key: treat every column as key, degenerate but conservative
    columns.iter().collect()
}

fn join_condition(keys: &[&NormalizedColumn], null_safe: bool) -> String {
    keys.iter()
        .map(|column| {
            let name = quote_identifier(&column.name);
            if null_safe {
                format!("dst.{name} IS NOT DISTINCT FROM src.{name}")
            } else {
                format!("dst.{name} = src.{name}")
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Value expression preserving the destination value for columns the source
/// flagged as unchanged TOAST on that row.
fn update_value_expr(column: &NormalizedColumn, unchanged_toast_columns: &BTreeSet<String>) -> String {
    let name = quote_identifier(&column.name);
    if unchanged_toast_columns.contains(&column.name) {
        format!(
            "CASE WHEN {} = ANY(STRING_TO_ARRAY(src._unchanged_toast_columns, ',')) \
             THEN dst.{name} ELSE src.{name} END",
            quote_literal(&column.name)
        )
    } else {
        format!("src.{name}")
    }
}

/// The single-statement MERGE normalization used on servers that support it.
/// Parameters: `$1` = normalize batch id (exclusive), `$2` = sync batch id
/// (inclusive), `$3` = destination table name as recorded in the raw rows.
pub fn merge_statement(
    raw_table: &str,
    dest_table: &TableName,
    columns: &[NormalizedColumn],
    unchanged_toast_columns: &BTreeSet<String>,
) -> String {
    let keys = key_columns(columns);
    let null_safe = !columns.iter().any(|c| c.primary);
    let source = reduced_rows_subquery(raw_table, columns, &keys);
    let target = dest_table.as_quoted_identifier();
    let on = join_condition(&keys, null_safe);

    let insert_columns = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_values = columns
        .iter()
        .map(|c| format!("src.{}", quote_identifier(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let non_key_columns: Vec<&NormalizedColumn> =
        columns.iter().filter(|c| !keys.iter().any(|k| k.name == c.name)).collect();

    let mut statement = format!(
        "MERGE INTO {target} AS dst USING ({source}) AS src ON {on} \
         WHEN MATCHED AND src._record_type = 2 THEN DELETE"
    );

    if !non_key_columns.is_empty() {
        let assignments = non_key_columns
            .iter()
            .map(|column| {
                format!(
                    "{} = {}",
                    quote_identifier(&column.name),
                    update_value_expr(column, unchanged_toast_columns)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        statement.push_str(&format!(
            " WHEN MATCHED AND src._record_type <> 2 THEN UPDATE SET {assignments}"
        ));
    }

    statement.push_str(&format!(
        " WHEN NOT MATCHED AND src._record_type <> 2 THEN INSERT ({insert_columns}) VALUES ({insert_values})"
    ));

    statement
}

/// The three-statement fallback for servers without MERGE: insert-new,
/// update-with-TOAST-preservation, delete. Executed in order inside the
/// normalize transaction; same parameters as [`merge_statement`].
pub fn fallback_statements(
    raw_table: &str,
    dest_table: &TableName,
    columns: &[NormalizedColumn],
    unchanged_toast_columns: &BTreeSet<String>,
) -> Vec<String> {
    let keys = key_columns(columns);
    let null_safe = !columns.iter().any(|c| c.primary);
    let source = reduced_rows_subquery(raw_table, columns, &keys);
    let target = dest_table.as_quoted_identifier();
    let on = join_condition(&keys, null_safe);

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict_target = if null_safe {
        String::new()
    } else {
        let key_list = keys
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ({key_list})")
    };

    let insert = format!(
        "INSERT INTO {target} ({column_list}) \
         SELECT {column_list} FROM ({source}) AS src WHERE src._record_type = 0 \
         ON CONFLICT{conflict_target} DO NOTHING"
    );

    let delete = format!(
        "DELETE FROM {target} AS dst USING ({source}) AS src \
         WHERE {on} AND src._record_type = 2"
    );

    let non_key_columns: Vec<&NormalizedColumn> =
        columns.iter().filter(|c| !keys.iter().any(|k| k.name == c.name)).collect();
    if non_key_columns.is_empty() {
        return vec![insert, delete];
    }

    let assignments = non_key_columns
        .iter()
        .map(|column| {
            let name = quote_identifier(&column.name);
            if unchanged_toast_columns.contains(&column.name) {
                format!("{name} = COALESCE(src.{name}, dst.{name})")
            } else {
                format!("{name} = src.{name}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let update = format!(
        "UPDATE {target} AS dst SET {assignments} FROM ({source}) AS src \
         WHERE {on} AND src._record_type = 1"
    );

    vec![insert, update, delete]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, cast_type: &str, primary: bool) -> NormalizedColumn {
        NormalizedColumn {
            name: name.to_string(),
            cast_type: cast_type.to_string(),
            primary,
        }
    }

    fn users_columns() -> Vec<NormalizedColumn> {
        vec![
            column("id", "bigint", true),
            column("name", "text", false),
            column("bio", "text", false),
        ]
    }

    fn users_table() -> TableName {
        TableName::parse("public.users").unwrap()
    }

    const RAW: &str = r#""_peerdb_internal"."_peerdb_raw_job""#;

    #[test]
    fn merge_reduces_to_last_row_per_key() {
        let statement = merge_statement(RAW, &users_table(), &users_columns(), &BTreeSet::new());

        assert!(statement.contains("SELECT DISTINCT ON ((_data->>'id'))"));
        assert!(statement.contains("ORDER BY (_data->>'id'), _timestamp DESC, ctid DESC"));
        assert!(statement.contains("_dest_table = $3 AND _batch_id > $1 AND _batch_id <= $2"));
    }

    #[test]
    fn merge_handles_all_three_record_types() {
        let statement = merge_statement(RAW, &users_table(), &users_columns(), &BTreeSet::new());

        assert!(statement.contains("WHEN MATCHED AND src._record_type = 2 THEN DELETE"));
        assert!(statement.contains("WHEN MATCHED AND src._record_type <> 2 THEN UPDATE SET"));
        assert!(statement
            .contains(r#"WHEN NOT MATCHED AND src._record_type <> 2 THEN INSERT ("id", "name", "bio")"#));
        assert!(statement.contains(r#"ON dst."id" = src."id""#));
    }

    #[test]
    fn merge_preserves_unchanged_toast_columns() {
        let toast = BTreeSet::from(["bio".to_string()]);
        let statement = merge_statement(RAW, &users_table(), &users_columns(), &toast);

        assert!(statement.contains(
            r#""bio" = CASE WHEN 'bio' = ANY(STRING_TO_ARRAY(src._unchanged_toast_columns, ',')) THEN dst."bio" ELSE src."bio" END"#
        ));
        // untouched columns assign directly
        assert!(statement.contains(r#""name" = src."name""#));
    }

    #[test]
    fn merge_casts_json_extractions_to_destination_types() {
        let statement = merge_statement(RAW, &users_table(), &users_columns(), &BTreeSet::new());
        assert!(statement.contains(r#"(_data->>'id')::bigint AS "id""#));
        assert!(statement.contains(r#"(_data->>'name')::text AS "name""#));
    }

    #[test]
    fn merge_without_declared_key_uses_all_columns_null_safely() {
        let columns = vec![column("a", "integer", false), column("b", "text", false)];
        let statement = merge_statement(RAW, &users_table(), &columns, &BTreeSet::new());

        assert!(statement.contains(r#"dst."a" IS NOT DISTINCT FROM src."a""#));
        assert!(statement.contains(r#"dst."b" IS NOT DISTINCT FROM src."b""#));
        // every column is a key, nothing remains to update
        assert!(!statement.contains("THEN UPDATE SET"));
    }

    #[test]
    fn fallback_is_insert_update_delete_in_order() {
        let toast = BTreeSet::from(["bio".to_string()]);
        let statements = fallback_statements(RAW, &users_table(), &users_columns(), &toast);
        assert_eq!(statements.len(), 3);

        assert!(statements[0].starts_with(r#"INSERT INTO "public"."users""#));
        assert!(statements[0].contains("src._record_type = 0"));
        assert!(statements[0].contains(r#"ON CONFLICT ("id") DO NOTHING"#));

        assert!(statements[1].starts_with(r#"UPDATE "public"."users""#));
        assert!(statements[1].contains(r#""bio" = COALESCE(src."bio", dst."bio")"#));
        assert!(statements[1].contains(r#""name" = src."name""#));
        assert!(statements[1].contains("src._record_type = 1"));

        assert!(statements[2].starts_with(r#"DELETE FROM "public"."users""#));
        assert!(statements[2].contains("src._record_type = 2"));
    }

    #[test]
    fn fallback_without_declared_key_skips_the_update() {
        let columns = vec![column("a", "integer", false)];
        let statements = fallback_statements(RAW, &users_table(), &columns, &BTreeSet::new());
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("ON CONFLICT DO NOTHING"));
        assert!(statements[1].starts_with("DELETE FROM"));
    }

    #[test]
    fn composite_keys_join_on_every_key_column() {
        let columns = vec![
            column("tenant", "integer", true),
            column("id", "bigint", true),
            column("payload", "text", false),
        ];
        let statement = merge_statement(RAW, &users_table(), &columns, &BTreeSet::new());
        assert!(statement.contains(r#"dst."tenant" = src."tenant" AND dst."id" = src."id""#));
        assert!(statement.contains("SELECT DISTINCT ON ((_data->>'tenant'), (_data->>'id'))"));
    }
}
