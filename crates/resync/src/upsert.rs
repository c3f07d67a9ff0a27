//! Upsert statement generation.
//!
//! An upsert inserts the mapped target fields and, when a row with the same
//! key already exists, replaces every mapped field with the incoming value:
//!
//! ```sql
//! -- MySQL
//! INSERT INTO users (id, name) VALUES (?, ?), (?, ?)
//!     ON DUPLICATE KEY UPDATE id = VALUES(id), name = VALUES(name);
//!
//! -- Postgres
//! INSERT INTO "users" ("id", "name") VALUES ($1, $2), ($3, $4)
//!     ON CONFLICT ("id") DO UPDATE SET "id" = EXCLUDED."id", "name" = EXCLUDED."name";
//! ```
//!
//! MySQL resolves the conflict against any unique key by itself. Postgres
//! needs an explicit conflict target built from inserted columns: the target
//! table's primary key when every key column is mapped, else its first mapped
//! unique column.

use crate::error::Error;
use crate::mapper::FieldMapper;
use crate::value::{Record, Value};
use crate::{Result, Table};
use std::collections::HashSet;
use std::fmt;

/// SQL dialect used to render upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
}

impl Dialect {
    /// Quote an identifier. MySQL identifiers are emitted bare.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => ident.to_string(),
        }
    }

    /// Placeholder for the `n`th parameter (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => f.write_str("postgres"),
            Dialect::MySql => f.write_str("mysql"),
        }
    }
}

/// A batched upsert into one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatement {
    pub dialect: Dialect,
    pub table: String,
    /// Target fields, in mapping order.
    pub columns: Vec<String>,
    /// Conflict target (Postgres only; empty for MySQL).
    pub conflict_columns: Vec<String>,
}

impl UpsertStatement {
    /// Build the upsert for a mapper's target table and target fields.
    pub fn for_mapper(mapper: &FieldMapper, dialect: Dialect) -> Result<Self> {
        let target = mapper.target_table();

        if mapper.is_empty() {
            return Err(Error::Validation(format!(
                "mapping {} -> {} has no fields",
                mapper.source_table().name,
                target.name
            )));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(mapper.len());
        for field in mapper.target_fields() {
            if !seen.insert(field) {
                return Err(Error::Validation(format!(
                    "target field '{}.{}' is mapped more than once",
                    target.name, field
                )));
            }
            columns.push(field.to_string());
        }

        let conflict_columns = match dialect {
            Dialect::MySql => Vec::new(),
            Dialect::Postgres => conflict_target(target, &columns)?,
        };

        Ok(Self {
            dialect,
            table: target.name.clone(),
            columns,
            conflict_columns,
        })
    }

    /// Single-row statement.
    pub fn to_sql(&self) -> String {
        self.to_batch_sql(1)
    }

    /// Statement with `rows` value tuples.
    pub fn to_batch_sql(&self, rows: usize) -> String {
        let d = self.dialect;
        let mut sql = String::new();

        sql.push_str("INSERT INTO ");
        sql.push_str(&d.quote_ident(&self.table));
        sql.push_str(" (");
        let cols: Vec<String> = self.columns.iter().map(|c| d.quote_ident(c)).collect();
        sql.push_str(&cols.join(", "));
        sql.push_str(") VALUES ");

        let width = self.columns.len();
        let tuples: Vec<String> = (0..rows.max(1))
            .map(|row| {
                let params: Vec<String> = (1..=width)
                    .map(|i| d.placeholder(row * width + i))
                    .collect();
                format!("({})", params.join(", "))
            })
            .collect();
        sql.push_str(&tuples.join(", "));

        match d {
            Dialect::MySql => {
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                let updates: Vec<String> = cols
                    .iter()
                    .map(|c| format!("{} = VALUES({})", c, c))
                    .collect();
                sql.push_str(&updates.join(", "));
            }
            Dialect::Postgres => {
                sql.push_str(" ON CONFLICT (");
                let conflict: Vec<String> = self
                    .conflict_columns
                    .iter()
                    .map(|c| d.quote_ident(c))
                    .collect();
                sql.push_str(&conflict.join(", "));
                sql.push_str(") DO UPDATE SET ");
                let updates: Vec<String> = cols
                    .iter()
                    .map(|c| format!("{} = EXCLUDED.{}", c, c))
                    .collect();
                sql.push_str(&updates.join(", "));
            }
        }

        sql.push(';');
        sql
    }

    /// Parameter values for one projected record, in column order.
    ///
    /// `index` is the record's position in its batch, used in the error.
    pub fn bind(&self, record: &Record, index: usize) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .map(|col| {
                record.get(col).cloned().ok_or_else(|| {
                    Error::Validation(format!(
                        "record {} has no value for target field '{}.{}'",
                        index, self.table, col
                    ))
                })
            })
            .collect()
    }
}

/// The key `ON CONFLICT` matches on, drawn only from inserted columns.
fn conflict_target(target: &Table, columns: &[String]) -> Result<Vec<String>> {
    let inserted = |field: &str| columns.iter().any(|c| c == field);

    let pk = target.primary_key();
    if !pk.is_empty() && pk.iter().all(|c| inserted(&c.field)) {
        return Ok(pk.into_iter().map(|c| c.field.clone()).collect());
    }
    if let Some(unique) = target
        .unique_columns()
        .into_iter()
        .find(|c| inserted(&c.field))
    {
        return Ok(vec![unique.field.clone()]);
    }

    Err(Error::Validation(format!(
        "no primary key or unique column of table '{}' is among the mapped fields ({}), \
         so rows cannot be matched for upsert",
        target.name,
        columns.join(", ")
    )))
}

impl fmt::Display for UpsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;
    use crate::{Column, KeyRole, Table};

    fn mapper(target: Table) -> FieldMapper {
        let source = Table::with_columns(
            "legacy_users",
            [Column::new("uid", "int"), Column::new("full_name", "text")],
        )
        .unwrap();
        FieldMapper::with_mappings(&source, &target, [("uid", "id"), ("full_name", "name")]).unwrap()
    }

    fn users() -> Table {
        Table::with_columns(
            "users",
            [
                Column::new("id", "int").not_null().key(KeyRole::Primary),
                Column::new("name", "text"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn snapshot_postgres_batch() {
        let stmt = UpsertStatement::for_mapper(&mapper(users()), Dialect::Postgres).unwrap();
        insta::assert_snapshot!(stmt.to_batch_sql(2), @r#"INSERT INTO "users" ("id", "name") VALUES ($1, $2), ($3, $4) ON CONFLICT ("id") DO UPDATE SET "id" = EXCLUDED."id", "name" = EXCLUDED."name";"#);
    }

    #[test]
    fn snapshot_mysql_batch() {
        let stmt = UpsertStatement::for_mapper(&mapper(users()), Dialect::MySql).unwrap();
        insta::assert_snapshot!(stmt.to_batch_sql(2), @"INSERT INTO users (id, name) VALUES (?, ?), (?, ?) ON DUPLICATE KEY UPDATE id = VALUES(id), name = VALUES(name);");
    }

    #[test]
    fn test_conflict_target_falls_back_to_unique() {
        let target = Table::with_columns(
            "users",
            [
                Column::new("id", "int"),
                Column::new("name", "text").key(KeyRole::Unique),
            ],
        )
        .unwrap();
        let stmt = UpsertStatement::for_mapper(&mapper(target), Dialect::Postgres).unwrap();
        assert_eq!(stmt.conflict_columns, vec!["name".to_string()]);
    }

    fn accounts() -> Table {
        Table::with_columns(
            "accounts",
            [
                Column::new("id", "serial").not_null().key(KeyRole::Primary),
                Column::new("email", "text").key(KeyRole::Unique),
                Column::new("name", "text"),
            ],
        )
        .unwrap()
    }

    fn legacy_accounts() -> Table {
        Table::with_columns(
            "legacy_accounts",
            [
                Column::new("uid", "int"),
                Column::new("mail", "text"),
                Column::new("n", "text"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_unmapped_primary_key_uses_mapped_unique() {
        let m = FieldMapper::with_mappings(
            &legacy_accounts(),
            &accounts(),
            [("mail", "email"), ("n", "name")],
        )
        .unwrap();
        let stmt = UpsertStatement::for_mapper(&m, Dialect::Postgres).unwrap();
        assert_eq!(stmt.conflict_columns, vec!["email".to_string()]);
        for col in &stmt.conflict_columns {
            assert!(stmt.columns.contains(col));
        }
        insta::assert_snapshot!(stmt.to_sql(), @r#"INSERT INTO "accounts" ("email", "name") VALUES ($1, $2) ON CONFLICT ("email") DO UPDATE SET "email" = EXCLUDED."email", "name" = EXCLUDED."name";"#);
    }

    #[test]
    fn test_mapped_primary_key_wins_over_unique() {
        let m = FieldMapper::with_mappings(
            &legacy_accounts(),
            &accounts(),
            [("uid", "id"), ("mail", "email")],
        )
        .unwrap();
        let stmt = UpsertStatement::for_mapper(&m, Dialect::Postgres).unwrap();
        assert_eq!(stmt.conflict_columns, vec!["id".to_string()]);
    }

    #[test]
    fn test_no_mapped_key_is_rejected() {
        let m = FieldMapper::with_mappings(&legacy_accounts(), &accounts(), [("n", "name")])
            .unwrap();
        let err = UpsertStatement::for_mapper(&m, Dialect::Postgres).unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.contains("accounts")));
        assert!(UpsertStatement::for_mapper(&m, Dialect::MySql).is_ok());
    }

    #[test]
    fn test_postgres_requires_a_key() {
        let target =
            Table::with_columns("users", [Column::new("id", "int"), Column::new("name", "text")])
                .unwrap();
        let m = mapper(target);
        assert!(matches!(
            UpsertStatement::for_mapper(&m, Dialect::Postgres),
            Err(Error::Validation(_))
        ));
        // MySQL resolves conflicts against the table's own keys.
        assert!(UpsertStatement::for_mapper(&m, Dialect::MySql).is_ok());
    }

    #[test]
    fn test_empty_mapping_is_rejected() {
        let m = FieldMapper::new(&users(), &users());
        assert!(matches!(
            UpsertStatement::for_mapper(&m, Dialect::Postgres),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_target_field_is_rejected() {
        let source = Table::with_columns("a", [Column::new("x", "int"), Column::new("y", "int")])
            .unwrap();
        let m = FieldMapper::with_mappings(&source, &users(), [("x", "id"), ("y", "id")]).unwrap();
        let err = UpsertStatement::for_mapper(&m, Dialect::Postgres).unwrap_err();
        assert!(err.to_string().contains("mapped more than once"));
    }

    #[test]
    fn test_bind_orders_values_by_column() {
        let stmt = UpsertStatement::for_mapper(&mapper(users()), Dialect::Postgres).unwrap();
        let values = stmt
            .bind(&record([("name", Value::from("Ann")), ("id", Value::from(7i64))]), 0)
            .unwrap();
        assert_eq!(values, vec![Value::from(7i64), Value::from("Ann")]);

        let err = stmt.bind(&record([("id", 1i64)]), 3).unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.contains("record 3")));
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(Dialect::Postgres.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::MySql.quote_ident("plain"), "plain");
    }
}
