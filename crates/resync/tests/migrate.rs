//! Migrator behavior against an in-memory upserting store.

use indexmap::IndexMap;
use resync::{
    BatchExecutor, BatchFuture, BoxError, Column, DataMigrator, Dialect, DryRun, Error, FieldMapper,
    KeyRole, Record, Table, UpsertStatement, Value, record,
};

/// A table that applies batches atomically, the way a store running each
/// batch in a transaction would.
///
/// Rows are matched on the statement's conflict target (on any unique column
/// when the statement names none, as MySQL does). Unmatched rows are
/// inserted, filling the serial column if it was not supplied, and every
/// unique column is enforced afterwards.
#[derive(Default)]
struct MemoryTable {
    unique: Vec<String>,
    serial: Option<String>,
    next_serial: i64,
    rows: Vec<IndexMap<String, Value>>,
    /// Any batch containing this value is rejected.
    poison: Option<Value>,
    writes: usize,
}

impl MemoryTable {
    fn keyed_on(key: &str) -> Self {
        Self {
            unique: vec![key.to_string()],
            ..Default::default()
        }
    }

    /// `serial` is generated on insert; it and `unique` are unique columns.
    fn with_serial(serial: &str, unique: &[&str]) -> Self {
        let mut table = Self::keyed_on(serial);
        table.serial = Some(serial.to_string());
        table.next_serial = 1;
        table.unique.extend(unique.iter().map(|c| c.to_string()));
        table
    }

    fn matches(
        &self,
        statement: &UpsertStatement,
        existing: &IndexMap<String, Value>,
        incoming: &IndexMap<String, Value>,
    ) -> bool {
        let same = |col: &String| match (existing.get(col), incoming.get(col)) {
            (Some(a), Some(b)) => !a.is_null() && a == b,
            _ => false,
        };
        if statement.conflict_columns.is_empty() {
            self.unique.iter().any(same)
        } else {
            statement.conflict_columns.iter().all(same)
        }
    }

    fn violation(&self, rows: &[IndexMap<String, Value>], idx: usize) -> Option<String> {
        self.unique
            .iter()
            .find(|col| match rows[idx].get(*col) {
                Some(v) if !v.is_null() => rows
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != idx && other.get(*col) == Some(v)),
                _ => false,
            })
            .cloned()
    }
}

impl BatchExecutor for MemoryTable {
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            self.writes += 1;
            let mut staged = self.rows.clone();
            for row in rows {
                if let Some(poison) = &self.poison {
                    if row.contains(poison) {
                        return Err(BoxError::from(format!("store rejected value {:?}", poison)));
                    }
                }
                let incoming: IndexMap<String, Value> = statement
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                let idx = match staged
                    .iter()
                    .position(|r| self.matches(statement, r, &incoming))
                {
                    Some(idx) => {
                        staged[idx].extend(incoming);
                        idx
                    }
                    None => {
                        let mut inserted = incoming;
                        if let Some(serial) = &self.serial {
                            if !inserted.contains_key(serial) {
                                inserted.insert(serial.clone(), Value::I64(self.next_serial));
                                self.next_serial += 1;
                            }
                        }
                        staged.push(inserted);
                        staged.len() - 1
                    }
                };
                if let Some(col) = self.violation(&staged, idx) {
                    return Err(BoxError::from(format!(
                        "duplicate key value violates unique constraint on {}",
                        col
                    )));
                }
            }
            self.rows = staged;
            Ok(rows.len() as u64)
        })
    }
}

fn users_mapper() -> FieldMapper {
    let source = Table::with_columns(
        "legacy_users",
        [Column::new("uid", "int(11)"), Column::new("full_name", "varchar(255)")],
    )
    .unwrap();
    let target = Table::with_columns(
        "users",
        [
            Column::new("id", "int(11)").not_null().key(KeyRole::Primary),
            Column::new("name", "varchar(255)"),
        ],
    )
    .unwrap();
    FieldMapper::with_mappings(&source, &target, [("uid", "id"), ("full_name", "name")]).unwrap()
}

fn legacy(uid: i64, name: &str) -> Record {
    record([("uid", Value::from(uid)), ("full_name", Value::from(name))])
}

fn user(id: i64, name: &str) -> IndexMap<String, Value> {
    record([("id", Value::from(id)), ("name", Value::from(name))])
}

#[tokio::test]
async fn empty_batch_writes_nothing() {
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    let count = migrator.migrate(&users_mapper(), &[]).await.unwrap();

    assert_eq!(count, 0);
    assert_eq!(migrator.executor().writes, 0);
}

#[tokio::test]
async fn migrate_inserts_projected_records() {
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    let count = migrator
        .migrate(&users_mapper(), &[legacy(1, "Ann"), legacy(2, "Bob")])
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(migrator.executor().rows, vec![user(1, "Ann"), user(2, "Bob")]);
}

#[tokio::test]
async fn duplicate_keys_in_one_batch_resolve_to_last() {
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    migrator
        .migrate(&users_mapper(), &[legacy(1, "A"), legacy(1, "B")])
        .await
        .unwrap();

    assert_eq!(migrator.executor().rows, vec![user(1, "B")]);
}

#[tokio::test]
async fn migrating_twice_equals_once() {
    let mapper = users_mapper();
    let batch = [legacy(1, "Ann"), legacy(2, "Bob")];

    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    migrator.migrate(&mapper, &batch).await.unwrap();
    let once = migrator.executor().rows.clone();

    migrator.migrate(&mapper, &batch).await.unwrap();
    assert_eq!(migrator.executor().rows, once);
}

#[tokio::test]
async fn conflicting_rows_are_replaced() {
    let mut table = MemoryTable::keyed_on("id");
    table.rows.push(user(1, "Old"));
    table.rows.push(user(5, "Untouched"));

    let mut migrator = DataMigrator::new(table);
    migrator
        .migrate(&users_mapper(), &[legacy(1, "New"), legacy(2, "Bob")])
        .await
        .unwrap();

    assert_eq!(
        migrator.executor().rows,
        vec![user(1, "New"), user(5, "Untouched"), user(2, "Bob")]
    );
}

#[tokio::test]
async fn failed_batch_leaves_target_untouched() {
    let mut table = MemoryTable::keyed_on("id");
    table.rows.push(user(1, "Old"));
    table.poison = Some(Value::from("boom"));

    let mut migrator = DataMigrator::new(table);
    let err = migrator
        .migrate(&users_mapper(), &[legacy(1, "New"), legacy(2, "boom")])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Execution {
            batch_index: 0,
            batch_size: 2,
            migrated_before: 0,
            ..
        }
    ));
    assert!(err.to_string().contains("rolled back"));
    assert_eq!(migrator.executor().rows, vec![user(1, "Old")]);
}

#[tokio::test]
async fn batches_stop_at_first_failure() {
    let mut table = MemoryTable::keyed_on("id");
    table.poison = Some(Value::from("boom"));

    let records = [
        legacy(1, "a"),
        legacy(2, "b"),
        legacy(3, "boom"),
        legacy(4, "d"),
        legacy(5, "e"),
    ];
    let mut migrator = DataMigrator::new(table);
    let err = migrator
        .migrate_in_batches(&users_mapper(), &records, 2)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Execution {
            batch_index: 1,
            batch_size: 2,
            migrated_before: 2,
            ..
        }
    ));
    // The first batch stays committed, nothing after it is applied.
    assert_eq!(migrator.executor().rows, vec![user(1, "a"), user(2, "b")]);
    assert_eq!(migrator.executor().writes, 2);
}

#[tokio::test]
async fn batches_report_counts() {
    let records: Vec<Record> = (1..=5).map(|i| legacy(i, "x")).collect();
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    let report = migrator
        .migrate_in_batches(&users_mapper(), &records, 2)
        .await
        .unwrap();

    assert_eq!(report.records, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(migrator.executor().rows.len(), 5);
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    let err = migrator
        .migrate_in_batches(&users_mapper(), &[legacy(1, "a")], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn record_missing_a_mapped_field_fails_before_writing() {
    let mut migrator = DataMigrator::new(MemoryTable::keyed_on("id"));
    let err = migrator
        .migrate(
            &users_mapper(),
            &[legacy(1, "a"), record([("uid", Value::from(2i64))])],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(migrator.executor().writes, 0);
}

#[tokio::test]
async fn dry_run_records_batched_statements() {
    let records: Vec<Record> = (1..=3).map(|i| legacy(i, "x")).collect();
    let mut migrator = DataMigrator::new(DryRun::new()).with_dialect(Dialect::MySql);
    migrator
        .migrate_in_batches(&users_mapper(), &records, 2)
        .await
        .unwrap();

    insta::assert_snapshot!(migrator.into_inner().statements.join("\n"), @r"
    INSERT INTO users (id, name) VALUES (?, ?), (?, ?) ON DUPLICATE KEY UPDATE id = VALUES(id), name = VALUES(name);
    INSERT INTO users (id, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE id = VALUES(id), name = VALUES(name);
    ");
}

fn accounts_mapper() -> FieldMapper {
    let source = Table::with_columns(
        "legacy_accounts",
        [Column::new("mail", "text"), Column::new("n", "text")],
    )
    .unwrap();
    let target = Table::with_columns(
        "accounts",
        [
            Column::new("id", "serial").not_null().key(KeyRole::Primary),
            Column::new("email", "text").not_null().key(KeyRole::Unique),
            Column::new("name", "text"),
        ],
    )
    .unwrap();
    FieldMapper::with_mappings(&source, &target, [("mail", "email"), ("n", "name")]).unwrap()
}

fn legacy_account(mail: &str, n: &str) -> Record {
    record([("mail", Value::from(mail)), ("n", Value::from(n))])
}

fn account(id: i64, email: &str, name: &str) -> IndexMap<String, Value> {
    record([
        ("email", Value::from(email)),
        ("name", Value::from(name)),
        ("id", Value::from(id)),
    ])
}

#[tokio::test]
async fn rerun_without_mapped_primary_key_matches_on_unique_column() {
    let mapper = accounts_mapper();
    let batch = [legacy_account("ann@x", "Ann"), legacy_account("bob@x", "Bob")];

    let mut migrator = DataMigrator::new(MemoryTable::with_serial("id", &["email"]));
    assert_eq!(migrator.migrate(&mapper, &batch).await.unwrap(), 2);
    let once = migrator.executor().rows.clone();
    assert_eq!(once, vec![account(1, "ann@x", "Ann"), account(2, "bob@x", "Bob")]);

    assert_eq!(migrator.migrate(&mapper, &batch).await.unwrap(), 2);
    assert_eq!(migrator.executor().rows, once);
}

#[tokio::test]
async fn unique_column_conflict_updates_existing_row() {
    let mut table = MemoryTable::with_serial("id", &["email"]);
    table.rows.push(account(40, "ann@x", "Old"));

    let mut migrator = DataMigrator::new(table);
    migrator
        .migrate(&accounts_mapper(), &[legacy_account("ann@x", "New")])
        .await
        .unwrap();

    assert_eq!(migrator.executor().rows, vec![account(40, "ann@x", "New")]);
}
