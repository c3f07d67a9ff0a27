//! Batched, idempotent data migration.

use crate::error::Error;
use crate::executor::BatchExecutor;
use crate::mapper::FieldMapper;
use crate::upsert::{Dialect, UpsertStatement};
use crate::value::{Record, Value};
use crate::Result;

/// Outcome of [`DataMigrator::migrate_in_batches`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records written across all batches.
    pub records: usize,
    /// Batches executed.
    pub batches: usize,
}

/// Migrates source records into a target table through a [`FieldMapper`].
///
/// Each batch is one upsert applied atomically by the executor: either every
/// record of the batch is written or none is. Re-running a batch leaves the
/// target in the same state.
pub struct DataMigrator<E> {
    executor: E,
    dialect: Dialect,
}

impl<E: BatchExecutor> DataMigrator<E> {
    /// Create a migrator rendering Postgres upserts.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            dialect: Dialect::Postgres,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn into_inner(self) -> E {
        self.executor
    }

    /// Migrate `records` as a single batch.
    ///
    /// An empty batch writes nothing and reports zero. On success, returns
    /// the number of records in the batch.
    pub async fn migrate(&mut self, mapper: &FieldMapper, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            tracing::debug!(target_table = %mapper.target_table().name, "empty batch, nothing to migrate");
            return Ok(0);
        }
        let statement = UpsertStatement::for_mapper(mapper, self.dialect)?;
        self.run_batch(&statement, mapper, records, 0, 0).await
    }

    /// Migrate `records` in consecutive batches of at most `batch_size`.
    ///
    /// Stops at the first failing batch. Earlier batches stay committed; the
    /// error reports how many records they held.
    pub async fn migrate_in_batches(
        &mut self,
        mapper: &FieldMapper,
        records: &[Record],
        batch_size: usize,
    ) -> Result<MigrationReport> {
        if batch_size == 0 {
            return Err(Error::Validation("batch size must be at least 1".to_string()));
        }

        let mut report = MigrationReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let statement = UpsertStatement::for_mapper(mapper, self.dialect)?;
        for (batch_index, chunk) in records.chunks(batch_size).enumerate() {
            report.records += self
                .run_batch(&statement, mapper, chunk, batch_index, report.records)
                .await?;
            report.batches += 1;
        }

        tracing::info!(
            source = %mapper.source_table().name,
            target = %mapper.target_table().name,
            records = report.records,
            batches = report.batches,
            "migration complete"
        );
        Ok(report)
    }

    async fn run_batch(
        &mut self,
        statement: &UpsertStatement,
        mapper: &FieldMapper,
        records: &[Record],
        batch_index: usize,
        migrated_before: usize,
    ) -> Result<usize> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, record)| statement.bind(&mapper.map_record(record), i))
            .collect::<Result<Vec<Vec<Value>>>>()?;

        tracing::debug!(
            table = %statement.table,
            batch = batch_index,
            size = rows.len(),
            "upserting batch"
        );

        match self.executor.upsert_batch(statement, &rows).await {
            Ok(_) => {
                tracing::debug!(table = %statement.table, batch = batch_index, "batch committed");
                Ok(rows.len())
            }
            Err(source) => {
                tracing::warn!(
                    table = %statement.table,
                    batch = batch_index,
                    size = rows.len(),
                    "batch rolled back: {}",
                    source
                );
                Err(Error::Execution {
                    batch_index,
                    batch_size: rows.len(),
                    migrated_before,
                    source,
                })
            }
        }
    }
}
