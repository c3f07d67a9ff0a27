//! Batch executors: where upserts actually run.
//!
//! [`BatchExecutor`] is implemented for `tokio_postgres::Client` and
//! `deadpool_postgres::Object`. Each batch runs inside one transaction: the
//! statement is prepared once and executed per row, so duplicate keys within
//! a batch resolve to the last row. Any failure rolls the whole batch back.
//!
//! [`DryRun`] records the batched statement text instead of executing it.

use crate::error::BoxError;
use crate::upsert::UpsertStatement;
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;
use tokio_postgres::types::ToSql;
use tracing::Instrument;

/// Boxed future returned by [`BatchExecutor::upsert_batch`].
pub type BatchFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, BoxError>> + Send + 'a>>;

/// Something that can apply one upsert batch atomically.
pub trait BatchExecutor: Send {
    /// Apply `rows` (parameter values in `statement.columns` order) as one
    /// all-or-nothing unit. Returns the number of rows written.
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a>;
}

impl<E: BatchExecutor + ?Sized> BatchExecutor for &mut E {
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a> {
        (**self).upsert_batch(statement, rows)
    }
}

impl BatchExecutor for tokio_postgres::Client {
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            upsert_in_transaction(self, statement, rows)
                .await
                .map_err(BoxError::from)
        })
    }
}

impl BatchExecutor for deadpool_postgres::Object {
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            use std::ops::DerefMut;
            let client: &mut tokio_postgres::Client = self.deref_mut().deref_mut();
            upsert_in_transaction(client, statement, rows)
                .await
                .map_err(BoxError::from)
        })
    }
}

async fn upsert_in_transaction(
    client: &mut tokio_postgres::Client,
    statement: &UpsertStatement,
    rows: &[Vec<Value>],
) -> Result<u64, tokio_postgres::Error> {
    let sql = statement.to_sql();
    let span = tracing::debug_span!(
        "db.upsert_batch",
        table = %statement.table,
        sql = %sql,
        rows = rows.len(),
        affected = tracing::field::Empty,
    );

    let tx = client.transaction().instrument(span.clone()).await?;
    let result = async {
        let prepared = tx.prepare(&sql).await?;
        let mut affected = 0;
        for row in rows {
            let params: Vec<&(dyn ToSql + Sync)> =
                row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            affected += tx.execute(&prepared, &params).await?;
        }
        Ok::<_, tokio_postgres::Error>(affected)
    }
    .instrument(span.clone())
    .await;

    match result {
        Ok(affected) => {
            tx.commit().instrument(span.clone()).await?;
            span.record("affected", affected);
            Ok(affected)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().instrument(span.clone()).await {
                tracing::warn!(table = %statement.table, "rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Executor that records statements instead of running them.
#[derive(Debug, Default, Clone)]
pub struct DryRun {
    /// Batched statement text, one entry per batch.
    pub statements: Vec<String>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchExecutor for DryRun {
    fn upsert_batch<'a>(
        &'a mut self,
        statement: &'a UpsertStatement,
        rows: &'a [Vec<Value>],
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            self.statements.push(statement.to_batch_sql(rows.len()));
            Ok(rows.len() as u64)
        })
    }
}
