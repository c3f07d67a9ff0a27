//! Schema reconciliation and data migration.
//!
//! - [`compare`] diffs a source (desired) schema against a target (current)
//!   schema and [`render`] turns the diff into ordered statements.
//! - [`FieldMapper`] describes how source fields land in target fields.
//! - [`DataMigrator`] upserts mapped records in all-or-nothing batches through
//!   a [`BatchExecutor`] (a Postgres client, a pooled connection, or
//!   [`DryRun`]).
//!
//! ```ignore
//! use resync::{DataMigrator, FieldMapper};
//!
//! let mut mapper = FieldMapper::new(&legacy_users, &users);
//! mapper.add_mapping("uid", "id")?;
//! mapper.add_mapping("full_name", "name")?;
//!
//! let mut migrator = DataMigrator::new(client);
//! let count = migrator.migrate(&mapper, &records).await?;
//! ```

mod diff;
mod error;
mod executor;
mod mapper;
mod migrate;
mod row;
mod upsert;
mod value;

pub use diff::{
    AddColumn, Change, CompareOptions, DropColumn, ModifyColumn, SchemaDiff, compare,
    compare_with, render,
};
pub use error::{BoxError, Error, Side};
pub use executor::{BatchExecutor, BatchFuture, DryRun};
pub use mapper::FieldMapper;
pub use migrate::{DataMigrator, MigrationReport};
pub use row::{fetch_mapped, pg_row_to_record, select_mapped_sql};
pub use upsert::{Dialect, UpsertStatement};
pub use value::{Record, Value, record};

pub use resync_schema::{
    Column, ColumnDescription, Database, DefaultLiteral, KeyRole, Schema, SchemaDescription,
    SchemaError, Table,
};

/// Result type for resync operations.
pub type Result<T> = std::result::Result<T, Error>;
