//! Configuration types for resync.
//!
//! The CLI reads these from `.config/resync.styx`:
//!
//! ```styx
//! compare { case_sensitive false }
//!
//! migrate {
//!     database_url "postgres://app@localhost/app"
//!     batch_size 1000
//!     dialect postgres
//! }
//!
//! mappings (
//!     {
//!         source_schema "schemas/legacy.json"
//!         target_schema "schemas/app.json"
//!         source legacy_users
//!         target users
//!         fields { uid id, full_name name }
//!     }
//! )
//! ```

use facet::Facet;
use indexmap::IndexMap;


/// Default number of records per upsert batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Configuration loaded from `resync.styx`.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Schema comparison settings.
    #[facet(default)]
    pub compare: CompareConfig,

    /// Data migration settings.
    #[facet(default)]
    pub migrate: MigrateConfig,

    /// Table pairs to migrate.
    #[facet(default)]
    pub mappings: Vec<TableMapping>,
}

/// Schema comparison settings.
#[derive(Debug, Clone, Default, Facet)]
pub struct CompareConfig {
    /// Match table and column names exactly (default: true).
    #[facet(default)]
    pub case_sensitive: Option<bool>,
}

impl CompareConfig {
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(true)
    }
}

/// Data migration settings.
#[derive(Debug, Clone, Default, Facet)]
pub struct MigrateConfig {
    /// Database connection URL. `DATABASE_URL` is used when unset.
    #[facet(default)]
    pub database_url: Option<String>,

    /// Records per upsert batch (default: [`DEFAULT_BATCH_SIZE`]).
    #[facet(default)]
    pub batch_size: Option<usize>,

    /// Dialect used to render upsert statements.
    #[facet(default)]
    pub dialect: DialectName,
}

impl MigrateConfig {
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// SQL dialect name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Facet)]
#[repr(u8)]
pub enum DialectName {
    #[default]
    #[facet(rename = "postgres")]
    Postgres,
    #[facet(rename = "mysql")]
    MySql,
}

/// One source table → target table migration.
#[derive(Debug, Clone, Facet)]
pub struct TableMapping {
    /// JSON description of the source schema.
    pub source_schema: String,

    /// JSON description of the target schema.
    pub target_schema: String,

    /// Source table name.
    pub source: String,

    /// Target table name.
    pub target: String,

    /// Source field → target field, in migration order.
    pub fields: IndexMap<String, String>,
}
