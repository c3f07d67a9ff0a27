//! Database schema model for resync.
//!
//! The model is a four-level hierarchy: [`Database`] → [`Schema`] → [`Table`] →
//! [`Column`]. Every level is name-keyed and insertion-ordered, so lookups are
//! O(1) while iteration (and therefore statement rendering) follows the order
//! in which entities were loaded.
//!
//! Models are usually built from a JSON description (see [`description`]) and
//! are treated as read-only once loaded.

use indexmap::IndexMap;
use indexmap::map::Entry;
use std::fmt;

pub mod description;

pub use description::{ColumnDescription, DefaultLiteral, SchemaDescription};


/// Errors raised while building a schema model.
///
/// Lookups never fail; only construction does.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("table '{table}' already has a column named '{column}'")]
    DuplicateColumn { table: String, column: String },

    #[error("schema '{schema}' already has a table named '{table}'")]
    DuplicateTable { schema: String, table: String },

    #[error("database '{database}' already has a schema named '{schema}'")]
    DuplicateSchema { database: String, schema: String },

    #[error("column '{table}.{column}': invalid Null value '{value}' (expected YES or NO)")]
    InvalidNullability {
        table: String,
        column: String,
        value: String,
    },

    #[error("column '{table}.{column}': unknown Key value '{value}'")]
    InvalidKey {
        table: String,
        column: String,
        value: String,
    },

    #[error("failed to parse schema description: {0}")]
    Parse(String),

    #[error("failed to read schema description {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The role a column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum KeyRole {
    /// Not part of any key.
    #[default]
    None,
    /// Part of the primary key (`PRI`).
    Primary,
    /// Has a unique constraint (`UNI`).
    Unique,
    /// Part of a non-unique index (`MUL`).
    Index,
}

impl KeyRole {
    /// Parse the key tag used in schema descriptions.
    ///
    /// Returns `None` for unknown tags.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "" => Some(KeyRole::None),
            "PRI" => Some(KeyRole::Primary),
            "UNI" => Some(KeyRole::Unique),
            "MUL" => Some(KeyRole::Index),
            _ => None,
        }
    }

    /// The description tag for this role (`""`, `PRI`, `UNI`, `MUL`).
    pub fn as_tag(&self) -> &'static str {
        match self {
            KeyRole::None => "",
            KeyRole::Primary => "PRI",
            KeyRole::Unique => "UNI",
            KeyRole::Index => "MUL",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, unique within its table
    pub field: String,
    /// Store-specific type descriptor, e.g. `int(11)` or `varchar(255)`
    pub col_type: String,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Key role
    pub key: KeyRole,
    /// Default value literal, `None` when the default is NULL
    pub default: Option<String>,
    /// Store-specific attribute tag, e.g. `auto_increment`
    pub extra: String,
}

impl Column {
    /// Create a nullable, unkeyed column with no default.
    pub fn new(field: impl Into<String>, col_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            col_type: col_type.into(),
            nullable: true,
            key: KeyRole::None,
            default: None,
            extra: String::new(),
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the key role.
    pub fn key(mut self, key: KeyRole) -> Self {
        self.key = key;
        self
    }

    /// Set the default literal.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the extra attribute tag.
    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.key == KeyRole::Primary
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.col_type)
    }
}

/// A table: a name plus its columns in definition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    columns: IndexMap<String, Column>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    /// Build a table from columns, failing on duplicate column names.
    pub fn with_columns(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = Column>,
    ) -> Result<Self, SchemaError> {
        let mut table = Self::new(name);
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Append a column. Fails if a column with the same name already exists.
    pub fn add_column(&mut self, column: Column) -> Result<(), SchemaError> {
        match self.columns.entry(column.field.clone()) {
            Entry::Occupied(_) => Err(SchemaError::DuplicateColumn {
                table: self.name.clone(),
                column: column.field,
            }),
            Entry::Vacant(slot) => {
                slot.insert(column);
                Ok(())
            }
        }
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Iterate over columns in definition order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns that form the primary key, in definition order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns().filter(|c| c.is_primary_key()).collect()
    }

    /// Columns with a single-column unique constraint, in definition order.
    pub fn unique_columns(&self) -> Vec<&Column> {
        self.columns().filter(|c| c.key == KeyRole::Unique).collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        write!(f, "Table '{}' with columns: {}", self.name, cols.join(", "))
    }
}

/// A named collection of tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Schema name
    pub name: String,
    tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
        }
    }

    /// Build a schema from tables, failing on duplicate table names.
    pub fn with_tables(
        name: impl Into<String>,
        tables: impl IntoIterator<Item = Table>,
    ) -> Result<Self, SchemaError> {
        let mut schema = Self::new(name);
        for table in tables {
            schema.add_table(table)?;
        }
        Ok(schema)
    }

    /// Add a table. Fails if a table with the same name already exists.
    pub fn add_table(&mut self, table: Table) -> Result<(), SchemaError> {
        match self.tables.entry(table.name.clone()) {
            Entry::Occupied(_) => Err(SchemaError::DuplicateTable {
                schema: self.name.clone(),
                table: table.name,
            }),
            Entry::Vacant(slot) => {
                slot.insert(table);
                Ok(())
            }
        }
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterate over all tables in load order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema '{}':", self.name)?;
        for table in self.tables() {
            write!(f, "\n  {}", table)?;
        }
        Ok(())
    }
}

/// A database holding one or more schemas.
///
/// Stores without a schema concept (MySQL) use a single default schema named
/// after the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    /// Database name
    pub name: String,
    schemas: IndexMap<String, Schema>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: IndexMap::new(),
        }
    }

    /// Add a schema. Fails if a schema with the same name already exists.
    pub fn add_schema(&mut self, schema: Schema) -> Result<(), SchemaError> {
        match self.schemas.entry(schema.name.clone()) {
            Entry::Occupied(_) => Err(SchemaError::DuplicateSchema {
                database: self.name.clone(),
                schema: schema.name,
            }),
            Entry::Vacant(slot) => {
                slot.insert(schema);
                Ok(())
            }
        }
    }

    /// Get a schema by name.
    pub fn get_schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// The schema named after the database, if present.
    pub fn default_schema(&self) -> Option<&Schema> {
        self.schemas.get(&self.name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Database '{}':", self.name)?;
        for schema in self.schemas() {
            write!(f, "\n{}", schema)?;
        }
        Ok(())
    }
}
