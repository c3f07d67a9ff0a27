//! JSON schema descriptions.
//!
//! A description maps each table name to its ordered column list, using the
//! same shape as MySQL's `DESCRIBE` output:
//!
//! ```json
//! {
//!     "users": [
//!         { "Field": "id", "Type": "int(11)", "Null": "NO", "Key": "PRI",
//!           "Default": null, "Extra": "auto_increment" },
//!         { "Field": "email", "Type": "varchar(255)", "Null": "YES", "Key": "",
//!           "Default": null, "Extra": "" }
//!     ]
//! }
//! ```

use crate::{Column, Database, KeyRole, Schema, SchemaError, Table};
use facet::Facet;
use indexmap::IndexMap;
use std::path::Path;

/// Table name → ordered column descriptions.
#[derive(Debug, Clone, Default, Facet)]
#[facet(transparent)]
pub struct SchemaDescription(pub IndexMap<String, Vec<ColumnDescription>>);

/// One column as it appears in a schema description.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ColumnDescription {
    #[facet(rename = "Field")]
    pub field: String,

    #[facet(rename = "Type")]
    pub col_type: String,

    /// `YES` or `NO`
    #[facet(rename = "Null")]
    pub null: String,

    #[facet(default, rename = "Key")]
    pub key: String,

    /// Any JSON scalar, or null for no default.
    #[facet(default, rename = "Default")]
    pub default: Option<DefaultLiteral>,

    #[facet(default, rename = "Extra")]
    pub extra: String,
}

/// A column default as written in a description.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(untagged)]
#[repr(u8)]
pub enum DefaultLiteral {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl DefaultLiteral {
    /// The literal's text, as stored in [`Column::default`].
    pub fn to_literal(&self) -> String {
        match self {
            DefaultLiteral::Bool(b) => b.to_string(),
            DefaultLiteral::Integer(n) => n.to_string(),
            DefaultLiteral::Float(x) => x.to_string(),
            DefaultLiteral::Text(s) => s.clone(),
        }
    }
}

impl ColumnDescription {
    /// Convert into a model column, validating the `Null` and `Key` tags.
    pub fn to_column(&self, table: &str) -> Result<Column, SchemaError> {
        let nullable = match self.null.trim() {
            "YES" => true,
            "NO" => false,
            other => {
                return Err(SchemaError::InvalidNullability {
                    table: table.to_string(),
                    column: self.field.clone(),
                    value: other.to_string(),
                });
            }
        };

        let key = KeyRole::parse(&self.key).ok_or_else(|| SchemaError::InvalidKey {
            table: table.to_string(),
            column: self.field.clone(),
            value: self.key.clone(),
        })?;

        Ok(Column {
            field: self.field.clone(),
            col_type: self.col_type.clone(),
            nullable,
            key,
            default: self.default.as_ref().map(DefaultLiteral::to_literal),
            extra: self.extra.clone(),
        })
    }
}

impl From<&Column> for ColumnDescription {
    fn from(col: &Column) -> Self {
        Self {
            field: col.field.clone(),
            col_type: col.col_type.clone(),
            null: if col.nullable { "YES" } else { "NO" }.to_string(),
            key: col.key.as_tag().to_string(),
            default: col.default.clone().map(DefaultLiteral::Text),
            extra: col.extra.clone(),
        }
    }
}

impl SchemaDescription {
    /// Parse a description from JSON text.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        facet_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    /// Read and parse a description file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }
}

impl Schema {
    /// Build a schema from a description, preserving table and column order.
    pub fn from_description(
        name: impl Into<String>,
        description: &SchemaDescription,
    ) -> Result<Self, SchemaError> {
        let mut schema = Schema::new(name);
        for (table_name, columns) in &description.0 {
            let mut table = Table::new(table_name.clone());
            for col in columns {
                table.add_column(col.to_column(table_name)?)?;
            }
            schema.add_table(table)?;
        }
        Ok(schema)
    }

    /// Describe this schema in the JSON description shape.
    pub fn to_description(&self) -> SchemaDescription {
        SchemaDescription(
            self.tables()
                .map(|t| {
                    (
                        t.name.clone(),
                        t.columns().map(ColumnDescription::from).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl Database {
    /// Build a database whose single default schema (named after the
    /// database) holds every described table.
    pub fn from_description(
        name: impl Into<String>,
        description: &SchemaDescription,
    ) -> Result<Self, SchemaError> {
        let mut db = Database::new(name);
        let schema = Schema::from_description(db.name.clone(), description)?;
        db.add_schema(schema)?;
        Ok(db)
    }

    /// Load a database from a JSON description file.
    pub fn load_json(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let description = SchemaDescription::read(path)?;
        Self::from_description(name, &description)
    }
}
