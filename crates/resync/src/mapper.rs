//! Field mapping between a source table and a target table.

use crate::error::{Error, Side};
use crate::value::Record;
use crate::{Result, Table};
use indexmap::IndexMap;
use std::fmt;

/// An ordered source-field → target-field correspondence between two tables.
///
/// Every entry is validated against both tables when it is added, so a built
/// mapper only ever references columns that exist.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    source: Table,
    target: Table,
    mapping: IndexMap<String, String>,
}

impl FieldMapper {
    /// Create an empty mapping between two tables.
    pub fn new(source: &Table, target: &Table) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            mapping: IndexMap::new(),
        }
    }

    /// Create a mapping and add every `(source_field, target_field)` pair.
    pub fn with_mappings<S, T>(
        source: &Table,
        target: &Table,
        pairs: impl IntoIterator<Item = (S, T)>,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut mapper = Self::new(source, target);
        for (src, dst) in pairs {
            mapper.add_mapping(src.as_ref(), dst.as_ref())?;
        }
        Ok(mapper)
    }

    /// Map `source_field` to `target_field`.
    ///
    /// Mapping an already-mapped source field replaces its target but keeps
    /// its position. On error the mapper is left unchanged.
    pub fn add_mapping(&mut self, source_field: &str, target_field: &str) -> Result<()> {
        if !self.source.has_column(source_field) {
            return Err(Error::FieldNotFound {
                side: Side::Source,
                table: self.source.name.clone(),
                field: source_field.to_string(),
            });
        }
        if !self.target.has_column(target_field) {
            return Err(Error::FieldNotFound {
                side: Side::Target,
                table: self.target.name.clone(),
                field: target_field.to_string(),
            });
        }

        tracing::trace!(
            source = %self.source.name,
            target = %self.target.name,
            "map {} -> {}",
            source_field,
            target_field
        );
        self.mapping
            .insert(source_field.to_string(), target_field.to_string());
        Ok(())
    }

    /// Forward lookup.
    pub fn get_target_field(&self, source_field: &str) -> Option<&str> {
        self.mapping.get(source_field).map(String::as_str)
    }

    /// Reverse lookup. Returns the first source field mapped to
    /// `target_field`.
    pub fn get_source_field(&self, target_field: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, dst)| dst.as_str() == target_field)
            .map(|(src, _)| src.as_str())
    }

    /// Project a source record into target shape.
    ///
    /// Keys without a mapping are dropped; mapped fields missing from the
    /// record are left out of the output. Output keys follow mapping order.
    pub fn map_record(&self, record: &Record) -> Record {
        let mut out = Record::with_capacity(self.mapping.len());
        for (src, dst) in &self.mapping {
            if let Some(value) = record.get(src) {
                out.insert(dst.clone(), value.clone());
            }
        }
        out
    }

    /// `(source_field, target_field)` pairs in mapping order.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapping.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    /// Mapped source fields, in mapping order.
    pub fn source_fields(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    /// Mapped target fields, in mapping order.
    pub fn target_fields(&self) -> impl Iterator<Item = &str> {
        self.mapping.values().map(String::as_str)
    }

    pub fn source_table(&self) -> &Table {
        &self.source
    }

    pub fn target_table(&self) -> &Table {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl fmt::Display for FieldMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.name, self.target.name)?;
        for (src, dst) in &self.mapping {
            write!(f, "\n  {} -> {}", src, dst)?;
        }
        Ok(())
    }
}
