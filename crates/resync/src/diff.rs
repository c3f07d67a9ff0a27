//! Schema diffing: compare a desired (source) schema against a current
//! (target) schema.
//!
//! [`compare`] produces a [`SchemaDiff`] holding five disjoint change lists.
//! Rendering walks them in a fixed order:
//!
//! 1. `CREATE TABLE` for every source-only table (full column list)
//! 2. `DROP TABLE` for every target-only table
//! 3. `ADD COLUMN` for columns only the source has
//! 4. `DROP COLUMN` for columns only the target has
//! 5. `MODIFY COLUMN` for columns whose type descriptor differs
//!
//! Matching is by name only. A renamed table or column shows up as a drop
//! plus an add.
//!
//! ```
//! use resync::{Column, Schema, Table, compare};
//!
//! let source = Schema::with_tables("app", [Table::with_columns(
//!     "users",
//!     [Column::new("id", "int"), Column::new("email", "varchar(255)")],
//! )?])?;
//! let target = Schema::with_tables("app", [Table::with_columns(
//!     "users",
//!     [Column::new("id", "int")],
//! )?])?;
//!
//! let diff = compare(&source, &target);
//! assert_eq!(diff.to_sql(), "ALTER TABLE users ADD COLUMN email varchar(255);");
//! # Ok::<(), resync::SchemaError>(())
//! ```

use crate::{Column, Schema, Table};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;

/// How names are matched between the two schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Match table and column names exactly (the default). When false,
    /// names are compared after lowercasing.
    pub case_sensitive: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

impl CompareOptions {
    fn key<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.case_sensitive {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(name.to_lowercase())
        }
    }
}

/// A column the target table is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddColumn {
    pub table: String,
    pub column: Column,
}

/// A column only the target table has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropColumn {
    pub table: String,
    pub column: String,
}

/// A column whose type descriptor differs between source and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyColumn {
    pub table: String,
    /// The desired (source) definition.
    pub column: Column,
    /// The target's current type descriptor.
    pub from: String,
}

/// The structural difference between two schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Source-only tables, in source order.
    pub add_tables: Vec<Table>,
    /// Target-only table names, in target order.
    pub drop_tables: Vec<String>,
    pub add_columns: Vec<AddColumn>,
    pub drop_columns: Vec<DropColumn>,
    pub modify_columns: Vec<ModifyColumn>,
}

/// A single change, borrowed from a [`SchemaDiff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    AddTable(&'a Table),
    DropTable(&'a str),
    AddColumn(&'a AddColumn),
    DropColumn(&'a DropColumn),
    ModifyColumn(&'a ModifyColumn),
}

impl Change<'_> {
    /// Name of the table this change applies to.
    pub fn table(&self) -> &str {
        match self {
            Change::AddTable(t) => &t.name,
            Change::DropTable(name) => name,
            Change::AddColumn(c) => &c.table,
            Change::DropColumn(c) => &c.table,
            Change::ModifyColumn(c) => &c.table,
        }
    }

    /// Render this change as a single statement.
    pub fn to_sql(&self) -> String {
        match self {
            Change::AddTable(table) => {
                let cols: Vec<String> = table
                    .columns()
                    .map(|c| format!("{} {}", c.field, c.col_type))
                    .collect();
                format!("CREATE TABLE {} ({});", table.name, cols.join(", "))
            }
            Change::DropTable(name) => format!("DROP TABLE {};", name),
            Change::AddColumn(c) => format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                c.table, c.column.field, c.column.col_type
            ),
            Change::DropColumn(c) => {
                format!("ALTER TABLE {} DROP COLUMN {};", c.table, c.column)
            }
            Change::ModifyColumn(c) => format!(
                "ALTER TABLE {} MODIFY COLUMN {} {};",
                c.table, c.column.field, c.column.col_type
            ),
        }
    }
}

impl fmt::Display for Change<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::DropTable(name) => write!(f, "- table {}", name),
            Change::AddColumn(c) => {
                write!(f, "+ {}.{}: {}", c.table, c.column.field, c.column.col_type)
            }
            Change::DropColumn(c) => write!(f, "- {}.{}", c.table, c.column),
            Change::ModifyColumn(c) => write!(
                f,
                "~ {}.{}: {} -> {}",
                c.table, c.column.field, c.from, c.column.col_type
            ),
        }
    }
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.add_tables.len()
            + self.drop_tables.len()
            + self.add_columns.len()
            + self.drop_columns.len()
            + self.modify_columns.len()
    }

    /// Iterate over every change in rendering order.
    pub fn changes(&self) -> impl Iterator<Item = Change<'_>> {
        self.add_tables
            .iter()
            .map(Change::AddTable)
            .chain(self.drop_tables.iter().map(|t| Change::DropTable(t.as_str())))
            .chain(self.add_columns.iter().map(Change::AddColumn))
            .chain(self.drop_columns.iter().map(Change::DropColumn))
            .chain(self.modify_columns.iter().map(Change::ModifyColumn))
    }

    /// Render every change as a statement, in rendering order.
    pub fn render(&self) -> Vec<String> {
        self.changes().map(|c| c.to_sql()).collect()
    }

    /// All statements joined by newlines.
    pub fn to_sql(&self) -> String {
        self.render().join("\n")
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            writeln!(f, "Changes detected:\n")?;
            for change in self.changes() {
                writeln!(f, "  {}", change)?;
            }
        }
        Ok(())
    }
}

/// Compare `source` (desired) against `target` (current) with exact name
/// matching.
pub fn compare(source: &Schema, target: &Schema) -> SchemaDiff {
    compare_with(source, target, &CompareOptions::default())
}

/// Compare `source` (desired) against `target` (current).
///
/// When names are folded, only the first table (or column) per folded name on
/// each side takes part; later ones are ignored.
pub fn compare_with(source: &Schema, target: &Schema, options: &CompareOptions) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    let source_tables = first_by_key(source.tables(), |t| t.name.as_str(), options);
    let target_tables = first_by_key(target.tables(), |t| t.name.as_str(), options);

    for (key, table) in &source_tables {
        if !target_tables.contains_key(key) {
            diff.add_tables.push((*table).clone());
        }
    }

    for (key, table) in &target_tables {
        if !source_tables.contains_key(key) {
            diff.drop_tables.push(table.name.clone());
        }
    }

    for (key, desired) in &source_tables {
        if let Some(current) = target_tables.get(key) {
            diff_columns(desired, current, options, &mut diff);
        }
    }

    diff
}

/// Items keyed by their (possibly folded) name, first occurrence winning, in
/// original order.
fn first_by_key<'a, T>(
    items: impl Iterator<Item = &'a T>,
    name: impl Fn(&'a T) -> &'a str,
    options: &CompareOptions,
) -> IndexMap<Cow<'a, str>, &'a T> {
    let mut out = IndexMap::new();
    for item in items {
        out.entry(options.key(name(item))).or_insert(item);
    }
    out
}

/// Render a diff as an ordered list of statements.
pub fn render(diff: &SchemaDiff) -> Vec<String> {
    diff.render()
}

/// Column-level diff for a table present on both sides. Statements name the
/// target's table, since that is where they run.
fn diff_columns(desired: &Table, current: &Table, options: &CompareOptions, diff: &mut SchemaDiff) {
    let desired_cols = first_by_key(desired.columns(), |c| c.field.as_str(), options);
    let current_cols = first_by_key(current.columns(), |c| c.field.as_str(), options);

    for (key, col) in &desired_cols {
        match current_cols.get(key) {
            None => diff.add_columns.push(AddColumn {
                table: current.name.clone(),
                column: (*col).clone(),
            }),
            Some(existing) if existing.col_type != col.col_type => {
                diff.modify_columns.push(ModifyColumn {
                    table: current.name.clone(),
                    column: (*col).clone(),
                    from: existing.col_type.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for (key, col) in &current_cols {
        if !desired_cols.contains_key(key) {
            diff.drop_columns.push(DropColumn {
                table: current.name.clone(),
                column: col.field.clone(),
            });
        }
    }
}
