//! Terminal rendering for diffs and schemas.

use owo_colors::OwoColorize;
use resync::{Change, Schema, SchemaDiff};

pub fn print_diff(diff: &SchemaDiff) {
    if diff.is_empty() {
        println!("{}", "No changes detected.".green());
        return;
    }

    println!(
        "{} ({} changes)",
        "Changes detected".bold(),
        diff.change_count()
    );
    println!();
    for change in diff.changes() {
        let line = change.to_string();
        match change {
            Change::AddTable(_) | Change::AddColumn(_) => println!("  {}", line.green()),
            Change::DropTable(_) | Change::DropColumn(_) => println!("  {}", line.red()),
            Change::ModifyColumn(_) => println!("  {}", line.yellow()),
        }
    }
}

pub fn print_schema(schema: &Schema) {
    println!(
        "{} ({} tables)",
        format!("Schema '{}'", schema.name).bold(),
        schema.table_count()
    );
    println!();

    for table in schema.tables() {
        println!("  {} ({} columns)", table.name.cyan(), table.column_count());
        for col in table.columns() {
            let mut attrs = Vec::new();
            if col.is_primary_key() {
                attrs.push("PK".to_string());
            } else if !col.key.as_tag().is_empty() {
                attrs.push(col.key.as_tag().to_string());
            }
            if !col.nullable {
                attrs.push("NOT NULL".to_string());
            }
            if let Some(default) = &col.default {
                attrs.push(format!("DEFAULT {}", default));
            }
            if !col.extra.is_empty() {
                attrs.push(col.extra.clone());
            }

            let attrs_str = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };
            println!("    {}: {}{}", col.field, col.col_type.dimmed(), attrs_str);
        }
        println!();
    }
}
