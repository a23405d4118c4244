//! Schema grounding for natural-language to SQL translation
//!
//! A [`SchemaDescription`] is the textual picture of the database handed to
//! the language model with every request. It is built once per process, either
//! from the static BikeStores description or by introspecting a live database,
//! and is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

mod bike_stores;

pub use bike_stores::bike_stores;

/// Role a column plays in its table's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    #[default]
    None,
    /// Single-column primary key
    Primary,
    /// Member of a composite primary key
    CompositePrimary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub key: KeyRole,
    #[serde(default)]
    pub note: String,
}

impl ColumnDescriptor {
    /// Nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            key: KeyRole::None,
            note: String::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.key = KeyRole::Primary;
        self.nullable = false;
        self
    }

    pub fn composite_key(mut self) -> Self {
        self.key = KeyRole::CompositePrimary;
        self.nullable = false;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    /// Free-text purpose of the table
    #[serde(default)]
    pub purpose: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Columns that together form a composite primary key, in declaration order
    pub fn composite_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key == KeyRole::CompositePrimary)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Ordered description of every table available to translation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Database display name used as the heading of the prompt text
    pub name: String,
    pub tables: Vec<TableDescriptor>,
    /// Free-form relationship notes rendered after the tables
    #[serde(default)]
    pub relationships: Vec<String>,
}

impl SchemaDescription {
    pub fn new(name: impl Into<String>, tables: Vec<TableDescriptor>) -> Self {
        Self {
            name: name.into(),
            tables,
            relationships: Vec::new(),
        }
    }

    /// An empty description means grounding is unavailable, not that the
    /// database has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Render the human-readable schema text embedded in translation prompts
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} Database Schema:", self.name);

        for table in &self.tables {
            out.push('\n');
            let _ = writeln!(out, "Table: {}", table.name);
            if !table.purpose.is_empty() {
                let _ = writeln!(out, "Description: {}", table.purpose);
            }
            out.push_str("Columns:\n");
            for col in &table.columns {
                let _ = write!(out, "  - {} ({})", col.name, col.data_type);
                match col.key {
                    KeyRole::Primary => out.push_str(" PRIMARY KEY"),
                    KeyRole::None if !col.nullable => out.push_str(" NOT NULL"),
                    _ => {}
                }
                if !col.note.is_empty() {
                    let _ = write!(out, ": {}", col.note);
                }
                out.push('\n');
            }

            let composite = table.composite_key();
            if !composite.is_empty() {
                let _ = writeln!(out, "Primary Key: ({})", composite.join(", "));
            }

            if !table.foreign_keys.is_empty() {
                out.push_str("Foreign Keys:\n");
                for fk in &table.foreign_keys {
                    let _ = writeln!(
                        out,
                        "  - {} references {}({})",
                        fk.column, fk.references_table, fk.references_column
                    );
                }
            }
        }

        if !self.relationships.is_empty() {
            out.push_str("\nCommon Relationships:\n");
            for rel in &self.relationships {
                let _ = writeln!(out, "- {}", rel);
            }
        }

        out
    }
}

/// Produces the schema used to ground translation
///
/// Implementations must return the same description on every call for the
/// lifetime of the process. A provider that cannot build a description
/// returns [`SchemaDescription::default`] instead of failing.
pub trait SchemaProvider: Send + Sync {
    fn describe_schema(&self) -> SchemaDescription;
}

/// Statically authored description, no I/O
#[derive(Debug, Clone)]
pub struct StaticSchema {
    schema: SchemaDescription,
}

impl StaticSchema {
    pub fn new(schema: SchemaDescription) -> Self {
        Self { schema }
    }

    /// The built-in BikeStores description
    pub fn bike_stores() -> Self {
        Self::new(bike_stores())
    }
}

impl SchemaProvider for StaticSchema {
    fn describe_schema(&self) -> SchemaDescription {
        self.schema.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_schema() -> SchemaDescription {
        let mut schema = SchemaDescription::new(
            "Tiny",
            vec![
                TableDescriptor::new("sales_stores", "Store locations")
                    .column(ColumnDescriptor::new("store_id", "INT").primary_key().note("Store id"))
                    .column(ColumnDescriptor::new("store_name", "VARCHAR").not_null())
                    .column(ColumnDescriptor::new("phone", "VARCHAR")),
                TableDescriptor::new("production_stocks", "Inventory")
                    .column(ColumnDescriptor::new("store_id", "INT").composite_key())
                    .column(ColumnDescriptor::new("product_id", "INT").composite_key())
                    .foreign_key(ForeignKey::new("store_id", "sales_stores", "store_id")),
            ],
        );
        schema.relationships.push("Stores maintain Stock".to_string());
        schema
    }

    #[test]
    fn test_prompt_text_lists_columns_and_keys() {
        let text = tiny_schema().to_prompt_text();

        assert!(text.starts_with("Tiny Database Schema:"));
        assert!(text.contains("Table: sales_stores"));
        assert!(text.contains("Description: Store locations"));
        assert!(text.contains("  - store_id (INT) PRIMARY KEY: Store id"));
        assert!(text.contains("  - store_name (VARCHAR) NOT NULL\n"));
        assert!(text.contains("  - phone (VARCHAR)\n"));
        assert!(text.contains("Primary Key: (store_id, product_id)"));
        assert!(text.contains("  - store_id references sales_stores(store_id)"));
        assert!(text.contains("Common Relationships:\n- Stores maintain Stock"));
    }

    #[test]
    fn test_empty_schema_means_no_grounding() {
        let schema = SchemaDescription::default();
        assert!(schema.is_empty());
        assert!(!tiny_schema().is_empty());
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let schema = tiny_schema();
        assert!(schema.table("SALES_STORES").is_some());
        assert!(schema.table("sales.stores").is_none());
        assert_eq!(schema.table_names(), vec!["sales_stores", "production_stocks"]);
    }

    #[test]
    fn test_static_provider_is_stable() {
        let provider = StaticSchema::bike_stores();
        assert_eq!(provider.describe_schema(), provider.describe_schema());
    }
}
