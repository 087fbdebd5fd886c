//! Schema Catalog - Static description of the analytics tables
//!
//! The catalog grounds the generation prompts and serves as the table
//! whitelist for validating generated SQL. It is built once at startup and
//! only read afterwards.

use serde::{Deserialize, Serialize};

/// Foreign key target of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub is_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnReference>,
}

impl ColumnDescriptor {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_key: false,
            references: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ColumnReference {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: &str, description: &str, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Ordered, immutable collection of table descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    schema: String,
    tables: Vec<TableDescriptor>,
}

impl SchemaCatalog {
    pub fn new(schema: &str, tables: Vec<TableDescriptor>) -> Self {
        Self {
            schema: schema.to_string(),
            tables,
        }
    }

    /// Tables of the photo-generation platform in the `public` schema.
    pub fn platform() -> Self {
        Self::new(
            "public",
            vec![
                TableDescriptor::new(
                    "profiles",
                    "One row per registered user",
                    vec![
                        ColumnDescriptor::new("id", "uuid").key(),
                        ColumnDescriptor::new("email", "text"),
                        ColumnDescriptor::new("created_at", "timestamptz"),
                    ],
                ),
                TableDescriptor::new(
                    "models",
                    "Fine-tuned AI models and their training status",
                    vec![
                        ColumnDescriptor::new("id", "bigint").key(),
                        ColumnDescriptor::new("user_id", "uuid").references("profiles", "id"),
                        ColumnDescriptor::new("\"modelId\"", "text"),
                        ColumnDescriptor::new("type", "text"),
                        ColumnDescriptor::new("status", "text"),
                        ColumnDescriptor::new("created_at", "timestamptz"),
                    ],
                ),
                TableDescriptor::new(
                    "credits",
                    "Credit balance entries per user",
                    vec![
                        ColumnDescriptor::new("id", "bigint").key(),
                        ColumnDescriptor::new("user_id", "uuid").references("profiles", "id"),
                        ColumnDescriptor::new("credits", "integer"),
                        ColumnDescriptor::new("created_at", "timestamptz"),
                    ],
                ),
                TableDescriptor::new(
                    "images",
                    "Generated images",
                    vec![
                        ColumnDescriptor::new("id", "bigint").key(),
                        ColumnDescriptor::new("model_id", "bigint").references("models", "id"),
                        ColumnDescriptor::new("user_id", "uuid").references("profiles", "id"),
                        ColumnDescriptor::new("created_at", "timestamptz"),
                    ],
                ),
                TableDescriptor::new(
                    "samples",
                    "Training samples uploaded for fine-tuning",
                    vec![
                        ColumnDescriptor::new("id", "bigint").key(),
                        ColumnDescriptor::new("model_id", "bigint").references("models", "id"),
                        ColumnDescriptor::new("created_at", "timestamptz"),
                    ],
                ),
            ],
        )
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Case-insensitive lookup; accepts bare or schema-qualified names.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        let bare = self.strip_schema(name);
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(bare))
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    fn strip_schema<'a>(&self, name: &'a str) -> &'a str {
        match name.rsplit_once('.') {
            Some((schema, table)) if schema.trim_matches('"').eq_ignore_ascii_case(&self.schema) => {
                table.trim_matches('"')
            }
            _ => name.trim_matches('"'),
        }
    }

    /// Render the catalog as prompt text, one table per block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("{}.{}: {}\n", self.schema, table.name, table.description));
            for column in &table.columns {
                out.push_str(&format!("  - {} {}", column.name, column.data_type));
                if column.is_key {
                    out.push_str(" PRIMARY KEY");
                }
                if let Some(reference) = &column.references {
                    out.push_str(&format!(
                        " REFERENCES {}.{}({})",
                        self.schema, reference.table, reference.column
                    ));
                }
                out.push('\n');
            }
        }
        out
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tables_in_order() {
        let catalog = SchemaCatalog::platform();
        let names: Vec<&str> = catalog.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["profiles", "models", "credits", "images", "samples"]);
    }

    #[test]
    fn test_table_lookup_handles_qualifiers() {
        let catalog = SchemaCatalog::platform();
        assert!(catalog.contains_table("credits"));
        assert!(catalog.contains_table("public.credits"));
        assert!(catalog.contains_table("PUBLIC.Profiles"));
        assert!(catalog.contains_table("\"models\""));
        assert!(!catalog.contains_table("auth.users"));
        assert!(!catalog.contains_table("payments"));
    }

    #[test]
    fn test_render_includes_relationships() {
        let rendered = SchemaCatalog::platform().render();
        assert!(rendered.contains("public.credits: Credit balance entries per user"));
        assert!(rendered.contains("  - user_id uuid REFERENCES public.profiles(id)"));
        assert!(rendered.contains("  - id uuid PRIMARY KEY"));
    }

    #[test]
    fn test_column_lookup() {
        let catalog = SchemaCatalog::platform();
        let credits = catalog.table("credits").unwrap();
        assert_eq!(credits.column("CREDITS").unwrap().data_type, "integer");
        assert!(credits.column("missing").is_none());
    }
}
