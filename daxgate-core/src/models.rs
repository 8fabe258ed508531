//! Schema metadata model for LLM prompt construction.
//!
//! These types represent the MAXIMUM information that may be sent to an
//! LLM backend: names, type tags, formula text, and relationship edges.
//! Row counts, sample values, and distinct counts have no fields here;
//! the types are structurally incapable of carrying data values.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn default_true() -> bool {
    true
}

fn default_cardinality() -> String {
    "many-to-one".to_string()
}

/// Column metadata. No value samples, ever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
    pub table_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
}

impl ColumnMeta {
    /// Creates a column with the common defaults (nullable, non-key).
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            table_name: table_name.into(),
            description: None,
            is_key: false,
            is_nullable: true,
        }
    }
}

/// Table metadata. No row counts or sample rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMeta>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
}

impl TableMeta {
    /// Creates a visible table with the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        Self {
            name: name.into(),
            columns,
            description: None,
            is_hidden: false,
        }
    }
}

/// Measure metadata. The expression is formula text, not a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureMeta {
    pub name: String,
    pub expression: String,
    pub table_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format_string: Option<String>,
}

/// Relationship metadata: identifier pairs only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_cardinality")]
    pub cardinality: String,
}

/// Complete schema aggregate, constructed fresh per request from
/// connector output and immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableMeta>,
    #[serde(default)]
    pub measures: Vec<MeasureMeta>,
    #[serde(default)]
    pub relationships: Vec<RelationshipMeta>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_description: Option<String>,
}

impl Schema {
    /// Serializes the schema to its canonical prompt text.
    ///
    /// This exact format is what crosses the boundary to the LLM, and it
    /// is the input to [`Schema::content_hash`], so the section order and
    /// line shapes must stay stable.
    pub fn to_prompt_string(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push("TABLES:".to_string());
        for table in &self.tables {
            if table.is_hidden {
                continue;
            }

            lines.push(format!("\n{}", format_table_name(&table.name)));

            if let Some(description) = &table.description {
                lines.push(format!("  Description: {description}"));
            }

            lines.push("  Columns:".to_string());
            for col in &table.columns {
                let mut col_str = format!("    - {} ({})", col.name, col.data_type);
                if col.is_key {
                    col_str.push_str(" [KEY]");
                }
                if let Some(description) = &col.description {
                    col_str.push_str(&format!(" -- {description}"));
                }
                lines.push(col_str);
            }
        }

        if !self.measures.is_empty() {
            lines.push("\nMEASURES:".to_string());
            for measure in &self.measures {
                lines.push(format!("  - [{}].[{}]", measure.table_name, measure.name));
                lines.push(format!("    Expression: {}", measure.expression));
                if let Some(description) = &measure.description {
                    lines.push(format!("    Description: {description}"));
                }
            }
        }

        if !self.relationships.is_empty() {
            lines.push("\nRELATIONSHIPS:".to_string());
            for rel in &self.relationships {
                let inactive = if rel.is_active { "" } else { " (inactive)" };
                lines.push(format!(
                    "  - {}[{}] -> {}[{}] ({}){}",
                    rel.from_table,
                    rel.from_column,
                    rel.to_table,
                    rel.to_column,
                    rel.cardinality,
                    inactive
                ));
            }
        }

        lines.join("\n")
    }

    /// Short content hash of the canonical prompt text, for audit records.
    pub fn content_hash(&self) -> String {
        let digest = Sha256::digest(self.to_prompt_string().as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Total column count across all tables.
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Names of all tables, in schema order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

/// Quotes a table name when it contains whitespace or bracket characters.
fn format_table_name(name: &str) -> String {
    if name.contains(' ') || name.chars().any(|c| "[](){}".contains(c)) {
        format!("'{name}'")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_schema() -> Schema {
        Schema {
            tables: vec![
                TableMeta::new(
                    "Sales",
                    vec![
                        ColumnMeta::new("Amount", "Decimal", "Sales"),
                        ColumnMeta {
                            is_key: true,
                            ..ColumnMeta::new("CustomerID", "Integer", "Sales")
                        },
                    ],
                ),
                TableMeta::new(
                    "Customer",
                    vec![
                        ColumnMeta::new("Name", "String", "Customer"),
                        ColumnMeta::new("Region", "String", "Customer"),
                    ],
                ),
            ],
            relationships: vec![RelationshipMeta {
                from_table: "Sales".to_string(),
                from_column: "CustomerID".to_string(),
                to_table: "Customer".to_string(),
                to_column: "CustomerID".to_string(),
                is_active: true,
                cardinality: "many-to-one".to_string(),
            }],
            ..Schema::default()
        }
    }

    #[test]
    fn test_prompt_string_sections() {
        let prompt = sales_schema().to_prompt_string();

        assert!(prompt.starts_with("TABLES:"));
        assert!(prompt.contains("\nSales\n"));
        assert!(prompt.contains("    - Amount (Decimal)"));
        assert!(prompt.contains("    - CustomerID (Integer) [KEY]"));
        assert!(prompt.contains("RELATIONSHIPS:"));
        assert!(prompt.contains("  - Sales[CustomerID] -> Customer[CustomerID] (many-to-one)"));
        assert!(!prompt.contains("MEASURES:"));
    }

    #[test]
    fn test_hidden_tables_are_skipped() {
        let mut schema = sales_schema();
        schema.tables[1].is_hidden = true;
        let prompt = schema.to_prompt_string();

        assert!(prompt.contains("Sales"));
        assert!(!prompt.contains("Customer\n"));
    }

    #[test]
    fn test_table_name_quoting() {
        assert_eq!(format_table_name("Sales"), "Sales");
        assert_eq!(format_table_name("Sales Data"), "'Sales Data'");
        assert_eq!(format_table_name("Sales[2024]"), "'Sales[2024]'");
    }

    #[test]
    fn test_inactive_relationship_suffix() {
        let mut schema = sales_schema();
        schema.relationships[0].is_active = false;
        let prompt = schema.to_prompt_string();

        assert!(prompt.contains("(many-to-one) (inactive)"));
    }

    #[test]
    fn test_content_hash_is_stable() {
        let schema = sales_schema();
        assert_eq!(schema.content_hash(), schema.content_hash());
        assert_eq!(schema.content_hash().len(), 16);

        let mut changed = schema.clone();
        changed.tables[0].name = "Orders".to_string();
        assert_ne!(schema.content_hash(), changed.content_hash());
    }

    #[test]
    fn test_measure_section_format() {
        let mut schema = sales_schema();
        schema.measures.push(MeasureMeta {
            name: "Total Sales".to_string(),
            expression: "SUM(Sales[Amount])".to_string(),
            table_name: "Sales".to_string(),
            description: Some("Sum of sales amounts".to_string()),
            format_string: None,
        });
        let prompt = schema.to_prompt_string();

        assert!(prompt.contains("MEASURES:"));
        assert!(prompt.contains("  - [Sales].[Total Sales]"));
        assert!(prompt.contains("    Expression: SUM(Sales[Amount])"));
        assert!(prompt.contains("    Description: Sum of sales amounts"));
    }

    #[test]
    fn test_schema_roundtrips_through_json() {
        let schema = sales_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }
}
