//! Data-boundary enforcement between model metadata and LLM backends.
//!
//! The sanitizer transforms a raw [`Schema`] into one safe to transmit and
//! produces a verifiable violation list. Schema (table names, column
//! names, types) may cross the boundary; data (actual values, row content)
//! never does. Sanitization is pure: violations are accumulated per call
//! and returned, never stored on the sanitizer.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::error::{DaxGateError, Result};
use crate::models::{ColumnMeta, MeasureMeta, Schema, TableMeta};

/// Version tag of the built-in leak-pattern set, recorded in audit details
/// so pattern updates are traceable across deployments.
pub const LEAK_PATTERNS_VERSION: &str = "1";

/// Placeholder substituted for free text that matched a leak pattern.
pub const REDACTED: &str = "[REDACTED]";

const MAX_TABLE_DESCRIPTION_LEN: usize = 500;
const MAX_COLUMN_DESCRIPTION_LEN: usize = 200;
const MAX_MEASURE_EXPRESSION_LEN: usize = 2000;
const MAX_PROMPT_LEN: usize = 50_000;

/// Patterns that might indicate data leakage: value-shaped text and
/// SQL/DAX constructs that return rows.
static LEAK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Looks like actual values
        r"\b\d{3}-\d{2}-\d{4}\b",                           // SSN
        r"\b\d{16}\b",                                      // card number
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", // email
        r"\$[\d,]+\.?\d*",                                  // currency amount
        r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b",          // IPv4 address
        // SQL/DAX that returns data
        r"SELECT\s+\*",
        r"EVALUATE\s+VALUES\s*\(",
        r"SAMPLE\s*\(",
    ]
    .iter()
    .map(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| unreachable!("built-in leak pattern is valid"))
    })
    .collect()
});

/// Classification of a sanitizer finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Text matched a leak pattern. Fatal in strict mode.
    LeakPattern,
    /// A field exceeded its length cap and was truncated. Never fatal.
    Oversize,
    /// The assembled prompt exceeded the hard size ceiling. Fatal in
    /// strict mode.
    SchemaTooLarge,
}

/// One sanitizer finding. Messages reference field locations by name and
/// never quote the offending text, so violations are safe to audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    fn leak(message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::LeakPattern,
            message: message.into(),
        }
    }

    fn oversize(message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Oversize,
            message: message.into(),
        }
    }

    /// Whether this finding fails the call in strict mode. Truncation of
    /// merely-long-but-clean input never does.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind, ViolationKind::Oversize)
    }
}

/// Configuration for the schema sanitizer.
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Pass through table/column/measure descriptions.
    pub allow_descriptions: bool,
    /// Include measure expressions.
    pub allow_measures: bool,
    /// Include relationship edges.
    pub allow_relationships: bool,
    /// Escalate any detected leak to a hard failure instead of a soft
    /// redaction.
    pub strict_mode: bool,
    /// Deployment-supplied patterns scanned in addition to the built-in
    /// set. Prefer [`BoundaryConfig::with_extra_patterns`] to populate.
    pub extra_patterns: Vec<Regex>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            allow_descriptions: true,
            allow_measures: true,
            allow_relationships: true,
            strict_mode: true,
            extra_patterns: Vec::new(),
        }
    }
}

impl BoundaryConfig {
    /// Adds deployment-specific leak patterns on top of the built-in set.
    ///
    /// # Errors
    /// Returns a configuration error if any pattern fails to compile.
    pub fn with_extra_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let compiled = RegexBuilder::new(pattern.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    DaxGateError::configuration(format!(
                        "invalid leak pattern '{}': {e}",
                        pattern.as_ref()
                    ))
                })?;
            self.extra_patterns.push(compiled);
        }
        Ok(self)
    }
}

/// Result of a sanitization pass: the best-effort sanitized schema plus
/// every finding, for the caller to log.
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub schema: Schema,
    pub violations: Vec<Violation>,
}

/// Validates and redacts a [`Schema`] before it is allowed to leave the
/// process.
///
/// # Security
/// In strict mode (the default) any leak finding fails the call with
/// [`DaxGateError::BoundaryViolation`] and nothing is forwarded. The
/// sanitizer does not trust its input: even though connectors are
/// responsible for never including row counts or sample values, safety is
/// re-derived here via pattern scanning regardless.
#[derive(Debug, Clone, Default)]
pub struct SchemaSanitizer {
    config: BoundaryConfig,
}

impl SchemaSanitizer {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Transforms a raw schema into one safe for an LLM prompt.
    ///
    /// # Errors
    /// Returns [`DaxGateError::BoundaryViolation`] carrying the full
    /// violation list when strict mode is on and any fatal finding exists.
    pub fn sanitize(&self, schema: &Schema) -> Result<Sanitized> {
        let mut violations = Vec::new();

        let mut sanitized = Schema {
            model_name: schema.model_name.clone(),
            model_description: schema.model_description.as_deref().and_then(|text| {
                self.sanitize_text(
                    text,
                    MAX_TABLE_DESCRIPTION_LEN,
                    "model description",
                    &mut violations,
                )
            }),
            ..Schema::default()
        };

        for table in &schema.tables {
            sanitized.tables.push(self.sanitize_table(table, &mut violations));
        }

        if self.config.allow_measures {
            for measure in &schema.measures {
                if let Some(clean) = self.sanitize_measure(measure, &mut violations) {
                    sanitized.measures.push(clean);
                }
            }
        }

        if self.config.allow_relationships {
            sanitized.relationships = schema.relationships.clone();
        }

        // Defense in depth: individual fields can be clean while their
        // composition is not, so the assembled prompt is re-scanned whole.
        self.validate_final(&sanitized, &mut violations);

        if self.config.strict_mode && violations.iter().any(Violation::is_fatal) {
            return Err(DaxGateError::BoundaryViolation { violations });
        }

        Ok(Sanitized {
            schema: sanitized,
            violations,
        })
    }

    /// Builds the audit `details` payload proving that only schema was
    /// sent. `data_included` is always false.
    pub fn audit_details(
        &self,
        schema: &Schema,
        violations: &[Violation],
    ) -> serde_json::Map<String, Value> {
        let mut details = serde_json::Map::new();
        details.insert("schema_hash".to_string(), json!(schema.content_hash()));
        details.insert("table_count".to_string(), json!(schema.tables.len()));
        details.insert("column_count".to_string(), json!(schema.column_count()));
        details.insert("measure_count".to_string(), json!(schema.measures.len()));
        details.insert(
            "relationship_count".to_string(),
            json!(schema.relationships.len()),
        );
        details.insert("tables".to_string(), json!(schema.table_names()));
        details.insert("data_included".to_string(), json!(false));
        details.insert(
            "violations".to_string(),
            json!(violations.iter().map(|v| v.message.clone()).collect::<Vec<_>>()),
        );
        details.insert(
            "boundary_settings".to_string(),
            json!({
                "allow_descriptions": self.config.allow_descriptions,
                "allow_measures": self.config.allow_measures,
                "allow_relationships": self.config.allow_relationships,
                "strict_mode": self.config.strict_mode,
                "leak_patterns_version": LEAK_PATTERNS_VERSION,
            }),
        );
        details
    }

    fn sanitize_table(&self, table: &TableMeta, violations: &mut Vec<Violation>) -> TableMeta {
        let table_name = sanitize_identifier(&table.name);

        let columns = table
            .columns
            .iter()
            .map(|col| self.sanitize_column(col, &table_name, violations))
            .collect();

        TableMeta {
            name: table_name.clone(),
            columns,
            description: table.description.as_deref().and_then(|text| {
                self.sanitize_text(
                    text,
                    MAX_TABLE_DESCRIPTION_LEN,
                    &format!("table '{table_name}' description"),
                    violations,
                )
            }),
            is_hidden: table.is_hidden,
        }
    }

    fn sanitize_column(
        &self,
        col: &ColumnMeta,
        table_name: &str,
        violations: &mut Vec<Violation>,
    ) -> ColumnMeta {
        let name = sanitize_identifier(&col.name);
        ColumnMeta {
            description: col.description.as_deref().and_then(|text| {
                self.sanitize_text(
                    text,
                    MAX_COLUMN_DESCRIPTION_LEN,
                    &format!("column '{table_name}'[{name}] description"),
                    violations,
                )
            }),
            name,
            data_type: col.data_type.clone(),
            table_name: table_name.to_string(),
            is_key: col.is_key,
            is_nullable: col.is_nullable,
        }
    }

    fn sanitize_measure(
        &self,
        measure: &MeasureMeta,
        violations: &mut Vec<Violation>,
    ) -> Option<MeasureMeta> {
        let name = sanitize_identifier(&measure.name);
        let mut expression = measure.expression.clone();

        if expression.chars().count() > MAX_MEASURE_EXPRESSION_LEN {
            violations.push(Violation::oversize(format!(
                "measure '{name}' expression too long, truncating"
            )));
            expression = truncate_with_ellipsis(&expression, MAX_MEASURE_EXPRESSION_LEN);
        }

        if self.matches_leak_pattern(&expression) {
            violations.push(Violation::leak(format!(
                "measure '{name}' contains potential data leak pattern"
            )));
            if self.config.strict_mode {
                return None;
            }
            expression = REDACTED.to_string();
        }

        Some(MeasureMeta {
            name,
            expression,
            table_name: measure.table_name.clone(),
            description: measure.description.as_deref().and_then(|text| {
                self.sanitize_text(
                    text,
                    MAX_COLUMN_DESCRIPTION_LEN,
                    &format!("measure '{}' description", measure.name),
                    violations,
                )
            }),
            format_string: measure.format_string.clone(),
        })
    }

    /// Sanitizes a free-text field. A leak hit records a violation and, in
    /// strict mode, drops the field; in lax mode the field becomes the
    /// fixed placeholder. Long-but-clean text is truncated, never failed.
    fn sanitize_text(
        &self,
        text: &str,
        max_len: usize,
        location: &str,
        violations: &mut Vec<Violation>,
    ) -> Option<String> {
        if !self.config.allow_descriptions {
            return None;
        }

        if self.matches_leak_pattern(text) {
            violations.push(Violation::leak(format!(
                "{location} contains potential data"
            )));
            if self.config.strict_mode {
                return None;
            }
            return Some(REDACTED.to_string());
        }

        if text.chars().count() > max_len {
            return Some(truncate_with_ellipsis(text, max_len));
        }

        Some(text.to_string())
    }

    fn validate_final(&self, schema: &Schema, violations: &mut Vec<Violation>) {
        let prompt = schema.to_prompt_string();

        if prompt.chars().count() > MAX_PROMPT_LEN {
            violations.push(Violation {
                kind: ViolationKind::SchemaTooLarge,
                message: format!(
                    "schema prompt too large ({} chars, limit {MAX_PROMPT_LEN})",
                    prompt.chars().count()
                ),
            });
        }

        for (index, pattern) in self.all_patterns().enumerate() {
            if pattern.is_match(&prompt) {
                violations.push(Violation::leak(format!(
                    "assembled schema prompt matches leak pattern #{index}"
                )));
            }
        }
    }

    fn matches_leak_pattern(&self, text: &str) -> bool {
        self.all_patterns().any(|p| p.is_match(text))
    }

    fn all_patterns(&self) -> impl Iterator<Item = &Regex> {
        LEAK_PATTERNS.iter().chain(self.config.extra_patterns.iter())
    }
}

/// Strips structurally dangerous characters from an identifier.
fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| !"<>{}|\\^`".contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Truncates to exactly `max_len` characters including the ellipsis, so a
/// second sanitization pass leaves the text unchanged.
fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    let mut truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationshipMeta;

    fn schema_with_description(description: &str) -> Schema {
        Schema {
            tables: vec![TableMeta {
                description: Some(description.to_string()),
                ..TableMeta::new("Sales", vec![ColumnMeta::new("Amount", "Decimal", "Sales")])
            }],
            ..Schema::default()
        }
    }

    #[test]
    fn test_clean_schema_passes_strict() {
        let sanitizer = SchemaSanitizer::default();
        let result = sanitizer
            .sanitize(&schema_with_description("Sales fact table"))
            .unwrap();

        assert!(result.violations.is_empty());
        assert_eq!(
            result.schema.tables[0].description.as_deref(),
            Some("Sales fact table")
        );
    }

    #[test]
    fn test_email_in_description_fails_strict() {
        let sanitizer = SchemaSanitizer::default();
        let result = sanitizer.sanitize(&schema_with_description("contact a@b.com"));

        match result {
            Err(DaxGateError::BoundaryViolation { violations }) => {
                assert!(!violations.is_empty());
                assert!(violations[0].message.contains("Sales"));
            }
            other => panic!("expected boundary violation, got {other:?}"),
        }
    }

    #[test]
    fn test_email_in_description_redacted_lax() {
        let sanitizer = SchemaSanitizer::new(BoundaryConfig {
            strict_mode: false,
            ..BoundaryConfig::default()
        });
        let result = sanitizer
            .sanitize(&schema_with_description("contact a@b.com"))
            .unwrap();

        assert_eq!(result.schema.tables[0].description.as_deref(), Some(REDACTED));
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].kind, ViolationKind::LeakPattern);
    }

    #[test]
    fn test_leak_patterns_match_value_shapes() {
        let sanitizer = SchemaSanitizer::default();
        for text in [
            "ssn 123-45-6789",
            "card 4111111111111111",
            "reach me at user@example.org",
            "$1,234.56 in revenue",
            "host 192.168.1.1",
            "select * from sales",
            "EVALUATE VALUES(Customer)",
            "Sample(Sales, 10)",
        ] {
            assert!(
                sanitizer.matches_leak_pattern(text),
                "expected leak match for: {text}"
            );
        }
        assert!(!sanitizer.matches_leak_pattern("Total sales by region"));
    }

    #[test]
    fn test_identifier_stripping() {
        assert_eq!(sanitize_identifier("Sales<script>"), "Salesscript");
        assert_eq!(sanitize_identifier("  Cust|omer  "), "Customer");
        assert_eq!(sanitize_identifier("Normal_Name"), "Normal_Name");
    }

    #[test]
    fn test_long_description_truncated_not_failed() {
        let sanitizer = SchemaSanitizer::default();
        let long = "a".repeat(600);
        let result = sanitizer.sanitize(&schema_with_description(&long)).unwrap();

        let description = result.schema.tables[0].description.as_deref().unwrap();
        assert_eq!(description.chars().count(), 500);
        assert!(description.ends_with("..."));
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_measure_with_select_star_dropped_strict() {
        let sanitizer = SchemaSanitizer::default();
        let schema = Schema {
            measures: vec![MeasureMeta {
                name: "BadMeasure".to_string(),
                expression: "SELECT * FROM x".to_string(),
                table_name: "Sales".to_string(),
                description: None,
                format_string: None,
            }],
            ..Schema::default()
        };

        match sanitizer.sanitize(&schema) {
            Err(DaxGateError::BoundaryViolation { violations }) => {
                assert!(violations.iter().any(|v| v.message.contains("BadMeasure")));
            }
            other => panic!("expected boundary violation, got {other:?}"),
        }
    }

    #[test]
    fn test_measures_excluded_when_disallowed() {
        let sanitizer = SchemaSanitizer::new(BoundaryConfig {
            allow_measures: false,
            ..BoundaryConfig::default()
        });
        let schema = Schema {
            measures: vec![MeasureMeta {
                name: "Total".to_string(),
                expression: "SUM(Sales[Amount])".to_string(),
                table_name: "Sales".to_string(),
                description: None,
                format_string: None,
            }],
            ..Schema::default()
        };

        let result = sanitizer.sanitize(&schema).unwrap();
        assert!(result.schema.measures.is_empty());
    }

    #[test]
    fn test_relationships_pass_through_when_enabled() {
        let sanitizer = SchemaSanitizer::default();
        let schema = Schema {
            relationships: vec![RelationshipMeta {
                from_table: "Sales".to_string(),
                from_column: "CustomerID".to_string(),
                to_table: "Customer".to_string(),
                to_column: "CustomerID".to_string(),
                is_active: true,
                cardinality: "many-to-one".to_string(),
            }],
            ..Schema::default()
        };

        let result = sanitizer.sanitize(&schema).unwrap();
        assert_eq!(result.schema.relationships, schema.relationships);

        let disabled = SchemaSanitizer::new(BoundaryConfig {
            allow_relationships: false,
            ..BoundaryConfig::default()
        });
        let result = disabled.sanitize(&schema).unwrap();
        assert!(result.schema.relationships.is_empty());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let sanitizer = SchemaSanitizer::default();
        let long = format!("Clean description {}", "x".repeat(600));
        let first = sanitizer.sanitize(&schema_with_description(&long)).unwrap();
        let second = sanitizer.sanitize(&first.schema).unwrap();

        assert_eq!(first.schema, second.schema);
        assert!(second.violations.is_empty());
    }

    #[test]
    fn test_extra_patterns_are_scanned() {
        let config = BoundaryConfig {
            strict_mode: false,
            ..BoundaryConfig::default()
        }
        .with_extra_patterns(["internal-code-\\d+"])
        .unwrap();
        let sanitizer = SchemaSanitizer::new(config);

        let result = sanitizer
            .sanitize(&schema_with_description("ref internal-code-42"))
            .unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.schema.tables[0].description.as_deref(), Some(REDACTED));
    }

    #[test]
    fn test_audit_details_shape() {
        let sanitizer = SchemaSanitizer::default();
        let schema = schema_with_description("Sales fact table");
        let result = sanitizer.sanitize(&schema).unwrap();
        let details = sanitizer.audit_details(&result.schema, &result.violations);

        assert_eq!(details["data_included"], json!(false));
        assert_eq!(details["table_count"], json!(1));
        assert_eq!(details["tables"], json!(["Sales"]));
        assert_eq!(details["schema_hash"].as_str().unwrap().len(), 16);
    }
}
