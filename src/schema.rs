//! Schema Descriptor - turns `table_metadata` rows into model grounding context
//!
//! Records are grouped by table in first-seen order, and columns keep their
//! input order inside a table. Nothing here sorts.

use crate::db::{DataGateway, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const METADATA_QUERY: &str = "SELECT * FROM table_metadata;";

pub const FALLBACK_SCHEMA: &str = "Default schema information: The system can access general data. \
(Could not fetch schema from 'table_metadata' or it is empty).";

pub const UNFORMATTABLE_SCHEMA: &str = "Default schema information: The system can access general data. \
('table_metadata' was found but its content could not be formatted into a descriptive string).";

const NO_DESCRIPTION: &str = "No description";

/// One describable column from the metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub table_name: Option<String>,
    #[serde(alias = "name")]
    pub column_name: Option<String>,
    pub description: Option<String>,
}

impl SchemaRecord {
    pub fn new(table: &str, column: &str, description: Option<&str>) -> Self {
        Self {
            table_name: Some(table.to_string()),
            column_name: Some(column.to_string()),
            description: description.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescribeMode {
    #[default]
    Text,
    Structured,
}

/// The flat record list as handed to a model that reads semi-structured input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSchema {
    pub tables: Vec<SchemaRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDescription {
    Text(String),
    Structured(StructuredSchema),
}

impl SchemaDescription {
    /// Prompt-ready rendering of either form.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(schema) => {
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{\"tables\": []}".to_string())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(schema) => schema.tables.is_empty(),
        }
    }
}

pub fn describe(records: &[SchemaRecord], mode: DescribeMode) -> SchemaDescription {
    match mode {
        DescribeMode::Text => SchemaDescription::Text(describe_text(records)),
        DescribeMode::Structured => SchemaDescription::Structured(StructuredSchema {
            tables: records.to_vec(),
        }),
    }
}

/// `Table <name>:` headers followed by indented `<column> (<description>)` lines.
pub fn describe_text(records: &[SchemaRecord]) -> String {
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let table = record.table_name.as_deref().filter(|t| !t.is_empty());
        let column = record.column_name.as_deref().filter(|c| !c.is_empty());
        let (Some(table), Some(column)) = (table, column) else {
            debug!(record = idx, "skipping schema record without table or column name");
            continue;
        };

        let line = format!(
            "{} ({})",
            column,
            record.description.as_deref().unwrap_or(NO_DESCRIPTION)
        );
        match groups.iter_mut().find(|(name, _)| *name == table) {
            Some((_, lines)) => lines.push(line),
            None => groups.push((table, vec![line])),
        }
    }

    groups
        .into_iter()
        .map(|(table, lines)| {
            let columns: Vec<String> = lines.into_iter().map(|l| format!("  {}", l)).collect();
            format!("Table {}:\n{}", table, columns.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads `table_metadata` through the gateway. A missing or broken table is
/// logged and yields no records.
pub fn load_schema_records(gateway: &dyn DataGateway) -> Vec<SchemaRecord> {
    let result = gateway.run(METADATA_QUERY);
    if let Some(failure) = result.failure() {
        warn!(error = %failure, "could not read table_metadata");
    }
    records_from_result(&result)
}

pub fn records_from_result(result: &QueryResult) -> Vec<SchemaRecord> {
    let Some(table) = result.table() else {
        return Vec::new();
    };
    let table_idx = table.column_index("table_name");
    let column_idx = table.column_index("name").or_else(|| table.column_index("column_name"));
    let description_idx = table.column_index("description");

    let cell = |row: &[Value], idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(text_of);

    table
        .rows
        .iter()
        .map(|row| SchemaRecord {
            table_name: cell(row.as_slice(), table_idx),
            column_name: cell(row.as_slice(), column_idx),
            description: cell(row.as_slice(), description_idx),
        })
        .collect()
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Grounding context for a generation call, with the generic fallbacks when
/// the metadata is missing, empty or entirely undescribable.
pub fn schema_context(gateway: &dyn DataGateway, mode: DescribeMode) -> String {
    let records = load_schema_records(gateway);
    if records.is_empty() {
        return FALLBACK_SCHEMA.to_string();
    }
    if describe_text(&records).is_empty() {
        return UNFORMATTABLE_SCHEMA.to_string();
    }
    describe(&records, mode).render()
}
