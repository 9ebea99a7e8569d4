//! Query Result - typed rows and columns returned by the gateway

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row; arity always equals the owning table's column count.
pub type Row = Vec<Value>;

/// Rows plus the statement's column names. Zero rows is a valid table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Name-keyed view of every row, in row order.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    /// The statement produced column metadata.
    Table(Table),
    /// No metadata: either a failure or a statement that yields no rows.
    NoMetadata { failure: Option<GatewayError> },
}

impl QueryResult {
    pub fn failed(err: GatewayError) -> Self {
        Self::NoMetadata { failure: Some(err) }
    }

    pub fn column_names(&self) -> Option<&[String]> {
        match self {
            Self::Table(table) => Some(&table.columns),
            Self::NoMetadata { .. } => None,
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Table(table) => &table.rows,
            Self::NoMetadata { .. } => &[],
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            Self::NoMetadata { .. } => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(table) => Some(table),
            Self::NoMetadata { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&GatewayError> {
        match self {
            Self::NoMetadata { failure } => failure.as_ref(),
            Self::Table(_) => None,
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.rows().is_empty()
    }

    /// One-line digest of the result, used to ground the summary prompt.
    pub fn digest(&self) -> String {
        match self {
            Self::Table(table) if !table.is_empty() => {
                let mut digest = format!("The query returned a table with {} rows", table.row_count());
                if table.columns.is_empty() {
                    digest.push('.');
                } else {
                    digest.push_str(&format!(" and columns: {}.", table.columns.join(", ")));
                }
                digest
            }
            Self::Table(table) => format!(
                "The query executed successfully and the table has columns: {}, but it returned no data.",
                table.columns.join(", ")
            ),
            Self::NoMetadata { .. } => {
                "The query did not return any data or schema from the database.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bills() -> Table {
        Table {
            columns: vec!["id".into(), "title".into()],
            rows: vec![vec![json!(1), json!("Budget 2023")], vec![json!(2), Value::Null]],
        }
    }

    #[test]
    fn test_records_are_name_keyed() {
        let records = bills().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], json!("Budget 2023"));
        assert_eq!(records[1]["title"], Value::Null);
    }

    #[test]
    fn test_empty_table_keeps_columns() {
        let result = QueryResult::Table(Table::new(vec!["id".into()]));
        assert_eq!(result.column_names(), Some(&["id".to_string()][..]));
        assert!(result.rows().is_empty());
        assert!(result.failure().is_none());
        assert!(result.digest().contains("returned no data"));
    }

    #[test]
    fn test_failed_result_has_no_columns() {
        let result = QueryResult::failed(GatewayError::query_failed("no such table: x", "SELECT * FROM x"));
        assert!(result.column_names().is_none());
        assert!(result.failure().is_some());
        assert!(!result.has_rows());
        assert!(result.digest().contains("did not return any data"));
    }

    #[test]
    fn test_digest_lists_columns() {
        let digest = QueryResult::Table(bills()).digest();
        assert_eq!(digest, "The query returned a table with 2 rows and columns: id, title.");
    }
}
