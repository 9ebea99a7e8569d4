//! SQLite gateway - one lazily opened connection shared by every conversation
//!
//! Nothing that goes wrong inside SQLite crosses this boundary as a panic or an
//! error type the orchestrator has to know about: reads come back as a
//! [`QueryResult`], writes as `Result<usize, GatewayError>`.

use super::result::{QueryResult, Row, Table};
use super::DataGateway;
use crate::error::GatewayError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    Memory,
}

pub struct SqliteGateway {
    target: Target,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl SqliteGateway {
    const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

    /// Gateway over an existing database file. The file is opened on first use.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            target: Target::File(path.as_ref().to_path_buf()),
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    /// Private in-memory database, kept alive for the gateway's lifetime.
    pub fn in_memory() -> Self {
        Self {
            target: Target::Memory,
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    fn connect(&self) -> Result<Connection, GatewayError> {
        let conn = match &self.target {
            Target::File(path) => {
                // Never create the file: a missing database is an outage, not an empty store.
                if !path.exists() {
                    return Err(GatewayError::ConnectionUnavailable(format!(
                        "database file '{}' not found",
                        path.display()
                    )));
                }
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                Connection::open_with_flags(path, flags)
            }
            Target::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| GatewayError::ConnectionUnavailable(format!("SQLite error connecting to database: {}", e)))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .and_then(|_| conn.busy_timeout(self.busy_timeout))
            .map_err(|e| GatewayError::ConnectionUnavailable(format!("SQLite error configuring connection: {}", e)))?;

        info!(db = ?self.target, "opened database connection");
        Ok(conn)
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> T,
    ) -> Result<T, GatewayError> {
        // A panic in another caller must not take the shared connection down with it.
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        match guard.as_mut() {
            Some(conn) => Ok(f(conn)),
            None => Err(GatewayError::ConnectionUnavailable("connection was not initialised".into())),
        }
    }

    fn select(conn: &Connection, sql: &str) -> Result<QueryResult, GatewayError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| GatewayError::query_failed(e, sql))?;

        if !stmt.readonly() {
            return Err(GatewayError::query_failed(
                "only read-only statements can be run on the query path",
                sql,
            ));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        if columns.is_empty() {
            return Ok(QueryResult::NoMetadata { failure: None });
        }

        let mut table = Table::new(columns);
        let mut rows = stmt.query([]).map_err(|e| GatewayError::query_failed(e, sql))?;
        while let Some(row) = rows.next().map_err(|e| GatewayError::query_failed(e, sql))? {
            let mut values: Row = Vec::with_capacity(table.columns.len());
            for idx in 0..table.columns.len() {
                let value = row.get_ref(idx).map_err(|e| GatewayError::query_failed(e, sql))?;
                values.push(to_json(value));
            }
            table.rows.push(values);
        }
        Ok(QueryResult::Table(table))
    }
}

impl DataGateway for SqliteGateway {
    fn run(&self, sql: &str) -> QueryResult {
        let sql = sql.trim();
        if sql.is_empty() {
            return QueryResult::failed(GatewayError::query_failed("empty statement", sql));
        }
        debug!(sql = %excerpt(sql), "running query");

        match self.with_connection(|conn| Self::select(conn, sql)) {
            Ok(Ok(result)) => {
                debug!(rows = result.rows().len(), "query finished");
                result
            }
            Ok(Err(err)) | Err(err) => {
                warn!(error = %err, "query failed");
                QueryResult::failed(err)
            }
        }
    }

    fn execute(&self, sql: &str) -> Result<usize, GatewayError> {
        debug!(sql = %excerpt(sql), "executing statement");
        let outcome = self.with_connection(|conn| -> Result<usize, GatewayError> {
            let tx = conn
                .transaction()
                .map_err(|e| GatewayError::query_failed(e, sql))?;
            // Dropping `tx` on the error path rolls the statement back.
            let affected = tx
                .execute(sql, [])
                .map_err(|e| GatewayError::query_failed(e, sql))?;
            tx.commit().map_err(|e| GatewayError::query_failed(e, sql))?;
            Ok(affected)
        })?;

        if let Err(err) = &outcome {
            warn!(error = %err, "modification rolled back");
        }
        outcome
    }
}

fn excerpt(sql: &str) -> String {
    sql.chars().take(GatewayError::QUERY_EXCERPT_CHARS).collect()
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> SqliteGateway {
        let gateway = SqliteGateway::in_memory();
        gateway
            .execute("CREATE TABLE bills (id INTEGER PRIMARY KEY, title TEXT, amount REAL)")
            .unwrap();
        gateway
            .execute("INSERT INTO bills (title, amount) VALUES ('Budget', 1.5), ('Pensions', NULL)")
            .unwrap();
        gateway
    }

    #[test]
    fn test_select_returns_typed_rows() {
        let gateway = seeded();
        let result = gateway.run("SELECT id, title, amount FROM bills ORDER BY id");
        let table = result.table().expect("table");
        assert_eq!(table.columns, vec!["id", "title", "amount"]);
        assert_eq!(table.rows[0], vec![json!(1), json!("Budget"), json!(1.5)]);
        assert_eq!(table.rows[1][2], Value::Null);
    }

    #[test]
    fn test_empty_table_still_reports_columns() {
        let gateway = SqliteGateway::in_memory();
        gateway.execute("CREATE TABLE laws (id INTEGER, year INTEGER)").unwrap();
        let result = gateway.run("SELECT * FROM laws");
        assert_eq!(result.column_names(), Some(&["id".to_string(), "year".to_string()][..]));
        assert!(result.rows().is_empty());
        assert!(result.failure().is_none());
    }

    #[test]
    fn test_missing_table_is_reported_not_raised() {
        let gateway = SqliteGateway::in_memory();
        let result = gateway.run("SELECT * FROM nowhere");
        assert!(result.column_names().is_none());
        match result.failure() {
            Some(GatewayError::QueryExecutionFailed { reason, query }) => {
                assert!(reason.contains("nowhere"));
                assert_eq!(query, "SELECT * FROM nowhere");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_run_refuses_writes() {
        let gateway = seeded();
        let result = gateway.run("DELETE FROM bills");
        assert!(matches!(result.failure(), Some(GatewayError::QueryExecutionFailed { .. })));
        assert_eq!(gateway.run("SELECT COUNT(*) FROM bills").rows()[0][0], json!(2));
    }

    #[test]
    fn test_missing_file_is_connection_unavailable() {
        let gateway = SqliteGateway::open("/definitely/not/here/001_sqlite.db");
        let result = gateway.run("SELECT 1");
        assert!(result.column_names().is_none());
        assert!(matches!(result.failure(), Some(GatewayError::ConnectionUnavailable(_))));
        assert!(matches!(
            gateway.execute("DELETE FROM bills"),
            Err(GatewayError::ConnectionUnavailable(_))
        ));
    }

    #[test]
    fn test_failed_execute_leaves_no_partial_effects() {
        let gateway = seeded();
        gateway
            .execute("CREATE TABLE uniq (v INTEGER UNIQUE)")
            .unwrap();
        gateway.execute("INSERT INTO uniq VALUES (1)").unwrap();
        // Second row violates the constraint; the first must not survive either.
        let err = gateway.execute("INSERT INTO uniq VALUES (2), (1)").unwrap_err();
        assert!(matches!(err, GatewayError::QueryExecutionFailed { .. }));
        assert_eq!(gateway.run("SELECT COUNT(*) FROM uniq").rows()[0][0], json!(1));
    }

    #[test]
    fn test_execute_reports_rows_affected() {
        let gateway = seeded();
        let affected = gateway
            .execute("UPDATE bills SET amount = 0 WHERE amount IS NULL")
            .unwrap();
        assert_eq!(affected, 1);
    }
}
