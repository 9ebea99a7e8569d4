//! Data access for the conversational query path
//!
//! The relational store is reached only through [`DataGateway`]; the SQLite
//! implementation lives in [`gateway`].

pub mod gateway;
pub mod result;

pub use gateway::SqliteGateway;
pub use result::{QueryResult, Row, Table};

use crate::error::GatewayError;

/// Read/write access to the relational store.
///
/// Implementations catch every storage fault themselves; `run` never fails,
/// it describes failures inside the returned [`QueryResult`].
pub trait DataGateway: Send + Sync {
    /// Run one read-only statement.
    fn run(&self, sql: &str) -> QueryResult;

    /// Run one modifying statement, committing on success and rolling back on
    /// failure. Returns the number of rows affected.
    fn execute(&self, sql: &str) -> Result<usize, GatewayError>;
}
