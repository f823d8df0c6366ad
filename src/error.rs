use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by connections, result sets and prepared statements.
///
/// Backend failure signals (non-positive handles, negative row counts, zero status
/// codes) are translated into one of these variants at the wrapper boundary, with
/// the backend's last-error text attached where one is available.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Transaction failed: {message}")]
    TransactionFailed {
        message: String,
        #[source]
        source: Box<DatabaseError>,
    },

    #[error("Statement preparation failed: {0}")]
    PreparationFailed(String),

    #[error("Parameter binding failed: {0}")]
    BindingFailed(String),

    #[error("Index out of bounds: row {row}, column {column} (result has {rows} rows, {columns} columns)")]
    IndexOutOfBounds {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Result set is closed")]
    ResultSetClosed,

    #[error("Prepared statement is closed")]
    StatementClosed,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl DatabaseError {
    pub(crate) fn not_connected() -> Self {
        DatabaseError::NotConnected("connect() has not succeeded on this connection".into())
    }

    pub(crate) fn transaction(message: impl Into<String>, source: DatabaseError) -> Self {
        DatabaseError::TransactionFailed {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Attach backend diagnostic text to a fallback description.
pub(crate) fn with_backend_detail(context: &str, last_error: &str) -> String {
    if last_error.is_empty() {
        context.to_string()
    } else {
        format!("{context}: {last_error}")
    }
}
