//! Handle lifecycle and thread-safety layer over opaque, handle-based database
//! backends.
//!
//! A [`Backend`] speaks in raw integer handles and status codes. This crate wraps
//! those handles in owned types that release them exactly once, serializes every
//! call made against a connection, retries connects with configurable backoff,
//! repairs stale connections, and runs statement batches atomically.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sql_handle_middleware::prelude::*;
//! use sql_handle_middleware::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), DatabaseError> {
//! let conn = ConnectionOptions::builder(":memory:")
//!     .max_retries(2)
//!     .connect(Arc::new(SqliteBackend::new()))?;
//! conn.execute("CREATE TABLE t (id INTEGER, name TEXT)")?;
//! conn.execute_batch(&["INSERT INTO t VALUES (1, 'a')", "INSERT INTO t VALUES (2, 'b')"])?;
//! let rows = conn.query("SELECT name FROM t ORDER BY id")?;
//! assert_eq!(rows.get_value(1, 0)?, "b");
//! # Ok(())
//! # }
//! ```

pub mod async_connection;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
mod guard;
pub mod prelude;
pub mod prepared;
pub mod registry;
pub mod results;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use async_connection::AsyncConnection;
pub use backend::{
    Backend, ConnectionHandle, RawHandle, ResultHandle, SharedBackend, StatementHandle,
};
pub use config::{BackoffStrategy, ConnectionOptions, ConnectionOptionsBuilder, RetryPolicy};
pub use connection::Connection;
pub use error::{DatabaseError, Result};
pub use prepared::PreparedStatement;
pub use registry::HandleRegistry;
pub use results::{ResultSet, Row};
pub use retry::{Clock, ConnectAttempt, Connector, SystemClock};
pub use session::Session;
pub use types::{ConnectionState, Param};
