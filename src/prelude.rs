//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::async_connection::AsyncConnection;
pub use crate::backend::{Backend, RawHandle, SharedBackend};
pub use crate::config::{BackoffStrategy, ConnectionOptions, RetryPolicy};
pub use crate::connection::Connection;
pub use crate::error::DatabaseError;
pub use crate::prepared::PreparedStatement;
pub use crate::results::{ResultSet, Row};
pub use crate::session::Session;
pub use crate::types::{ConnectionState, Param};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteBackend;
