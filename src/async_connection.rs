//! Async facade over [`Connection`].
//!
//! Backends block, so every call runs on tokio's blocking pool. The connection's
//! own guard still serializes the calls; awaiting here only frees the async
//! worker thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backend::SharedBackend;
use crate::config::ConnectionOptions;
use crate::connection::Connection;
use crate::error::{DatabaseError, Result};
use crate::prepared::PreparedStatement;
use crate::results::{ResultSet, Row};

/// Cloneable async handle to a shared [`Connection`].
#[derive(Clone)]
pub struct AsyncConnection {
    inner: Arc<Connection>,
    deadline: Option<Duration>,
}

impl AsyncConnection {
    #[must_use]
    pub fn new(options: ConnectionOptions, backend: SharedBackend) -> Self {
        Self::from_shared(Arc::new(Connection::new(options, backend)))
    }

    /// Wrap a connection that may also be used synchronously elsewhere.
    #[must_use]
    pub fn from_shared(inner: Arc<Connection>) -> Self {
        Self {
            inner,
            deadline: None,
        }
    }

    /// The underlying blocking connection.
    #[must_use]
    pub fn blocking(&self) -> &Arc<Connection> {
        &self.inner
    }

    /// A view of the same connection whose calls give up after `limit`.
    ///
    /// On expiry the caller gets `DatabaseError::Timeout`; the backend call
    /// already in flight still runs to completion and its result is dropped.
    #[must_use]
    pub fn with_deadline(&self, limit: Duration) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            deadline: Some(limit),
        }
    }

    /// # Errors
    /// See [`Connection::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.run_blocking(DatabaseError::ConnectionFailed, Connection::connect)
            .await
    }

    /// # Errors
    /// See [`Connection::query`].
    pub async fn query(&self, sql: impl Into<String>) -> Result<ResultSet> {
        let sql = sql.into();
        self.run_blocking(DatabaseError::QueryFailed, move |conn| conn.query(&sql))
            .await
    }

    /// Run a query and return its rows, releasing the result immediately.
    ///
    /// # Errors
    /// See [`Connection::query`].
    pub async fn fetch_rows(&self, sql: impl Into<String>) -> Result<Vec<Row>> {
        let sql = sql.into();
        self.run_blocking(DatabaseError::QueryFailed, move |conn| {
            let result = conn.query(&sql)?;
            let rows = result.rows();
            result.close();
            Ok(rows)
        })
        .await
    }

    /// # Errors
    /// See [`Connection::execute`].
    pub async fn execute(&self, sql: impl Into<String>) -> Result<u64> {
        let sql = sql.into();
        self.run_blocking(DatabaseError::ExecutionFailed, move |conn| {
            conn.execute(&sql)
        })
        .await
    }

    /// # Errors
    /// See [`Connection::execute_batch`].
    pub async fn execute_batch(&self, statements: Vec<String>) -> Result<u64> {
        self.run_blocking(
            |msg| {
                DatabaseError::transaction("batch task failed", DatabaseError::ExecutionFailed(msg))
            },
            move |conn| conn.execute_batch(statements.as_slice()),
        )
        .await
    }

    /// # Errors
    /// See [`Connection::prepare`].
    pub async fn prepare(&self, sql: impl Into<String>) -> Result<PreparedStatement> {
        let sql = sql.into();
        self.run_blocking(DatabaseError::PreparationFailed, move |conn| {
            conn.prepare(&sql)
        })
        .await
    }

    /// # Errors
    /// Only `DatabaseError::Timeout` under a deadline; closing itself cannot fail.
    pub async fn close(&self) -> Result<()> {
        self.run_blocking(DatabaseError::ConnectionLost, |conn| {
            conn.close();
            Ok(())
        })
        .await
    }

    async fn run_blocking<F, R>(
        &self,
        failure: fn(String) -> DatabaseError,
        func: F,
    ) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || func(conn.as_ref()));
        let joined = match self.deadline {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                warn!(?limit, "database call exceeded its deadline");
                DatabaseError::Timeout(limit)
            })?,
            None => task.await,
        };
        joined.map_err(|e| failure(format!("blocking task failed: {e}")))?
    }
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("inner", &self.inner)
            .field("deadline", &self.deadline)
            .finish()
    }
}
