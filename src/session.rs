use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::SharedBackend;
use crate::config::ConnectionOptions;
use crate::connection::Connection;
use crate::error::Result;
use crate::types::Param;

/// Connected convenience wrapper that never hands out backend resources.
///
/// Results come back as column-name maps and every result or statement handle
/// is released before the call returns.
#[derive(Debug, Clone)]
pub struct Session {
    connection: Arc<Connection>,
}

impl Session {
    /// Create a connection and connect it.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` once every attempt has failed.
    pub fn open(options: ConnectionOptions, backend: SharedBackend) -> Result<Self> {
        let connection = Connection::new(options, backend);
        connection.connect()?;
        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// The shared connection, for work the session does not cover.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Run a query and return every row as a column-name map.
    ///
    /// # Errors
    /// See [`Connection::query`].
    pub fn fetch_all(&self, sql: &str) -> Result<Vec<HashMap<String, String>>> {
        let result = self.connection.query(sql)?;
        let rows = result.to_array();
        result.close();
        Ok(rows)
    }

    /// Prepare `sql`, bind `params` to `?1..`, execute and return the rows.
    ///
    /// # Errors
    /// Any preparation, binding or execution error; the statement is released
    /// either way.
    pub fn fetch_prepared(
        &self,
        sql: &str,
        params: &[Param],
    ) -> Result<Vec<HashMap<String, String>>> {
        let stmt = self.connection.prepare(sql)?;
        let outcome = stmt.bind_all(params).and_then(|()| stmt.execute());
        stmt.close();

        let result = outcome?;
        let rows = result.to_array();
        result.close();
        debug!(sql, rows = rows.len(), "prepared fetch complete");
        Ok(rows)
    }

    /// # Errors
    /// See [`Connection::execute_batch`].
    pub fn run_in_transaction<S: AsRef<str>>(&self, statements: &[S]) -> Result<u64> {
        self.connection.execute_batch(statements)
    }

    /// # Errors
    /// See [`Connection::execute`].
    pub fn execute(&self, sql: &str) -> Result<u64> {
        self.connection.execute(sql)
    }

    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffStrategy;
    use crate::error::DatabaseError;
    use crate::test_utils::FakeBackend;

    fn open(backend: &Arc<FakeBackend>) -> Result<Session> {
        let opts = ConnectionOptions::builder("fake://db")
            .max_retries(1)
            .backoff(BackoffStrategy::None)
            .finish();
        Session::open(opts, Arc::clone(backend) as SharedBackend)
    }

    #[test]
    fn fetches_release_their_resources() {
        let backend = Arc::new(FakeBackend::new());
        let session = open(&backend).expect("open");

        let rows = session.fetch_all("SELECT * FROM users").expect("rows");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["username"], "charlie");

        let rows = session
            .fetch_prepared("SELECT * FROM users WHERE id = ?", &[Param::from(1)])
            .expect("prepared");
        assert_eq!(rows.len(), 3);
        assert_eq!(backend.live_results(), 0);
        assert_eq!(backend.live_statements(), 0);
    }

    #[test]
    fn failed_bind_still_closes_statement() {
        let backend = Arc::new(FakeBackend::new());
        let session = open(&backend).expect("open");
        backend.reject_binds(true);

        let err = session
            .fetch_prepared("SELECT 1", &[Param::from("x")])
            .expect_err("bind fails");
        assert!(matches!(err, DatabaseError::BindingFailed(_)));
        assert_eq!(backend.closed_statements(), 1);
    }

    #[test]
    fn open_fails_when_backend_refuses() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_next_connects(1);
        assert!(matches!(open(&backend), Err(DatabaseError::ConnectionFailed(_))));
    }
}
