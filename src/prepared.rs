use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, error, trace};

use crate::backend::{RawHandle, ResultHandle, SharedBackend, StatementHandle};
use crate::connection::SessionState;
use crate::error::{DatabaseError, Result, with_backend_detail};
use crate::guard::{LockLevel, OrderedMutex};
use crate::results::ResultSet;
use crate::types::Param;

/// Owner of one backend prepared-statement handle.
///
/// The statement remembers which connection handle it was prepared on and keeps
/// a non-owning reference to that connection's guard. Each call takes the
/// connection guard first and the statement's own guard second, so statement
/// calls are serialized with everything else running on the connection.
///
/// If the connection has been closed or reconnected since `prepare`, the
/// statement is stale: binds fail with [`DatabaseError::BindingFailed`], execution
/// with [`DatabaseError::ExecutionFailed`].
pub struct PreparedStatement {
    backend: SharedBackend,
    session: Weak<OrderedMutex<SessionState>>,
    connection: RawHandle,
    sql: Arc<String>,
    handle: OrderedMutex<Option<StatementHandle>>,
}

impl PreparedStatement {
    pub(crate) fn new(
        backend: SharedBackend,
        session: Weak<OrderedMutex<SessionState>>,
        connection: RawHandle,
        handle: StatementHandle,
        sql: &str,
    ) -> Self {
        trace!(%handle, connection, "prepared statement opened");
        Self {
            backend,
            session,
            connection,
            sql: Arc::new(sql.to_owned()),
            handle: OrderedMutex::new(LockLevel::Child, Some(handle)),
        }
    }

    /// Access the raw SQL string of the prepared statement.
    #[must_use]
    pub fn sql(&self) -> &str {
        self.sql.as_str()
    }

    /// Raw handle of the connection this statement was prepared on.
    #[must_use]
    pub fn connection_handle(&self) -> RawHandle {
        self.connection
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }

    /// Bind an integer to the 1-based parameter `index`.
    ///
    /// # Errors
    /// Returns `DatabaseError::InvalidParameter` for index 0,
    /// `DatabaseError::StatementClosed` after `close`, or
    /// `DatabaseError::BindingFailed` if the backend rejects the value or the
    /// statement's connection is gone.
    pub fn bind_int(&self, index: usize, value: i64) -> Result<()> {
        check_index(index)?;
        self.with_statement(DatabaseError::BindingFailed, |conn, stmt| {
            trace!(index, value, "binding integer parameter");
            let status = self.backend.bind_int_parameter(conn, stmt.raw(), index, value);
            self.check_bind(status, conn, index)
        })
    }

    /// Bind text to the 1-based parameter `index`.
    ///
    /// # Errors
    /// Same as [`PreparedStatement::bind_int`].
    pub fn bind_string(&self, index: usize, value: &str) -> Result<()> {
        check_index(index)?;
        self.with_statement(DatabaseError::BindingFailed, |conn, stmt| {
            trace!(index, len = value.len(), "binding string parameter");
            let status = self
                .backend
                .bind_string_parameter(conn, stmt.raw(), index, value);
            self.check_bind(status, conn, index)
        })
    }

    /// Bind a [`Param`] to the 1-based parameter `index`.
    ///
    /// # Errors
    /// Same as [`PreparedStatement::bind_int`].
    pub fn bind(&self, index: usize, param: &Param) -> Result<()> {
        match param {
            Param::Int(value) => self.bind_int(index, *value),
            Param::Text(value) => self.bind_string(index, value),
        }
    }

    /// Bind `params` to parameters `1..=params.len()`.
    ///
    /// # Errors
    /// Stops at and returns the first binding error.
    pub fn bind_all(&self, params: &[Param]) -> Result<()> {
        for (offset, param) in params.iter().enumerate() {
            self.bind(offset + 1, param)?;
        }
        Ok(())
    }

    /// Execute with the currently bound parameters.
    ///
    /// # Errors
    /// Returns `DatabaseError::StatementClosed` after `close`, or
    /// `DatabaseError::ExecutionFailed` with the backend's last error.
    pub fn execute(&self) -> Result<ResultSet> {
        self.with_statement(DatabaseError::ExecutionFailed, |conn, stmt| {
            debug!(sql = %self.sql, "executing prepared statement");
            let raw = self.backend.execute_prepared(conn, stmt.raw());
            match ResultHandle::from_raw(raw) {
                Some(handle) => Ok(ResultSet::new(Arc::clone(&self.backend), handle)),
                None => {
                    let detail = self.backend.last_error(conn);
                    error!(sql = %self.sql, error = %detail, "prepared statement execution failed");
                    Err(DatabaseError::ExecutionFailed(with_backend_detail(
                        "backend returned no result handle",
                        &detail,
                    )))
                }
            }
        })
    }

    /// Release the backend statement. Further calls are no-ops.
    pub fn close(&self) {
        let session = self.session.upgrade();
        let parent = session.as_ref().map(|s| s.lock());
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        if parent.as_ref().is_some_and(|p| p.holds(self.connection)) {
            trace!(%handle, "closing prepared statement");
            self.backend.close_prepared(self.connection, handle.raw());
        } else {
            // The backend dropped the statement together with its session.
            debug!(%handle, "connection already closed; statement released with it");
        }
    }

    /// Run `op` holding the connection guard, then the statement guard.
    fn with_statement<R>(
        &self,
        stale: fn(String) -> DatabaseError,
        op: impl FnOnce(RawHandle, &StatementHandle) -> Result<R>,
    ) -> Result<R> {
        let session = self.session.upgrade();
        let parent = session.as_ref().map(|s| s.lock());
        let guard = self.handle.lock();
        let stmt = guard.as_ref().ok_or(DatabaseError::StatementClosed)?;

        if !parent.as_ref().is_some_and(|p| p.holds(self.connection)) {
            return Err(stale(format!(
                "statement was prepared on connection handle {} which is no longer open",
                self.connection
            )));
        }
        op(self.connection, stmt)
    }

    fn check_bind(&self, status: i32, conn: RawHandle, index: usize) -> Result<()> {
        if status > 0 {
            return Ok(());
        }
        let detail = self.backend.last_error(conn);
        error!(index, error = %detail, "parameter binding failed");
        Err(DatabaseError::BindingFailed(with_backend_detail(
            &format!("backend rejected parameter {index}"),
            &detail,
        )))
    }
}

fn check_index(index: usize) -> Result<()> {
    if index < 1 {
        return Err(DatabaseError::InvalidParameter(
            "parameter index must be >= 1".into(),
        ));
    }
    Ok(())
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            debug!(sql = %self.sql, "prepared statement released by drop");
            self.close();
        }
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("connection", &self.connection)
            .field("handle", &*self.handle.lock())
            .finish_non_exhaustive()
    }
}
