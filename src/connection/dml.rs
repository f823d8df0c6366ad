use tracing::{debug, error};

use super::Connection;
use crate::backend::RawHandle;
use crate::error::{DatabaseError, Result, with_backend_detail};

impl Connection {
    /// Run a statement that returns no rows (INSERT/UPDATE/DELETE/DDL).
    ///
    /// # Errors
    /// Returns `DatabaseError::NotConnected` before a successful `connect`,
    /// `DatabaseError::ConnectionLost` if the handle could not be repaired, or
    /// `DatabaseError::ExecutionFailed` with the backend's last error.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        let mut session = self.session.lock();
        let conn = self.validate_locked(&mut session)?;
        self.execute_locked(conn, sql)
    }

    /// Caller holds the connection guard.
    pub(super) fn execute_locked(&self, conn: RawHandle, sql: &str) -> Result<u64> {
        debug!(sql, "executing statement");
        let affected = self.backend.execute_non_query(conn, sql);
        u64::try_from(affected).map_err(|_| {
            let detail = self.backend.last_error(conn);
            error!(sql, error = %detail, "statement failed");
            DatabaseError::ExecutionFailed(with_backend_detail(
                &format!("backend reported {affected} rows affected"),
                &detail,
            ))
        })
    }
}
