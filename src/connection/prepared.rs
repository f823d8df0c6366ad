use std::sync::Arc;

use tracing::{debug, error};

use super::Connection;
use crate::backend::StatementHandle;
use crate::error::{DatabaseError, Result, with_backend_detail};
use crate::prepared::PreparedStatement;

impl Connection {
    /// Prepare a statement for repeated execution.
    ///
    /// The statement is tied to the current connection handle. If the connection is
    /// later closed or replaced by a reconnect, the statement stops working and
    /// must be prepared again.
    ///
    /// # Errors
    /// Returns `DatabaseError::NotConnected` before a successful `connect`,
    /// `DatabaseError::ConnectionLost` if the handle could not be repaired, or
    /// `DatabaseError::PreparationFailed` with the backend's last error.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        let mut session = self.session.lock();
        let conn = self.validate_locked(&mut session)?;

        debug!(sql, "preparing statement");
        let raw = self.backend.prepare_statement(conn, sql);
        let Some(handle) = StatementHandle::from_raw(raw) else {
            let detail = self.backend.last_error(conn);
            error!(sql, error = %detail, "statement preparation failed");
            return Err(DatabaseError::PreparationFailed(with_backend_detail(
                "backend returned no statement handle",
                &detail,
            )));
        };

        Ok(PreparedStatement::new(
            Arc::clone(&self.backend),
            Arc::downgrade(&self.session),
            conn,
            handle,
            sql,
        ))
    }
}
