use tracing::{debug, warn};

use super::Connection;
use crate::backend::RawHandle;
use crate::error::{DatabaseError, Result};

impl Connection {
    /// Run `statements` in order inside one `BEGIN`/`COMMIT` transaction.
    ///
    /// Returns the total rows affected. If any step fails (including `BEGIN` and
    /// `COMMIT`) the remaining statements are skipped and `ROLLBACK` is issued. A
    /// failed rollback is logged; the error returned is always the original one.
    /// An empty batch returns 0 without opening a transaction.
    ///
    /// # Errors
    /// Returns `DatabaseError::NotConnected`/`DatabaseError::ConnectionLost` if the
    /// connection is unusable, otherwise `DatabaseError::TransactionFailed` with the
    /// failing step's error as its source.
    pub fn execute_batch<S: AsRef<str>>(&self, statements: &[S]) -> Result<u64> {
        let mut session = self.session.lock();
        let conn = self.validate_locked(&mut session)?;
        if statements.is_empty() {
            return Ok(0);
        }

        debug!(statements = statements.len(), "executing batch");
        match self.run_transaction(conn, statements) {
            Ok(total) => Ok(total),
            Err((message, cause)) => {
                warn!(reason = %message, error = %cause, "batch failed; rolling back");
                self.rollback_best_effort(conn);
                Err(DatabaseError::transaction(message, cause))
            }
        }
    }

    fn run_transaction<S: AsRef<str>>(
        &self,
        conn: RawHandle,
        statements: &[S],
    ) -> std::result::Result<u64, (String, DatabaseError)> {
        self.execute_locked(conn, "BEGIN")
            .map_err(|e| ("failed to begin transaction".to_string(), e))?;

        let mut total: u64 = 0;
        for (idx, sql) in statements.iter().enumerate() {
            let affected = self.execute_locked(conn, sql.as_ref()).map_err(|e| {
                (
                    format!("statement {} of {} failed", idx + 1, statements.len()),
                    e,
                )
            })?;
            total = total.saturating_add(affected);
        }

        self.execute_locked(conn, "COMMIT")
            .map_err(|e| ("failed to commit transaction".to_string(), e))?;
        Ok(total)
    }

    fn rollback_best_effort(&self, conn: RawHandle) {
        if self.backend.execute_non_query(conn, "ROLLBACK") < 0 {
            let detail = self.backend.last_error(conn);
            warn!(error = %detail, "rollback failed");
        } else {
            debug!("transaction rolled back");
        }
    }
}
