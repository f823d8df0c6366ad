use std::sync::Arc;

use tracing::{debug, error};

use super::Connection;
use crate::backend::ResultHandle;
use crate::error::{DatabaseError, Result, with_backend_detail};
use crate::results::ResultSet;

impl Connection {
    /// Run a query and take ownership of its backend result.
    ///
    /// # Errors
    /// Returns `DatabaseError::NotConnected` before a successful `connect`,
    /// `DatabaseError::ConnectionLost` if the handle went stale and could not be
    /// replaced, or `DatabaseError::QueryFailed` with the backend's last error.
    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        let mut session = self.session.lock();
        let conn = self.validate_locked(&mut session)?;

        debug!(sql, "executing query");
        let raw = self.backend.execute_query(conn, sql);
        match ResultHandle::from_raw(raw) {
            Some(handle) => Ok(ResultSet::new(Arc::clone(&self.backend), handle)),
            None => {
                let detail = self.backend.last_error(conn);
                error!(sql, error = %detail, "query failed");
                Err(DatabaseError::QueryFailed(with_backend_detail(
                    "backend returned no result handle",
                    &detail,
                )))
            }
        }
    }
}
