use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::row::{Row, index_columns};
use crate::backend::{ResultHandle, SharedBackend};
use crate::error::{DatabaseError, Result};
use crate::guard::{LockLevel, OrderedMutex};

/// Owner of one backend result handle.
///
/// Reads go straight to the backend under this result's own guard. Once closed
/// (explicitly or by `Drop`) the handle is never passed to the backend again:
/// counts read as zero, collections read as empty and [`ResultSet::get_value`]
/// fails with [`DatabaseError::ResultSetClosed`].
pub struct ResultSet {
    backend: SharedBackend,
    handle: OrderedMutex<Option<ResultHandle>>,
}

impl ResultSet {
    pub(crate) fn new(backend: SharedBackend, handle: ResultHandle) -> Self {
        trace!(%handle, "result set opened");
        Self {
            backend,
            handle: OrderedMutex::new(LockLevel::Child, Some(handle)),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }

    /// Number of rows, or 0 once closed.
    #[must_use]
    pub fn row_count(&self) -> usize {
        let guard = self.handle.lock();
        guard
            .as_ref()
            .map_or(0, |h| clamp_count(self.backend.row_count(h.raw())))
    }

    /// Number of columns, or 0 once closed.
    #[must_use]
    pub fn column_count(&self) -> usize {
        let guard = self.handle.lock();
        guard
            .as_ref()
            .map_or(0, |h| clamp_count(self.backend.column_count(h.raw())))
    }

    /// Read one value by zero-based position.
    ///
    /// # Errors
    /// Returns `DatabaseError::ResultSetClosed` after `close`, or
    /// `DatabaseError::IndexOutOfBounds` when `row`/`column` fall outside the result.
    pub fn get_value(&self, row: usize, column: usize) -> Result<String> {
        let guard = self.handle.lock();
        let handle = guard.as_ref().ok_or(DatabaseError::ResultSetClosed)?;
        let rows = clamp_count(self.backend.row_count(handle.raw()));
        let columns = clamp_count(self.backend.column_count(handle.raw()));
        if row >= rows || column >= columns {
            return Err(DatabaseError::IndexOutOfBounds {
                row,
                column,
                rows,
                columns,
            });
        }
        Ok(self.backend.value(handle.raw(), row, column))
    }

    /// Column names in order, or empty once closed.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let guard = self.handle.lock();
        match guard.as_ref() {
            Some(handle) => self.read_columns(handle),
            None => Vec::new(),
        }
    }

    /// Copy every row out of the backend, or nothing once closed.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        let guard = self.handle.lock();
        let Some(handle) = guard.as_ref() else {
            return Vec::new();
        };
        let column_names = Arc::new(self.read_columns(handle));
        let cache = Arc::new(index_columns(&column_names));
        let row_count = clamp_count(self.backend.row_count(handle.raw()));

        let mut rows = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let values = (0..column_names.len())
                .map(|column| self.backend.value(handle.raw(), row, column))
                .collect();
            rows.push(Row::with_cache(
                Arc::clone(&column_names),
                Arc::clone(&cache),
                values,
            ));
        }
        rows
    }

    /// One map per row keyed by column name; with duplicate names the last column wins.
    #[must_use]
    pub fn to_array(&self) -> Vec<HashMap<String, String>> {
        self.rows().iter().map(Row::to_map).collect()
    }

    /// Rows as a JSON array of objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows()
            .into_iter()
            .map(|row| {
                let object = row
                    .column_names
                    .iter()
                    .cloned()
                    .zip(row.values.into_iter().map(serde_json::Value::String))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Release the backend result. Further calls are no-ops.
    pub fn close(&self) {
        let released = self.handle.lock().take();
        if let Some(handle) = released {
            trace!(%handle, "freeing result");
            self.backend.free_result(handle.raw());
        }
    }

    fn read_columns(&self, handle: &ResultHandle) -> Vec<String> {
        let count = clamp_count(self.backend.column_count(handle.raw()));
        (0..count)
            .map(|column| self.backend.column_name(handle.raw(), column))
            .collect()
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            debug!(%handle, "result set released by drop");
            self.backend.free_result(handle.raw());
        }
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("handle", &*self.handle.lock())
            .finish_non_exhaustive()
    }
}

fn clamp_count(raw: i64) -> usize {
    usize::try_from(raw).unwrap_or(0)
}
