use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value;
use tracing::{debug, warn};

use super::query::{self, Materialized};
use crate::backend::{Backend, RawHandle};
use crate::registry::HandleRegistry;

struct SqliteSession {
    conn: rusqlite::Connection,
    last_error: String,
}

#[derive(Debug)]
struct StoredStatement {
    connection: RawHandle,
    sql: String,
    parameter_count: usize,
    params: BTreeMap<usize, Value>,
}

impl StoredStatement {
    /// Values for `?1..?N`; unbound slots are NULL.
    fn positional_values(&self) -> Vec<Value> {
        (1..=self.parameter_count)
            .map(|idx| self.params.get(&idx).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[derive(Default)]
struct Tables {
    sessions: HandleRegistry<SqliteSession>,
    statements: HandleRegistry<StoredStatement>,
    results: HandleRegistry<Materialized>,
    connect_error: String,
}

impl Tables {
    fn fail(&mut self, connection: RawHandle, err: impl fmt::Display) {
        if let Some(session) = self.sessions.get_mut(connection) {
            session.last_error = err.to_string();
        }
    }

    fn statement_on(&self, connection: RawHandle, statement: RawHandle) -> Option<&StoredStatement> {
        self.statements
            .get(statement)
            .filter(|stmt| stmt.connection == connection)
    }
}

/// [`Backend`] over rusqlite.
///
/// Every handle lives in one table guarded by a single mutex. Query results are
/// copied out of SQLite when the query runs, so result handles stay readable after
/// their connection closes. Prepared statements keep their SQL and bound values
/// and reuse rusqlite's per-connection statement cache on execution.
pub struct SqliteBackend {
    tables: Mutex<Tables>,
}

impl SqliteBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` for `index` if the statement exists on `connection` and has
    /// that many parameters.
    fn bind_value(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: Value,
    ) -> i32 {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let Some(stmt) = tables
            .statements
            .get_mut(statement)
            .filter(|stmt| stmt.connection == connection)
        else {
            tables.fail(connection, format!("unknown statement handle {statement}"));
            return 0;
        };
        if index == 0 || index > stmt.parameter_count {
            let count = stmt.parameter_count;
            tables.fail(
                connection,
                format!("parameter index {index} out of range (statement takes {count})"),
            );
            return 0;
        }
        stmt.params.insert(index, value);
        1
    }
}

impl Default for SqliteBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.lock();
        f.debug_struct("SqliteBackend")
            .field("connections", &tables.sessions.len())
            .field("statements", &tables.statements.len())
            .field("results", &tables.results.len())
            .finish()
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Backend for SqliteBackend {
    fn create_connection(&self, connection_string: &str) -> RawHandle {
        match query::open(connection_string) {
            Ok(conn) => {
                let handle = self.lock().sessions.insert(SqliteSession {
                    conn,
                    last_error: String::new(),
                });
                debug!(connection = handle, "sqlite connection opened");
                handle
            }
            Err(err) => {
                warn!(error = %err, "sqlite connection failed");
                self.lock().connect_error = err.to_string();
                0
            }
        }
    }

    fn close_connection(&self, connection: RawHandle) {
        let mut tables = self.lock();
        if tables.sessions.remove(connection).is_some() {
            let released = tables
                .statements
                .remove_where(|stmt| stmt.connection == connection);
            debug!(connection, released, "sqlite connection closed");
        }
    }

    fn is_connection_valid(&self, connection: RawHandle) -> bool {
        self.lock().sessions.get(connection).is_some_and(|session| {
            session
                .conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok()
        })
    }

    fn execute_query(&self, connection: RawHandle, sql: &str) -> RawHandle {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let Some(session) = tables.sessions.get_mut(connection) else {
            return 0;
        };
        match query::materialize(&session.conn, sql, &[]) {
            Ok(result) => tables.results.insert(result),
            Err(err) => {
                session.last_error = err.to_string();
                0
            }
        }
    }

    fn execute_non_query(&self, connection: RawHandle, sql: &str) -> i64 {
        let mut tables = self.lock();
        let Some(session) = tables.sessions.get_mut(connection) else {
            return -1;
        };
        match session.conn.execute(sql, []) {
            Ok(changed) => count(changed),
            Err(err) => {
                session.last_error = err.to_string();
                -1
            }
        }
    }

    fn prepare_statement(&self, connection: RawHandle, sql: &str) -> RawHandle {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let Some(session) = tables.sessions.get_mut(connection) else {
            return 0;
        };
        let parameter_count = match session.conn.prepare_cached(sql) {
            Ok(stmt) => stmt.parameter_count(),
            Err(err) => {
                session.last_error = err.to_string();
                return 0;
            }
        };
        tables.statements.insert(StoredStatement {
            connection,
            sql: sql.to_owned(),
            parameter_count,
            params: BTreeMap::new(),
        })
    }

    fn bind_int_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: i64,
    ) -> i32 {
        self.bind_value(connection, statement, index, Value::Integer(value))
    }

    fn bind_string_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: &str,
    ) -> i32 {
        self.bind_value(connection, statement, index, Value::Text(value.to_owned()))
    }

    fn execute_prepared(&self, connection: RawHandle, statement: RawHandle) -> RawHandle {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let Some((sql, params)) = tables
            .statement_on(connection, statement)
            .map(|stmt| (stmt.sql.clone(), stmt.positional_values()))
        else {
            tables.fail(connection, format!("unknown statement handle {statement}"));
            return 0;
        };
        let Some(session) = tables.sessions.get_mut(connection) else {
            return 0;
        };
        match query::materialize(&session.conn, &sql, &params) {
            Ok(result) => tables.results.insert(result),
            Err(err) => {
                session.last_error = err.to_string();
                0
            }
        }
    }

    fn close_prepared(&self, connection: RawHandle, statement: RawHandle) {
        let mut tables = self.lock();
        if tables.statement_on(connection, statement).is_some() {
            tables.statements.remove(statement);
        }
    }

    fn row_count(&self, result: RawHandle) -> i64 {
        self.lock()
            .results
            .get(result)
            .map_or(0, |r| count(r.rows.len()))
    }

    fn column_count(&self, result: RawHandle) -> i64 {
        self.lock()
            .results
            .get(result)
            .map_or(0, |r| count(r.columns.len()))
    }

    fn column_name(&self, result: RawHandle, column: usize) -> String {
        self.lock()
            .results
            .get(result)
            .and_then(|r| r.columns.get(column).cloned())
            .unwrap_or_default()
    }

    fn value(&self, result: RawHandle, row: usize, column: usize) -> String {
        self.lock()
            .results
            .get(result)
            .and_then(|r| r.rows.get(row))
            .and_then(|values| values.get(column).cloned())
            .unwrap_or_default()
    }

    fn free_result(&self, result: RawHandle) {
        self.lock().results.remove(result);
    }

    fn last_error(&self, connection: RawHandle) -> String {
        let tables = self.lock();
        if connection == 0 {
            return tables.connect_error.clone();
        }
        tables
            .sessions
            .get(connection)
            .map(|session| session.last_error.clone())
            .unwrap_or_default()
    }
}
