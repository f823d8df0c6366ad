use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{Backend, RawHandle};

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
        }
    }

    fn users() -> Self {
        Self::new(
            &["id", "username", "email"],
            &[
                &["1", "alice", "alice@example.com"],
                &["2", "bob", "bob@example.com"],
                &["3", "charlie", "charlie@example.com"],
            ],
        )
    }
}

#[derive(Debug, Default)]
struct Session {
    pending: Option<Vec<String>>,
    last_error: String,
}

#[derive(Debug)]
struct Statement {
    connection: RawHandle,
    sql: String,
    params: BTreeMap<usize, String>,
}

#[derive(Debug, Default)]
struct State {
    next_handle: RawHandle,
    create_calls: u32,
    connect_failures_remaining: u32,
    last_connect_error: String,
    sessions: HashMap<RawHandle, Session>,
    closed_sessions: HashSet<RawHandle>,
    invalid: HashSet<RawHandle>,
    last_connection: RawHandle,
    tables: HashMap<String, Table>,
    rows_affected: HashMap<String, i64>,
    failing: Vec<String>,
    reject_binds: bool,
    results: HashMap<RawHandle, Table>,
    free_counts: HashMap<RawHandle, u32>,
    last_result: RawHandle,
    statements: HashMap<RawHandle, Statement>,
    last_statement: RawHandle,
    closed_statements: usize,
    bind_calls: usize,
    executed: Vec<String>,
    committed: Vec<String>,
    rolled_back: Vec<String>,
    rollback_calls: usize,
}

impl State {
    fn issue(&mut self) -> RawHandle {
        self.next_handle += 1;
        self.next_handle
    }

    fn fails(&self, sql: &str) -> bool {
        self.failing.iter().any(|pattern| sql.contains(pattern.as_str()))
    }

    fn set_error(&mut self, connection: RawHandle, message: String) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.last_error = message;
        }
    }

    fn usable(&self, connection: RawHandle) -> bool {
        self.sessions.contains_key(&connection) && !self.invalid.contains(&connection)
    }

    fn table_for(&self, sql: &str) -> Table {
        self.tables.get(sql).cloned().unwrap_or_else(Table::users)
    }
}

/// Scripted in-memory [`Backend`].
///
/// Queries return a three-row `users` table unless a table was registered for the
/// exact SQL text. Statements affect one row unless configured otherwise and fail
/// when their text contains a pattern registered with
/// [`FakeBackend::fail_statements_containing`]. `BEGIN`/`COMMIT`/`ROLLBACK` are
/// tracked per connection so tests can see what was committed.
///
/// Every call keyed by a connection handle is checked for overlap with another
/// call on the same handle; overlaps are counted by
/// [`FakeBackend::reentrant_calls`].
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<State>,
    in_flight: Mutex<HashSet<RawHandle>>,
    reentrant: AtomicUsize,
    call_delay: Mutex<Duration>,
}

struct InFlight<'a> {
    backend: &'a FakeBackend,
    connection: RawHandle,
    owned: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.owned {
            lock(&self.backend.in_flight).remove(&self.connection);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---- scripting ----

    /// Make the next `n` `create_connection` calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        lock(&self.state).connect_failures_remaining = n;
    }

    /// Report `connection` as invalid from now on; calls on it fail.
    pub fn invalidate(&self, connection: RawHandle) {
        lock(&self.state).invalid.insert(connection);
    }

    /// Fail any statement, query or preparation whose SQL contains `pattern`.
    pub fn fail_statements_containing(&self, pattern: &str) {
        lock(&self.state).failing.push(pattern.to_owned());
    }

    pub fn set_rows_affected(&self, sql: &str, rows: i64) {
        lock(&self.state).rows_affected.insert(sql.to_owned(), rows);
    }

    pub fn set_table(&self, sql: &str, columns: &[&str], rows: &[&[&str]]) {
        lock(&self.state)
            .tables
            .insert(sql.to_owned(), Table::new(columns, rows));
    }

    pub fn reject_binds(&self, reject: bool) {
        lock(&self.state).reject_binds = reject;
    }

    /// Sleep inside every connection-keyed call, widening race windows.
    pub fn set_call_delay(&self, delay: Duration) {
        *lock(&self.call_delay) = delay;
    }

    /// Register a result directly, bypassing any connection.
    pub fn open_result(&self, columns: &[&str], rows: &[&[&str]]) -> RawHandle {
        let mut state = lock(&self.state);
        let handle = state.issue();
        state.results.insert(handle, Table::new(columns, rows));
        state.last_result = handle;
        handle
    }

    // ---- observations ----

    #[must_use]
    pub fn create_calls(&self) -> u32 {
        lock(&self.state).create_calls
    }

    #[must_use]
    pub fn last_connection_handle(&self) -> RawHandle {
        lock(&self.state).last_connection
    }

    #[must_use]
    pub fn open_connections(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    #[must_use]
    pub fn was_closed(&self, connection: RawHandle) -> bool {
        lock(&self.state).closed_sessions.contains(&connection)
    }

    #[must_use]
    pub fn last_result_handle(&self) -> RawHandle {
        lock(&self.state).last_result
    }

    #[must_use]
    pub fn free_count(&self, result: RawHandle) -> u32 {
        lock(&self.state).free_counts.get(&result).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn live_results(&self) -> usize {
        lock(&self.state).results.len()
    }

    #[must_use]
    pub fn bind_calls(&self) -> usize {
        lock(&self.state).bind_calls
    }

    /// Parameters currently bound to `statement`, by index.
    #[must_use]
    pub fn bound_params(&self, statement: RawHandle) -> BTreeMap<usize, String> {
        lock(&self.state)
            .statements
            .get(&statement)
            .map(|s| s.params.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_statement_handle(&self) -> RawHandle {
        lock(&self.state).last_statement
    }

    #[must_use]
    pub fn live_statements(&self) -> usize {
        lock(&self.state).statements.len()
    }

    #[must_use]
    pub fn closed_statements(&self) -> usize {
        lock(&self.state).closed_statements
    }

    /// Every statement passed to `execute_non_query`, in order, failures included.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        lock(&self.state).executed.clone()
    }

    #[must_use]
    pub fn committed(&self) -> Vec<String> {
        lock(&self.state).committed.clone()
    }

    #[must_use]
    pub fn rolled_back(&self) -> Vec<String> {
        lock(&self.state).rolled_back.clone()
    }

    #[must_use]
    pub fn rollback_calls(&self) -> usize {
        lock(&self.state).rollback_calls
    }

    #[must_use]
    pub fn reentrant_calls(&self) -> usize {
        self.reentrant.load(Ordering::SeqCst)
    }

    fn enter(&self, connection: RawHandle) -> InFlight<'_> {
        let owned = lock(&self.in_flight).insert(connection);
        if !owned {
            self.reentrant.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *lock(&self.call_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        InFlight {
            backend: self,
            connection,
            owned,
        }
    }
}

impl Backend for FakeBackend {
    fn create_connection(&self, _connection_string: &str) -> RawHandle {
        let mut state = lock(&self.state);
        state.create_calls += 1;
        if state.connect_failures_remaining > 0 {
            state.connect_failures_remaining -= 1;
            state.last_connect_error = format!("simulated connect failure #{}", state.create_calls);
            return 0;
        }
        let handle = state.issue();
        state.sessions.insert(handle, Session::default());
        state.last_connection = handle;
        handle
    }

    fn close_connection(&self, connection: RawHandle) {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        if state.sessions.remove(&connection).is_some() {
            state.closed_sessions.insert(connection);
            state.statements.retain(|_, s| s.connection != connection);
        }
    }

    fn is_connection_valid(&self, connection: RawHandle) -> bool {
        let _flight = self.enter(connection);
        lock(&self.state).usable(connection)
    }

    fn execute_query(&self, connection: RawHandle, sql: &str) -> RawHandle {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        if !state.usable(connection) {
            return 0;
        }
        if state.fails(sql) {
            state.set_error(connection, format!("simulated query failure: {sql}"));
            return 0;
        }
        let table = state.table_for(sql);
        let handle = state.issue();
        state.results.insert(handle, table);
        state.last_result = handle;
        handle
    }

    fn execute_non_query(&self, connection: RawHandle, sql: &str) -> i64 {
        let _flight = self.enter(connection);
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.usable(connection) {
            return -1;
        }
        state.executed.push(sql.to_owned());
        if state.fails(sql) {
            state.set_error(connection, format!("simulated statement failure: {sql}"));
            return -1;
        }

        let affected = state.rows_affected.get(sql).copied().unwrap_or(1);
        let Some(session) = state.sessions.get_mut(&connection) else {
            return -1;
        };
        match sql {
            "BEGIN" => {
                session.pending = Some(Vec::new());
                0
            }
            "COMMIT" => {
                let pending = session.pending.take().unwrap_or_default();
                state.committed.extend(pending);
                0
            }
            "ROLLBACK" => {
                let pending = session.pending.take().unwrap_or_default();
                state.rolled_back.extend(pending);
                state.rollback_calls += 1;
                0
            }
            _ => {
                if let Some(pending) = session.pending.as_mut() {
                    pending.push(sql.to_owned());
                } else {
                    state.committed.push(sql.to_owned());
                }
                affected
            }
        }
    }

    fn prepare_statement(&self, connection: RawHandle, sql: &str) -> RawHandle {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        if !state.usable(connection) {
            return 0;
        }
        if state.fails(sql) {
            state.set_error(connection, format!("simulated prepare failure: {sql}"));
            return 0;
        }
        let handle = state.issue();
        state.statements.insert(
            handle,
            Statement {
                connection,
                sql: sql.to_owned(),
                params: BTreeMap::new(),
            },
        );
        state.last_statement = handle;
        handle
    }

    fn bind_int_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: i64,
    ) -> i32 {
        self.bind_string_parameter(connection, statement, index, &value.to_string())
    }

    fn bind_string_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: &str,
    ) -> i32 {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        state.bind_calls += 1;
        if state.reject_binds {
            state.set_error(connection, format!("simulated bind failure at {index}"));
            return 0;
        }
        match state.statements.get_mut(&statement) {
            Some(stmt) if stmt.connection == connection => {
                stmt.params.insert(index, value.to_owned());
                1
            }
            _ => 0,
        }
    }

    fn execute_prepared(&self, connection: RawHandle, statement: RawHandle) -> RawHandle {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        let sql = match state.statements.get(&statement) {
            Some(stmt) if stmt.connection == connection => stmt.sql.clone(),
            _ => return 0,
        };
        if !state.usable(connection) {
            return 0;
        }
        if state.fails(&sql) {
            state.set_error(connection, format!("simulated execution failure: {sql}"));
            return 0;
        }
        let table = state.table_for(&sql);
        let handle = state.issue();
        state.results.insert(handle, table);
        state.last_result = handle;
        handle
    }

    fn close_prepared(&self, connection: RawHandle, statement: RawHandle) {
        let _flight = self.enter(connection);
        let mut state = lock(&self.state);
        if state.statements.remove(&statement).is_some() {
            state.closed_statements += 1;
        }
    }

    fn row_count(&self, result: RawHandle) -> i64 {
        lock(&self.state)
            .results
            .get(&result)
            .map_or(0, |t| i64::try_from(t.rows.len()).unwrap_or(i64::MAX))
    }

    fn column_count(&self, result: RawHandle) -> i64 {
        lock(&self.state)
            .results
            .get(&result)
            .map_or(0, |t| i64::try_from(t.columns.len()).unwrap_or(i64::MAX))
    }

    fn column_name(&self, result: RawHandle, column: usize) -> String {
        lock(&self.state)
            .results
            .get(&result)
            .and_then(|t| t.columns.get(column).cloned())
            .unwrap_or_default()
    }

    fn value(&self, result: RawHandle, row: usize, column: usize) -> String {
        lock(&self.state)
            .results
            .get(&result)
            .and_then(|t| t.rows.get(row))
            .and_then(|r| r.get(column).cloned())
            .unwrap_or_default()
    }

    fn free_result(&self, result: RawHandle) {
        let mut state = lock(&self.state);
        state.results.remove(&result);
        *state.free_counts.entry(result).or_insert(0) += 1;
    }

    fn last_error(&self, connection: RawHandle) -> String {
        let state = lock(&self.state);
        if connection == 0 {
            return state.last_connect_error.clone();
        }
        state
            .sessions
            .get(&connection)
            .map(|s| s.last_error.clone())
            .unwrap_or_default()
    }
}
