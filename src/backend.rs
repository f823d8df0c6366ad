//! The driver capability the wrappers in this crate are built on.
//!
//! A [`Backend`] speaks in raw integer handles and status codes, the way a C or
//! JNI interop layer would. It makes no ownership promises: nothing stops two
//! callers from freeing the same result handle twice or interleaving calls on one
//! connection. [`Connection`](crate::Connection), [`ResultSet`](crate::ResultSet)
//! and [`PreparedStatement`](crate::PreparedStatement) add those guarantees.
//!
//! Failure conventions:
//! * handle-returning calls signal failure with a value `<= 0`;
//! * [`Backend::execute_non_query`] signals failure with a negative count;
//! * bind calls signal failure with a status `<= 0`.
//!
//! After a failure, [`Backend::last_error`] returns diagnostic text for the
//! connection handle involved (handle `0` for failures creating a connection).

use std::sync::Arc;

/// Raw handle value as exchanged with a backend.
pub type RawHandle = i64;

/// Synchronous, handle-based database driver.
///
/// Every call may block. Implementations must be shareable across threads; the
/// wrappers guarantee that calls keyed by one connection handle never overlap.
pub trait Backend: Send + Sync {
    fn create_connection(&self, connection_string: &str) -> RawHandle;

    fn close_connection(&self, connection: RawHandle);

    fn is_connection_valid(&self, connection: RawHandle) -> bool;

    fn execute_query(&self, connection: RawHandle, sql: &str) -> RawHandle;

    fn execute_non_query(&self, connection: RawHandle, sql: &str) -> i64;

    fn prepare_statement(&self, connection: RawHandle, sql: &str) -> RawHandle;

    /// Bind an integer to the 1-based parameter `index`.
    fn bind_int_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: i64,
    ) -> i32;

    /// Bind text to the 1-based parameter `index`.
    fn bind_string_parameter(
        &self,
        connection: RawHandle,
        statement: RawHandle,
        index: usize,
        value: &str,
    ) -> i32;

    fn execute_prepared(&self, connection: RawHandle, statement: RawHandle) -> RawHandle;

    fn close_prepared(&self, connection: RawHandle, statement: RawHandle);

    fn row_count(&self, result: RawHandle) -> i64;

    fn column_count(&self, result: RawHandle) -> i64;

    fn column_name(&self, result: RawHandle, column: usize) -> String;

    fn value(&self, result: RawHandle, row: usize, column: usize) -> String;

    fn free_result(&self, result: RawHandle);

    fn last_error(&self, connection: RawHandle) -> String;
}

/// Backend shared between a connection and the results/statements it hands out.
pub type SharedBackend = Arc<dyn Backend>;

macro_rules! owned_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl $name {
            /// Wrap a raw backend value, rejecting the failure range (`<= 0`).
            #[must_use]
            pub fn from_raw(raw: RawHandle) -> Option<Self> {
                (raw > 0).then_some(Self(raw))
            }

            /// Raw value to pass back to the backend.
            #[must_use]
            pub fn raw(&self) -> RawHandle {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

owned_handle!(
    /// Live backend session. Neither `Clone` nor `Copy`: exactly one
    /// [`Connection`](crate::Connection) owns it.
    ConnectionHandle
);

owned_handle!(
    /// Backend-side result set, owned by exactly one [`ResultSet`](crate::ResultSet).
    ResultHandle
);

owned_handle!(
    /// Backend-prepared statement, owned by exactly one
    /// [`PreparedStatement`](crate::PreparedStatement).
    StatementHandle
);
