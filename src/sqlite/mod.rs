// SQLite module - a real `Backend` over rusqlite
//
// - backend: handle tables and the `Backend` implementation
// - query: connection-string parsing and result materialisation

mod backend;
pub mod query;

pub use backend::SqliteBackend;
