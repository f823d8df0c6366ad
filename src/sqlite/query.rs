use std::path::Path;

use rusqlite::types::{Value, ValueRef};

/// Where a connection string points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Memory,
    File(&'a Path),
}

/// Parse `:memory:`, `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>` or a
/// bare path. Returns `None` for an empty string.
#[must_use]
pub fn parse_target(connection_string: &str) -> Option<Target<'_>> {
    let trimmed = connection_string.trim();
    let rest = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    match rest {
        "" => None,
        ":memory:" => Some(Target::Memory),
        path => Some(Target::File(Path::new(path))),
    }
}

/// Open a rusqlite connection for `connection_string`.
///
/// # Errors
/// Returns the rusqlite error if the database cannot be opened, or
/// `InvalidPath` for an empty connection string.
pub fn open(connection_string: &str) -> rusqlite::Result<rusqlite::Connection> {
    match parse_target(connection_string) {
        Some(Target::Memory) => rusqlite::Connection::open_in_memory(),
        Some(Target::File(path)) => rusqlite::Connection::open(path),
        None => Err(rusqlite::Error::InvalidPath(Path::new("").to_path_buf())),
    }
}

/// A query result copied out of SQLite, every value rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Render one `SQLite` value as text. NULL renders as the empty string.
#[must_use]
pub fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Run `sql` with positional `params` and copy every row out.
/// Only SELECT queries produce rows; DML is executed and yields an empty result.
///
/// # Errors
/// Returns the rusqlite error if preparation, binding or stepping fails.
pub fn materialize(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> rusqlite::Result<Materialized> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    let mut rows_iter = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(render_value(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    Ok(Materialized { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_forms() {
        assert_eq!(parse_target(":memory:"), Some(Target::Memory));
        assert_eq!(parse_target("sqlite::memory:"), Some(Target::Memory));
        assert_eq!(
            parse_target("sqlite:///tmp/a.db"),
            Some(Target::File(Path::new("/tmp/a.db")))
        );
        assert_eq!(
            parse_target("sqlite:data.db"),
            Some(Target::File(Path::new("data.db")))
        );
        assert_eq!(
            parse_target("plain.db"),
            Some(Target::File(Path::new("plain.db")))
        );
        assert_eq!(parse_target("  "), None);
    }

    #[test]
    fn values_render_as_text() {
        let conn = open(":memory:").expect("open");
        let result = materialize(
            &conn,
            "SELECT 1 AS i, 2.5 AS r, 'x' AS t, NULL AS n, x'6869' AS b",
            &[],
        )
        .expect("query");
        assert_eq!(result.columns, ["i", "r", "t", "n", "b"]);
        assert_eq!(result.rows, [["1", "2.5", "x", "", "hi"]]);
    }

    #[test]
    fn positional_params_are_bound() {
        let conn = open(":memory:").expect("open");
        let result = materialize(
            &conn,
            "SELECT ?1 + 1, ?2",
            &[Value::Integer(41), Value::Text("ok".into())],
        )
        .expect("query");
        assert_eq!(result.rows, [["42", "ok"]]);
    }
}
