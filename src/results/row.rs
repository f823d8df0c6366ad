use std::collections::HashMap;
use std::sync::Arc;

/// A row copied out of a [`ResultSet`](crate::ResultSet).
///
/// Rows outlive the result handle they were read from: values are plain strings
/// and the column names are shared by every row of one read.
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row (shared across all rows of one read)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row, in column order
    pub values: Vec<String>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a new row.
    ///
    /// With duplicate column names, name lookups resolve to the last such column.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<String>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        values: Vec<String>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index_cache.get(column_name).copied()
    }

    /// Get a value by column name.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&str> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Get a value by column index.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Column name to value, last duplicate wins.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.column_names
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

// `collect` keeps the last index for a repeated name.
pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
