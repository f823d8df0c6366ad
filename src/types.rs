/// Values that can be bound to a prepared statement parameter.
///
/// ```rust
/// use sql_handle_middleware::prelude::*;
///
/// let params = vec![Param::from(1_i64), Param::from("alice")];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Integer value (64-bit)
    Int(i64),
    /// Text/string value
    Text(String),
}

impl Param {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Param::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Param::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_owned())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

/// Lifecycle state of a [`Connection`](crate::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}
