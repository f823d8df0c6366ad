mod core;
mod dml;
mod prepared;
mod select;
mod tx;

pub use self::core::Connection;
pub(crate) use self::core::{SessionState, SharedSession};
