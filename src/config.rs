use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::SharedBackend;
use crate::connection::Connection;
use crate::error::Result;

/// Delay schedule between connection attempts.
///
/// `attempt` is 1-based: the delay returned for attempt *n* is slept after the
/// *n*-th attempt fails and before attempt *n + 1* starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    None,
    Fixed {
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
    /// Attempt *n* waits *n* units.
    Linear {
        #[serde(with = "duration_ms")]
        unit: Duration,
    },
    /// Attempt *n* waits `base * 2^(n-1)`, capped at `max`.
    Exponential {
        #[serde(with = "duration_ms")]
        base: Duration,
        #[serde(with = "duration_ms")]
        max: Duration,
    },
}

impl BackoffStrategy {
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { delay } => delay,
            BackoffStrategy::Linear { unit } => unit.saturating_mul(attempt),
            BackoffStrategy::Exponential { base, max } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Linear {
            unit: Duration::from_secs(1),
        }
    }
}

/// How many times `connect` tries the backend and how long it waits in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_retries: u32,
    #[serde(default)]
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// A policy of zero retries is clamped to a single attempt.
    #[must_use]
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffStrategy {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffStrategy::default())
    }
}

/// Options for opening a [`Connection`].
#[derive(Clone, Deserialize)]
pub struct ConnectionOptions {
    pub connection_string: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            retry: RetryPolicy::default(),
            auto_reconnect: true,
        }
    }

    #[must_use]
    pub fn builder(connection_string: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(connection_string)
    }

    /// Parse options from a JSON document.
    ///
    /// # Errors
    /// Returns the `serde_json` error if the document does not describe valid options.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// Connection strings routinely embed passwords.
impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("connection_string", &"<redacted>")
            .field("retry", &self.retry)
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}

/// Fluent builder for [`ConnectionOptions`].
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            opts: ConnectionOptions::new(connection_string),
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.opts.retry = RetryPolicy::new(max_retries, self.opts.retry.backoff());
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.opts.retry = RetryPolicy::new(self.opts.retry.max_retries(), backoff);
        self
    }

    #[must_use]
    pub fn auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.opts.auto_reconnect = auto_reconnect;
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionOptions {
        self.opts
    }

    /// Build a [`Connection`] and connect it.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` if every connection attempt fails.
    pub fn connect(self, backend: SharedBackend) -> Result<Connection> {
        let conn = Connection::new(self.finish(), backend);
        conn.connect()?;
        Ok(conn)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_with_attempt() {
        let backoff = BackoffStrategy::Linear {
            unit: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(40));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(50));
        assert_eq!(backoff.delay_for(200), Duration::from_millis(50));
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        assert_eq!(RetryPolicy::new(0, BackoffStrategy::None).max_retries(), 1);
    }

    #[test]
    fn builder_keeps_backoff_when_changing_retries() {
        let opts = ConnectionOptions::builder("mem://db")
            .backoff(BackoffStrategy::None)
            .max_retries(7)
            .auto_reconnect(false)
            .finish();
        assert_eq!(opts.retry, RetryPolicy::new(7, BackoffStrategy::None));
        assert!(!opts.auto_reconnect);
    }

    #[test]
    fn options_parse_from_json_with_defaults() {
        let opts = ConnectionOptions::from_json(
            r#"{"connection_string": "sqlite::memory:",
                "retry": {"max_retries": 5, "backoff": {"kind": "fixed", "delay": 250}}}"#,
        )
        .expect("valid options");
        assert_eq!(opts.retry.max_retries(), 5);
        assert_eq!(
            opts.retry.backoff(),
            BackoffStrategy::Fixed {
                delay: Duration::from_millis(250)
            }
        );
        assert!(opts.auto_reconnect);
    }

    #[test]
    fn debug_output_hides_connection_string() {
        let opts = ConnectionOptions::new("postgresql://admin:hunter2@db/prod");
        let rendered = format!("{opts:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
