//! Connect-with-retry as an explicit state machine.
//!
//! [`Connector::step`] advances one attempt at a time so the policy can be driven
//! and inspected without a live connection; [`Connector::run`] drives it to a
//! terminal state.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{Backend, ConnectionHandle};
use crate::config::RetryPolicy;
use crate::error::{DatabaseError, Result};

/// Source of the blocking waits between connection attempts.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// State of a connect-with-retry run. `Attempting(n)` is 1-based.
#[derive(Debug)]
pub enum ConnectAttempt {
    Attempting(u32),
    Connected(ConnectionHandle),
    Failed(DatabaseError),
}

impl ConnectAttempt {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectAttempt::Attempting(_))
    }
}

pub struct Connector<'a> {
    backend: &'a dyn Backend,
    connection_string: &'a str,
    policy: RetryPolicy,
    clock: &'a dyn Clock,
    last_error: Option<String>,
}

impl<'a> Connector<'a> {
    #[must_use]
    pub fn new(
        backend: &'a dyn Backend,
        connection_string: &'a str,
        policy: RetryPolicy,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            backend,
            connection_string,
            policy,
            clock,
            last_error: None,
        }
    }

    /// Most recent diagnostic reported by the backend for a failed attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Perform the attempt described by `state`. Terminal states are returned unchanged.
    pub fn step(&mut self, state: ConnectAttempt) -> ConnectAttempt {
        let ConnectAttempt::Attempting(attempt) = state else {
            return state;
        };
        let max = self.policy.max_retries();

        let raw = self.backend.create_connection(self.connection_string);
        if let Some(handle) = ConnectionHandle::from_raw(raw) {
            debug!(attempt, %handle, "connection established");
            return ConnectAttempt::Connected(handle);
        }

        let detail = self.backend.last_error(0);
        if !detail.is_empty() {
            self.last_error = Some(detail);
        }
        warn!(
            attempt,
            max,
            error = self.last_error.as_deref().unwrap_or("unknown"),
            "connection attempt failed"
        );

        if attempt >= max {
            let message = match &self.last_error {
                Some(last) => format!("{max} attempt(s) exhausted; last error: {last}"),
                None => format!("unable to connect after {max} attempt(s)"),
            };
            return ConnectAttempt::Failed(DatabaseError::ConnectionFailed(message));
        }

        self.clock.sleep(self.policy.backoff().delay_for(attempt));
        ConnectAttempt::Attempting(attempt + 1)
    }

    /// Drive attempts until the backend hands out a handle or retries run out.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` carrying the last backend error.
    pub fn run(mut self) -> Result<ConnectionHandle> {
        let mut state = ConnectAttempt::Attempting(1);
        loop {
            state = self.step(state);
            match state {
                ConnectAttempt::Connected(handle) => return Ok(handle),
                ConnectAttempt::Failed(err) => return Err(err),
                ConnectAttempt::Attempting(_) => {}
            }
        }
    }
}

impl fmt::Debug for Connector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("policy", &self.policy)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
