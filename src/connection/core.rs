use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::backend::{ConnectionHandle, RawHandle, SharedBackend};
use crate::config::ConnectionOptions;
use crate::error::{DatabaseError, Result};
use crate::guard::{LockLevel, OrderedMutex};
use crate::retry::{Clock, Connector, SystemClock};
use crate::types::ConnectionState;

/// Handle slot guarded by the connection lock. `Some` exactly when connected.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) handle: Option<ConnectionHandle>,
}

impl SessionState {
    pub(crate) fn holds(&self, raw: RawHandle) -> bool {
        self.handle.as_ref().is_some_and(|h| h.raw() == raw)
    }
}

/// The connection lock. Prepared statements keep only a `Weak` to it.
pub(crate) type SharedSession = Arc<OrderedMutex<SessionState>>;

/// Thread-safe owner of one backend connection handle.
///
/// Share it across threads with `Arc<Connection>`. Every operation that touches
/// the handle runs under the connection's guard, so the backend never sees two
/// overlapping calls for this connection. Dropping the connection closes it.
pub struct Connection {
    pub(crate) options: ConnectionOptions,
    pub(crate) backend: SharedBackend,
    clock: Arc<dyn Clock>,
    pub(crate) session: SharedSession,
    // Fast-path hint only; `session` is authoritative.
    connected: AtomicBool,
}

impl Connection {
    /// Create a disconnected connection. Call [`Connection::connect`] before use.
    #[must_use]
    pub fn new(options: ConnectionOptions, backend: SharedBackend) -> Self {
        Self::with_clock(options, backend, Arc::new(SystemClock))
    }

    /// Like [`Connection::new`], with a custom source of retry waits.
    #[must_use]
    pub fn with_clock(
        options: ConnectionOptions,
        backend: SharedBackend,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            options,
            backend,
            clock,
            session: Arc::new(OrderedMutex::new(
                LockLevel::Connection,
                SessionState::default(),
            )),
            connected: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.session.lock().handle.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect, retrying per the configured [`RetryPolicy`](crate::RetryPolicy).
    ///
    /// A no-op when already connected. Blocks the calling thread for the backoff
    /// between attempts.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` carrying the last backend error once
    /// every attempt has failed.
    pub fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut session = self.session.lock();
        // Another caller may have connected while we waited for the guard.
        if session.handle.is_some() {
            return Ok(());
        }
        self.connect_locked(&mut session)
    }

    fn connect_locked(&self, session: &mut SessionState) -> Result<()> {
        debug!(
            max_retries = self.options.retry.max_retries(),
            "connecting"
        );
        let handle = Connector::new(
            self.backend.as_ref(),
            &self.options.connection_string,
            self.options.retry,
            self.clock.as_ref(),
        )
        .run()?;
        session.handle = Some(handle);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Confirm the handle is usable, reconnecting if allowed. Returns the raw handle
    /// to use for the rest of the operation.
    pub(crate) fn validate_locked(&self, session: &mut SessionState) -> Result<RawHandle> {
        let Some(handle) = session.handle.as_ref() else {
            return Err(DatabaseError::not_connected());
        };
        if self.backend.is_connection_valid(handle.raw()) {
            return Ok(handle.raw());
        }
        if !self.options.auto_reconnect {
            return Err(DatabaseError::ConnectionLost(format!(
                "{handle} is no longer valid and auto-reconnect is disabled"
            )));
        }

        warn!(%handle, "connection no longer valid; reconnecting");
        self.release_locked(session);
        self.connect_locked(session)
            .map_err(|err| DatabaseError::ConnectionLost(format!("reconnect failed: {err}")))?;
        session
            .handle
            .as_ref()
            .map(ConnectionHandle::raw)
            .ok_or_else(DatabaseError::not_connected)
    }

    /// Release the backend handle. Safe to call repeatedly.
    pub fn close(&self) {
        let mut session = self.session.lock();
        self.release_locked(&mut session);
    }

    fn release_locked(&self, session: &mut SessionState) {
        if let Some(handle) = session.handle.take() {
            self.connected.store(false, Ordering::Release);
            debug!(%handle, "closing connection");
            self.backend.close_connection(handle.raw());
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.options)
            .field("session", &*self.session.lock())
            .finish_non_exhaustive()
    }
}
