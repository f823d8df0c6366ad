use std::sync::Arc;
use std::time::Duration;

use sql_handle_middleware::test_utils::{FakeBackend, ManualClock};
use sql_handle_middleware::{
    BackoffStrategy, ConnectionOptions, ConnectionState, Connection, DatabaseError, SharedBackend,
};

fn connection(backend: &Arc<FakeBackend>, max_retries: u32) -> (Connection, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let opts = ConnectionOptions::builder("fake://user:secret@db")
        .max_retries(max_retries)
        .backoff(BackoffStrategy::Linear {
            unit: Duration::from_millis(100),
        })
        .finish();
    let conn = Connection::with_clock(opts, Arc::clone(backend) as SharedBackend, clock.clone());
    (conn, clock)
}

#[test]
fn connecting_twice_creates_one_backend_connection() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let (conn, _clock) = connection(&backend, 3);

    conn.connect()?;
    conn.connect()?;
    assert_eq!(backend.create_calls(), 1);
    assert_eq!(conn.state(), ConnectionState::Connected);
    Ok(())
}

#[test]
fn operations_before_connect_are_refused() {
    let backend = Arc::new(FakeBackend::new());
    let (conn, _clock) = connection(&backend, 3);

    assert!(matches!(conn.query("SELECT 1"), Err(DatabaseError::NotConnected(_))));
    assert!(matches!(conn.execute("DELETE FROM t"), Err(DatabaseError::NotConnected(_))));
    assert!(matches!(conn.prepare("SELECT ?"), Err(DatabaseError::NotConnected(_))));
    assert!(matches!(
        conn.execute_batch(&["INSERT INTO t VALUES (1)"]),
        Err(DatabaseError::NotConnected(_))
    ));
    assert_eq!(backend.create_calls(), 0);
}

#[test]
fn success_on_last_attempt_uses_every_attempt() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_next_connects(2);
    let (conn, clock) = connection(&backend, 3);

    conn.connect()?;
    assert_eq!(backend.create_calls(), 3);
    assert_eq!(
        clock.sleeps(),
        [Duration::from_millis(100), Duration::from_millis(200)]
    );
    Ok(())
}

#[test]
fn always_failing_backend_exhausts_retries() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_next_connects(u32::MAX);
    let (conn, clock) = connection(&backend, 4);

    let err = conn.connect().expect_err("must fail");
    assert_eq!(backend.create_calls(), 4);
    // No wait after the final attempt.
    assert_eq!(clock.sleeps().len(), 3);
    match err {
        DatabaseError::ConnectionFailed(msg) => {
            assert!(msg.contains("simulated connect failure #4"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn close_is_idempotent_and_allows_reconnect() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let (conn, _clock) = connection(&backend, 1);

    conn.connect()?;
    let first = backend.last_connection_handle();
    conn.close();
    conn.close();
    assert!(backend.was_closed(first));
    assert!(matches!(conn.execute("SELECT 1"), Err(DatabaseError::NotConnected(_))));

    conn.connect()?;
    assert_ne!(backend.last_connection_handle(), first);
    assert_eq!(backend.open_connections(), 1);
    Ok(())
}

#[test]
fn invalid_handle_is_replaced_transparently() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let (conn, _clock) = connection(&backend, 2);
    conn.connect()?;
    backend.invalidate(backend.last_connection_handle());

    assert_eq!(conn.execute("UPDATE users SET active = 1")?, 1);
    assert_eq!(backend.create_calls(), 2);
    Ok(())
}

#[test]
fn debug_output_hides_the_connection_string() {
    let backend = Arc::new(FakeBackend::new());
    let (conn, _clock) = connection(&backend, 1);
    let rendered = format!("{conn:?}");
    assert!(!rendered.contains("secret"), "{rendered}");
}
