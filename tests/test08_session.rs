use std::sync::Arc;

use sql_handle_middleware::test_utils::FakeBackend;
use sql_handle_middleware::{
    BackoffStrategy, ConnectionOptions, DatabaseError, Param, Session, SharedBackend,
};

fn session(backend: &Arc<FakeBackend>) -> Session {
    let opts = ConnectionOptions::builder("fake://db")
        .backoff(BackoffStrategy::None)
        .finish();
    Session::open(opts, Arc::clone(backend) as SharedBackend).expect("open")
}

#[test]
fn session_leaves_no_handles_open() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let session = session(&backend);

    assert_eq!(session.fetch_all("SELECT * FROM users")?.len(), 3);
    let rows = session.fetch_prepared(
        "SELECT * FROM users WHERE id = ? AND username = ?",
        &[Param::from(2), Param::from("bob")],
    )?;
    assert_eq!(rows[1]["email"], "bob@example.com");
    assert_eq!(session.execute("DELETE FROM users WHERE id = 3")?, 1);
    assert_eq!(session.run_in_transaction(&["INSERT INTO t VALUES (1)"])?, 1);

    assert_eq!(backend.live_results(), 0);
    assert_eq!(backend.live_statements(), 0);

    session.close();
    assert!(!session.connection().is_connected());
    assert_eq!(backend.open_connections(), 0);
    Ok(())
}

#[test]
fn failed_transaction_surfaces_through_the_session() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_statements_containing("boom");
    let session = session(&backend);

    assert!(matches!(
        session.run_in_transaction(&["INSERT INTO t VALUES (1)", "INSERT boom"]),
        Err(DatabaseError::TransactionFailed { .. })
    ));
    assert!(backend.committed().is_empty());
}

#[test]
fn connection_is_shared_with_the_caller() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let session = session(&backend);
    let conn = Arc::clone(session.connection());

    let result = conn.query("SELECT * FROM users")?;
    assert_eq!(result.row_count(), 3);
    drop(session);
    assert!(conn.is_connected());
    Ok(())
}
