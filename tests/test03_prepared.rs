use std::sync::Arc;

use sql_handle_middleware::test_utils::FakeBackend;
use sql_handle_middleware::{
    BackoffStrategy, Connection, ConnectionOptions, DatabaseError, Param, SharedBackend,
};

fn connected(backend: &Arc<FakeBackend>) -> Connection {
    ConnectionOptions::builder("fake://db")
        .backoff(BackoffStrategy::None)
        .connect(Arc::clone(backend) as SharedBackend)
        .expect("connect")
}

#[test]
fn binds_reach_the_backend_and_execute_returns_rows() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("SELECT * FROM users WHERE id = ? AND username = ?")?;

    stmt.bind_int(1, 2)?;
    stmt.bind_string(2, "bob")?;
    let bound = backend.bound_params(backend.last_statement_handle());
    assert_eq!(bound.get(&1).map(String::as_str), Some("2"));
    assert_eq!(bound.get(&2).map(String::as_str), Some("bob"));

    let result = stmt.execute()?;
    assert_eq!(result.column_count(), 3);
    assert_eq!(stmt.sql(), "SELECT * FROM users WHERE id = ? AND username = ?");
    Ok(())
}

#[test]
fn index_below_one_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("SELECT ?")?;

    assert!(matches!(stmt.bind_int(0, 5), Err(DatabaseError::InvalidParameter(_))));
    assert!(matches!(stmt.bind_string(0, "x"), Err(DatabaseError::InvalidParameter(_))));
    assert!(matches!(stmt.bind(0, &Param::from(5)), Err(DatabaseError::InvalidParameter(_))));
    assert_eq!(backend.bind_calls(), 0);
    Ok(())
}

#[test]
fn rejected_bind_reports_binding_failed() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("SELECT ?")?;
    backend.reject_binds(true);

    match stmt.bind_int(1, 5) {
        Err(DatabaseError::BindingFailed(msg)) => {
            assert!(msg.contains("simulated bind failure"), "{msg}");
        }
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[test]
fn bind_all_numbers_params_from_one() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("INSERT INTO users VALUES (?, ?)")?;

    stmt.bind_all(&[Param::from(4), Param::from("dave")])?;
    assert_eq!(backend.bind_calls(), 2);
    Ok(())
}

#[test]
fn failed_preparation_and_execution_are_distinguished() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_statements_containing("broken");
    let conn = connected(&backend);

    assert!(matches!(
        conn.prepare("SELECT broken"),
        Err(DatabaseError::PreparationFailed(_))
    ));

    let stmt = conn.prepare("SELECT later")?;
    backend.fail_statements_containing("later");
    assert!(matches!(stmt.execute(), Err(DatabaseError::ExecutionFailed(_))));
    Ok(())
}

#[test]
fn statement_is_released_once() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("SELECT 1")?;

    stmt.close();
    stmt.close();
    assert!(stmt.is_closed());
    assert!(matches!(stmt.execute(), Err(DatabaseError::StatementClosed)));
    drop(stmt);

    {
        let _implicit = conn.prepare("SELECT 2")?;
    }
    assert_eq!(backend.closed_statements(), 2);
    assert_eq!(backend.live_statements(), 0);
    Ok(())
}

#[test]
fn statement_from_before_a_reconnect_is_stale() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = connected(&backend);
    let stmt = conn.prepare("SELECT ?")?;

    backend.invalidate(backend.last_connection_handle());
    conn.execute("UPDATE users SET seen = 1")?;

    assert!(matches!(stmt.bind_int(1, 1), Err(DatabaseError::BindingFailed(_))));
    assert!(matches!(stmt.execute(), Err(DatabaseError::ExecutionFailed(_))));
    let fresh = conn.prepare("SELECT ?")?;
    fresh.bind_int(1, 1)?;
    Ok(())
}
