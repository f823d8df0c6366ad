use std::sync::Arc;
use std::time::Duration;

use sql_handle_middleware::test_utils::FakeBackend;
use sql_handle_middleware::{
    AsyncConnection, BackoffStrategy, ConnectionOptions, DatabaseError, SharedBackend,
};

fn async_conn(backend: &Arc<FakeBackend>) -> AsyncConnection {
    let opts = ConnectionOptions::builder("fake://db")
        .backoff(BackoffStrategy::None)
        .finish();
    AsyncConnection::new(opts, Arc::clone(backend) as SharedBackend)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_connection() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    backend.set_call_delay(Duration::from_millis(1));
    let conn = async_conn(&backend);
    conn.connect().await?;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            let rows = conn.fetch_rows("SELECT * FROM users").await?;
            conn.execute(format!("UPDATE users SET hits = {i}")).await?;
            Ok::<usize, DatabaseError>(rows.len())
        }));
    }
    for task in tasks {
        assert_eq!(task.await??, 3);
    }
    assert_eq!(backend.reentrant_calls(), 0);
    assert_eq!(backend.create_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn batch_and_prepare_go_through_the_blocking_pool() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = async_conn(&backend);
    conn.connect().await?;

    let total = conn
        .execute_batch(vec!["INSERT INTO t VALUES (1)".into(), "INSERT INTO t VALUES (2)".into()])
        .await?;
    assert_eq!(total, 2);
    assert_eq!(backend.committed().len(), 2);

    let stmt = conn.prepare("SELECT * FROM users WHERE id = ?").await?;
    stmt.bind_int(1, 1)?;
    let result = stmt.execute()?;
    assert_eq!(result.row_count(), 3);

    let queried = conn.query("SELECT * FROM users").await?;
    assert_eq!(queried.get_value(0, 1)?, "alice");
    Ok(())
}

#[tokio::test]
async fn errors_pass_through_unchanged() {
    let backend = Arc::new(FakeBackend::new());
    let conn = async_conn(&backend);

    assert!(matches!(
        conn.query("SELECT 1").await,
        Err(DatabaseError::NotConnected(_))
    ));

    backend.fail_next_connects(1);
    let opts = ConnectionOptions::builder("fake://db")
        .max_retries(1)
        .backoff(BackoffStrategy::None)
        .finish();
    let failing = AsyncConnection::new(opts, Arc::clone(&backend) as SharedBackend);
    assert!(matches!(
        failing.connect().await,
        Err(DatabaseError::ConnectionFailed(_))
    ));
}

#[tokio::test]
async fn deadline_is_reported_as_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(FakeBackend::new());
    let conn = async_conn(&backend);
    conn.connect().await?;
    backend.set_call_delay(Duration::from_millis(150));

    let limit = Duration::from_millis(5);
    let bounded = conn.with_deadline(limit);
    assert!(matches!(
        bounded.fetch_rows("SELECT * FROM users").await,
        Err(DatabaseError::Timeout(d)) if d == limit
    ));

    backend.set_call_delay(Duration::ZERO);
    let generous = conn.with_deadline(Duration::from_secs(5));
    assert_eq!(generous.fetch_rows("SELECT * FROM users").await?.len(), 3);
    Ok(())
}
