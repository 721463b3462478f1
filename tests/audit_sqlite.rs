//! SQLite audit sink: records persist, and the table refuses edits.

use record_desk::audit::{AuditLogger, SqliteAuditSink};
use record_desk::models::{Actor, Outcome, QueryAttempt};
use sqlx::Row;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_sqlite_sink_is_append_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data").join("audit.sqlite");

    let sink = Arc::new(SqliteAuditSink::open(&path).await.unwrap());
    let logger = AuditLogger::new(sink.clone());
    assert_eq!(logger.sink_name(), "sqlite");

    let actor = Actor::new("111").named("Ana").with_handle("ana_q");
    logger
        .record(QueryAttempt::new(&actor, "search", "informe", Outcome::Ok, 4))
        .await;
    logger
        .record(QueryAttempt::new(&actor, "broadcast", "hola", Outcome::Denied, 0))
        .await;

    let rows = sqlx::query(
        "SELECT actor_id, actor_handle, operation, outcome, match_count FROM query_attempts ORDER BY id",
    )
    .fetch_all(sink.pool())
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String, _>("actor_id"), "111");
    assert_eq!(rows[0].get::<String, _>("actor_handle"), "ana_q");
    assert_eq!(rows[0].get::<i64, _>("match_count"), 4);
    assert_eq!(rows[1].get::<String, _>("operation"), "broadcast");
    assert_eq!(rows[1].get::<String, _>("outcome"), "denied");

    assert!(sqlx::query("DELETE FROM query_attempts")
        .execute(sink.pool())
        .await
        .is_err());
    assert!(sqlx::query("UPDATE query_attempts SET outcome = 'ok'")
        .execute(sink.pool())
        .await
        .is_err());
}

#[tokio::test]
async fn test_reopening_keeps_existing_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("audit.sqlite");
    let actor = Actor::new("222");

    {
        let logger = AuditLogger::new(Arc::new(SqliteAuditSink::open(&path).await.unwrap()));
        logger
            .record(QueryAttempt::new(&actor, "whoami", "", Outcome::Ok, 0))
            .await;
    }

    let sink = SqliteAuditSink::open(&path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_attempts")
        .fetch_one(sink.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}
