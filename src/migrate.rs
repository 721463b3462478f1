use anyhow::Result;
use sqlx::SqlitePool;

/// Create the audit schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            actor_name TEXT NOT NULL DEFAULT '',
            actor_handle TEXT NOT NULL DEFAULT '',
            operation TEXT NOT NULL,
            query_text TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL,
            match_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Rows are insert-only; refuse updates and deletes at the storage layer.
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS query_attempts_no_update
        BEFORE UPDATE ON query_attempts
        BEGIN
            SELECT RAISE(ABORT, 'query_attempts is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS query_attempts_no_delete
        BEFORE DELETE ON query_attempts
        BEGIN
            SELECT RAISE(ABORT, 'query_attempts is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_query_attempts_actor ON query_attempts(actor_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
