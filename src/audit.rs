//! Audit logging.
//!
//! Records one [`QueryAttempt`] per validated command, after its outcome is
//! known: successes, empty searches, backend failures and denials alike.
//! A failing sink degrades to a warning in the operational log and never
//! changes the reply the actor receives.
//!
//! # Sinks
//!
//! | `audit.sink` | Storage |
//! |--------------|---------|
//! | `sheet` | One row per attempt on the audit range of the tabular store |
//! | `sqlite` | `query_attempts` table in a local SQLite file |
//! | `disabled` | Nothing is stored |

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::db;
use crate::migrate;
use crate::models::{Outcome, QueryAttempt};
use crate::traits::{AuditSink, RowStore};

/// Header written to an empty audit sheet.
pub const SHEET_HEADER: [&str; 6] = [
    "Fecha/Hora",
    "Telegram_ID",
    "Nombre",
    "Username",
    "Consulta",
    "Coincidencias",
];

/// Front of the audit pipeline. Cheap to clone.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledSink))
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Append one attempt. Never fails.
    pub async fn record(&self, attempt: QueryAttempt) {
        if let Err(e) = self.sink.append(&attempt).await {
            tracing::warn!(
                sink = self.sink.name(),
                operation = %attempt.operation,
                actor = %attempt.actor_id,
                error = %e,
                "audit write failed"
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Sheet sink
// ═══════════════════════════════════════════════════════════════════════

pub struct SheetAuditSink {
    store: Arc<dyn RowStore>,
    range: String,
    header: OnceCell<()>,
}

impl SheetAuditSink {
    pub fn new(store: Arc<dyn RowStore>, range: impl Into<String>) -> Self {
        Self {
            store,
            range: range.into(),
            header: OnceCell::new(),
        }
    }

    async fn ensure_header(&self) -> Result<()> {
        self.header
            .get_or_try_init(|| async {
                let rows = self.store.read_rows(&self.range).await?;
                if rows.is_empty() {
                    let header = SHEET_HEADER.iter().map(|s| s.to_string()).collect();
                    self.store.append_row(&self.range, header).await?;
                }
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        Ok(())
    }
}

/// The fixed six audit columns. Operation and outcome ride in the query
/// cell: `<operation> <query>`, plus ` [<outcome>]` unless it succeeded.
pub fn sheet_row(attempt: &QueryAttempt) -> Vec<String> {
    let mut query = if attempt.query_text.is_empty() {
        attempt.operation.clone()
    } else {
        format!("{} {}", attempt.operation, attempt.query_text)
    };
    if attempt.outcome != Outcome::Ok {
        query.push_str(&format!(" [{}]", attempt.outcome));
    }
    vec![
        attempt.formatted_timestamp(),
        attempt.actor_id.clone(),
        attempt.actor_name.clone(),
        attempt.actor_handle.clone(),
        query,
        attempt.match_count.to_string(),
    ]
}

#[async_trait]
impl AuditSink for SheetAuditSink {
    fn name(&self) -> &str {
        "sheet"
    }

    async fn append(&self, attempt: &QueryAttempt) -> Result<()> {
        self.ensure_header().await?;
        self.store
            .append_row(&self.range, sheet_row(attempt))
            .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SQLite sink
// ═══════════════════════════════════════════════════════════════════════

pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    /// Open the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, attempt: &QueryAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO query_attempts
                (timestamp, actor_id, actor_name, actor_handle, operation, query_text, outcome, match_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.timestamp.to_rfc3339())
        .bind(&attempt.actor_id)
        .bind(&attempt.actor_name)
        .bind(&attempt.actor_handle)
        .bind(&attempt.operation)
        .bind(&attempt.query_text)
        .bind(attempt.outcome.as_str())
        .bind(attempt.match_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Disabled sink
// ═══════════════════════════════════════════════════════════════════════

pub struct DisabledSink;

#[async_trait]
impl AuditSink for DisabledSink {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn append(&self, _attempt: &QueryAttempt) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, BackendResult};
    use crate::models::{Actor, BackendKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct SheetStore {
        rows: Mutex<Vec<Vec<String>>>,
        fail_appends: bool,
    }

    #[async_trait]
    impl RowStore for SheetStore {
        async fn read_rows(&self, _range: &str) -> BackendResult<Vec<Vec<String>>> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn append_row(&self, _range: &str, row: Vec<String>) -> BackendResult<()> {
            if self.fail_appends {
                return Err(BackendError::unavailable(BackendKind::Tabular, "quota"));
            }
            self.rows.lock().unwrap().push(row);
            Ok(())
        }
    }

    fn attempt(outcome: Outcome) -> QueryAttempt {
        let actor = Actor::new("111").named("Ana").with_handle("ana_q");
        QueryAttempt::new(&actor, "search", "report", outcome, 2)
    }

    #[test]
    fn test_sheet_row_layout() {
        let row = sheet_row(&attempt(Outcome::Ok));
        assert_eq!(row.len(), 6);
        assert_eq!(&row[1..], &["111", "Ana", "ana_q", "search report", "2"]);

        let denied = sheet_row(&attempt(Outcome::Denied));
        assert_eq!(denied[4], "search report [denied]");
    }

    #[tokio::test]
    async fn test_sheet_sink_writes_header_once() {
        let store = Arc::new(SheetStore::default());
        let sink = SheetAuditSink::new(store.clone(), "Log_Busquedas");
        sink.append(&attempt(Outcome::Ok)).await.unwrap();
        sink.append(&attempt(Outcome::NoMatches)).await.unwrap();
        let rows = store.rows.lock().unwrap().clone();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Fecha/Hora");
        assert_eq!(rows[0][5], "Coincidencias");
    }

    #[tokio::test]
    async fn test_logger_swallows_sink_failures() {
        let store = Arc::new(SheetStore {
            rows: Mutex::new(vec![vec!["Fecha/Hora".to_string()]]),
            fail_appends: true,
        });
        let logger = AuditLogger::new(Arc::new(SheetAuditSink::new(store.clone(), "log")));
        logger.record(attempt(Outcome::Ok)).await;
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }
}
