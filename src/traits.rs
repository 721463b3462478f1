//! Extension traits at the backend, transport and audit seams.
//!
//! Every external collaborator of the desk sits behind one of these traits.
//! The built-in adapters implement them over HTTP; tests and custom
//! binaries can implement them in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             BackendRegistry              │
//! │  ┌─────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ Tabular │ │FileStore │ │ CodeRepo  │  │
//! │  └─────────┘ └──────────┘ └───────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          fan_out() → merged hits
//! ```
//!
//! Identity lookups, row writes, file fetches, broadcasts and audit records
//! each go through their own trait and never through fan-out.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::BackendResult;
use crate::models::{Attachment, BackendKind, Hit, IdentityKind, QueryAttempt};

// ═══════════════════════════════════════════════════════════════════════
// Backend traits
// ═══════════════════════════════════════════════════════════════════════

/// A backend that answers free-text searches.
///
/// `search` performs a case-insensitive substring match and returns hits in
/// backend-native order. It is finite and is called once per fan-out.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One-line description, shown by `rdesk sources`.
    fn description(&self) -> &str;

    async fn search(&self, term: &str) -> BackendResult<Vec<Hit>>;
}

/// Single-key lookup against the identity service.
///
/// Implementations must reject keys of the wrong shape with
/// `BackendError::Invalid` before any network call, and must issue at most
/// one request per call.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup(&self, kind: IdentityKind, key: &str) -> BackendResult<Hit>;
}

/// Raw access to a spreadsheet-like store: full snapshot reads and single
/// row appends. Row 0 of a snapshot is the header row.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn read_rows(&self, range: &str) -> BackendResult<Vec<Vec<String>>>;

    async fn append_row(&self, range: &str, row: Vec<String>) -> BackendResult<()>;
}

/// Appends one record to the tabular data set.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn append(&self, fields: Vec<String>) -> BackendResult<()>;
}

/// Retrieves the file behind a file-store hit.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, hit: &Hit) -> BackendResult<Attachment>;
}

// ═══════════════════════════════════════════════════════════════════════
// Transport and audit traits
// ═══════════════════════════════════════════════════════════════════════

/// Outbound side of the chat transport, used by `broadcast`.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, recipient_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Durable, append-only storage for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn append(&self, attempt: &QueryAttempt) -> anyhow::Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// The search backends available for fan-out.
///
/// At most one adapter per [`BackendKind`]; registering a second adapter
/// of the same kind replaces the first.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn SearchBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) {
        let kind = backend.kind();
        self.backends.retain(|b| b.kind() != kind);
        self.backends.push(backend);
        self.backends.sort_by_key(|b| b.kind());
    }

    pub fn backends(&self) -> &[Arc<dyn SearchBackend>] {
        &self.backends
    }

    pub fn find(&self, kind: BackendKind) -> Option<Arc<dyn SearchBackend>> {
        self.backends.iter().find(|b| b.kind() == kind).cloned()
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(BackendKind, &'static str);

    #[async_trait]
    impl SearchBackend for Fixed {
        fn kind(&self) -> BackendKind {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        async fn search(&self, _term: &str) -> BackendResult<Vec<Hit>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_registry_orders_by_priority() {
        let mut reg = BackendRegistry::new();
        reg.register(Arc::new(Fixed(BackendKind::CodeRepo, "code")));
        reg.register(Arc::new(Fixed(BackendKind::Tabular, "rows")));
        reg.register(Arc::new(Fixed(BackendKind::FileStore, "files")));
        assert_eq!(reg.kinds(), BackendKind::SEARCHABLE.to_vec());
    }

    #[test]
    fn test_registry_replaces_same_kind() {
        let mut reg = BackendRegistry::new();
        reg.register(Arc::new(Fixed(BackendKind::Tabular, "first")));
        reg.register(Arc::new(Fixed(BackendKind::Tabular, "second")));
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.find(BackendKind::Tabular).unwrap().description(),
            "second"
        );
        assert!(reg.find(BackendKind::CodeRepo).is_none());
    }
}
