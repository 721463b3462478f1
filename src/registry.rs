//! Registry client: the actor-id → role table.
//!
//! The role table lives on its own range of the tabular store. Each row is
//! one enrolled actor; the role column says `admin` for administrators and
//! anything else (including blank) for members. Actors without a row have
//! [`Role::None`].
//!
//! By default every call re-reads the table. A positive
//! `registry.cache_ttl_secs` lets snapshots be reused for that long; once a
//! snapshot is older than the TTL it is never served again, so a registry
//! outage after expiry still fails closed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RegistryConfig;
use crate::error::{BackendError, BackendResult};
use crate::models::{BackendKind, Role};
use crate::traits::RowStore;

/// One snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    roles: HashMap<String, Role>,
    /// Enrolled ids in row order, without duplicates.
    members: Vec<String>,
}

impl RoleTable {
    /// Build a table from a raw snapshot. Row 0 is the header row.
    ///
    /// A duplicated id keeps the highest role found for it.
    pub fn from_rows(
        rows: &[Vec<String>],
        id_column: &str,
        role_column: &str,
    ) -> BackendResult<Self> {
        let Some((headers, data)) = rows.split_first() else {
            return Ok(Self::default());
        };
        let find = |title: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(title.trim()))
        };
        let id_idx = find(id_column).ok_or_else(|| {
            BackendError::unavailable(
                BackendKind::Tabular,
                format!("registry has no '{}' column", id_column),
            )
        })?;
        let role_idx = find(role_column);

        let mut table = Self::default();
        for row in data {
            let id = row.get(id_idx).map(|s| s.trim()).unwrap_or_default();
            if id.is_empty() {
                continue;
            }
            let role = role_idx
                .and_then(|i| row.get(i))
                .map(|cell| Role::from_cell(cell))
                .unwrap_or(Role::Member);
            match table.roles.get_mut(id) {
                Some(existing) => *existing = (*existing).max(role),
                None => {
                    table.roles.insert(id.to_string(), role);
                    table.members.push(id.to_string());
                }
            }
        }
        Ok(table)
    }

    pub fn role_of(&self, actor_id: &str) -> Role {
        self.roles
            .get(actor_id.trim())
            .copied()
            .unwrap_or(Role::None)
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct RegistryClient {
    store: Arc<dyn RowStore>,
    config: RegistryConfig,
    ttl: Option<Duration>,
    cached: Mutex<Option<(Instant, Arc<RoleTable>)>>,
}

impl RegistryClient {
    pub fn new(store: Arc<dyn RowStore>, config: RegistryConfig) -> Self {
        let ttl = config.cache_ttl();
        Self {
            store,
            config,
            ttl,
            cached: Mutex::new(None),
        }
    }

    fn fresh_cached(&self) -> Option<Arc<RoleTable>> {
        let ttl = self.ttl?;
        let slot = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(at, _)| at.elapsed() < ttl)
            .map(|(_, table)| table.clone())
    }

    /// Current role table, read through the optional cache.
    pub async fn snapshot(&self) -> BackendResult<Arc<RoleTable>> {
        if let Some(table) = self.fresh_cached() {
            return Ok(table);
        }

        let rows = self.store.read_rows(&self.config.range).await?;
        let table = Arc::new(RoleTable::from_rows(
            &rows,
            &self.config.id_column,
            &self.config.role_column,
        )?);

        if self.ttl.is_some() {
            let mut slot = self.cached.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some((Instant::now(), table.clone()));
        }
        Ok(table)
    }

    pub async fn role_of(&self, actor_id: &str) -> BackendResult<Role> {
        Ok(self.snapshot().await?.role_of(actor_id))
    }

    /// Every enrolled actor id, in registry order.
    pub async fn recipients(&self) -> BackendResult<Vec<String>> {
        Ok(self.snapshot().await?.members().to_vec())
    }
}
