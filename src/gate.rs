//! Access gate.
//!
//! Each privileged request walks a small state machine:
//!
//! ```text
//! Unauthenticated ──resolve role──▶ RoleResolved{None|Member|Admin} ──▶ Permitted | Denied
//! ```
//!
//! Public operations skip resolution entirely. Any registry failure denies
//! the request.

use std::sync::Arc;

use crate::models::{Actor, Role};
use crate::registry::RegistryClient;

/// Minimum role an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Public,
    Member,
    Admin,
}

impl AccessLevel {
    pub fn allows(&self, role: Role) -> bool {
        match self {
            AccessLevel::Public => true,
            AccessLevel::Member => role >= Role::Member,
            AccessLevel::Admin => role == Role::Admin,
        }
    }
}

/// Why a request was denied. Kept for the operational log only; callers are
/// never told which applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InsufficientRole,
    RegistryUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// `role` is `None` for public operations, which never resolve a role.
    Permitted { role: Option<Role> },
    Denied { actor_id: String, reason: DenyReason },
}

impl Decision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Decision::Permitted { .. })
    }
}

pub struct AccessGate {
    registry: Arc<RegistryClient>,
}

impl AccessGate {
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        Self { registry }
    }

    pub async fn check(&self, actor: &Actor, level: AccessLevel) -> Decision {
        if level == AccessLevel::Public {
            return Decision::Permitted { role: None };
        }

        let role = match self.registry.role_of(&actor.id).await {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(actor = %actor.id, error = %e, "registry unavailable, denying");
                return Decision::Denied {
                    actor_id: actor.id.clone(),
                    reason: DenyReason::RegistryUnavailable,
                };
            }
        };

        if level.allows(role) {
            Decision::Permitted { role: Some(role) }
        } else {
            tracing::info!(actor = %actor.id, ?level, "access denied");
            Decision::Denied {
                actor_id: actor.id.clone(),
                reason: DenyReason::InsufficientRole,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::error::{BackendError, BackendResult};
    use crate::models::BackendKind;
    use crate::traits::RowStore;
    use async_trait::async_trait;

    struct Rows(Option<Vec<Vec<String>>>);

    #[async_trait]
    impl RowStore for Rows {
        async fn read_rows(&self, _range: &str) -> BackendResult<Vec<Vec<String>>> {
            self.0
                .clone()
                .ok_or_else(|| BackendError::unavailable(BackendKind::Tabular, "offline"))
        }
        async fn append_row(&self, _range: &str, _row: Vec<String>) -> BackendResult<()> {
            Ok(())
        }
    }

    fn gate(rows: Option<&[(&str, &str)]>) -> AccessGate {
        let rows = rows.map(|r| {
            let mut out = vec![vec!["ID".to_string(), "ROL".to_string()]];
            out.extend(r.iter().map(|(id, role)| vec![id.to_string(), role.to_string()]));
            out
        });
        let registry = RegistryClient::new(Arc::new(Rows(rows)), RegistryConfig::default());
        AccessGate::new(Arc::new(registry))
    }

    #[test]
    fn test_level_allows() {
        assert!(AccessLevel::Public.allows(Role::None));
        assert!(!AccessLevel::Member.allows(Role::None));
        assert!(AccessLevel::Member.allows(Role::Member));
        assert!(AccessLevel::Member.allows(Role::Admin));
        assert!(!AccessLevel::Admin.allows(Role::Member));
        assert!(AccessLevel::Admin.allows(Role::Admin));
    }

    #[tokio::test]
    async fn test_unknown_actor_denied_with_own_id() {
        let g = gate(Some(&[("111", "admin")]));
        let d = g.check(&Actor::new("999"), AccessLevel::Member).await;
        assert_eq!(
            d,
            Decision::Denied {
                actor_id: "999".into(),
                reason: DenyReason::InsufficientRole
            }
        );
    }

    #[tokio::test]
    async fn test_member_cannot_use_admin_operations() {
        let g = gate(Some(&[("222", "")]));
        assert!(g.check(&Actor::new("222"), AccessLevel::Member).await.is_permitted());
        assert!(!g.check(&Actor::new("222"), AccessLevel::Admin).await.is_permitted());
    }

    #[tokio::test]
    async fn test_fails_closed_when_registry_is_down() {
        let g = gate(None);
        let d = g.check(&Actor::new("111"), AccessLevel::Member).await;
        assert!(matches!(
            d,
            Decision::Denied {
                reason: DenyReason::RegistryUnavailable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_public_skips_registry() {
        let g = gate(None);
        assert_eq!(
            g.check(&Actor::new("1"), AccessLevel::Public).await,
            Decision::Permitted { role: None }
        );
    }
}
