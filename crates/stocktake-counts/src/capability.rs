//! Capability gating for privileged count actions.
//!
//! The engine consumes authorization as a boolean oracle: it refuses an
//! action the oracle denies but owns none of the permission model. The
//! oracle is injected so policy lives with the caller, not in the engine.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Capabilities the engine checks before mutating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountCapability {
    /// Create and start count sessions.
    Create,
    /// Record counted quantities.
    Count,
    /// Approve or reject a session under review.
    Approve,
    /// Cancel a session.
    Cancel,
}

impl fmt::Display for CountCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create cycle counts"),
            Self::Count => write!(f, "record counts"),
            Self::Approve => write!(f, "approve cycle counts"),
            Self::Cancel => write!(f, "cancel cycle counts"),
        }
    }
}

/// Boolean capability oracle consulted before privileged actions.
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    /// Check whether an actor holds a capability in a tenant.
    async fn allows(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        capability: CountCapability,
    ) -> Result<bool>;
}

/// Static oracle for testing: allows everything except explicitly denied
/// actor/capability pairs.
#[derive(Debug, Default)]
pub struct StaticCapabilityOracle {
    denied: RwLock<HashSet<(Uuid, CountCapability)>>,
}

impl StaticCapabilityOracle {
    /// Create an oracle that allows every check.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Deny one capability for one actor.
    pub async fn deny(&self, actor_id: Uuid, capability: CountCapability) {
        self.denied.write().await.insert((actor_id, capability));
    }
}

#[async_trait]
impl CapabilityOracle for StaticCapabilityOracle {
    async fn allows(
        &self,
        _tenant_id: Uuid,
        actor_id: Uuid,
        capability: CountCapability,
    ) -> Result<bool> {
        Ok(!self.denied.read().await.contains(&(actor_id, capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_by_default() {
        let oracle = StaticCapabilityOracle::allow_all();
        let actor = Uuid::new_v4();
        for capability in [
            CountCapability::Create,
            CountCapability::Count,
            CountCapability::Approve,
            CountCapability::Cancel,
        ] {
            assert!(oracle
                .allows(Uuid::new_v4(), actor, capability)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_denied_pair_is_scoped() {
        let oracle = StaticCapabilityOracle::allow_all();
        let actor = Uuid::new_v4();
        oracle.deny(actor, CountCapability::Approve).await;

        let tenant = Uuid::new_v4();
        assert!(!oracle
            .allows(tenant, actor, CountCapability::Approve)
            .await
            .unwrap());
        assert!(oracle
            .allows(tenant, actor, CountCapability::Count)
            .await
            .unwrap());
        assert!(oracle
            .allows(tenant, Uuid::new_v4(), CountCapability::Approve)
            .await
            .unwrap());
    }
}
