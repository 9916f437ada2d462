//! Audit logging for cycle count operations.
//!
//! Every state mutation in the service layer records one event. Audit
//! failures never fail the underlying operation; they are logged and the
//! operation proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::CountStatus;

/// Action recorded against a cycle count session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountAuditAction {
    /// Session was created.
    Created,
    /// Snapshot was locked and counting opened.
    Started,
    /// A counted quantity was recorded or corrected.
    CountRecorded,
    /// Session was submitted for review.
    Submitted,
    /// Session was approved.
    Approved,
    /// Session was rejected back to counting.
    Rejected,
    /// Session was cancelled.
    Cancelled,
    /// A ledger adjustment was posted for one item.
    AdjustmentPosted,
}

impl std::fmt::Display for CountAuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::CountRecorded => write!(f, "count_recorded"),
            Self::Submitted => write!(f, "submitted"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AdjustmentPosted => write!(f, "adjustment_posted"),
        }
    }
}

impl std::str::FromStr for CountAuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "count_recorded" => Ok(Self::CountRecorded),
            "submitted" => Ok(Self::Submitted),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "adjustment_posted" => Ok(Self::AdjustmentPosted),
            _ => Err(format!("Unknown audit action: {s}")),
        }
    }
}

/// An audit event for a cycle count operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountAuditEvent {
    /// Unique identifier for the event.
    pub id: Uuid,
    /// Tenant this event belongs to.
    pub tenant_id: Uuid,
    /// The session involved.
    pub cycle_count_id: Uuid,
    /// The line item involved, for item-level actions.
    pub item_id: Option<Uuid>,
    /// Action performed.
    pub action: CountAuditAction,
    /// User who performed the action.
    pub actor_id: Uuid,
    /// Session status before the action.
    pub status_before: Option<CountStatus>,
    /// Session status after the action.
    pub status_after: Option<CountStatus>,
    /// Action-specific detail payload (JSON).
    pub detail: Option<serde_json::Value>,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

/// Input for recording an audit event.
#[derive(Debug, Clone, Default)]
pub struct CountAuditEventInput {
    pub tenant_id: Uuid,
    pub cycle_count_id: Uuid,
    pub item_id: Option<Uuid>,
    pub action: Option<CountAuditAction>,
    pub actor_id: Uuid,
    pub status_before: Option<CountStatus>,
    pub status_after: Option<CountStatus>,
    pub detail: Option<serde_json::Value>,
}

/// Trait for audit event storage backends.
#[async_trait]
pub trait CountAuditStore: Send + Sync {
    /// Record an audit event.
    async fn log_event(&self, input: CountAuditEventInput) -> Result<CountAuditEvent>;

    /// List events for a session, oldest first.
    async fn list_for_count(
        &self,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<Vec<CountAuditEvent>>;
}

/// In-memory implementation of [`CountAuditStore`] for testing.
#[derive(Debug, Default)]
pub struct InMemoryCountAuditStore {
    events: Arc<RwLock<HashMap<Uuid, Vec<CountAuditEvent>>>>,
}

impl InMemoryCountAuditStore {
    /// Create a new in-memory audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events (for testing).
    pub async fn count(&self) -> usize {
        self.events.read().await.values().map(Vec::len).sum()
    }

    /// Clear all events (for testing).
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl CountAuditStore for InMemoryCountAuditStore {
    async fn log_event(&self, input: CountAuditEventInput) -> Result<CountAuditEvent> {
        let event = CountAuditEvent {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            cycle_count_id: input.cycle_count_id,
            item_id: input.item_id,
            action: input.action.unwrap_or(CountAuditAction::Created),
            actor_id: input.actor_id,
            status_before: input.status_before,
            status_after: input.status_after,
            detail: input.detail,
            occurred_at: Utc::now(),
        };
        self.events
            .write()
            .await
            .entry(input.cycle_count_id)
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn list_for_count(
        &self,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<Vec<CountAuditEvent>> {
        let events = self.events.read().await;
        Ok(events
            .get(&cycle_count_id)
            .map(|list| {
                list.iter()
                    .filter(|e| e.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_and_list_events() {
        let store = InMemoryCountAuditStore::new();
        let tenant_id = Uuid::new_v4();
        let count_id = Uuid::new_v4();

        store
            .log_event(CountAuditEventInput {
                tenant_id,
                cycle_count_id: count_id,
                action: Some(CountAuditAction::Created),
                actor_id: Uuid::new_v4(),
                status_after: Some(CountStatus::Draft),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .log_event(CountAuditEventInput {
                tenant_id,
                cycle_count_id: count_id,
                action: Some(CountAuditAction::Started),
                actor_id: Uuid::new_v4(),
                status_before: Some(CountStatus::Draft),
                status_after: Some(CountStatus::InProgress),
                ..Default::default()
            })
            .await
            .unwrap();

        let events = store.list_for_count(tenant_id, count_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, CountAuditAction::Created);
        assert_eq!(events[1].action, CountAuditAction::Started);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_events_are_tenant_scoped() {
        let store = InMemoryCountAuditStore::new();
        let count_id = Uuid::new_v4();
        store
            .log_event(CountAuditEventInput {
                tenant_id: Uuid::new_v4(),
                cycle_count_id: count_id,
                action: Some(CountAuditAction::Created),
                actor_id: Uuid::new_v4(),
                ..Default::default()
            })
            .await
            .unwrap();

        let other_tenant = Uuid::new_v4();
        let events = store.list_for_count(other_tenant, count_id).await.unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(CountAuditAction::AdjustmentPosted.to_string(), "adjustment_posted");
        assert_eq!(CountAuditAction::CountRecorded.to_string(), "count_recorded");
    }

    #[test]
    fn test_action_from_str_roundtrip() {
        for action in [
            CountAuditAction::Created,
            CountAuditAction::Started,
            CountAuditAction::CountRecorded,
            CountAuditAction::Submitted,
            CountAuditAction::Approved,
            CountAuditAction::Rejected,
            CountAuditAction::Cancelled,
            CountAuditAction::AdjustmentPosted,
        ] {
            let parsed: CountAuditAction = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert!("vanished".parse::<CountAuditAction>().is_err());
    }
}
