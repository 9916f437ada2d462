//! Count audit event row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use stocktake_counts::audit::{CountAuditAction, CountAuditEvent, CountAuditEventInput};
use stocktake_counts::types::CountStatus;

/// An audit event as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CountAuditEventRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cycle_count_id: Uuid,
    pub item_id: Option<Uuid>,
    pub action: String,
    pub actor_id: Uuid,
    pub status_before: Option<CountStatus>,
    pub status_after: Option<CountStatus>,
    pub detail: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl From<CountAuditEventRow> for CountAuditEvent {
    fn from(row: CountAuditEventRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            cycle_count_id: row.cycle_count_id,
            item_id: row.item_id,
            action: row.action.parse().unwrap_or(CountAuditAction::Created),
            actor_id: row.actor_id,
            status_before: row.status_before,
            status_after: row.status_after,
            detail: row.detail,
            occurred_at: row.occurred_at,
        }
    }
}

impl CountAuditEventRow {
    /// Insert an audit event.
    pub async fn insert(
        pool: &sqlx::PgPool,
        input: &CountAuditEventInput,
        action: CountAuditAction,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO count_audit_events (
                tenant_id, cycle_count_id, item_id, action, actor_id,
                status_before, status_after, detail
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(input.tenant_id)
        .bind(input.cycle_count_id)
        .bind(input.item_id)
        .bind(action.to_string())
        .bind(input.actor_id)
        .bind(input.status_before)
        .bind(input.status_after)
        .bind(&input.detail)
        .fetch_one(pool)
        .await
    }

    /// List events for a session, oldest first.
    pub async fn list_for_count(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM count_audit_events
            WHERE tenant_id = $1 AND cycle_count_id = $2
            ORDER BY occurred_at, id
            ",
        )
        .bind(tenant_id)
        .bind(cycle_count_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_domain_parses_action() {
        let row = CountAuditEventRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            cycle_count_id: Uuid::new_v4(),
            item_id: None,
            action: "adjustment_posted".to_string(),
            actor_id: Uuid::new_v4(),
            status_before: Some(CountStatus::PendingReview),
            status_after: Some(CountStatus::Completed),
            detail: None,
            occurred_at: Utc::now(),
        };
        let event: CountAuditEvent = row.into();
        assert_eq!(event.action, CountAuditAction::AdjustmentPosted);
        assert_eq!(event.status_after, Some(CountStatus::Completed));
    }
}
