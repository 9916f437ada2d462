//! Cycle count session row model.
//!
//! Status transitions are expressed as conditional updates so that racing
//! callers serialize on the database row: the update only applies while the
//! session is still in the expected status, and a losing caller observes
//! `None` from the returning query.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use stocktake_counts::count::{CountFilter, CycleCount};
use stocktake_counts::types::{CountStatus, CountType, CycleCountId};

/// A cycle count session as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CycleCountRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub count_number: String,
    pub count_type: CountType,
    pub status: CountStatus,
    pub blind_count: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub total_items: i64,
    pub items_counted: i64,
    pub items_with_variance: i64,
    pub total_variance_cost: Decimal,
    pub accuracy_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CycleCountRow> for CycleCount {
    fn from(row: CycleCountRow) -> Self {
        Self {
            id: CycleCountId::from(row.id),
            tenant_id: row.tenant_id,
            warehouse_id: row.warehouse_id,
            count_number: row.count_number,
            count_type: row.count_type,
            status: row.status,
            blind_count: row.blind_count,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_by: row.created_by,
            approved_by: row.approved_by,
            total_items: row.total_items,
            items_counted: row.items_counted,
            items_with_variance: row.items_with_variance,
            total_variance_cost: row.total_variance_cost,
            accuracy_percent: row.accuracy_percent,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl CycleCountRow {
    /// Find a session by ID within a tenant.
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM cycle_counts
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Find a session by count number within a tenant.
    pub async fn find_by_count_number(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        count_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM cycle_counts
            WHERE tenant_id = $1 AND count_number = $2
            ",
        )
        .bind(tenant_id)
        .bind(count_number)
        .fetch_optional(pool)
        .await
    }

    /// List sessions for a tenant with filtering and pagination.
    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        filter: &CountFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = String::from(
            r"
            SELECT * FROM cycle_counts
            WHERE tenant_id = $1
            ",
        );
        let mut param_count = 1;

        if filter.status.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.warehouse_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if filter.count_type.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND count_type = ${param_count}"));
        }

        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut q = sqlx::query_as::<_, CycleCountRow>(&query).bind(tenant_id);

        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            q = q.bind(warehouse_id);
        }
        if let Some(count_type) = filter.count_type {
            q = q.bind(count_type);
        }

        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count sessions in a tenant with filtering.
    pub async fn count_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        filter: &CountFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut query = String::from(
            r"
            SELECT COUNT(*) FROM cycle_counts
            WHERE tenant_id = $1
            ",
        );
        let mut param_count = 1;

        if filter.status.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.warehouse_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if filter.count_type.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND count_type = ${param_count}"));
        }

        let mut q = sqlx::query_scalar::<_, i64>(&query).bind(tenant_id);

        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            q = q.bind(warehouse_id);
        }
        if let Some(count_type) = filter.count_type {
            q = q.bind(count_type);
        }

        q.fetch_one(pool).await
    }

    /// Insert a session created by the engine.
    pub async fn insert<'e, E>(executor: E, count: &CycleCount) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO cycle_counts (
                id, tenant_id, warehouse_id, count_number, count_type, status,
                blind_count, scheduled_at, created_by, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(count.id.into_inner())
        .bind(count.tenant_id)
        .bind(count.warehouse_id)
        .bind(&count.count_number)
        .bind(count.count_type)
        .bind(count.status)
        .bind(count.blind_count)
        .bind(count.scheduled_at)
        .bind(count.created_by)
        .bind(&count.notes)
        .fetch_one(executor)
        .await
    }

    /// Move a startable session to in-progress, stamping `started_at`.
    pub async fn start<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE cycle_counts
            SET status = 'in_progress',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status IN ('draft', 'scheduled')
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
    }

    /// Move an in-progress session to pending review.
    pub async fn submit(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE cycle_counts
            SET status = 'pending_review',
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'in_progress'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Approve a session under review, stamping approver and completion.
    pub async fn approve<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        approved_by: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE cycle_counts
            SET status = 'completed',
                approved_by = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'pending_review'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(approved_by)
        .fetch_optional(executor)
        .await
    }

    /// Move a session under review back to counting, appending the
    /// rejection note.
    pub async fn return_to_counting<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE cycle_counts
            SET status = 'in_progress',
                notes = CASE WHEN notes IS NULL THEN $3 ELSE notes || E'\n' || $3 END,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'pending_review'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(note)
        .fetch_optional(executor)
        .await
    }

    /// Cancel a non-terminal session, appending the optional note.
    pub async fn cancel(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
        note: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE cycle_counts
            SET status = 'cancelled',
                notes = CASE
                    WHEN $3::text IS NULL THEN notes
                    WHEN notes IS NULL THEN $3
                    ELSE notes || E'\n' || $3
                END,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
              AND status NOT IN ('completed', 'cancelled')
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(note)
        .fetch_optional(pool)
        .await
    }

    /// Recompute the session aggregates from its item rows.
    pub async fn refresh_aggregates<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r"
            UPDATE cycle_counts c
            SET total_items = s.total,
                items_counted = s.counted,
                items_with_variance = s.with_variance,
                total_variance_cost = s.variance_cost,
                accuracy_percent = CASE
                    WHEN s.counted > 0
                    THEN (s.counted - s.with_variance)::numeric * 100 / s.counted
                    ELSE NULL
                END,
                updated_at = NOW()
            FROM (
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE counted_quantity IS NOT NULL) AS counted,
                    COUNT(*) FILTER (WHERE variance IS NOT NULL AND variance <> 0) AS with_variance,
                    COALESCE(SUM(variance_cost), 0) AS variance_cost
                FROM cycle_count_items
                WHERE cycle_count_id = $1
            ) s
            WHERE c.id = $1
            ",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }
}
