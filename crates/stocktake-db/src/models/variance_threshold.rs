//! Variance threshold row model: per-tenant classification bounds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use stocktake_counts::variance::VarianceThresholds;

/// Per-tenant variance thresholds as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VarianceThresholdRow {
    pub tenant_id: Uuid,
    pub percent_threshold: Decimal,
    pub cost_threshold: Decimal,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl From<VarianceThresholdRow> for VarianceThresholds {
    fn from(row: VarianceThresholdRow) -> Self {
        Self {
            tenant_id: row.tenant_id,
            percent_threshold: row.percent_threshold,
            cost_threshold: row.cost_threshold,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

impl VarianceThresholdRow {
    /// Get thresholds for a tenant.
    pub async fn find(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM variance_thresholds
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Insert or replace a tenant's thresholds.
    pub async fn upsert(
        pool: &sqlx::PgPool,
        thresholds: &VarianceThresholds,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO variance_thresholds (
                tenant_id, percent_threshold, cost_threshold, updated_by
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE
            SET percent_threshold = EXCLUDED.percent_threshold,
                cost_threshold = EXCLUDED.cost_threshold,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING *
            ",
        )
        .bind(thresholds.tenant_id)
        .bind(thresholds.percent_threshold)
        .bind(thresholds.cost_threshold)
        .bind(thresholds.updated_by)
        .fetch_one(pool)
        .await
    }

    /// Delete a tenant's thresholds, reverting it to the engine defaults.
    pub async fn delete(pool: &sqlx::PgPool, tenant_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM variance_thresholds
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_domain_conversion() {
        let row = VarianceThresholdRow {
            tenant_id: Uuid::new_v4(),
            percent_threshold: Decimal::from(8),
            cost_threshold: Decimal::from(250),
            updated_by: Uuid::new_v4(),
            updated_at: Utc::now(),
        };
        let domain: VarianceThresholds = row.clone().into();
        assert_eq!(domain.tenant_id, row.tenant_id);
        assert_eq!(domain.percent_threshold, Decimal::from(8));
        assert_eq!(domain.cost_threshold, Decimal::from(250));
    }
}
