use crate::models::{NewSecurityAlert, SecurityAlert};
use async_trait::async_trait;
use sentinel_core::error::Result;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Bulk-inserts alerts within the caller's transaction, returning the
    /// persisted rows (with assigned ids) in insertion order.
    async fn bulk_insert(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        alerts: &[NewSecurityAlert],
    ) -> Result<Vec<SecurityAlert>>;

    /// The `limit` newest alerts for one organization, descending by
    /// `created_at`. Used to build a subscriber's initial snapshot.
    async fn newest_for_tenant(&self, organization_id: Uuid, limit: i64) -> Result<Vec<SecurityAlert>>;
}

pub struct PostgresAlertRepository {
    pool: PgPool,
}

impl PostgresAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    async fn bulk_insert(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        alerts: &[NewSecurityAlert],
    ) -> Result<Vec<SecurityAlert>> {
        let mut inserted = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let row = sqlx::query_as::<_, SecurityAlert>(
                r#"
                INSERT INTO security_alerts (
                    event_id, rule_code, severity, description, organization_id,
                    cloud_identity_id, cloud_account_id, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                RETURNING id, event_id, rule_code, severity, description, created_at,
                          organization_id, cloud_identity_id, cloud_account_id
                "#,
            )
            .bind(&alert.event_id)
            .bind(&alert.rule_code)
            .bind(alert.severity)
            .bind(&alert.description)
            .bind(alert.organization_id)
            .bind(alert.cloud_identity_id)
            .bind(alert.cloud_account_id)
            .fetch_one(&mut **txn)
            .await?;

            inserted.push(row);
        }

        Ok(inserted)
    }

    async fn newest_for_tenant(&self, organization_id: Uuid, limit: i64) -> Result<Vec<SecurityAlert>> {
        let rows = sqlx::query_as::<_, SecurityAlert>(
            r#"
            SELECT id, event_id, rule_code, severity, description, created_at,
                   organization_id, cloud_identity_id, cloud_account_id
            FROM security_alerts
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
