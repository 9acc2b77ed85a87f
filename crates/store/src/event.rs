use crate::models::{GenericAuditEvent, NewAuditEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::error::Result;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Bulk-inserts a batch of events within the caller's transaction,
    /// returning the persisted rows (with assigned ids) in insertion order.
    async fn bulk_insert(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        events: &[NewAuditEvent],
    ) -> Result<Vec<GenericAuditEvent>>;

    /// Events for one organization (and optionally one cloud account)
    /// observed at or after `since`, ordered oldest-first. Used by the
    /// offline profile builder's lookback window.
    async fn load_since(
        &self,
        organization_id: Uuid,
        cloud_account_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<GenericAuditEvent>>;
}

pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn bulk_insert(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        events: &[NewAuditEvent],
    ) -> Result<Vec<GenericAuditEvent>> {
        let mut inserted = Vec::with_capacity(events.len());

        for event in events {
            let row = sqlx::query_as::<_, GenericAuditEvent>(
                r#"
                INSERT INTO audit_events (
                    event_id, event_time, actor_identity, actor_ip_address, action_name,
                    target_resource, event_status, organization_id, cloud_account_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, event_id, event_time, actor_identity, actor_ip_address,
                          action_name, target_resource, event_status, organization_id, cloud_account_id
                "#,
            )
            .bind(&event.event_id)
            .bind(event.event_time)
            .bind(&event.actor_identity)
            .bind(&event.actor_ip_address)
            .bind(&event.action_name)
            .bind(&event.target_resource)
            .bind(event.event_status)
            .bind(event.organization_id)
            .bind(event.cloud_account_id)
            .fetch_one(&mut **txn)
            .await?;

            inserted.push(row);
        }

        Ok(inserted)
    }

    async fn load_since(
        &self,
        organization_id: Uuid,
        cloud_account_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<GenericAuditEvent>> {
        let rows = sqlx::query_as::<_, GenericAuditEvent>(
            r#"
            SELECT id, event_id, event_time, actor_identity, actor_ip_address,
                   action_name, target_resource, event_status, organization_id, cloud_account_id
            FROM audit_events
            WHERE organization_id = $1
              AND ($2::uuid IS NULL OR cloud_account_id = $2)
              AND event_time >= $3
            ORDER BY event_time ASC
            "#,
        )
        .bind(organization_id)
        .bind(cloud_account_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
