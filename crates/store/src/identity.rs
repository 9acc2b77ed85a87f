use crate::models::{CloudIdentity, IdentityType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::error::Result;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// All identities for a tenant, keyed by `identity_arn`. Used by the
    /// violation detector to preload its working set in one round-trip.
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, CloudIdentity>>;

    async fn get_by_arn(&self, organization_id: Uuid, identity_arn: &str) -> Result<Option<CloudIdentity>>;

    /// Upsert keyed on `(organization_id, identity_arn)`. `created_at` is
    /// only set if the existing row had none and a valid value was given.
    async fn upsert(
        &self,
        organization_id: Uuid,
        identity_arn: &str,
        identity_name: Option<String>,
        identity_type: Option<IdentityType>,
        is_mfa_enabled: Option<bool>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<CloudIdentity>;

    /// Records that an event's actor resolved to this identity, so the
    /// profile's `cloud_identity_id` linkage stays current. Runs inside
    /// the caller's transaction so it shares the flush's atomicity.
    async fn link_profile(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        organization_id: Uuid,
        entity_id: &str,
        identity_id: Uuid,
    ) -> Result<()>;
}

pub struct PostgresIdentityRepository {
    pool: PgPool,
}

impl PostgresIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, CloudIdentity>> {
        let rows = sqlx::query_as::<_, CloudIdentity>(
            r#"
            SELECT id, organization_id, identity_arn, identity_name, identity_type,
                   is_mfa_enabled, cloud_account_id, discovered_at, last_updated_at
            FROM cloud_identities
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.identity_arn.clone(), r)).collect())
    }

    async fn get_by_arn(&self, organization_id: Uuid, identity_arn: &str) -> Result<Option<CloudIdentity>> {
        let row = sqlx::query_as::<_, CloudIdentity>(
            r#"
            SELECT id, organization_id, identity_arn, identity_name, identity_type,
                   is_mfa_enabled, cloud_account_id, discovered_at, last_updated_at
            FROM cloud_identities
            WHERE organization_id = $1 AND identity_arn = $2
            "#,
        )
        .bind(organization_id)
        .bind(identity_arn)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert(
        &self,
        organization_id: Uuid,
        identity_arn: &str,
        identity_name: Option<String>,
        identity_type: Option<IdentityType>,
        is_mfa_enabled: Option<bool>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<CloudIdentity> {
        let identity_type = identity_type.unwrap_or(IdentityType::IamUser);
        let is_mfa_enabled = is_mfa_enabled.unwrap_or(false);
        let now = Utc::now();

        let row = sqlx::query_as::<_, CloudIdentity>(
            r#"
            INSERT INTO cloud_identities (
                id, organization_id, identity_arn, identity_name, identity_type,
                is_mfa_enabled, cloud_account_id, discovered_at, last_updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $8)
            ON CONFLICT (organization_id, identity_arn) DO UPDATE SET
                identity_name = EXCLUDED.identity_name,
                identity_type = EXCLUDED.identity_type,
                is_mfa_enabled = EXCLUDED.is_mfa_enabled,
                discovered_at = COALESCE(cloud_identities.discovered_at, EXCLUDED.discovered_at),
                last_updated_at = EXCLUDED.last_updated_at
            RETURNING id, organization_id, identity_arn, identity_name, identity_type,
                      is_mfa_enabled, cloud_account_id, discovered_at, last_updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(identity_arn)
        .bind(identity_name)
        .bind(identity_type)
        .bind(is_mfa_enabled)
        .bind(created_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn link_profile(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        organization_id: Uuid,
        entity_id: &str,
        identity_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entity_profiles
            SET cloud_identity_id = $3
            WHERE organization_id = $1 AND entity_id = $2 AND cloud_identity_id IS DISTINCT FROM $3
            "#,
        )
        .bind(organization_id)
        .bind(entity_id)
        .bind(identity_id)
        .execute(&mut **txn)
        .await?;

        Ok(())
    }
}
