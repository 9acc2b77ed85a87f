use crate::models::EntityProfile;
use async_trait::async_trait;
use chrono::Utc;
use sentinel_core::error::Result;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// All profiles for a tenant, keyed by `entity_id`. Used by the
    /// violation detector to preload its working set in one round-trip.
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, EntityProfile>>;

    async fn get(&self, organization_id: Uuid, entity_id: &str) -> Result<Option<EntityProfile>>;

    /// Materializes a profile with default (empty) lists on first sighting
    /// of an entity. No-op if a profile already exists.
    async fn ensure_exists(&self, organization_id: Uuid, entity_id: &str) -> Result<EntityProfile>;

    /// Upserts the auto-learned fields computed by the offline builder,
    /// keyed on the tenant-scoped `(organization_id, entity_id)` pair.
    async fn upsert_auto_fields(
        &self,
        organization_id: Uuid,
        entity_id: &str,
        auto_common_hours: Vec<i32>,
        auto_common_ips: Vec<String>,
        auto_common_actions: Vec<String>,
    ) -> Result<EntityProfile>;
}

pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PROFILE_COLUMNS: &str = r#"
    entity_id, organization_id, cloud_identity_id, whitelisted_cidrs,
    manual_allowed_actions, manual_forbidden_actions, auto_common_hours,
    auto_common_ips, auto_common_actions, profile_mode, updated_at
"#;

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, EntityProfile>> {
        let sql = format!(
            "SELECT {} FROM entity_profiles WHERE organization_id = $1",
            PROFILE_COLUMNS
        );
        let rows = sqlx::query_as::<_, EntityProfile>(&sql)
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| (r.entity_id.clone(), r)).collect())
    }

    async fn get(&self, organization_id: Uuid, entity_id: &str) -> Result<Option<EntityProfile>> {
        let sql = format!(
            "SELECT {} FROM entity_profiles WHERE organization_id = $1 AND entity_id = $2",
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, EntityProfile>(&sql)
            .bind(organization_id)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn ensure_exists(&self, organization_id: Uuid, entity_id: &str) -> Result<EntityProfile> {
        let sql = format!(
            r#"
            INSERT INTO entity_profiles (
                entity_id, organization_id, cloud_identity_id, whitelisted_cidrs,
                manual_allowed_actions, manual_forbidden_actions, auto_common_hours,
                auto_common_ips, auto_common_actions, profile_mode, updated_at
            ) VALUES ($1, $2, NULL, '{{}}', '{{}}', '{{}}', '{{}}', '{{}}', '{{}}', 'HYBRID', $3)
            ON CONFLICT (organization_id, entity_id) DO UPDATE SET entity_id = entity_profiles.entity_id
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let row = sqlx::query_as::<_, EntityProfile>(&sql)
            .bind(entity_id)
            .bind(organization_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn upsert_auto_fields(
        &self,
        organization_id: Uuid,
        entity_id: &str,
        auto_common_hours: Vec<i32>,
        auto_common_ips: Vec<String>,
        auto_common_actions: Vec<String>,
    ) -> Result<EntityProfile> {
        let sql = format!(
            r#"
            INSERT INTO entity_profiles (
                entity_id, organization_id, cloud_identity_id, whitelisted_cidrs,
                manual_allowed_actions, manual_forbidden_actions, auto_common_hours,
                auto_common_ips, auto_common_actions, profile_mode, updated_at
            ) VALUES ($1, $2, NULL, '{{}}', '{{}}', '{{}}', $3, $4, $5, 'HYBRID', $6)
            ON CONFLICT (organization_id, entity_id) DO UPDATE SET
                auto_common_hours = EXCLUDED.auto_common_hours,
                auto_common_ips = EXCLUDED.auto_common_ips,
                auto_common_actions = EXCLUDED.auto_common_actions,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let row = sqlx::query_as::<_, EntityProfile>(&sql)
            .bind(entity_id)
            .bind(organization_id)
            .bind(auto_common_hours)
            .bind(auto_common_ips)
            .bind(auto_common_actions)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }
}
