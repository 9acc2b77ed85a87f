use crate::models::CloudResource;
use async_trait::async_trait;
use sentinel_core::error::Result;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// All resources for a tenant, keyed by `resource_id`. Used by the
    /// violation detector to preload its working set in one round-trip.
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, CloudResource>>;

    async fn get(&self, organization_id: Uuid, resource_id: &str) -> Result<Option<CloudResource>>;
}

pub struct PostgresResourceRepository {
    pool: PgPool,
}

impl PostgresResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceRepository for PostgresResourceRepository {
    async fn load_all_for_tenant(&self, organization_id: Uuid) -> Result<HashMap<String, CloudResource>> {
        let rows = sqlx::query_as::<_, CloudResource>(
            r#"
            SELECT resource_id, organization_id, resource_type, display_name, criticality, custom_rules
            FROM cloud_resources
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.resource_id.clone(), r)).collect())
    }

    async fn get(&self, organization_id: Uuid, resource_id: &str) -> Result<Option<CloudResource>> {
        let row = sqlx::query_as::<_, CloudResource>(
            r#"
            SELECT resource_id, organization_id, resource_type, display_name, criticality, custom_rules
            FROM cloud_resources
            WHERE organization_id = $1 AND resource_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
