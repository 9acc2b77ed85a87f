use crate::models::Organization;
use async_trait::async_trait;
use sentinel_core::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Read-only lookups; organizations themselves are created by the
/// registration collaborator outside this crate's scope.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn get(&self, organization_id: Uuid) -> Result<Option<Organization>>;
    async fn exists(&self, organization_id: Uuid) -> Result<bool>;
}

pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    async fn get(&self, organization_id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, Organization>(
            "SELECT id, name, created_at FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn exists(&self, organization_id: Uuid) -> Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM organizations WHERE id = $1)",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(exists,)| exists).unwrap_or(false))
    }
}
