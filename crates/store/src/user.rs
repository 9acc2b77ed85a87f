use crate::models::User;
use async_trait::async_trait;
use sentinel_core::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Read-only lookups for resolving an authenticated subject to its
/// organization. Accounts themselves are created and managed by the
/// registration collaborator outside this crate's scope.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<User>>;
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT id, organization_id, email, role, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
