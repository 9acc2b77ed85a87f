use async_trait::async_trait;
use sentinel_core::security::JwtService;
use sentinel_store::UserRepository;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// The organization-scoped identity behind a bearer token, resolved and
/// validated against the user directory — not just decoded off the JWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is malformed or expired: {0}")]
    InvalidToken(String),
    #[error("token subject is not a valid user id")]
    MalformedSubject,
    #[error("user not found")]
    UnknownUser,
    #[error("user account is disabled")]
    InactiveUser,
    #[error(transparent)]
    Store(#[from] sentinel_core::error::Error),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Decodes the bearer JWT, then re-resolves the subject against the user
/// directory rather than trusting the token's own tenant claim — mirrors
/// the lookup the websocket gateway performs before admitting a
/// subscriber, so a deactivated account loses access immediately rather
/// than waiting for its token to expire.
pub struct JwtTokenVerifier {
    jwt: JwtService,
    users: Arc<dyn UserRepository>,
}

impl JwtTokenVerifier {
    pub fn new(jwt: JwtService, users: Arc<dyn UserRepository>) -> Self {
        Self { jwt, users }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self
            .jwt
            .verify_access_token(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::MalformedSubject)?;

        let user = self.users.get(user_id).await?.ok_or(AuthError::UnknownUser)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        Ok(AuthenticatedUser {
            user_id: user.id,
            organization_id: user.organization_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sentinel_core::config::JwtConfig;
    use sentinel_store::{User, UserRole};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeUsers(Mutex<HashMap<Uuid, User>>);

    #[async_trait]
    impl UserRepository for FakeUsers {
        async fn get(&self, user_id: Uuid) -> sentinel_core::error::Result<Option<User>> {
            Ok(self.0.lock().unwrap().get(&user_id).cloned())
        }
    }

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "a-test-secret-that-is-long-enough-for-hs256".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 86400,
        }
    }

    fn user(id: Uuid, org: Uuid, active: bool) -> User {
        User {
            id,
            organization_id: org,
            email: "person@example.com".to_string(),
            role: UserRole::Viewer,
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolves_a_valid_token_to_its_organization() {
        let jwt = JwtService::new(&jwt_config()).unwrap();
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let token = jwt.mint_test_token(&user_id.to_string(), &org_id.to_string()).unwrap();

        let mut users = HashMap::new();
        users.insert(user_id, user(user_id, org_id, true));
        let verifier = JwtTokenVerifier::new(jwt, Arc::new(FakeUsers(Mutex::new(users))));

        let authenticated = verifier.verify(&token).await.unwrap();
        assert_eq!(authenticated.user_id, user_id);
        assert_eq!(authenticated.organization_id, org_id);
    }

    #[tokio::test]
    async fn rejects_a_deactivated_user() {
        let jwt = JwtService::new(&jwt_config()).unwrap();
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let token = jwt.mint_test_token(&user_id.to_string(), &org_id.to_string()).unwrap();

        let mut users = HashMap::new();
        users.insert(user_id, user(user_id, org_id, false));
        let verifier = JwtTokenVerifier::new(jwt, Arc::new(FakeUsers(Mutex::new(users))));

        assert!(matches!(verifier.verify(&token).await, Err(AuthError::InactiveUser)));
    }

    #[tokio::test]
    async fn rejects_an_unknown_user() {
        let jwt = JwtService::new(&jwt_config()).unwrap();
        let token = jwt.mint_test_token(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()).unwrap();

        let verifier = JwtTokenVerifier::new(jwt, Arc::new(FakeUsers(Mutex::new(HashMap::new()))));

        assert!(matches!(verifier.verify(&token).await, Err(AuthError::UnknownUser)));
    }

    #[tokio::test]
    async fn rejects_garbage_tokens() {
        let jwt = JwtService::new(&jwt_config()).unwrap();
        let verifier = JwtTokenVerifier::new(jwt, Arc::new(FakeUsers(Mutex::new(HashMap::new()))));

        assert!(matches!(verifier.verify("not-a-jwt").await, Err(AuthError::InvalidToken(_))));
    }
}
