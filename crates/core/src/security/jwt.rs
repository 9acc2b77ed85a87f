use crate::{config::JwtConfig, error::Result, types::JwtClaims, Error};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

/// Verifies bearer/websocket-query-param tokens minted by the external
/// identity provider. Token *issuance* lives outside this service; `encode`
/// exists only so test fixtures can mint a token without a live IdP.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self> {
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry: Duration::seconds(config.access_token_expiry),
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<JwtClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::new(crate::error::ErrorCode::TokenInvalid, format!("invalid access token: {e}")))?;

        Ok(token_data.claims)
    }

    #[cfg(any(test, feature = "test-fixtures"))]
    pub fn mint_test_token(&self, user_id: &str, tenant_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            roles: vec![],
            permissions: vec![],
            exp: (now + self.access_token_expiry).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            impersonator_id: None,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::new(crate::error::ErrorCode::TokenInvalid, format!("failed to mint token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "a-test-secret-that-is-long-enough-for-hs256".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 86400,
        }
    }

    #[test]
    fn round_trips_a_minted_token() {
        let svc = JwtService::new(&config()).unwrap();
        let token = svc.mint_test_token("user-1", "org-1").unwrap();
        let claims = svc.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id, "org-1");
    }

    #[test]
    fn rejects_garbage_tokens() {
        let svc = JwtService::new(&config()).unwrap();
        assert!(svc.verify_access_token("not-a-jwt").is_err());
    }
}
