#[cfg(test)]
mod tests {
    use crate::Permission;

    #[test]
    fn permission_formats_as_resource_colon_action() {
        let permission = Permission::new("alert", "read");
        assert_eq!(permission.resource, "alert");
        assert_eq!(permission.action, "read");
        assert_eq!(permission.to_string(), "alert:read");
    }

    #[test]
    fn jwt_claims_round_trip_through_json() {
        use crate::types::JwtClaims;

        let claims = JwtClaims {
            sub: "user-1".to_string(),
            tenant_id: "org-1".to_string(),
            roles: vec!["ADMIN".to_string()],
            permissions: vec!["alert:read".to_string()],
            exp: 1_900_000_000,
            iat: 1_800_000_000,
            jti: "jti-1".to_string(),
            impersonator_id: None,
        };

        let serialized = serde_json::to_string(&claims).unwrap();
        let deserialized: JwtClaims = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.sub, claims.sub);
        assert_eq!(deserialized.tenant_id, claims.tenant_id);
    }
}
