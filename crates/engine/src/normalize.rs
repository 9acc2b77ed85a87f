//! Adapts heterogeneous bus payloads into the canonical shapes the rest of
//! the engine works with. Topic routing happens in [`crate::consumer`]
//! before either normalize function here runs.

use chrono::{DateTime, TimeZone, Utc};
use sentinel_store::{EventStatus, IdentityType};
use serde_json::Value;
use uuid::Uuid;

const INVALID_IDENTITY_VALUES: [&str; 4] = ["nan", "none", "anonymous", "unknown"];

#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor_identity: String,
    pub actor_ip_address: String,
    pub action_name: String,
    pub target_resource: String,
    pub event_status: EventStatus,
    pub organization_id: Uuid,
    pub cloud_provider: String,
    pub raw_log: Value,
}

#[derive(Debug, Clone)]
pub struct NormalizedIdentity {
    pub organization_id: Uuid,
    pub identity_arn: String,
    pub identity_name: Option<String>,
    pub identity_type: Option<IdentityType>,
    pub is_mfa_enabled: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Returns the canonical hybrid entity id for a normalized event: the
/// actor identity when it is present and not one of a handful of
/// meaningless placeholders, else the source IP.
pub fn hybrid_entity_id(actor_identity: &str, actor_ip_address: &str) -> String {
    let identity = actor_identity.trim();
    if !identity.is_empty() && !INVALID_IDENTITY_VALUES.contains(&identity.to_lowercase().as_str()) {
        identity.to_string()
    } else {
        actor_ip_address.trim().to_string()
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    Some(cur)
}

fn nested_str(value: &Value, path: &[&str]) -> Option<String> {
    nested(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parses either an ISO-8601 string or an epoch-seconds number into UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_f64().and_then(|secs| {
            let nanos = (secs.fract() * 1e9) as u32;
            Utc.timestamp_opt(secs.trunc() as i64, nanos).single()
        }),
        _ => None,
    }
}

fn resolve_event_time(payload: &Value, raw: &Value) -> Option<DateTime<Utc>> {
    for source in [
        payload.get("event_time"),
        raw.get("event_time"),
        raw.get("eventTime"),
    ] {
        if let Some(v) = source {
            if let Some(parsed) = parse_timestamp(v) {
                return Some(parsed);
            }
        }
    }
    None
}

fn resolve_actor_identity(payload: &Value, raw: &Value) -> String {
    non_empty_str(payload, "actor_identity")
        .or_else(|| non_empty_str(raw, "actor_identity"))
        .or_else(|| nested_str(raw, &["userIdentity", "userName"]))
        .or_else(|| nested_str(raw, &["userIdentity", "arn"]))
        .or_else(|| non_empty_str(raw, "AccessKeyId"))
        .unwrap_or_default()
}

fn resolve_actor_ip(payload: &Value, raw: &Value) -> String {
    non_empty_str(payload, "actor_ip_address")
        .or_else(|| non_empty_str(raw, "actor_ip_address"))
        .or_else(|| non_empty_str(raw, "sourceIPAddress"))
        .or_else(|| non_empty_str(payload, "ip"))
        .unwrap_or_default()
}

fn resolve_action_name(payload: &Value, raw: &Value) -> String {
    non_empty_str(payload, "action_name")
        .or_else(|| non_empty_str(raw, "action_name"))
        .or_else(|| non_empty_str(raw, "eventName"))
        .unwrap_or_default()
}

fn resolve_target_resource(payload: &Value, raw: &Value) -> String {
    if let Some(v) = non_empty_str(payload, "target_resource") {
        return v;
    }
    if let Some(v) = non_empty_str(raw, "target_resource") {
        return v;
    }
    let req = raw.get("requestParameters").cloned().unwrap_or(Value::Null);
    let bucket = non_empty_str(&req, "bucketName")
        .or_else(|| non_empty_str(&req, "bucket"))
        .or_else(|| non_empty_str(&req, "name"));
    let key = non_empty_str(&req, "key").or_else(|| non_empty_str(&req, "objectKey"));
    let instance = non_empty_str(&req, "instanceId").or_else(|| non_empty_str(&req, "imageId"));

    if let (Some(bucket), Some(key)) = (&bucket, &key) {
        return format!("s3://{}/{}", bucket, key);
    }
    if let Some(bucket) = bucket {
        return format!("s3://{}", bucket);
    }
    if let Some(instance) = instance {
        return instance;
    }

    non_empty_str(raw, "eventSource")
        .or_else(|| non_empty_str(&req, "resource"))
        .or_else(|| non_empty_str(&req, "groupId"))
        .unwrap_or_default()
}

fn resolve_event_status(payload: &Value, raw: &Value) -> EventStatus {
    if let Some(v) = non_empty_str(payload, "event_status").or_else(|| non_empty_str(raw, "event_status")) {
        return if v.eq_ignore_ascii_case("FAILURE") {
            EventStatus::Failure
        } else {
            EventStatus::Success
        };
    }
    if raw.get("errorCode").is_some() || raw.get("errorMessage").is_some() {
        return EventStatus::Failure;
    }
    if raw.get("responseElements").map(Value::is_null).unwrap_or(false)
        && raw.as_object().map(|o| o.contains_key("responseElements")).unwrap_or(false)
    {
        return EventStatus::Failure;
    }
    EventStatus::Success
}

fn resolve_cloud_provider(payload: &Value, raw: &Value) -> String {
    if let Some(v) = non_empty_str(payload, "cloud_provider").or_else(|| non_empty_str(raw, "cloud_provider")) {
        return v;
    }
    "AWS".to_string()
}

fn resolve_event_id(payload: &Value, raw: &Value) -> String {
    non_empty_str(payload, "event_id")
        .or_else(|| non_empty_str(raw, "event_id"))
        .or_else(|| non_empty_str(raw, "eventID"))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn resolve_organization_id(payload: &Value) -> Option<Uuid> {
    payload
        .get("organization_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Normalizes a decoded JSON event payload into a canonical event, or
/// `None` if a required field (`organization_id`) is missing/invalid.
/// Idempotent: feeding an already-normalized payload back through yields
/// the same result, since every field is re-derived from the same
/// precedence rules regardless of how many passes have run.
pub fn normalize_event(payload: &Value) -> Option<NormalizedEvent> {
    let organization_id = resolve_organization_id(payload)?;
    let raw = payload.get("raw").cloned().unwrap_or_else(|| payload.clone());

    let event_time = resolve_event_time(payload, &raw).unwrap_or_else(Utc::now);

    Some(NormalizedEvent {
        event_id: resolve_event_id(payload, &raw),
        event_time,
        actor_identity: resolve_actor_identity(payload, &raw),
        actor_ip_address: resolve_actor_ip(payload, &raw),
        action_name: resolve_action_name(payload, &raw),
        target_resource: resolve_target_resource(payload, &raw),
        event_status: resolve_event_status(payload, &raw),
        organization_id,
        cloud_provider: resolve_cloud_provider(payload, &raw),
        raw_log: raw,
    })
}

/// Normalizes an identity payload, or `None` if `organization_id` or
/// `identity_arn` is missing/invalid.
pub fn normalize_identity(payload: &Value) -> Option<NormalizedIdentity> {
    let organization_id = resolve_organization_id(payload)?;
    let identity_arn = non_empty_str(payload, "identity_arn")?;

    let identity_type = non_empty_str(payload, "identity_type").and_then(|t| match t.to_uppercase().as_str() {
        "IAM_USER" => Some(IdentityType::IamUser),
        "IAM_ROLE" => Some(IdentityType::IamRole),
        "ROOT" => Some(IdentityType::Root),
        _ => None,
    });

    let is_mfa_enabled = payload.get("is_mfa_enabled").and_then(Value::as_bool);
    let created_at = payload.get("created_at").and_then(parse_timestamp);

    Some(NormalizedIdentity {
        organization_id,
        identity_arn,
        identity_name: non_empty_str(payload, "identity_name"),
        identity_type,
        is_mfa_enabled,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hybrid_entity_id_prefers_actor_identity() {
        assert_eq!(hybrid_entity_id("alice", "10.0.0.1"), "alice");
    }

    #[test]
    fn hybrid_entity_id_falls_back_to_ip_for_placeholder_identities() {
        for placeholder in ["nan", "None", "ANONYMOUS", "unknown", ""] {
            assert_eq!(hybrid_entity_id(placeholder, "10.0.0.1"), "10.0.0.1");
        }
    }

    #[test]
    fn normalize_event_adapts_cloudtrail_shaped_payload() {
        let org_id = Uuid::new_v4();
        let payload = json!({
            "organization_id": org_id.to_string(),
            "raw": {
                "eventTime": "2026-01-01T12:00:00Z",
                "eventName": "DeleteBucket",
                "sourceIPAddress": "8.8.8.8",
                "userIdentity": {"arn": "arn:aws:iam::1:user/alice"},
                "requestParameters": {"bucketName": "prod-data"},
                "errorCode": "AccessDenied",
            }
        });

        let normalized = normalize_event(&payload).expect("should normalize");
        assert_eq!(normalized.organization_id, org_id);
        assert_eq!(normalized.actor_identity, "arn:aws:iam::1:user/alice");
        assert_eq!(normalized.actor_ip_address, "8.8.8.8");
        assert_eq!(normalized.action_name, "DeleteBucket");
        assert_eq!(normalized.target_resource, "s3://prod-data");
        assert_eq!(normalized.event_status, EventStatus::Failure);
        assert_eq!(normalized.cloud_provider, "AWS");
    }

    #[test]
    fn normalize_event_prefers_top_level_fields_over_raw() {
        let org_id = Uuid::new_v4();
        let payload = json!({
            "organization_id": org_id.to_string(),
            "action_name": "ListBuckets",
            "raw": {"eventName": "DeleteBucket"},
        });

        let normalized = normalize_event(&payload).expect("should normalize");
        assert_eq!(normalized.action_name, "ListBuckets");
    }

    #[test]
    fn normalize_event_rejects_missing_organization_id() {
        let payload = json!({"action_name": "ListBuckets"});
        assert!(normalize_event(&payload).is_none());
    }

    #[test]
    fn normalize_event_is_idempotent() {
        let org_id = Uuid::new_v4();
        let payload = json!({
            "organization_id": org_id.to_string(),
            "event_time": "2026-01-01T12:00:00Z",
            "actor_identity": "alice",
            "actor_ip_address": "10.0.0.1",
            "action_name": "GetObject",
            "target_resource": "s3://b/k",
            "event_status": "SUCCESS",
        });

        let first = normalize_event(&payload).expect("first pass normalizes");
        let reencoded = json!({
            "organization_id": first.organization_id.to_string(),
            "event_id": first.event_id,
            "event_time": first.event_time.to_rfc3339(),
            "actor_identity": first.actor_identity,
            "actor_ip_address": first.actor_ip_address,
            "action_name": first.action_name,
            "target_resource": first.target_resource,
            "event_status": if first.event_status == EventStatus::Failure { "FAILURE" } else { "SUCCESS" },
            "cloud_provider": first.cloud_provider,
        });
        let second = normalize_event(&reencoded).expect("second pass normalizes");

        assert_eq!(first.event_id, second.event_id);
        assert_eq!(first.event_time, second.event_time);
        assert_eq!(first.actor_identity, second.actor_identity);
        assert_eq!(first.actor_ip_address, second.actor_ip_address);
        assert_eq!(first.action_name, second.action_name);
        assert_eq!(first.target_resource, second.target_resource);
        assert_eq!(first.event_status, second.event_status);
    }

    #[test]
    fn normalize_identity_requires_arn() {
        let payload = json!({"organization_id": Uuid::new_v4().to_string()});
        assert!(normalize_identity(&payload).is_none());
    }

    #[test]
    fn normalize_identity_defaults_unparseable_type_to_none() {
        let org_id = Uuid::new_v4();
        let payload = json!({
            "organization_id": org_id.to_string(),
            "identity_arn": "arn:aws:iam::1:user/bob",
            "identity_type": "bogus",
        });
        let normalized = normalize_identity(&payload).expect("should normalize");
        assert_eq!(normalized.identity_type, None);
    }
}
