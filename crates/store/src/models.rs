use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cloud_provider", rename_all = "UPPERCASE")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "identity_type", rename_all = "UPPERCASE")]
pub enum IdentityType {
    IamUser,
    IamRole,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resource_criticality", rename_all = "UPPERCASE")]
pub enum ResourceCriticality {
    Low,
    Standard,
    Critical,
}

impl Default for ResourceCriticality {
    fn default() -> Self {
        ResourceCriticality::Standard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "UPPERCASE")]
pub enum EventStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "profile_mode", rename_all = "UPPERCASE")]
pub enum ProfileMode {
    Auto,
    Manual,
    Hybrid,
}

impl Default for ProfileMode {
    fn default() -> Self {
        ProfileMode::Hybrid
    }
}

/// Severity ordering matches LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "alert_severity", rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Viewer,
}

/// A member of an organization. Account lifecycle (invitation, password
/// reset, role changes) is handled by the collaborator that owns user
/// management; this crate only reads what the websocket and API layers
/// need to resolve a bearer token to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CloudAccount {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider: CloudProvider,
    pub region: String,
    pub credentials_blob: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CloudIdentity {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub identity_arn: String,
    pub identity_name: Option<String>,
    pub identity_type: IdentityType,
    pub is_mfa_enabled: bool,
    pub cloud_account_id: Option<Uuid>,
    pub discovered_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CloudResource {
    pub resource_id: String,
    pub organization_id: Uuid,
    pub resource_type: String,
    pub display_name: Option<String>,
    pub criticality: ResourceCriticality,
    pub custom_rules: serde_json::Value,
}

/// The audit event ingested from the bus, after normalization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenericAuditEvent {
    pub id: i64,
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor_identity: Option<String>,
    pub actor_ip_address: Option<String>,
    pub action_name: String,
    pub target_resource: Option<String>,
    pub event_status: EventStatus,
    pub organization_id: Uuid,
    pub cloud_account_id: Option<Uuid>,
}

/// A row ready for bulk insertion; `id` is assigned by the database.
/// `event_id` is the canonical id produced during normalization, kept
/// alongside the row so alerts can reference the source event by it.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor_identity: Option<String>,
    pub actor_ip_address: Option<String>,
    pub action_name: String,
    pub target_resource: Option<String>,
    pub event_status: EventStatus,
    pub organization_id: Uuid,
    pub cloud_account_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityProfile {
    pub entity_id: String,
    pub organization_id: Uuid,
    pub cloud_identity_id: Option<Uuid>,
    pub whitelisted_cidrs: Vec<String>,
    pub manual_allowed_actions: Vec<String>,
    pub manual_forbidden_actions: Vec<String>,
    pub auto_common_hours: Vec<i32>,
    pub auto_common_ips: Vec<String>,
    pub auto_common_actions: Vec<String>,
    pub profile_mode: ProfileMode,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityAlert {
    pub id: i64,
    pub event_id: String,
    pub rule_code: String,
    pub severity: AlertSeverity,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub organization_id: Uuid,
    pub cloud_identity_id: Option<Uuid>,
    pub cloud_account_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewSecurityAlert {
    pub event_id: String,
    pub rule_code: String,
    pub severity: AlertSeverity,
    pub description: String,
    pub organization_id: Uuid,
    pub cloud_identity_id: Option<Uuid>,
    pub cloud_account_id: Option<Uuid>,
}
