//! Tenant-scoped persistence for audit events, alerts, identities,
//! resources, and behavior profiles. Every query here takes an
//! `organization_id` and filters by it; there is no global listing.

pub mod alert;
pub mod event;
pub mod identity;
pub mod models;
pub mod organization;
pub mod profile;
pub mod resource;
pub mod user;

pub use alert::{AlertRepository, PostgresAlertRepository};
pub use event::{EventRepository, PostgresEventRepository};
pub use identity::{IdentityRepository, PostgresIdentityRepository};
pub use organization::{OrganizationRepository, PostgresOrganizationRepository};
pub use profile::{PostgresProfileRepository, ProfileRepository};
pub use resource::{PostgresResourceRepository, ResourceRepository};
pub use user::{PostgresUserRepository, UserRepository};

pub use models::*;
