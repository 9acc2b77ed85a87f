//! The multi-layer violation detector. Every layer runs independently and
//! contributes to one ordered multiset of violations per event; a single
//! alert is emitted per event if that multiset is non-empty.

use crate::anomaly::{AnomalyLabel, AnomalyScorer};
use crate::features::{build_features, FeatureKey};
use crate::normalize::hybrid_entity_id;
use chrono::{Timelike, Utc};
use ipnetwork::IpNetwork;
use sentinel_store::{AlertSeverity, CloudIdentity, CloudResource, EntityProfile, GenericAuditEvent, NewSecurityAlert, ResourceCriticality};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

const DESTRUCTIVE_PREFIXES: [&str; 8] = [
    "delete", "terminate", "destroy", "drop", "purge", "revoke", "shutdown", "kill",
];

struct Violation {
    tag: &'static str,
    severity: AlertSeverity,
}

/// Identity linkage discovered while scanning a batch: the profile for
/// `entity_id` should point at `identity_id`.
pub struct ProfileLinkUpdate {
    pub entity_id: String,
    pub identity_id: Uuid,
}

pub struct DetectorInputs<'a> {
    pub profiles_by_entity: &'a HashMap<String, EntityProfile>,
    pub identities_by_arn: &'a HashMap<String, CloudIdentity>,
    pub resources_by_id: &'a HashMap<String, CloudResource>,
    pub scorer: &'a AnomalyScorer,
}

pub struct DetectorOutput {
    pub alerts: Vec<NewSecurityAlert>,
    pub profile_links: Vec<ProfileLinkUpdate>,
    /// One entry per Layer F invocation ("anomaly", "normal", or "error"),
    /// for callers that want inference-outcome metrics without coupling
    /// this pure function to a metrics collector.
    pub anomaly_outcomes: Vec<&'static str>,
}

fn is_destructive_action(action_name: &str) -> bool {
    let lowered = action_name.trim().to_lowercase();
    DESTRUCTIVE_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

fn ip_in_any_cidr(ip: &str, cidrs: &[String]) -> bool {
    if ip.is_empty() {
        return false;
    }
    let Ok(addr) = IpAddr::from_str(ip) else {
        return false;
    };
    cidrs.iter().any(|cidr| {
        IpNetwork::from_str(cidr)
            .map(|net| net.contains(addr))
            .unwrap_or(false)
    })
}

/// True iff the event matches every non-empty auto dimension on the
/// profile, and at least one dimension is configured.
fn auto_profile_allows(profile: &EntityProfile, event: &GenericAuditEvent) -> bool {
    let hours_set: HashSet<i32> = profile.auto_common_hours.iter().copied().collect();
    let ips_set: HashSet<&str> = profile.auto_common_ips.iter().map(String::as_str).collect();
    let actions_set: HashSet<&str> = profile.auto_common_actions.iter().map(String::as_str).collect();

    if hours_set.is_empty() && ips_set.is_empty() && actions_set.is_empty() {
        return false;
    }

    let hour_ok = hours_set.is_empty() || hours_set.contains(&(event.event_time.hour() as i32));
    let ip_ok = ips_set.is_empty()
        || ips_set.contains(event.actor_ip_address.as_deref().unwrap_or(""));
    let action_ok = actions_set.is_empty() || actions_set.contains(event.action_name.as_str());

    hour_ok && ip_ok && action_ok
}

fn truncate_to_hour(ts: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    ts.date_naive().and_hms_opt(ts.hour(), 0, 0).unwrap().and_utc()
}

/// Analyzes one tenant's batch of persisted events, emitting at most one
/// alert per event and a list of profile-linkage updates to apply.
pub fn analyze_batch(
    organization_id: Uuid,
    events: &[GenericAuditEvent],
    inputs: &DetectorInputs<'_>,
) -> DetectorOutput {
    let mut alerts = Vec::new();
    let mut profile_links = Vec::new();
    let mut anomaly_outcomes = Vec::new();

    let features = build_features(events);

    for event in events {
        let entity_id = hybrid_entity_id(
            event.actor_identity.as_deref().unwrap_or(""),
            event.actor_ip_address.as_deref().unwrap_or(""),
        );
        let actor_arn = event.actor_identity.as_deref().unwrap_or("").trim();
        let profile = inputs.profiles_by_entity.get(&entity_id);
        let cloud_identity = if actor_arn.is_empty() {
            None
        } else {
            inputs.identities_by_arn.get(actor_arn)
        };
        let resource = event
            .target_resource
            .as_deref()
            .and_then(|r| inputs.resources_by_id.get(r));

        let mut violations: Vec<Violation> = Vec::new();
        let mut skip_ml = false;

        // Layer A — shadow identity.
        if !actor_arn.is_empty() {
            match cloud_identity {
                Some(identity) => {
                    if profile.map(|p| p.cloud_identity_id) != Some(Some(identity.id)) {
                        profile_links.push(ProfileLinkUpdate {
                            entity_id: entity_id.clone(),
                            identity_id: identity.id,
                        });
                    }
                }
                None => violations.push(Violation { tag: "SHADOW_IDENTITY", severity: AlertSeverity::Medium }),
            }
        }

        // Layer B — IP whitelist.
        if let Some(profile) = profile {
            if !profile.whitelisted_cidrs.is_empty() {
                let ip = event.actor_ip_address.as_deref().unwrap_or("");
                if !ip_in_any_cidr(ip, &profile.whitelisted_cidrs) {
                    violations.push(Violation { tag: "IP_VIOLATION", severity: AlertSeverity::Critical });
                }
            }
        }

        // Layer C — critical-resource tampering.
        if let Some(resource) = resource {
            if resource.criticality == ResourceCriticality::Critical && is_destructive_action(&event.action_name) {
                violations.push(Violation { tag: "CRITICAL_RESOURCE_TAMPERING", severity: AlertSeverity::High });
            }
        }

        // Layer D — manual allow/forbidden lists.
        if let Some(profile) = profile {
            if profile.manual_forbidden_actions.iter().any(|a| a == &event.action_name) {
                violations.push(Violation { tag: "FORBIDDEN_ACTION", severity: AlertSeverity::Medium });
            }
            if profile.manual_allowed_actions.iter().any(|a| a == &event.action_name) {
                skip_ml = true;
            }
        }

        // Layer E — auto-profile match decides whether ML runs at all.
        let run_ml = if skip_ml {
            false
        } else {
            match profile {
                Some(profile) => !auto_profile_allows(profile, event),
                None => true,
            }
        };

        // Layer F — anomaly scoring.
        if run_ml {
            let key: FeatureKey = (entity_id.clone(), truncate_to_hour(event.event_time));
            match inputs.scorer.score(&key, &features) {
                Ok(Some(AnomalyLabel::Anomaly)) => {
                    anomaly_outcomes.push("anomaly");
                    violations.push(Violation { tag: "ML_ANOMALY_DETECTED", severity: AlertSeverity::High });
                }
                Ok(Some(AnomalyLabel::Normal)) => anomaly_outcomes.push("normal"),
                Ok(None) => {}
                Err(e) => {
                    anomaly_outcomes.push("error");
                    warn!("anomaly inference failed for entity {}: {}", entity_id, e);
                }
            }
        }

        if violations.is_empty() {
            continue;
        }

        let max_severity = violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(AlertSeverity::Low);

        let rule_code = if violations.len() > 1 {
            "MULTIPLE_VIOLATIONS".to_string()
        } else {
            violations[0].tag.to_string()
        };

        let tags: Vec<&str> = violations.iter().map(|v| v.tag).collect();
        let target_id = resource
            .map(|r| r.resource_id.clone())
            .or_else(|| event.target_resource.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let description = format!(
            "Violations detected: {}. Details: action={}, resource={}, actor={}, ip={}.",
            tags.join(", "),
            event.action_name,
            target_id,
            entity_id,
            event.actor_ip_address.as_deref().unwrap_or(""),
        );

        alerts.push(NewSecurityAlert {
            event_id: event.event_id.clone(),
            rule_code,
            severity: max_severity,
            description,
            organization_id,
            cloud_identity_id: cloud_identity.map(|i| i.id),
            cloud_account_id: event.cloud_account_id,
        });
    }

    DetectorOutput { alerts, profile_links, anomaly_outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_store::ProfileMode;

    fn event(
        actor_identity: &str,
        actor_ip_address: &str,
        action_name: &str,
        target_resource: &str,
        hour: u32,
    ) -> GenericAuditEvent {
        GenericAuditEvent {
            id: 1,
            event_id: "evt-1".to_string(),
            event_time: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
            actor_identity: Some(actor_identity.to_string()).filter(|s| !s.is_empty()),
            actor_ip_address: Some(actor_ip_address.to_string()).filter(|s| !s.is_empty()),
            action_name: action_name.to_string(),
            target_resource: Some(target_resource.to_string()).filter(|s| !s.is_empty()),
            event_status: sentinel_store::EventStatus::Success,
            organization_id: Uuid::nil(),
            cloud_account_id: None,
        }
    }

    fn empty_profile(entity_id: &str) -> EntityProfile {
        EntityProfile {
            entity_id: entity_id.to_string(),
            organization_id: Uuid::nil(),
            cloud_identity_id: None,
            whitelisted_cidrs: Vec::new(),
            manual_allowed_actions: Vec::new(),
            manual_forbidden_actions: Vec::new(),
            auto_common_hours: Vec::new(),
            auto_common_ips: Vec::new(),
            auto_common_actions: Vec::new(),
            profile_mode: ProfileMode::Hybrid,
            updated_at: Utc::now(),
        }
    }

    fn no_scorer() -> AnomalyScorer {
        AnomalyScorer::load(None, None)
    }

    #[test]
    fn shadow_identity_when_no_matching_cloud_identity() {
        let events = vec![event(
            "arn:aws:iam::1:user/alice",
            "10.0.0.1",
            "GetObject",
            "s3://b/k",
            12,
        )];
        let profiles = HashMap::new();
        let identities = HashMap::new();
        let resources = HashMap::new();
        let scorer = no_scorer();
        let inputs = DetectorInputs {
            profiles_by_entity: &profiles,
            identities_by_arn: &identities,
            resources_by_id: &resources,
            scorer: &scorer,
        };

        let output = analyze_batch(Uuid::nil(), &events, &inputs);

        assert_eq!(output.alerts.len(), 1);
        assert_eq!(output.alerts[0].rule_code, "SHADOW_IDENTITY");
        assert_eq!(output.alerts[0].severity, AlertSeverity::Medium);
    }

    #[test]
    fn ip_violation_and_critical_tampering_combine_into_multiple_violations() {
        let events = vec![event(
            "",
            "8.8.8.8",
            "DeleteBucket",
            "arn:aws:s3:::prod",
            12,
        )];

        let mut profiles = HashMap::new();
        let mut profile = empty_profile("8.8.8.8");
        profile.whitelisted_cidrs = vec!["10.0.0.0/24".to_string()];
        profiles.insert("8.8.8.8".to_string(), profile);

        let mut resources = HashMap::new();
        resources.insert(
            "arn:aws:s3:::prod".to_string(),
            CloudResource {
                resource_id: "arn:aws:s3:::prod".to_string(),
                organization_id: Uuid::nil(),
                resource_type: "s3_bucket".to_string(),
                display_name: None,
                criticality: ResourceCriticality::Critical,
                custom_rules: serde_json::json!({}),
            },
        );

        let identities = HashMap::new();
        let scorer = no_scorer();
        let inputs = DetectorInputs {
            profiles_by_entity: &profiles,
            identities_by_arn: &identities,
            resources_by_id: &resources,
            scorer: &scorer,
        };

        let output = analyze_batch(Uuid::nil(), &events, &inputs);

        assert_eq!(output.alerts.len(), 1);
        let alert = &output.alerts[0];
        assert_eq!(alert.rule_code, "MULTIPLE_VIOLATIONS");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.description.contains("IP_VIOLATION"));
        assert!(alert.description.contains("CRITICAL_RESOURCE_TAMPERING"));
    }

    #[test]
    fn manual_allow_suppresses_ml_and_emits_no_alert() {
        let events = vec![event(
            "",
            "203.0.113.9",
            "AssumeRole",
            "",
            3,
        )];

        let mut profiles = HashMap::new();
        let mut profile = empty_profile("203.0.113.9");
        profile.manual_allowed_actions = vec!["AssumeRole".to_string()];
        profile.auto_common_actions = vec!["ListBuckets".to_string()];
        profiles.insert("203.0.113.9".to_string(), profile);

        let identities = HashMap::new();
        let resources = HashMap::new();
        let scorer = no_scorer();
        let inputs = DetectorInputs {
            profiles_by_entity: &profiles,
            identities_by_arn: &identities,
            resources_by_id: &resources,
            scorer: &scorer,
        };

        let output = analyze_batch(Uuid::nil(), &events, &inputs);

        assert!(output.alerts.is_empty());
        assert!(output.anomaly_outcomes.is_empty());
    }

    #[test]
    fn auto_profile_match_skips_ml_and_emits_no_alert() {
        let events = vec![event(
            "",
            "10.0.0.1",
            "ListBuckets",
            "",
            14,
        )];

        let mut profiles = HashMap::new();
        let mut profile = empty_profile("10.0.0.1");
        profile.auto_common_hours = vec![14];
        profile.auto_common_ips = vec!["10.0.0.1".to_string()];
        profile.auto_common_actions = vec!["ListBuckets".to_string()];
        profiles.insert("10.0.0.1".to_string(), profile);

        let identities = HashMap::new();
        let resources = HashMap::new();
        let scorer = no_scorer();
        let inputs = DetectorInputs {
            profiles_by_entity: &profiles,
            identities_by_arn: &identities,
            resources_by_id: &resources,
            scorer: &scorer,
        };

        let output = analyze_batch(Uuid::nil(), &events, &inputs);

        assert!(output.alerts.is_empty());
        assert!(output.anomaly_outcomes.is_empty());
    }

    #[test]
    fn empty_violations_produce_no_alert() {
        let events: Vec<GenericAuditEvent> = Vec::new();
        let profiles = HashMap::new();
        let identities = HashMap::new();
        let resources = HashMap::new();
        let scorer = no_scorer();
        let inputs = DetectorInputs {
            profiles_by_entity: &profiles,
            identities_by_arn: &identities,
            resources_by_id: &resources,
            scorer: &scorer,
        };

        let output = analyze_batch(Uuid::nil(), &events, &inputs);
        assert!(output.alerts.is_empty());
    }
}
