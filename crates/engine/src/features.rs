//! Hourly aggregation of events into the fixed feature vector the
//! anomaly scorer consumes.

use crate::normalize::hybrid_entity_id;
use chrono::{DateTime, Timelike, Utc};
use sentinel_store::{EventStatus, GenericAuditEvent};
use std::collections::{HashMap, HashSet};

pub const FEATURE_COLUMNS: [&str; 5] = [
    "event_count",
    "failure_ratio",
    "unique_ips",
    "critical_actions_count",
    "is_night",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub event_count: i64,
    pub failure_ratio: f64,
    pub unique_ips: i64,
    pub critical_actions_count: i64,
    pub is_night: i64,
}

impl FeatureRow {
    pub fn as_vector(&self) -> [f64; 5] {
        [
            self.event_count as f64,
            self.failure_ratio,
            self.unique_ips as f64,
            self.critical_actions_count as f64,
            self.is_night as f64,
        ]
    }
}

pub type FeatureKey = (String, DateTime<Utc>);

struct Accumulator {
    event_count: i64,
    failure_count: i64,
    ips: HashSet<String>,
    critical_actions_count: i64,
    hour: u32,
}

fn is_critical_action(action_name: &str) -> bool {
    let lowered = action_name.to_lowercase();
    lowered.starts_with("delete") || lowered.starts_with("terminate")
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap()
        .and_utc()
}

fn is_night_hour(hour: u32) -> bool {
    (0..=6).contains(&hour) || (21..=23).contains(&hour)
}

/// Builds the `(entity_id, hour_window)` feature table for a batch of
/// already-persisted events. Events with unparseable timestamps never
/// reach this stage (normalization always produces a valid `event_time`),
/// so there is nothing to drop here.
pub fn build_features(events: &[GenericAuditEvent]) -> HashMap<FeatureKey, FeatureRow> {
    let mut accumulators: HashMap<FeatureKey, Accumulator> = HashMap::new();

    for event in events {
        let entity_id = hybrid_entity_id(
            event.actor_identity.as_deref().unwrap_or(""),
            event.actor_ip_address.as_deref().unwrap_or(""),
        );
        let window = truncate_to_hour(event.event_time);
        let key = (entity_id, window);

        let acc = accumulators.entry(key).or_insert_with(|| Accumulator {
            event_count: 0,
            failure_count: 0,
            ips: HashSet::new(),
            critical_actions_count: 0,
            hour: window.hour(),
        });

        acc.event_count += 1;
        if event.event_status == EventStatus::Failure {
            acc.failure_count += 1;
        }
        if let Some(ip) = &event.actor_ip_address {
            if !ip.is_empty() {
                acc.ips.insert(ip.clone());
            }
        }
        if is_critical_action(&event.action_name) {
            acc.critical_actions_count += 1;
        }
    }

    accumulators
        .into_iter()
        .map(|(key, acc)| {
            let failure_ratio = if acc.event_count > 0 {
                acc.failure_count as f64 / acc.event_count as f64
            } else {
                0.0
            };
            let row = FeatureRow {
                event_count: acc.event_count,
                failure_ratio,
                unique_ips: acc.ips.len() as i64,
                critical_actions_count: acc.critical_actions_count,
                is_night: if is_night_hour(acc.hour) { 1 } else { 0 },
            };
            (key, row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_store::EventStatus;
    use uuid::Uuid;

    fn event(hour: u32, status: EventStatus, ip: &str, action: &str) -> GenericAuditEvent {
        GenericAuditEvent {
            id: 1,
            event_id: "e1".to_string(),
            event_time: Utc.with_ymd_and_hms(2026, 1, 1, hour, 15, 0).unwrap(),
            actor_identity: Some("alice".to_string()),
            actor_ip_address: Some(ip.to_string()),
            action_name: action.to_string(),
            target_resource: None,
            event_status: status,
            organization_id: Uuid::new_v4(),
            cloud_account_id: None,
        }
    }

    #[test]
    fn night_hours_are_flagged_correctly() {
        let events = vec![
            event(2, EventStatus::Success, "10.0.0.1", "GetObject"),
            event(22, EventStatus::Success, "10.0.0.1", "GetObject"),
            event(14, EventStatus::Success, "10.0.0.1", "GetObject"),
        ];
        let features = build_features(&events);
        for (key, row) in features.iter() {
            if key.1.hour() == 2 || key.1.hour() == 22 {
                assert_eq!(row.is_night, 1);
            } else {
                assert_eq!(row.is_night, 0);
            }
        }
    }

    #[test]
    fn critical_actions_and_failure_ratio_accumulate() {
        let events = vec![
            event(10, EventStatus::Failure, "10.0.0.1", "DeleteBucket"),
            event(10, EventStatus::Success, "10.0.0.2", "GetObject"),
        ];
        let features = build_features(&events);
        assert_eq!(features.len(), 1);
        let row = features.values().next().unwrap();
        assert_eq!(row.event_count, 2);
        assert_eq!(row.unique_ips, 2);
        assert_eq!(row.critical_actions_count, 1);
        assert!((row.failure_ratio - 0.5).abs() < f64::EPSILON);
    }
}
