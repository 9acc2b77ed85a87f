//! Offline profile builder: derives the auto-learned "common" hours,
//! IPs, and actions per entity from a lookback window of events.

use crate::normalize::hybrid_entity_id;
use chrono::{Duration, Timelike, Utc};
use sentinel_core::error::Result;
use sentinel_store::{EventRepository, GenericAuditEvent, ProfileRepository};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Returns the smallest prefix of `values`, ordered by descending
/// normalized frequency, whose cumulative share reaches `threshold`.
/// `threshold` must be in `(0, 1]`.
pub fn cumulative_top<T: Eq + Hash + Clone>(values: impl IntoIterator<Item = T>, threshold: f64) -> Vec<T> {
    let mut order: Vec<T> = Vec::new();
    let mut counts: HashMap<T, usize> = HashMap::new();

    for v in values {
        counts
            .entry(v.clone())
            .and_modify(|c| *c += 1)
            .or_insert_with(|| {
                order.push(v.clone());
                1
            });
    }

    if order.is_empty() {
        return Vec::new();
    }

    let total = counts.values().sum::<usize>() as f64;
    let mut ranked: Vec<(T, f64)> = order
        .into_iter()
        .map(|k| {
            let freq = counts[&k] as f64 / total;
            (k, freq)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut result = Vec::new();
    let mut cumulative = 0.0;
    for (value, freq) in ranked {
        cumulative += freq;
        result.push(value);
        if cumulative >= threshold {
            break;
        }
    }
    result
}

struct EntityObservations {
    hours: Vec<i32>,
    ips: Vec<String>,
    actions: Vec<String>,
}

fn group_by_entity(events: &[GenericAuditEvent]) -> HashMap<String, EntityObservations> {
    let mut groups: HashMap<String, EntityObservations> = HashMap::new();

    for event in events {
        let entity_id = hybrid_entity_id(
            event.actor_identity.as_deref().unwrap_or(""),
            event.actor_ip_address.as_deref().unwrap_or(""),
        );
        if entity_id.is_empty() {
            continue;
        }

        let group = groups.entry(entity_id).or_insert_with(|| EntityObservations {
            hours: Vec::new(),
            ips: Vec::new(),
            actions: Vec::new(),
        });

        group.hours.push(event.event_time.hour() as i32);
        if let Some(ip) = &event.actor_ip_address {
            if !ip.is_empty() {
                group.ips.push(ip.clone());
            }
        }
        if !event.action_name.is_empty() {
            group.actions.push(event.action_name.clone());
        }
    }

    groups
}

/// Runs the offline profile-building job for one organization (and
/// optionally one cloud account) and upserts the resulting auto-learned
/// fields. Idempotent: re-running with the same inputs yields the same
/// lists, only `updated_at` advances.
pub async fn build_profiles(
    events: &dyn EventRepository,
    profiles: &dyn ProfileRepository,
    organization_id: Uuid,
    cloud_account_id: Option<Uuid>,
    threshold: f64,
    lookback_days: i64,
) -> Result<usize> {
    let since = Utc::now() - Duration::days(lookback_days.max(1));
    let rows = events.load_since(organization_id, cloud_account_id, since).await?;

    if rows.is_empty() {
        info!("no audit events found for organization {} in lookback window", organization_id);
        return Ok(0);
    }

    let groups = group_by_entity(&rows);
    let entity_count = groups.len();

    for (entity_id, observations) in groups {
        let common_hours = cumulative_top(observations.hours, threshold);
        let common_ips = cumulative_top(observations.ips, threshold);
        let common_actions = cumulative_top(observations.actions, threshold);

        profiles
            .upsert_auto_fields(organization_id, &entity_id, common_hours, common_ips, common_actions)
            .await?;
    }

    info!("upserted {} entity profiles for organization {}", entity_count, organization_id);
    Ok(entity_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_top_matches_the_worked_example() {
        let values = vec!["A", "A", "A", "A", "A", "A", "B", "B", "C", "C"];
        let result = cumulative_top(values, 0.8);
        assert_eq!(result, vec!["A", "B"]);
    }

    #[test]
    fn single_value_returns_itself() {
        let result = cumulative_top(vec!["only"], 1.0);
        assert_eq!(result, vec!["only"]);
    }

    #[test]
    fn empty_input_returns_empty() {
        let result: Vec<&str> = cumulative_top(Vec::<&str>::new(), 0.8);
        assert!(result.is_empty());
    }
}
