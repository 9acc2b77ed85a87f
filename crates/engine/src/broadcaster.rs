//! Per-tenant subscriber registry for live alert fan-out. Holds no
//! persistent state: a restart loses all subscribers, who simply
//! reconnect and get a fresh snapshot.

use dashmap::DashMap;
use sentinel_store::{AlertRepository, SecurityAlert};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_SNAPSHOT_LIMIT: i64 = 50;
pub const MIN_SNAPSHOT_LIMIT: i64 = 1;
pub const MAX_SNAPSHOT_LIMIT: i64 = 200;

pub fn clamp_snapshot_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_SNAPSHOT_LIMIT)
        .clamp(MIN_SNAPSHOT_LIMIT, MAX_SNAPSHOT_LIMIT)
}

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<Value>,
}

/// A handle a connection owner uses to both receive pushed frames and
/// unsubscribe on disconnect.
pub struct Subscription {
    pub receiver: mpsc::Receiver<Value>,
    id: Uuid,
    organization_id: Uuid,
    broadcaster: Arc<AlertBroadcasterInner>,
}

impl Subscription {
    pub async fn unsubscribe(&self) {
        self.broadcaster.unsubscribe(self.organization_id, self.id).await;
    }
}

struct AlertBroadcasterInner {
    subscribers: DashMap<Uuid, Mutex<Vec<Subscriber>>>,
}

impl AlertBroadcasterInner {
    async fn unsubscribe(&self, organization_id: Uuid, subscriber_id: Uuid) {
        let Some(entry) = self.subscribers.get(&organization_id) else {
            return;
        };
        let mut guard = entry.lock().await;
        guard.retain(|s| s.id != subscriber_id);
        let is_empty = guard.is_empty();
        drop(guard);
        if is_empty {
            drop(entry);
            self.subscribers.remove(&organization_id);
        }
    }
}

/// Shared, cheaply cloneable broadcaster instance.
#[derive(Clone)]
pub struct AlertBroadcaster {
    inner: Arc<AlertBroadcasterInner>,
}

impl AlertBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AlertBroadcasterInner {
                subscribers: DashMap::new(),
            }),
        }
    }

    /// Registers a new subscriber and returns a subscription carrying the
    /// initial snapshot frame as its first queued message. The caller is
    /// responsible for draining `receiver` and calling `unsubscribe` on
    /// disconnect.
    pub async fn subscribe(
        &self,
        alerts: &dyn AlertRepository,
        organization_id: Uuid,
        snapshot_limit: i64,
    ) -> sentinel_core::error::Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = Uuid::new_v4();

        self.inner
            .subscribers
            .entry(organization_id)
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .await
            .push(Subscriber { id, sender: tx.clone() });

        let newest = alerts.newest_for_tenant(organization_id, snapshot_limit).await?;
        let snapshot = json!({
            "type": "snapshot",
            "items": newest.into_iter().map(alert_frame).collect::<Vec<_>>(),
        });
        // Best-effort: the channel was just created, so this only fails if
        // the receiver was dropped before it was ever read, which cannot
        // happen for a freshly constructed pair.
        let _ = tx.send(snapshot).await;

        Ok(Subscription {
            receiver: rx,
            id,
            organization_id,
            broadcaster: self.inner.clone(),
        })
    }

    pub async fn unsubscribe(&self, organization_id: Uuid, subscriber_id: Uuid) {
        self.inner.unsubscribe(organization_id, subscriber_id).await;
    }

    /// Pushes a freshly created alert to every live subscriber for its
    /// tenant. Subscribers whose channel is full or closed are dropped
    /// silently; this never surfaces an error to the caller.
    pub async fn publish(&self, alert: &SecurityAlert) {
        let Some(entry) = self.inner.subscribers.get(&alert.organization_id) else {
            return;
        };
        let frame = alert_frame(alert.clone());
        let mut guard = entry.lock().await;
        let mut dead = Vec::new();
        for subscriber in guard.iter() {
            if subscriber.sender.try_send(frame.clone()).is_err() {
                dead.push(subscriber.id);
            }
        }
        if !dead.is_empty() {
            guard.retain(|s| !dead.contains(&s.id));
            debug!("dropped {} dead subscriber(s) for org {}", dead.len(), alert.organization_id);
        }
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn alert_frame(alert: SecurityAlert) -> Value {
    json!({
        "id": alert.id,
        "event_id": alert.event_id,
        "rule_code": alert.rule_code,
        "severity": alert.severity.as_str(),
        "description": alert.description,
        "created_at": alert.created_at,
        "organization_id": alert.organization_id,
        "cloud_identity_id": alert.cloud_identity_id,
        "cloud_account_id": alert.cloud_account_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_store::{AlertSeverity, NewSecurityAlert};
    use sqlx::{Postgres, Transaction};

    struct FixedAlertRepository {
        alerts: Vec<SecurityAlert>,
    }

    #[async_trait]
    impl AlertRepository for FixedAlertRepository {
        async fn bulk_insert(
            &self,
            _txn: &mut Transaction<'_, Postgres>,
            _alerts: &[NewSecurityAlert],
        ) -> sentinel_core::error::Result<Vec<SecurityAlert>> {
            unimplemented!("not exercised by broadcaster tests")
        }

        async fn newest_for_tenant(&self, organization_id: Uuid, limit: i64) -> sentinel_core::error::Result<Vec<SecurityAlert>> {
            Ok(self
                .alerts
                .iter()
                .filter(|a| a.organization_id == organization_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    fn alert(organization_id: Uuid) -> SecurityAlert {
        SecurityAlert {
            id: 1,
            event_id: "evt-1".to_string(),
            rule_code: "SHADOW_IDENTITY".to_string(),
            severity: AlertSeverity::Medium,
            description: "test".to_string(),
            created_at: chrono::Utc::now(),
            organization_id,
            cloud_identity_id: None,
            cloud_account_id: None,
        }
    }

    #[test]
    fn clamp_snapshot_limit_clamps_to_bounds() {
        assert_eq!(clamp_snapshot_limit(None), DEFAULT_SNAPSHOT_LIMIT);
        assert_eq!(clamp_snapshot_limit(Some(0)), MIN_SNAPSHOT_LIMIT);
        assert_eq!(clamp_snapshot_limit(Some(10_000)), MAX_SNAPSHOT_LIMIT);
        assert_eq!(clamp_snapshot_limit(Some(75)), 75);
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_snapshot() {
        let org = Uuid::new_v4();
        let repo = FixedAlertRepository { alerts: vec![alert(org)] };
        let broadcaster = AlertBroadcaster::new();

        let mut subscription = broadcaster.subscribe(&repo, org, 50).await.unwrap();
        let frame = subscription.receiver.recv().await.expect("snapshot frame");
        assert_eq!(frame["type"], "snapshot");
        assert_eq!(frame["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers_of_the_same_tenant() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let repo = FixedAlertRepository { alerts: Vec::new() };
        let broadcaster = AlertBroadcaster::new();

        let mut sub_a = broadcaster.subscribe(&repo, org_a, 50).await.unwrap();
        let mut sub_b = broadcaster.subscribe(&repo, org_b, 50).await.unwrap();
        // drain the initial snapshot frames
        sub_a.receiver.recv().await.unwrap();
        sub_b.receiver.recv().await.unwrap();

        broadcaster.publish(&alert(org_a)).await;

        let live = sub_a.receiver.recv().await.expect("live alert for org_a");
        assert_eq!(live["rule_code"], "SHADOW_IDENTITY");
        assert!(sub_b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscriber_and_drops_empty_org_entries() {
        let org = Uuid::new_v4();
        let repo = FixedAlertRepository { alerts: Vec::new() };
        let broadcaster = AlertBroadcaster::new();

        let mut subscription = broadcaster.subscribe(&repo, org, 50).await.unwrap();
        subscription.receiver.recv().await.unwrap();

        subscription.unsubscribe().await;
        assert!(!broadcaster.inner.subscribers.contains_key(&org));

        // publishing after unsubscribe must not panic or deliver anything
        broadcaster.publish(&alert(org)).await;
    }
}
