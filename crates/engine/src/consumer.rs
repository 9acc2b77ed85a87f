//! The long-running ingestion loop: poll the bus, normalize and buffer
//! each message, flush on the buffer's own schedule, and publish any
//! alerts a flush produces. Topic routing, batching thresholds, and the
//! best-effort final flush on shutdown all mirror the offline consumer
//! this service replaced.

use crate::anomaly::AnomalyScorer;
use crate::broadcaster::AlertBroadcaster;
use crate::buffer::{flush_batch, BatchBuffer};
use crate::bus::{Bus, BusMessage};
use crate::metrics::EngineMetrics;
use crate::normalize::{normalize_event, normalize_identity};
use sentinel_core::error::Result;
use sentinel_store::{AlertRepository, EventRepository, IdentityRepository, NewAuditEvent, ProfileRepository, ResourceRepository};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything the consume loop needs, gathered in one place so the API
/// server's startup sequence has a single value to construct and hand
/// off to a spawned task.
pub struct ConsumerContext {
    pub pool: PgPool,
    pub bus: Arc<dyn Bus>,
    pub events_repo: Arc<dyn EventRepository>,
    pub alerts_repo: Arc<dyn AlertRepository>,
    pub identities_repo: Arc<dyn IdentityRepository>,
    pub profiles_repo: Arc<dyn ProfileRepository>,
    pub resources_repo: Arc<dyn ResourceRepository>,
    pub scorer: Arc<AnomalyScorer>,
    pub broadcaster: AlertBroadcaster,
    pub metrics: Arc<EngineMetrics>,
    pub events_topic: String,
    pub identities_topic: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub poll_timeout: Duration,
}

/// Runs until `shutdown` resolves, then performs one best-effort final
/// flush of whatever is still buffered before returning.
pub async fn run_consume_loop(ctx: ConsumerContext, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
    let mut buffer = BatchBuffer::new(ctx.batch_size, ctx.flush_interval);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("consume loop received shutdown signal");
                break;
            }
            poll_result = ctx.bus.poll_batch(ctx.poll_timeout) => {
                match poll_result {
                    Ok(messages) => {
                        for message in messages {
                            handle_message(&ctx, &mut buffer, message).await;
                        }
                    }
                    Err(e) => {
                        warn!("bus poll failed, backing off before retrying: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                }
            }
        }

        if buffer.should_flush() {
            run_flush(&ctx, &mut buffer, "threshold").await;
        }
    }

    if !buffer.is_empty() {
        run_flush(&ctx, &mut buffer, "shutdown").await;
    }

    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

async fn handle_message(ctx: &ConsumerContext, buffer: &mut BatchBuffer, message: BusMessage) {
    let Some(bytes) = message.payload.filter(|b| !b.is_empty()) else {
        ctx.metrics.events_dropped_total.with_label_values(&["empty_payload"]).inc();
        return;
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("invalid JSON received on topic {}: {}", message.topic, e);
            ctx.metrics.events_dropped_total.with_label_values(&["invalid_json"]).inc();
            return;
        }
    };

    if !payload.is_object() {
        warn!("ignoring non-object payload on topic {}", message.topic);
        ctx.metrics.events_dropped_total.with_label_values(&["not_an_object"]).inc();
        return;
    }

    if message.topic == ctx.identities_topic {
        handle_identity_payload(ctx, &payload).await;
        return;
    }

    match normalize_event(&payload) {
        Some(event) => {
            buffer.push(NewAuditEvent {
                event_id: event.event_id,
                event_time: event.event_time,
                actor_identity: non_empty(event.actor_identity),
                actor_ip_address: non_empty(event.actor_ip_address),
                action_name: event.action_name,
                target_resource: non_empty(event.target_resource),
                event_status: event.event_status,
                organization_id: event.organization_id,
                cloud_account_id: None,
            });
            ctx.metrics.events_ingested_total.with_label_values(&["events"]).inc();
        }
        None => {
            warn!("dropping event payload without a valid organization_id");
            ctx.metrics.events_dropped_total.with_label_values(&["missing_organization_id"]).inc();
        }
    }
}

async fn handle_identity_payload(ctx: &ConsumerContext, payload: &Value) {
    let Some(identity) = normalize_identity(payload) else {
        warn!("dropping identity payload missing organization_id or identity_arn");
        ctx.metrics.events_dropped_total.with_label_values(&["missing_fields"]).inc();
        return;
    };

    let result = ctx
        .identities_repo
        .upsert(
            identity.organization_id,
            &identity.identity_arn,
            identity.identity_name,
            identity.identity_type,
            identity.is_mfa_enabled,
            identity.created_at,
        )
        .await;

    match result {
        Ok(_) => ctx.metrics.events_ingested_total.with_label_values(&["identities"]).inc(),
        Err(e) => warn!("failed to upsert cloud identity {}: {}", identity.identity_arn, e),
    }
}

async fn run_flush(ctx: &ConsumerContext, buffer: &mut BatchBuffer, trigger: &str) {
    let pending = buffer.take();
    if pending.is_empty() {
        return;
    }
    let batch_len = pending.len();
    let started = Instant::now();

    let result = flush_batch(
        &ctx.pool,
        ctx.events_repo.as_ref(),
        ctx.alerts_repo.as_ref(),
        ctx.profiles_repo.as_ref(),
        ctx.identities_repo.as_ref(),
        ctx.resources_repo.as_ref(),
        ctx.scorer.as_ref(),
        pending,
    )
    .await;

    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(outcome) => {
            ctx.metrics.flushes_total.with_label_values(&[trigger, "success"]).inc();
            ctx.metrics.flush_duration_seconds.with_label_values(&["success"]).observe(elapsed);
            for outcome_label in &outcome.anomaly_outcomes {
                ctx.metrics.anomaly_inferences_total.with_label_values(&[outcome_label]).inc();
            }
            info!(
                "flushed batch of {} events ({} persisted), {} alert(s) emitted",
                batch_len,
                outcome.events_persisted,
                outcome.alerts.len()
            );
            for alert in &outcome.alerts {
                ctx.metrics.alerts_emitted_total.with_label_values(&[alert.severity.as_str()]).inc();
                ctx.broadcaster.publish(alert).await;
            }
        }
        Err(e) => {
            ctx.metrics.flushes_total.with_label_values(&[trigger, "failure"]).inc();
            ctx.metrics.flush_duration_seconds.with_label_values(&["failure"]).observe(elapsed);
            warn!("flush failed for batch of {} events, batch is lost: {}", batch_len, e);
        }
    }
}
