//! Websocket endpoint that streams security alerts to a subscribed
//! organization: an initial snapshot of its most recent alerts, followed
//! by every new alert as it's emitted.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use sentinel_core::error::ErrorCode;
use sentinel_core::Error;
use sentinel_engine::broadcaster::clamp_snapshot_limit;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertStreamQuery {
    token: String,
    initial_limit: Option<i64>,
}

/// `GET /ws/alerts?token=...&initial_limit=...`. The token is passed as a
/// query parameter rather than an `Authorization` header because browser
/// websocket clients cannot set custom headers on the upgrade request.
pub async fn alert_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<AlertStreamQuery>,
) -> impl IntoResponse {
    let authenticated = match state.token_verifier.verify(&query.token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("rejected alert-stream subscriber: {}", e);
            return ApiError::from(Error::new(ErrorCode::AuthenticationFailed, "invalid or expired token"))
                .into_response();
        }
    };

    let snapshot_limit = clamp_snapshot_limit(query.initial_limit);

    ws.on_upgrade(move |socket| stream_alerts(socket, state, authenticated.organization_id, snapshot_limit))
        .into_response()
}

async fn stream_alerts(mut socket: WebSocket, state: AppState, organization_id: Uuid, snapshot_limit: i64) {
    let mut subscription = match state
        .broadcaster
        .subscribe(state.alerts_repo.as_ref(), organization_id, snapshot_limit)
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("failed to subscribe organization {} to alert stream: {}", organization_id, e);
            let _ = socket.close().await;
            return;
        }
    };

    state.engine_metrics.subscriber_count.inc();
    info!("organization {} subscribed to alert stream", organization_id);

    loop {
        tokio::select! {
            frame = subscription.receiver.recv() => {
                match frame {
                    Some(value) => {
                        if socket.send(Message::Text(value.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    subscription.unsubscribe().await;
    state.engine_metrics.subscriber_count.dec();
    info!("organization {} unsubscribed from alert stream", organization_id);
}
