use sentinel_auth::JwtTokenVerifier;
use sentinel_core::{Config, DatabasePool, MetricsRegistry};
use sentinel_engine::{AlertBroadcaster, EngineMetrics};
use sentinel_store::AlertRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub alerts_repo: Arc<dyn AlertRepository>,
    pub broadcaster: AlertBroadcaster,
    pub token_verifier: Arc<JwtTokenVerifier>,
    pub metrics_registry: MetricsRegistry,
    pub engine_metrics: Arc<EngineMetrics>,
}
