//! Cloud security telemetry API server.
//!
//! Two things happen here: a long-running bus consumer normalizes and
//! scores incoming audit events in the background, and an Axum HTTP
//! server exposes the results to the outside world — a websocket alert
//! stream, a Prometheus scrape endpoint, and health checks. Both halves
//! share one database pool and one `AlertBroadcaster`.

use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sentinel_auth::JwtTokenVerifier;
use sentinel_core::{
    security::JwtService, Config, CorsConfig, DatabasePool, MetricsRegistry,
};
use sentinel_engine::{
    consumer::{run_consume_loop, ConsumerContext},
    AlertBroadcaster, AnomalyScorer, Bus, EngineMetrics, KafkaBus,
};
use sentinel_store::{
    PostgresAlertRepository, PostgresEventRepository, PostgresIdentityRepository,
    PostgresProfileRepository, PostgresResourceRepository, PostgresUserRepository,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api_middleware;
mod error;
mod error_handler;
mod handlers;
mod health;
mod state;

use crate::state::AppState;

fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            cors_config.allowed_origins.iter().map(|origin| origin.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> =
            cors_config.allowed_methods.iter().map(|method| method.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> =
            cors_config.allowed_headers.iter().map(|header| header.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    if !cors_config.expose_headers.is_empty() {
        let expose_headers: Result<Vec<HeaderName>, _> =
            cors_config.expose_headers.iter().map(|header| header.parse()).collect();
        cors = cors.expose_headers(expose_headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("starting sentinel-api");

    let config = Config::load()?;
    info!("configuration loaded");

    let db = DatabasePool::new(config.database.clone()).await?;
    info!("database pool initialized");

    run_migrations(&db).await?;
    info!("database migrations complete");

    let metrics_registry = MetricsRegistry::new(config.metrics.clone());
    let engine_metrics = Arc::new(EngineMetrics::new(&config.metrics.namespace)?);
    metrics_registry.with_registry(|registry| engine_metrics.register_all(registry))?;

    let pool = db.get().clone();
    let events_repo = Arc::new(PostgresEventRepository::new(pool.clone()));
    let alerts_repo = Arc::new(PostgresAlertRepository::new(pool.clone()));
    let identities_repo = Arc::new(PostgresIdentityRepository::new(pool.clone()));
    let profiles_repo = Arc::new(PostgresProfileRepository::new(pool.clone()));
    let resources_repo = Arc::new(PostgresResourceRepository::new(pool.clone()));
    let users_repo = Arc::new(PostgresUserRepository::new(pool.clone()));

    let scorer = Arc::new(AnomalyScorer::load(config.anomaly.scaler_path.as_deref(), config.anomaly.model_path.as_deref()));
    if !scorer.is_loaded() {
        warn!("anomaly scorer artifacts not configured or unreadable; anomaly layer will yield no signal");
    }

    let broadcaster = AlertBroadcaster::new();

    let jwt_service = JwtService::new(&config.jwt)?;
    let token_verifier = Arc::new(JwtTokenVerifier::new(jwt_service, users_repo));

    let shutdown_tx = if config.bus.enable_consumer {
        let bus: Arc<dyn Bus> = Arc::new(
            KafkaBus::connect(
                &config.bus.bootstrap_servers,
                &config.bus.group_id,
                &config.bus.events_topic,
                &config.bus.identities_topic,
            )
            .await?,
        );

        let ctx = ConsumerContext {
            pool: pool.clone(),
            bus,
            events_repo: events_repo.clone(),
            alerts_repo: alerts_repo.clone(),
            identities_repo,
            profiles_repo,
            resources_repo,
            scorer,
            broadcaster: broadcaster.clone(),
            metrics: engine_metrics.clone(),
            events_topic: config.bus.events_topic.clone(),
            identities_topic: config.bus.identities_topic.clone(),
            batch_size: config.bus.batch_size,
            flush_interval: Duration::from_secs(config.bus.flush_interval_seconds),
            poll_timeout: Duration::from_millis(config.bus.poll_timeout_ms),
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        let consumer_task = tokio::spawn(async move {
            if let Err(e) = run_consume_loop(ctx, rx).await {
                warn!("consume loop exited with an error: {}", e);
            }
        });
        Some((tx, consumer_task))
    } else {
        info!("bus consumer disabled by configuration; serving API against existing data only");
        None
    };

    let app_state = AppState {
        config: config.clone(),
        db,
        alerts_repo,
        broadcaster,
        token_verifier,
        metrics_registry,
        engine_metrics,
    };

    let app = create_app(app_state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some((tx, consumer_task)) = shutdown_tx {
        let _ = tx.send(());
        if let Err(e) = consumer_task.await {
            warn!("consume loop task panicked during shutdown: {}", e);
        }
    }

    info!("server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    let cors = build_cors_layer(&state.config.cors)?;

    let router = Router::new()
        .route("/ws/alerts", get(handlers::alerts::alert_stream))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::security_headers::security_headers_middleware))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "resource not found" })))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_api=debug,sentinel_engine=debug,sentinel_auth=debug,sentinel_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_migrations(db: &DatabasePool) -> Result<(), sqlx::Error> {
    info!("running database migrations");
    let migrator = sqlx::migrate!("../../migrations");
    migrator.run(db.get()).await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
