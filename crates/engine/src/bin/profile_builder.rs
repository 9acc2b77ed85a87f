//! Offline CLI entry point for (re)building entity profiles from a
//! lookback window of persisted events. Intended to run on a schedule
//! (cron, a Kubernetes CronJob) alongside the always-on consumer.

use clap::Parser;
use sentinel_core::{Config, DatabasePool};
use sentinel_engine::profiles::{build_profiles, DEFAULT_LOOKBACK_DAYS, DEFAULT_THRESHOLD};
use sentinel_store::{PostgresEventRepository, PostgresProfileRepository};
use std::process::ExitCode;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "sentinel-profile-builder", about = "Rebuilds entity behavior profiles from recent audit events")]
struct Args {
    /// Organization whose entities should be profiled.
    #[arg(long = "org-id", alias = "organization-id")]
    organization_id: Uuid,

    /// Restrict the lookback window to a single cloud account.
    #[arg(long = "account-id", alias = "cloud-account-id")]
    cloud_account_id: Option<Uuid>,

    /// Cumulative frequency share an entity's "common" hours/IPs/actions must cover.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Number of days of history to consider.
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    days: i64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if !(args.threshold > 0.0 && args.threshold <= 1.0) {
        error!("--threshold must be in (0, 1], got {}", args.threshold);
        return ExitCode::FAILURE;
    }
    if args.days < 1 {
        error!("--days must be >= 1, got {}", args.days);
        return ExitCode::FAILURE;
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let db = match DatabasePool::new(config.database.clone()).await {
        Ok(db) => db,
        Err(e) => {
            error!("failed to connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let events_repo = PostgresEventRepository::new(db.get().clone());
    let profiles_repo = PostgresProfileRepository::new(db.get().clone());

    let result = build_profiles(
        &events_repo,
        &profiles_repo,
        args.organization_id,
        args.cloud_account_id,
        args.threshold,
        args.days,
    )
    .await;

    match result {
        Ok(count) => {
            info!("rebuilt {} entity profile(s) for organization {}", count, args.organization_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("profile build failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
