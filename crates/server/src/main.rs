use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lapse_core::capture::CameraClient;
use lapse_core::config::AppConfig;
use lapse_core::frames::FrameStore;
use lapse_core::stats::CachedStats;
use lapse_core::status::RunStatus;
use lapse_db::users::UserRepo;
use lapse_server::{background, schedule, worker::Worker};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lapse_server=debug,lapse_core=debug,lapse_db=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let mut config = AppConfig::from_env();
    config
        .ensure_data_dirs()
        .expect("failed to create data directories");
    tracing::info!(
        data_dir = %config.data_dir.display(),
        host = %config.ufp_host,
        "loaded configuration"
    );

    // --- Database ---
    let pool = lapse_db::create_pool(&config.db_path())
        .await
        .expect("failed to open database");
    lapse_db::health_check(&pool)
        .await
        .expect("database health check failed");
    lapse_db::run_migrations(&pool)
        .await
        .expect("failed to run database migrations");
    tracing::info!(db = %config.db_path().display(), "database ready");

    // --- Initial admin user ---
    let admin_exists = UserRepo::exists(&pool, "admin")
        .await
        .expect("failed to check for admin user");
    if !admin_exists {
        if config.admin_password.is_empty() {
            panic!("ADMIN_PASSWORD must be set to create the initial admin user");
        }
        UserRepo::create(&pool, "admin", &config.admin_password, true)
            .await
            .expect("failed to create initial admin user");
    }

    // --- Shared state ---
    let store = FrameStore::new(&config);
    let run_status = RunStatus::new();
    let cached_stats = CachedStats::new();
    let camera = CameraClient::from_config(&config).expect("failed to build camera client");
    let cancel = CancellationToken::new();

    // --- Background tasks ---
    let capture_handle = tokio::spawn(background::capture::run(
        camera.clone(),
        store.clone(),
        config.snapshot_interval_secs,
        cancel.clone(),
    ));

    let scheduler_handle = tokio::spawn(schedule::run(
        pool.clone(),
        config.clone(),
        cancel.clone(),
    ));

    let worker = Worker::new(pool.clone(), config.clone(), store.clone(), run_status.clone());
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let share_sweep_handle = tokio::spawn(background::share_sweep::run(
        pool.clone(),
        cancel.clone(),
    ));

    let stats_handle = tokio::spawn(background::stats_refresh::run(
        cached_stats.clone(),
        store.clone(),
        run_status.clone(),
        camera.clone(),
        config.days_of_24_hour_snapshots,
        cancel.clone(),
    ));

    tracing::info!(
        capture_interval = config.snapshot_interval_secs,
        video_interval = config.video_interval_secs,
        "all tasks started"
    );

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    for (name, handle) in [
        ("capture", capture_handle),
        ("scheduler", scheduler_handle),
        ("worker", worker_handle),
        ("share-sweep", share_sweep_handle),
        ("stats", stats_handle),
    ] {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            tracing::warn!(task = name, "task did not stop in time");
        }
    }

    pool.close().await;
    tracing::info!("graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
