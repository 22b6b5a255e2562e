//! lovejournal-api - HTTP API server and job scheduler for Love Journal

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lovejournal_api::{cors_layer, router, AppConfig, AppState, StoreBackend};
use lovejournal_core::{DocumentStore, IdentityProvider, ImageStore};
use lovejournal_db::{Database, InMemoryStore, PoolConfig};
use lovejournal_jobs::{
    AccountReaper, AuditPruneHandler, ReaperHandler, SchedulerBuilder, SchedulerConfig,
    SchedulerEvent, StatsRefreshHandler,
};
use lovejournal_media::{CloudinaryClient, HttpIdentityProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "lovejournal_api=debug,lovejournal_jobs=info,tower_http=info".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("lovejournal-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;
    info!(
        environment = ?config.environment,
        prefix = config.environment.prefix(),
        store_backend = ?config.store_backend,
        "Configuration loaded"
    );

    let store: DocumentStore = match config.store_backend {
        StoreBackend::Postgres => {
            let db = Database::connect_with_config(
                &config.database_url,
                config.environment,
                PoolConfig::from_env(),
            )
            .await?;
            db.migrate().await?;
            info!("Database migrations applied");
            db.document_store()
        }
        StoreBackend::Memory => {
            warn!("Using in-memory document store; data is lost on restart");
            InMemoryStore::new().document_store()
        }
    };

    let cloudinary = CloudinaryClient::from_env()?;
    let root_folder = cloudinary.root_folder().to_string();
    let images: Arc<dyn ImageStore> = Arc::new(cloudinary);
    let identity: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::from_env()?);

    let reaper = Arc::new(
        AccountReaper::new(store.clone(), images.clone(), identity.clone())
            .with_root_folder(root_folder.clone()),
    );
    let scheduler = SchedulerBuilder::new()
        .with_config(SchedulerConfig::from_env())
        .with_handler(ReaperHandler::new(
            reaper.clone(),
            config.schedules.reaper,
        ))
        .with_handler(AuditPruneHandler::new(
            store.clone(),
            config.schedules.audit_prune,
        ))
        .with_handler(StatsRefreshHandler::new(
            store.clone(),
            config.schedules.stats,
        ))
        .build();

    tokio::spawn(log_scheduler_events(scheduler.events()));
    let scheduler_handle = scheduler.start();

    let state = AppState::new(store, images, identity)
        .with_root_folder(root_folder)
        .with_grace_period(reaper.grace_period())
        .with_admin_uids(config.admin_uids.clone());
    let app = router(state).layer(cors_layer(config.allowed_origins.clone()));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down scheduler");
    scheduler_handle.shutdown().await?;
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Mirror scheduler events into the log.
async fn log_scheduler_events(mut rx: tokio::sync::broadcast::Receiver<SchedulerEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(SchedulerEvent::JobFailed { job, error, .. }) => {
                warn!(subsystem = "jobs", job, error = %error, "Scheduled job failed");
            }
            Ok(event) => tracing::debug!(subsystem = "jobs", event = ?event, "Scheduler event"),
            Err(RecvError::Lagged(skipped)) => {
                warn!(subsystem = "jobs", skipped, "Scheduler event log lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
