use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authcodes::api::AppState;
use authcodes::config::Config;
use authcodes::jobs::retention_cleaner;
use authcodes::services::code_generator::SystemRandomSource;
use authcodes::store::{CodeStore, PgCodeStore};
use authcodes::{api, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authcodes=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting authorization-code service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn CodeStore> = Arc::new(PgCodeStore::new(pool));

    // Schedule the retention cleaner
    let scheduler = JobScheduler::new().await?;
    let retention = Duration::days(config.retention_days);
    let batch_size = config.cleanup_batch_size;
    let job_store = store.clone();
    scheduler
        .add(Job::new_async(
            config.cleanup_schedule.as_str(),
            move |_id, _lock| {
                let store = job_store.clone();
                Box::pin(async move {
                    if let Err(e) =
                        retention_cleaner::cleanup(store.as_ref(), retention, batch_size).await
                    {
                        tracing::error!(error = %e, "retention cleanup failed");
                    }
                })
            },
        )?)
        .await?;
    scheduler.start().await?;
    tracing::info!(schedule = %config.cleanup_schedule, "Retention cleaner scheduled");

    // Build application state
    let state = AppState {
        store,
        rng: Arc::new(SystemRandomSource::new()),
        config: config.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api::codes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
