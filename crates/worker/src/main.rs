use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oncoflow_pipeline::store::PgJobStore;
use oncoflow_pipeline::types;
use oncoflow_worker::config::WorkerConfig;
use oncoflow_worker::dispatcher::Dispatcher;
use oncoflow_worker::executor::Executor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oncoflow_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;

    let pool = oncoflow_db::create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    oncoflow_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    oncoflow_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgJobStore::new(pool)) as Arc<dyn oncoflow_pipeline::store::JobStore>;
    let registry = Arc::new(types::builtin_registry());
    tracing::info!(
        job_types = ?registry.discriminators(),
        "Job type registry initialized",
    );

    let executor = Executor::new(Arc::clone(&store), registry, config.pipeline_env());
    let dispatcher =
        Dispatcher::new(store, executor).with_poll_interval(config.poll_interval);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    dispatcher.run(cancel).await;
    Ok(())
}
