mod config;
mod crawl;
mod tasks;

use anyhow::{Context, Result};
use catalog_core::{Dispatcher, PostgresCatalogStore, PostgresOutboxStore, PostgresReceiptStore};
use chat_transport::{HttpChatTransport, HttpChatTransportConfig};
use config::Config;
use crawl::SubprocessCrawlExecutor;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,catalog_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting catalog scheduler");

    let config = Config::from_env().context("failed to load configuration")?;
    if config.broker_url.is_some() {
        tracing::warn!("BROKER_URL is set but unused by this in-process scheduler");
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let catalog = Arc::new(PostgresCatalogStore::new(pool.clone()));
    let outbox = Arc::new(PostgresOutboxStore::new(pool.clone()));
    let receipts: Arc<PostgresReceiptStore> = Arc::new(PostgresReceiptStore::new(pool.clone()));

    let chat_config = HttpChatTransportConfig {
        base_url: config.chat_api_base_url.clone(),
        bot_token: config.chat_bot_token.clone(),
    };
    let transport_factory = move || HttpChatTransport::new(chat_config.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        catalog,
        outbox,
        receipts,
        transport_factory,
        config.target_chat.clone(),
        config.message_strategy,
        8,
    ));

    let data_dir = PathBuf::from(config.data_dir.clone());
    let extractor_name = config.extractor_name.clone();
    let crawl_executor = Arc::new(SubprocessCrawlExecutor::new(data_dir.clone(), None));

    let scheduler = JobScheduler::new().await?;

    let crawl_job = Job::new_async("0 0 0 * * *", move |_uuid, _lock| {
        let executor = Arc::clone(&crawl_executor);
        let extractor_name = extractor_name.clone();
        let data_dir = data_dir.clone();
        Box::pin(async move {
            if let Err(err) = tasks::run_crawl(&*executor, &extractor_name, &data_dir, false).await
            {
                tracing::error!(error = %err, "daily crawl task failed");
            }
        })
    })?;
    scheduler.add(crawl_job).await?;

    let dispatch_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let dispatcher = Arc::clone(&dispatcher);
        Box::pin(async move {
            if let Err(err) = tasks::dispatch_outbox(&*dispatcher, 20).await {
                tracing::error!(error = %err, "dispatch_outbox task failed");
            }
        })
    })?;
    scheduler.add(dispatch_job).await?;

    scheduler.start().await?;
    tracing::info!("scheduled tasks started (daily crawl at 00:00 UTC, dispatch every minute)");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl_c")?;
    tracing::info!("shutting down scheduler");
    Ok(())
}
