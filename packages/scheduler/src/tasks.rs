use anyhow::Result;
use catalog_core::{ChatTransport, CrawlExecutor, Dispatcher};
use std::path::Path;

/// Entry point triggered by the daily cron job. `force_full` bypasses the
/// state-marker check and always runs a full crawl.
pub async fn run_crawl(
    executor: &dyn CrawlExecutor,
    extractor_name: &str,
    data_dir: &Path,
    force_full: bool,
) -> Result<()> {
    let state_file = data_dir.join("state").join("crawl_state.txt");
    let full = force_full || !state_file.exists();
    executor.run(extractor_name, full).await
}

/// Entry point triggered every minute by cron; fans pending outbox events
/// out to the dispatcher's bounded worker pool and returns how many were
/// dispatched.
pub async fn dispatch_outbox<C, O, R, T, F>(
    dispatcher: &Dispatcher<C, O, R, T, F>,
    batch_size: i64,
) -> Result<usize>
where
    C: catalog_core::CatalogStore + 'static,
    O: catalog_core::OutboxStore + 'static,
    R: catalog_core::ReceiptStore + 'static,
    T: ChatTransport + 'static,
    F: catalog_core::TransportFactory<T> + 'static,
{
    let count = dispatcher.poll(batch_size).await?;
    tracing::info!(count, "dispatched outbox batch");
    Ok(count)
}
