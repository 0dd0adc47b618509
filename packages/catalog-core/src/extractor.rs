use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The contract any extractor must honor before handing records to the
/// reconciler. The core never parses HTML; it only consumes this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub media_type: String,
    pub source_url: String,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_key: String,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<PriceRecord>,
    pub media: Vec<MediaDescriptor>,
    pub raw: Value,
}

/// Seam the scheduler calls through to trigger a crawl. No implementation
/// in this core parses the extractor's output; the extractor is expected
/// to reconcile the products it finds on its own, out of process.
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    async fn run(&self, extractor_name: &str, full: bool) -> anyhow::Result<()>;
}
