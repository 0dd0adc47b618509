pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod model;
pub mod outbox;
pub mod receipts;
pub mod reconciler;
pub mod strategy;

pub use catalog::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore};
pub use dispatcher::{send_event, Dispatcher, SendOutcome, TransportFactory};
pub use error::{CoreError, Result};
pub use extractor::{CrawlExecutor, MediaDescriptor, PriceRecord, ProductRecord};
pub use model::*;
pub use outbox::{InMemoryOutboxStore, OutboxStore, PostgresOutboxStore};
pub use receipts::{InMemoryReceiptStore, PostgresReceiptStore, ReceiptStore};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use strategy::{Action, ChatTransport, MediaItem, StrategyKind};
