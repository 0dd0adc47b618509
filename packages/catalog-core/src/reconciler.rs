use crate::catalog::CatalogStore;
use crate::error::{CoreError, Result};
use crate::extractor::ProductRecord;
use crate::fingerprint::{build_dedupe_key, compute_fingerprint};
use crate::model::{
    ChangeDescriptor, EventType, MediaType, OutboxEvent, OutboxStatus, Price, Product,
    ProductMedia,
};
use crate::outbox::OutboxStore;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub struct ReconcileOutcome {
    pub product: Product,
    pub event_emitted: bool,
    pub event_type: Option<EventType>,
    pub change: ChangeDescriptor,
}

pub struct Reconciler<C: CatalogStore, O: OutboxStore> {
    catalog: C,
    outbox: O,
}

impl<C: CatalogStore, O: OutboxStore> Reconciler<C, O> {
    pub fn new(catalog: C, outbox: O) -> Self {
        Self { catalog, outbox }
    }

    pub async fn reconcile(&self, record: ProductRecord) -> Result<ReconcileOutcome> {
        if record.product_key.trim().is_empty() {
            return Err(CoreError::Logic("product_key must not be empty".into()));
        }

        let media_pairs: Vec<(String, String)> = record
            .media
            .iter()
            .map(|m| (m.media_type.clone(), m.source_url.clone()))
            .collect();

        let fields = json!({
            "url": record.url,
            "title": record.title,
            "price": record.price.as_ref().map(|p| json!({"amount": p.amount, "currency": p.currency})),
        });
        let fingerprint = compute_fingerprint(&fields, &media_pairs);

        let existing = self.catalog.get_product(&record.product_key).await?;
        let now = Utc::now();

        let (version, event_type, changed_fields, previous_version, created_at, event_needed) =
            match &existing {
                None => (1, EventType::ProductCreated, Vec::new(), None, now, true),
                Some(prev) if prev.fingerprint == fingerprint => {
                    (prev.version, EventType::ProductUpdated, Vec::new(), None, prev.created_at, false)
                }
                Some(prev) => {
                    let mut changed = Vec::new();
                    if prev.title != record.title {
                        changed.push("title".to_string());
                    }
                    let new_price = record
                        .price
                        .as_ref()
                        .map(|p| Price { amount: p.amount.clone(), currency: p.currency.clone() });
                    if !price_eq(&prev.price, &new_price) {
                        changed.push("price".to_string());
                    }
                    if prev.url != record.url {
                        changed.push("url".to_string());
                    }
                    (
                        prev.version + 1,
                        EventType::ProductUpdated,
                        changed,
                        Some(prev.version),
                        prev.created_at,
                        true,
                    )
                }
            };

        let price = record
            .price
            .as_ref()
            .map(|p| Price { amount: p.amount.clone(), currency: p.currency.clone() });

        let product = Product {
            product_key: record.product_key.clone(),
            url: record.url.clone(),
            title: record.title.clone(),
            price,
            fingerprint,
            version,
            created_at,
            updated_at: now,
        };
        self.catalog.upsert_product(&product).await?;

        if !record.media.is_empty() {
            let media_rows: Vec<ProductMedia> = record
                .media
                .iter()
                .map(|m| ProductMedia {
                    product_key: record.product_key.clone(),
                    version,
                    media_type: if m.media_type == "video" {
                        MediaType::Video
                    } else {
                        MediaType::Image
                    },
                    source_url: m.source_url.clone(),
                    local_path: m.local_path.clone(),
                    created_at: now,
                })
                .collect();
            self.catalog.insert_media(&media_rows).await?;
        }

        let change = ChangeDescriptor {
            changed_fields,
            previous_version,
        };

        if !event_needed {
            return Ok(ReconcileOutcome {
                product,
                event_emitted: false,
                event_type: None,
                change,
            });
        }

        let dedupe_key = build_dedupe_key(&record.product_key, version, event_type.as_str());
        let payload = json!({
            "product_key": product.product_key,
            "url": product.url,
            "title": product.title,
            "price": product.price.as_ref().map(|p| json!({"amount": p.amount, "currency": p.currency})),
            "version": product.version,
            "changed_fields": change.changed_fields,
            "previous_version": change.previous_version,
        });

        let event = OutboxEvent {
            id: Uuid::new_v4(),
            dedupe_key,
            product_key: record.product_key.clone(),
            version,
            event_type,
            payload,
            status: OutboxStatus::Pending,
            try_count: 0,
            last_error: None,
            strategy_used: None,
            created_at: now,
            updated_at: now,
        };
        self.outbox.insert(&event).await?;

        tracing::info!(
            product_key = %record.product_key,
            version,
            event_type = event_type.as_str(),
            "reconciled product"
        );

        Ok(ReconcileOutcome {
            product,
            event_emitted: true,
            event_type: Some(event_type),
            change,
        })
    }
}

fn price_eq(a: &Option<Price>, b: &Option<Price>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.amount == b.amount && a.currency == b.currency,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogStore;
    use crate::extractor::{MediaDescriptor, PriceRecord};
    use crate::outbox::InMemoryOutboxStore;

    fn record(key: &str, title: &str, media: Vec<MediaDescriptor>) -> ProductRecord {
        ProductRecord {
            product_key: key.to_string(),
            url: "https://example.com/p/42".to_string(),
            title: Some(title.to_string()),
            price: Some(PriceRecord {
                amount: "9.99".to_string(),
                currency: "$".to_string(),
            }),
            media,
            raw: json!({"path": "/p/42"}),
        }
    }

    fn image(url: &str) -> MediaDescriptor {
        MediaDescriptor {
            media_type: "image".to_string(),
            source_url: url.to_string(),
            local_path: None,
        }
    }

    fn reconciler() -> Reconciler<InMemoryCatalogStore, InMemoryOutboxStore> {
        Reconciler::new(InMemoryCatalogStore::new(), InMemoryOutboxStore::new())
    }

    #[tokio::test]
    async fn scenario_a_first_ingest_creates_version_one() {
        let r = reconciler();
        let outcome = r
            .reconcile(record("42", "T", vec![image("i1")]))
            .await
            .unwrap();
        assert_eq!(outcome.product.version, 1);
        assert!(outcome.event_emitted);
        assert!(matches!(outcome.event_type, Some(EventType::ProductCreated)));
    }

    #[tokio::test]
    async fn scenario_b_reingest_same_content_emits_no_event() {
        let r = reconciler();
        r.reconcile(record("42", "T", vec![image("i1")])).await.unwrap();
        let outcome = r
            .reconcile(record("42", "T", vec![image("i1")]))
            .await
            .unwrap();
        assert!(!outcome.event_emitted);
        assert_eq!(outcome.product.version, 1);
    }

    #[tokio::test]
    async fn scenario_c_title_change_bumps_version_and_reports_changed_field() {
        let r = reconciler();
        r.reconcile(record("42", "T", vec![image("i1")])).await.unwrap();
        let outcome = r
            .reconcile(record("42", "T2", vec![image("i1")]))
            .await
            .unwrap();
        assert_eq!(outcome.product.version, 2);
        assert!(outcome.event_emitted);
    }

    #[tokio::test]
    async fn scenario_d_media_only_change_still_emits_event() {
        let r = reconciler();
        r.reconcile(record("42", "T", vec![image("i1")])).await.unwrap();
        let outcome = r
            .reconcile(record("42", "T", vec![image("i1"), image("i2")]))
            .await
            .unwrap();
        assert_eq!(outcome.product.version, 2);
        assert!(outcome.event_emitted);
        assert!(outcome.change.changed_fields.is_empty());
    }

    #[tokio::test]
    async fn empty_product_key_is_rejected() {
        let r = reconciler();
        let result = r.reconcile(record("", "T", vec![])).await;
        assert!(matches!(result, Err(CoreError::Logic(_))));
    }
}
