use crate::error::Result;
use crate::model::{MediaType, Product, ProductMedia};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, product_key: &str) -> Result<Option<Product>>;
    async fn upsert_product(&self, product: &Product) -> Result<()>;
    async fn insert_media(&self, media: &[ProductMedia]) -> Result<()>;
    async fn list_media(
        &self,
        product_key: &str,
        version: i32,
        limit: i64,
    ) -> Result<Vec<ProductMedia>>;
}

pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn media_type_str(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "image",
        MediaType::Video => "video",
    }
}

fn parse_media_type(s: &str) -> MediaType {
    match s {
        "video" => MediaType::Video,
        _ => MediaType::Image,
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn get_product(&self, product_key: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT product_key, url, title, price_amount, price_currency,
                   fingerprint, version, created_at, updated_at
            FROM products
            WHERE product_key = $1
            "#,
        )
        .bind(product_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Product {
            product_key: r.get("product_key"),
            url: r.get("url"),
            title: r.get("title"),
            price: match (
                r.get::<Option<String>, _>("price_amount"),
                r.get::<Option<String>, _>("price_currency"),
            ) {
                (Some(amount), Some(currency)) => Some(crate::model::Price { amount, currency }),
                _ => None,
            },
            fingerprint: r.get("fingerprint"),
            version: r.get("version"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                product_key, url, title, price_amount, price_currency,
                fingerprint, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (product_key) DO UPDATE SET
                url = EXCLUDED.url,
                title = EXCLUDED.title,
                price_amount = EXCLUDED.price_amount,
                price_currency = EXCLUDED.price_currency,
                fingerprint = EXCLUDED.fingerprint,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&product.product_key)
        .bind(&product.url)
        .bind(&product.title)
        .bind(product.price.as_ref().map(|p| p.amount.clone()))
        .bind(product.price.as_ref().map(|p| p.currency.clone()))
        .bind(&product.fingerprint)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_media(&self, media: &[ProductMedia]) -> Result<()> {
        for m in media {
            sqlx::query(
                r#"
                INSERT INTO product_media (
                    product_key, version, media_type, source_url, local_path, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (product_key, version, media_type, source_url) DO NOTHING
                "#,
            )
            .bind(&m.product_key)
            .bind(m.version)
            .bind(media_type_str(m.media_type))
            .bind(&m.source_url)
            .bind(&m.local_path)
            .bind(m.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_media(
        &self,
        product_key: &str,
        version: i32,
        limit: i64,
    ) -> Result<Vec<ProductMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT product_key, version, media_type, source_url, local_path, created_at
            FROM product_media
            WHERE product_key = $1 AND version = $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(product_key)
        .bind(version)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ProductMedia {
                product_key: r.get("product_key"),
                version: r.get("version"),
                media_type: parse_media_type(r.get("media_type")),
                source_url: r.get("source_url"),
                local_path: r.get("local_path"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

/// In-memory `CatalogStore` used by tests, mirroring the teacher's
/// `MockStorage` pattern: plain state behind a `Mutex`, no network I/O.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    products: Mutex<HashMap<String, Product>>,
    media: Mutex<Vec<ProductMedia>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_product(&self, product_key: &str) -> Result<Option<Product>> {
        Ok(self
            .products
            .lock()
            .expect("catalog mutex poisoned")
            .get(product_key)
            .cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.products
            .lock()
            .expect("catalog mutex poisoned")
            .insert(product.product_key.clone(), product.clone());
        Ok(())
    }

    async fn insert_media(&self, new_media: &[ProductMedia]) -> Result<()> {
        let mut media = self.media.lock().expect("catalog mutex poisoned");
        for m in new_media {
            let exists = media.iter().any(|existing| {
                existing.product_key == m.product_key
                    && existing.version == m.version
                    && existing.media_type == m.media_type
                    && existing.source_url == m.source_url
            });
            if !exists {
                media.push(m.clone());
            }
        }
        Ok(())
    }

    async fn list_media(
        &self,
        product_key: &str,
        version: i32,
        limit: i64,
    ) -> Result<Vec<ProductMedia>> {
        let media = self.media.lock().expect("catalog mutex poisoned");
        let mut matching: Vec<ProductMedia> = media
            .iter()
            .filter(|m| m.product_key == product_key && m.version == version)
            .cloned()
            .collect();
        matching.sort_by_key(|m| m.created_at);
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Price;

    fn product(key: &str, version: i32, fp: &str) -> Product {
        let ts = now();
        Product {
            product_key: key.to_string(),
            url: "u".to_string(),
            title: Some("T".to_string()),
            price: Some(Price {
                amount: "9.99".to_string(),
                currency: "$".to_string(),
            }),
            fingerprint: fp.to_string(),
            version,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryCatalogStore::new();
        store.upsert_product(&product("42", 1, "fp1")).await.unwrap();
        let fetched = store.get_product("42").await.unwrap().unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.fingerprint, "fp1");
    }

    #[tokio::test]
    async fn duplicate_media_insert_is_silently_dropped() {
        let store = InMemoryCatalogStore::new();
        let ts = now();
        let m = ProductMedia {
            product_key: "42".to_string(),
            version: 1,
            media_type: MediaType::Image,
            source_url: "i1".to_string(),
            local_path: None,
            created_at: ts,
        };
        store.insert_media(&[m.clone(), m.clone()]).await.unwrap();
        let listed = store.list_media("42", 1, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
