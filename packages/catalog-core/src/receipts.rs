use crate::error::Result;
use crate::model::SendReceipt;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn get(&self, dedupe_key: &str) -> Result<Option<SendReceipt>>;

    /// Inserts a receipt. Returns `true` if this call created it, `false`
    /// if a receipt for this dedupe key already existed (another worker
    /// already delivered it) — the insert-or-detect-existing idempotence
    /// primitive the dispatcher relies on.
    async fn insert_if_absent(&self, receipt: &SendReceipt) -> Result<bool>;
}

pub struct PostgresReceiptStore {
    pool: PgPool,
}

impl PostgresReceiptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptStore for PostgresReceiptStore {
    async fn get(&self, dedupe_key: &str) -> Result<Option<SendReceipt>> {
        let row = sqlx::query(
            r#"
            SELECT dedupe_key, target_chat, message_ids, sent_at
            FROM send_receipts
            WHERE dedupe_key = $1
            "#,
        )
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SendReceipt {
            dedupe_key: r.get("dedupe_key"),
            target_chat: r.get("target_chat"),
            message_ids: r.get::<Vec<String>, _>("message_ids"),
            sent_at: r.get("sent_at"),
        }))
    }

    async fn insert_if_absent(&self, receipt: &SendReceipt) -> Result<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO send_receipts (dedupe_key, target_chat, message_ids, sent_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING dedupe_key
            "#,
        )
        .bind(&receipt.dedupe_key)
        .bind(&receipt.target_chat)
        .bind(&receipt.message_ids)
        .bind(receipt.sent_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[derive(Default)]
pub struct InMemoryReceiptStore {
    receipts: Mutex<HashMap<String, SendReceipt>>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn get(&self, dedupe_key: &str) -> Result<Option<SendReceipt>> {
        Ok(self
            .receipts
            .lock()
            .expect("receipt mutex poisoned")
            .get(dedupe_key)
            .cloned())
    }

    async fn insert_if_absent(&self, receipt: &SendReceipt) -> Result<bool> {
        let mut receipts = self.receipts.lock().expect("receipt mutex poisoned");
        if receipts.contains_key(&receipt.dedupe_key) {
            return Ok(false);
        }
        receipts.insert(receipt.dedupe_key.clone(), receipt.clone());
        Ok(true)
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(dedupe_key: &str) -> SendReceipt {
        SendReceipt {
            dedupe_key: dedupe_key.to_string(),
            target_chat: "chat-1".to_string(),
            message_ids: vec!["m1".to_string()],
            sent_at: now(),
        }
    }

    #[tokio::test]
    async fn second_insert_for_same_key_is_rejected() {
        let store = InMemoryReceiptStore::new();
        let first = store.insert_if_absent(&receipt("dk1")).await.unwrap();
        let second = store.insert_if_absent(&receipt("dk1")).await.unwrap();
        assert!(first);
        assert!(!second);
    }
}
