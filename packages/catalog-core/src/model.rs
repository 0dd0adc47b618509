use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProductCreated,
    ProductUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProductCreated => "product_created",
            EventType::ProductUpdated => "product_updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_key: String,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<Price>,
    pub fingerprint: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMedia {
    pub product_key: String,
    pub version: i32,
    pub media_type: MediaType,
    pub source_url: String,
    pub local_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: uuid::Uuid,
    pub dedupe_key: String,
    pub product_key: String,
    pub version: i32,
    pub event_type: EventType,
    pub payload: Value,
    pub status: OutboxStatus,
    pub try_count: i32,
    pub last_error: Option<String>,
    pub strategy_used: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub dedupe_key: String,
    pub target_chat: String,
    pub message_ids: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

/// Change descriptor carried in an OutboxEvent payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub changed_fields: Vec<String>,
    pub previous_version: Option<i32>,
}
