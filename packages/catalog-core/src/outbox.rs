use crate::error::Result;
use crate::model::{EventType, OutboxEvent, OutboxStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts a new event. A dedupe-key collision is swallowed silently.
    async fn insert(&self, event: &OutboxEvent) -> Result<()>;

    async fn find_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>>;

    /// Atomically transitions one event from `pending` to `processing`.
    /// Returns `None` if the event no longer is `pending` (already claimed).
    async fn claim(&self, id: Uuid) -> Result<Option<OutboxEvent>>;

    async fn mark_sent(&self, id: Uuid, strategy_used: &str) -> Result<()>;

    async fn revert_to_pending(&self, id: Uuid, error: &str) -> Result<()>;

    /// Extension point: events stuck in `processing` past `older_than`.
    /// No scheduled caller exists by default; see DESIGN.md open questions.
    async fn find_stale_processing(&self, older_than: Duration) -> Result<Vec<OutboxEvent>>;
}

pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn event_type_str(event_type: EventType) -> &'static str {
    event_type.as_str()
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "product_updated" => EventType::ProductUpdated,
        _ => EventType::ProductCreated,
    }
}

fn status_str(status: OutboxStatus) -> &'static str {
    match status {
        OutboxStatus::Pending => "pending",
        OutboxStatus::Processing => "processing",
        OutboxStatus::Sent => "sent",
    }
}

fn parse_status(s: &str) -> OutboxStatus {
    match s {
        "processing" => OutboxStatus::Processing,
        "sent" => OutboxStatus::Sent,
        _ => OutboxStatus::Pending,
    }
}

fn row_to_event(r: sqlx::postgres::PgRow) -> OutboxEvent {
    OutboxEvent {
        id: r.get("id"),
        dedupe_key: r.get("dedupe_key"),
        product_key: r.get("product_key"),
        version: r.get("version"),
        event_type: parse_event_type(r.get("event_type")),
        payload: r.get("payload"),
        status: parse_status(r.get("status")),
        try_count: r.get("try_count"),
        last_error: r.get("last_error"),
        strategy_used: r.get("strategy_used"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn insert(&self, event: &OutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id, dedupe_key, product_key, version, event_type, payload,
                status, try_count, last_error, strategy_used, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.dedupe_key)
        .bind(&event.product_key)
        .bind(event.version)
        .bind(event_type_str(event.event_type))
        .bind(&event.payload)
        .bind(status_str(event.status))
        .bind(event.try_count)
        .bind(&event.last_error)
        .bind(&event.strategy_used)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, dedupe_key, product_key, version, event_type, payload,
                   status, try_count, last_error, strategy_used, created_at, updated_at
            FROM outbox_events
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn claim(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'processing', try_count = try_count + 1, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, dedupe_key, product_key, version, event_type, payload,
                      status, try_count, last_error, strategy_used, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_event))
    }

    async fn mark_sent(&self, id: Uuid, strategy_used: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'sent', strategy_used = $2, last_error = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(strategy_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revert_to_pending(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending', last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_stale_processing(&self, older_than: Duration) -> Result<Vec<OutboxEvent>> {
        let cutoff = Utc::now() - older_than;
        let rows = sqlx::query(
            r#"
            SELECT id, dedupe_key, product_key, version, event_type, payload,
                   status, try_count, last_error, strategy_used, created_at, updated_at
            FROM outbox_events
            WHERE status = 'processing' AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }
}

/// In-memory `OutboxStore` for tests. The claim CAS is implemented with a
/// single `Mutex` critical section, mirroring the exclusivity a Postgres
/// `UPDATE ... WHERE status = 'pending'` gives via row locking.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    events: Mutex<Vec<OutboxEvent>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, event: &OutboxEvent) -> Result<()> {
        let mut events = self.events.lock().expect("outbox mutex poisoned");
        if events.iter().any(|e| e.dedupe_key == event.dedupe_key) {
            return Ok(());
        }
        events.push(event.clone());
        Ok(())
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let events = self.events.lock().expect("outbox mutex poisoned");
        let mut pending: Vec<OutboxEvent> = events
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn claim(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        let mut events = self.events.lock().expect("outbox mutex poisoned");
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            if event.status == OutboxStatus::Pending {
                event.status = OutboxStatus::Processing;
                event.try_count += 1;
                event.updated_at = Utc::now();
                return Ok(Some(event.clone()));
            }
        }
        Ok(None)
    }

    async fn mark_sent(&self, id: Uuid, strategy_used: &str) -> Result<()> {
        let mut events = self.events.lock().expect("outbox mutex poisoned");
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = OutboxStatus::Sent;
            event.strategy_used = Some(strategy_used.to_string());
            event.last_error = None;
            event.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn revert_to_pending(&self, id: Uuid, error: &str) -> Result<()> {
        let mut events = self.events.lock().expect("outbox mutex poisoned");
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = OutboxStatus::Pending;
            event.last_error = Some(error.to_string());
            event.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_stale_processing(&self, older_than: Duration) -> Result<Vec<OutboxEvent>> {
        let cutoff: DateTime<Utc> = Utc::now() - older_than;
        let events = self.events.lock().expect("outbox mutex poisoned");
        Ok(events
            .iter()
            .filter(|e| e.status == OutboxStatus::Processing && e.updated_at < cutoff)
            .cloned()
            .collect())
    }
}
