//! Event sink and audit log
//!
//! Every committed lifecycle change produces an [`Event`]: a human-readable
//! summary plus a structured payload. Events are appended to `event_log`
//! inside the change's own transaction, then published to an [`EventSink`]
//! once the transaction commits.

mod summary;

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::Tx;

pub use summary::{make_summary, summarize_roster, summarize_table_roll};

/// An audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub campaign_id: Option<String>,
    /// Operation tag, e.g. "combat.next_turn"
    pub kind: String,
    pub summary: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        kind: impl Into<String>,
        campaign_id: Option<&str>,
        summary: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign_id.map(str::to_string),
            kind: kind.into(),
            summary: summary.into(),
            payload,
            recorded_at: Utc::now(),
        }
    }
}

/// Receives events after their transaction commits
pub trait EventSink: Send + Sync + fmt::Debug {
    fn publish(&self, event: &Event);
}

/// Sink that writes events to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &Event) {
        info!(
            kind = %event.kind,
            campaign = event.campaign_id.as_deref().unwrap_or("-"),
            "{}",
            event.summary
        );
    }
}

/// Sink that keeps events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Event kinds in publish order
    pub fn kinds(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.kind.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Durable event log stored alongside campaign data
#[derive(Debug, Clone)]
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event inside an open transaction
    pub async fn append(tx: &mut Tx<'_>, event: &Event) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO event_log (id, campaign_id, kind, summary, payload, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.campaign_id)
        .bind(&event.kind)
        .bind(&event.summary)
        .bind(event.payload.to_string())
        .bind(event.recorded_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Most recent events for a campaign, newest first
    pub async fn recent(&self, campaign_id: &str, limit: u32) -> anyhow::Result<Vec<Event>> {
        let rows: Vec<(String, Option<String>, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, kind, summary, payload, recorded_at
            FROM event_log WHERE campaign_id = ?
            ORDER BY recorded_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(campaign_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, campaign_id, kind, summary, payload, recorded_at)| -> anyhow::Result<Event> {
                Ok(Event {
                    id,
                    campaign_id,
                    kind,
                    summary,
                    payload: serde_json::from_str(&payload)?,
                    recorded_at: DateTime::parse_from_rfc3339(&recorded_at)?.with_timezone(&Utc),
                })
            })
            .collect()
    }
}
