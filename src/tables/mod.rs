//! Random tables
//!
//! A table pairs a dice notation with entries covering inclusive roll
//! ranges. Rolling it picks the first entry whose range holds the total.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use crate::dice::{self, DiceError, RollOptions};
use crate::error::ErrorKind;
use crate::events::{make_summary, summarize_table_roll, Event, EventLog, EventSink};

/// Random table errors
#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Dice(#[from] DiceError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("random table {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TableError::Dice(e) => e.kind(),
            TableError::InvalidInput(_) => ErrorKind::InvalidInput,
            TableError::NotFound(_) => ErrorKind::NotFound,
            TableError::Database(_) | TableError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

/// One row of a table: an inclusive `[min, max]` range and its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub range: (i64, i64),
    pub result: Value,
}

impl TableEntry {
    pub fn new(min: i64, max: i64, result: impl Into<Value>) -> Self {
        Self {
            range: (min, max),
            result: result.into(),
        }
    }

    pub fn contains(&self, roll: i64) -> bool {
        self.range.0 <= roll && roll <= self.range.1
    }
}

/// `table.create` input
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTableRequest {
    #[serde(default, alias = "campaignId")]
    pub campaign_id: Option<String>,
    pub name: String,
    pub dice: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub entries: Vec<TableEntry>,
}

/// `table.create` output
#[derive(Debug, Clone, Serialize)]
pub struct CreateTableOutcome {
    pub table_id: String,
    pub summary: String,
}

/// `table.roll` input
#[derive(Debug, Clone, Deserialize)]
pub struct RollTableRequest {
    #[serde(alias = "tableId")]
    pub table_id: String,
    #[serde(default)]
    pub seed: Option<String>,
}

/// `table.roll` output
#[derive(Debug, Clone, Serialize)]
pub struct TableRoll {
    pub roll: i64,
    pub seed: String,
    /// Payload of the matching entry, `null` when no range holds the roll
    pub result: Option<Value>,
    pub summary: String,
}

/// A stored table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomTable {
    pub id: String,
    pub campaign_id: Option<String>,
    pub name: String,
    pub dice: String,
    pub scope: Option<String>,
    pub entries: Vec<TableEntry>,
}

impl RandomTable {
    /// First entry whose range holds `roll`
    pub fn lookup(&self, roll: i64) -> Option<&TableEntry> {
        self.entries.iter().find(|e| e.contains(roll))
    }
}

/// Random table service
#[derive(Debug, Clone)]
pub struct TableService {
    pool: SqlitePool,
    events: Arc<dyn EventSink>,
}

impl TableService {
    pub fn new(pool: SqlitePool, events: Arc<dyn EventSink>) -> Self {
        Self { pool, events }
    }

    /// Create a table after validating its notation and ranges
    pub async fn create(&self, request: CreateTableRequest) -> Result<CreateTableOutcome, TableError> {
        if request.name.trim().is_empty() {
            return Err(TableError::InvalidInput("table name is required".to_string()));
        }
        dice::parse_notation(&request.dice)?;
        if request.entries.is_empty() {
            return Err(TableError::InvalidInput(
                "a random table needs at least one entry".to_string(),
            ));
        }
        if let Some(bad) = request.entries.iter().find(|e| e.range.0 > e.range.1) {
            return Err(TableError::InvalidInput(format!(
                "range [{}, {}] must be ascending",
                bad.range.0, bad.range.1
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let summary = make_summary(
            "Random table created",
            &request.name,
            Some(&format!("{} entries", request.entries.len())),
        );
        let event = Event::new(
            "table.create",
            request.campaign_id.as_deref(),
            summary.clone(),
            json!({
                "table_id": id,
                "dice": request.dice,
                "entries": request.entries.len(),
            }),
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO random_tables (id, campaign_id, name, dice, scope, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.campaign_id)
        .bind(&request.name)
        .bind(&request.dice)
        .bind(&request.scope)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, entry) in request.entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO random_table_entries (id, table_id, position, min_roll, max_roll, result)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(entry.range.0)
            .bind(entry.range.1)
            .bind(entry.result.to_string())
            .execute(&mut *tx)
            .await?;
        }

        EventLog::append(&mut tx, &event).await?;
        tx.commit().await?;

        self.events.publish(&event);
        info!("Created random table {} ({})", request.name, id);

        Ok(CreateTableOutcome { table_id: id, summary })
    }

    /// Load a table and its entries in declaration order
    pub async fn get(&self, id: &str) -> Result<Option<RandomTable>, TableError> {
        let row: Option<(String, Option<String>, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, campaign_id, name, dice, scope FROM random_tables WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, campaign_id, name, dice, scope)) = row else {
            return Ok(None);
        };

        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT min_roll, max_roll, result FROM random_table_entries
            WHERE table_id = ? ORDER BY position ASC
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|(min, max, result)| Ok(TableEntry::new(min, max, serde_json::from_str::<Value>(&result)?)))
            .collect::<Result<Vec<_>, TableError>>()?;

        Ok(Some(RandomTable {
            id,
            campaign_id,
            name,
            dice,
            scope,
            entries,
        }))
    }

    /// Roll a table
    pub async fn roll(&self, request: RollTableRequest) -> Result<TableRoll, TableError> {
        let table = self
            .get(&request.table_id)
            .await?
            .ok_or_else(|| TableError::NotFound(request.table_id.clone()))?;

        if table.entries.is_empty() {
            return Err(TableError::InvalidInput(format!(
                "random table {} has no entries",
                table.name
            )));
        }

        let options = RollOptions {
            seed: request.seed,
            ..RollOptions::default()
        };
        let rolled = dice::roll(&table.dice, &options)?;
        let result = table.lookup(rolled.total).map(|e| e.result.clone());
        let summary = summarize_table_roll(&table.name, rolled.total, result.as_ref());

        debug!("{} (seed {})", summary, rolled.seed);

        Ok(TableRoll {
            roll: rolled.total,
            seed: rolled.seed,
            result,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;
    use crate::events::MemorySink;

    fn weather() -> CreateTableRequest {
        CreateTableRequest {
            campaign_id: Some("camp".to_string()),
            name: "Weather".to_string(),
            dice: "1d6".to_string(),
            scope: Some("wilderness".to_string()),
            entries: vec![
                TableEntry::new(1, 3, "clear"),
                TableEntry::new(4, 5, json!({"kind": "rain", "hours": 2})),
                TableEntry::new(6, 6, "storm"),
            ],
        }
    }

    async fn service() -> (TableService, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (TableService::new(test_pool().await, sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (service, sink) = service().await;
        let created = service.create(weather()).await.unwrap();
        assert_eq!(created.summary, "Random table created: Weather - 3 entries");
        assert_eq!(sink.kinds(), vec!["table.create"]);

        let table = service.get(&created.table_id).await.unwrap().unwrap();
        assert_eq!(table.entries, weather().entries);
        assert_eq!(table.scope.as_deref(), Some("wilderness"));
    }

    #[tokio::test]
    async fn test_roll_matches_range() {
        let (service, _) = service().await;
        let created = service.create(weather()).await.unwrap();
        let table = service.get(&created.table_id).await.unwrap().unwrap();

        for seed in ["a", "b", "c", "d", "e"] {
            let rolled = service
                .roll(RollTableRequest {
                    table_id: created.table_id.clone(),
                    seed: Some(seed.to_string()),
                })
                .await
                .unwrap();
            assert!((1..=6).contains(&rolled.roll));
            assert_eq!(rolled.seed, seed);
            assert_eq!(rolled.result.as_ref(), table.lookup(rolled.roll).map(|e| &e.result));
        }
    }

    #[tokio::test]
    async fn test_roll_replays_with_seed() {
        let (service, _) = service().await;
        let created = service.create(weather()).await.unwrap();

        let first = service
            .roll(RollTableRequest { table_id: created.table_id.clone(), seed: None })
            .await
            .unwrap();
        let again = service
            .roll(RollTableRequest { table_id: created.table_id, seed: Some(first.seed.clone()) })
            .await
            .unwrap();
        assert_eq!(first.roll, again.roll);
        assert_eq!(first.result, again.result);
    }

    #[tokio::test]
    async fn test_roll_gap_yields_null() {
        let (service, _) = service().await;
        let mut request = weather();
        request.dice = "10".to_string();
        let created = service.create(request).await.unwrap();

        let rolled = service
            .roll(RollTableRequest { table_id: created.table_id, seed: None })
            .await
            .unwrap();
        assert_eq!(rolled.roll, 10);
        assert_eq!(rolled.result, None);
        assert_eq!(rolled.summary, "Rolled Weather: 10 -> no entry");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (service, sink) = service().await;

        let mut bad_dice = weather();
        bad_dice.dice = "2dx".to_string();
        let err = service.create(bad_dice).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedNotation);

        let mut no_entries = weather();
        no_entries.entries.clear();
        let err = service.create(no_entries).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut descending = weather();
        descending.entries.push(TableEntry::new(9, 7, "odd"));
        let err = service.create(descending).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_roll_missing_table() {
        let (service, _) = service().await;
        let err = service
            .roll(RollTableRequest { table_id: "nope".to_string(), seed: None })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_entry_deserializes_range_pair() {
        let entry: TableEntry =
            serde_json::from_str(r#"{"range": [2, 4], "result": ["a", "b"]}"#).unwrap();
        assert!(entry.contains(2));
        assert!(entry.contains(4));
        assert!(!entry.contains(5));
        assert_eq!(entry.result, json!(["a", "b"]));
    }
}
