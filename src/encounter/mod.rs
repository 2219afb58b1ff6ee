//! Pre-built encounters
//!
//! An encounter is a named roster saved ahead of time. `combat.start` can
//! pull its members instead of receiving a roster inline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;

use crate::combat::StatBlock;
use crate::error::ErrorKind;
use crate::events::{make_summary, summarize_roster, Event, EventLog, EventSink};

/// Encounter errors
#[derive(Debug, Error)]
pub enum EncounterError {
    #[error("encounter roster cannot be empty")]
    EmptyRoster,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("encounter {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EncounterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncounterError::EmptyRoster => ErrorKind::EmptyRoster,
            EncounterError::InvalidInput(_) => ErrorKind::InvalidInput,
            EncounterError::NotFound(_) => ErrorKind::NotFound,
            EncounterError::Database(_) | EncounterError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

/// One member of a roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterMember {
    pub name: String,
    pub side: String,
    /// Loose stat block used for initiative and HP
    #[serde(default, alias = "base", skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatBlock>,
}

impl RosterMember {
    pub fn new(name: &str, side: &str) -> Self {
        Self {
            name: name.to_string(),
            side: side.to_string(),
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: StatBlock) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Reject members with blank names or sides
pub fn validate_roster(roster: &[RosterMember]) -> Result<(), EncounterError> {
    for (i, member) in roster.iter().enumerate() {
        if member.name.trim().is_empty() {
            return Err(EncounterError::InvalidInput(format!(
                "roster member {} has an empty name",
                i
            )));
        }
        if member.side.trim().is_empty() {
            return Err(EncounterError::InvalidInput(format!(
                "roster member {} ({}) has an empty side",
                i, member.name
            )));
        }
    }
    Ok(())
}

fn default_difficulty() -> String {
    "medium".to_string()
}

/// Request to build an encounter
#[derive(Debug, Clone, Deserialize)]
pub struct BuildRequest {
    #[serde(alias = "campaignId")]
    pub campaign_id: String,
    pub name: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    pub roster: Vec<RosterMember>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Response for encounter creation
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub encounter_id: String,
    pub summary: String,
}

/// A stored encounter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Encounter {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub difficulty: String,
    pub notes: Option<String>,
    pub created_at: String,
    /// Members in declaration order
    pub roster: Vec<RosterMember>,
}

/// Encounter service
#[derive(Debug, Clone)]
pub struct EncounterService {
    pool: SqlitePool,
    events: Arc<dyn EventSink>,
}

impl EncounterService {
    pub fn new(pool: SqlitePool, events: Arc<dyn EventSink>) -> Self {
        Self { pool, events }
    }

    /// Save an encounter and its roster
    pub async fn build(&self, request: BuildRequest) -> Result<BuildOutcome, EncounterError> {
        if request.campaign_id.trim().is_empty() {
            return Err(EncounterError::InvalidInput("campaign_id is required".to_string()));
        }
        if request.name.trim().is_empty() {
            return Err(EncounterError::InvalidInput("encounter name is required".to_string()));
        }
        if request.roster.is_empty() {
            return Err(EncounterError::EmptyRoster);
        }
        validate_roster(&request.roster)?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let summary = make_summary(
            "Encounter built",
            &request.name,
            Some(&summarize_roster(
                request.roster.iter().map(|m| (m.name.as_str(), m.side.as_str())),
            )),
        );
        let event = Event::new(
            "encounter.build",
            Some(&request.campaign_id),
            summary.clone(),
            json!({
                "encounter_id": id,
                "difficulty": request.difficulty,
                "roster": request.roster.iter()
                    .map(|m| json!({"name": m.name, "side": m.side}))
                    .collect::<Vec<_>>(),
            }),
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO encounters (id, campaign_id, name, difficulty, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.campaign_id)
        .bind(&request.name)
        .bind(&request.difficulty)
        .bind(&request.notes)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for (position, member) in request.roster.iter().enumerate() {
            let stats = member.stats.as_ref().map(serde_json::to_string).transpose()?;
            sqlx::query(
                r#"
                INSERT INTO encounter_combatants (id, encounter_id, position, name, side, stats)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(&member.name)
            .bind(&member.side)
            .bind(stats)
            .execute(&mut *tx)
            .await?;
        }

        EventLog::append(&mut tx, &event).await?;
        tx.commit().await?;

        self.events.publish(&event);
        debug!("Built encounter {} with {} members", id, request.roster.len());

        Ok(BuildOutcome {
            encounter_id: id,
            summary,
        })
    }

    /// Get an encounter with its roster
    pub async fn get(&self, id: &str) -> Result<Option<Encounter>, EncounterError> {
        let row: Option<(String, String, String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT id, campaign_id, name, difficulty, notes, created_at FROM encounters WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, campaign_id, name, difficulty, notes, created_at)) = row else {
            return Ok(None);
        };

        let members: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT name, side, stats FROM encounter_combatants
            WHERE encounter_id = ? ORDER BY position ASC
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let roster = members
            .into_iter()
            .map(|(name, side, stats)| {
                let stats = stats.map(|s| serde_json::from_str(&s)).transpose()?;
                Ok(RosterMember { name, side, stats })
            })
            .collect::<Result<Vec<_>, EncounterError>>()?;

        Ok(Some(Encounter {
            id,
            campaign_id,
            name,
            difficulty,
            notes,
            created_at,
            roster,
        }))
    }
}
