//! Combat persistence
//!
//! Sessions and combatants live in `combats` and `combatants`. Turn changes
//! commit only while the session version still matches what was read, and
//! combatant writes commit only while the row revision still matches.

use sqlx::SqlitePool;

use super::mutation::Combatant;
use super::session::{CombatSession, TurnAdvance};
use super::stats::StatBlock;
use super::CombatError;
use crate::db::{CommitOutcome, Tx};

/// Combat storage with database backing
#[derive(Debug, Clone)]
pub struct CombatStore {
    pool: SqlitePool,
}

impl CombatStore {
    /// Create a new combat store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new session
    pub async fn insert_session(tx: &mut Tx<'_>, session: &CombatSession) -> Result<(), CombatError> {
        sqlx::query(
            r#"
            INSERT INTO combats (id, campaign_id, encounter_id, round, turn_index, version, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.campaign_id)
        .bind(&session.encounter_id)
        .bind(session.round)
        .bind(session.turn_index)
        .bind(session.version)
        .bind(session.status.as_str())
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Insert a new combatant
    pub async fn insert_combatant(tx: &mut Tx<'_>, combatant: &Combatant) -> Result<(), CombatError> {
        let conditions = serde_json::to_string(&combatant.conditions)?;
        let stats = serde_json::to_string(&combatant.stats)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO combatants (id, combat_id, position, name, side, max_hp, current_hp, temp_hp,
                                    initiative, conditions, notes, stats, revision, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&combatant.id)
        .bind(&combatant.combat_id)
        .bind(combatant.position)
        .bind(&combatant.name)
        .bind(&combatant.side)
        .bind(combatant.max_hp)
        .bind(combatant.current_hp)
        .bind(combatant.temp_hp)
        .bind(combatant.initiative)
        .bind(&conditions)
        .bind(&combatant.notes)
        .bind(&stats)
        .bind(combatant.revision)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Get a session by ID
    pub async fn get_session(&self, id: &str) -> Result<Option<CombatSession>, CombatError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, encounter_id, round, turn_index, version, status, created_at, updated_at
            FROM combats WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Current version of a session, if it exists
    pub async fn session_version(&self, id: &str) -> Result<Option<i64>, CombatError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM combats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Combatants of a session in initiative order: highest first, ties by roster position
    pub async fn list_combatants(&self, combat_id: &str) -> Result<Vec<Combatant>, CombatError> {
        let rows: Vec<CombatantRow> = sqlx::query_as(
            r#"
            SELECT id, combat_id, position, name, side, max_hp, current_hp, temp_hp,
                   initiative, conditions, notes, stats, revision
            FROM combatants WHERE combat_id = ?
            ORDER BY initiative DESC, position ASC
            "#,
        )
        .bind(combat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CombatantRow::into_combatant).collect()
    }

    /// Get a combatant by ID
    pub async fn get_combatant(&self, id: &str) -> Result<Option<Combatant>, CombatError> {
        let row: Option<CombatantRow> = sqlx::query_as(
            r#"
            SELECT id, combat_id, position, name, side, max_hp, current_hp, temp_hp,
                   initiative, conditions, notes, stats, revision
            FROM combatants WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CombatantRow::into_combatant).transpose()
    }

    /// Write a turn advance if the session is still at `advance.from_version`
    pub async fn commit_advance(
        tx: &mut Tx<'_>,
        combat_id: &str,
        advance: &TurnAdvance,
    ) -> Result<CommitOutcome, CombatError> {
        let result = sqlx::query(
            r#"
            UPDATE combats
            SET turn_index = ?, round = ?, version = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(advance.turn_index)
        .bind(advance.round)
        .bind(advance.version)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(combat_id)
        .bind(advance.from_version)
        .execute(&mut **tx)
        .await?;

        Ok(CommitOutcome::from_rows_affected(result.rows_affected()))
    }

    /// Write a combatant's mutable fields if its row is still at `combatant.revision`.
    ///
    /// On success the stored revision is bumped by one.
    pub async fn commit_combatant(
        tx: &mut Tx<'_>,
        combatant: &Combatant,
    ) -> Result<CommitOutcome, CombatError> {
        let conditions = serde_json::to_string(&combatant.conditions)?;

        let result = sqlx::query(
            r#"
            UPDATE combatants
            SET current_hp = ?, temp_hp = ?, conditions = ?, notes = ?,
                revision = revision + 1, updated_at = ?
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(combatant.current_hp)
        .bind(combatant.temp_hp)
        .bind(&conditions)
        .bind(&combatant.notes)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&combatant.id)
        .bind(combatant.revision)
        .execute(&mut **tx)
        .await?;

        Ok(CommitOutcome::from_rows_affected(result.rows_affected()))
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    campaign_id: String,
    encounter_id: Option<String>,
    round: i64,
    turn_index: i64,
    version: i64,
    status: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn into_session(self) -> Result<CombatSession, CombatError> {
        Ok(CombatSession {
            id: self.id,
            campaign_id: self.campaign_id,
            encounter_id: self.encounter_id,
            round: self.round,
            turn_index: self.turn_index,
            version: self.version,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct CombatantRow {
    id: String,
    combat_id: String,
    position: i64,
    name: String,
    side: String,
    max_hp: i64,
    current_hp: i64,
    temp_hp: i64,
    initiative: i64,
    conditions: String,
    notes: Option<String>,
    stats: String,
    revision: i64,
}

impl CombatantRow {
    fn into_combatant(self) -> Result<Combatant, CombatError> {
        let conditions: Vec<String> = serde_json::from_str(&self.conditions)?;
        let stats: StatBlock = serde_json::from_str(&self.stats)?;
        Ok(Combatant {
            id: self.id,
            combat_id: self.combat_id,
            name: self.name,
            side: self.side,
            max_hp: self.max_hp,
            current_hp: self.current_hp,
            temp_hp: self.temp_hp,
            initiative: self.initiative,
            conditions,
            notes: self.notes,
            stats,
            position: self.position,
            revision: self.revision,
        })
    }
}
