//! Database module - SQLite-backed campaign store
//!
//! One [`Database`] is opened per process and handed to each service at
//! construction. Multi-row writes thread an explicit [`Tx`] through the
//! operation; conditional writes report a [`CommitOutcome`].

#[cfg(test)]
pub mod test_utils;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::info;

/// Transaction scope threaded through multi-row writes.
///
/// Dropping it without calling `commit` rolls every write back.
pub type Tx<'c> = Transaction<'c, Sqlite>;

/// Result of a conditional write inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The guarded row matched and was written
    Committed,
    /// The guard no longer matched; nothing was written
    Aborted,
}

impl CommitOutcome {
    /// Map an `UPDATE ... WHERE <guard>` row count to an outcome
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            CommitOutcome::Aborted
        } else {
            CommitOutcome::Committed
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// Database handle wrapping SQLite connection pool
#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let pool = match path {
            Some(p) => {
                let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", p))?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5))
                    .foreign_keys(true);

                SqlitePoolOptions::new()
                    .max_connections(10)
                    .connect_with(options)
                    .await?
            }
            None => {
                // Every in-memory connection is its own database, so keep exactly one alive
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await?
            }
        };

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combats (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                encounter_id TEXT,
                round INTEGER NOT NULL DEFAULT 1,
                turn_index INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Position is the roster declaration order, used to break initiative ties
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combatants (
                id TEXT PRIMARY KEY,
                combat_id TEXT NOT NULL REFERENCES combats(id),
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                side TEXT NOT NULL,
                max_hp INTEGER NOT NULL DEFAULT 0,
                current_hp INTEGER NOT NULL DEFAULT 0,
                temp_hp INTEGER NOT NULL DEFAULT 0,
                initiative INTEGER NOT NULL DEFAULT 0,
                conditions TEXT NOT NULL DEFAULT '[]',
                notes TEXT,
                stats TEXT NOT NULL DEFAULT '{}',
                revision INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS encounters (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                name TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'medium',
                notes TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS encounter_combatants (
                id TEXT PRIMARY KEY,
                encounter_id TEXT NOT NULL REFERENCES encounters(id),
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                side TEXT NOT NULL,
                stats TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS random_tables (
                id TEXT PRIMARY KEY,
                campaign_id TEXT,
                name TEXT NOT NULL,
                dice TEXT NOT NULL,
                scope TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS random_table_entries (
                id TEXT PRIMARY KEY,
                table_id TEXT NOT NULL REFERENCES random_tables(id),
                position INTEGER NOT NULL,
                min_roll INTEGER NOT NULL,
                max_roll INTEGER NOT NULL,
                result TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_log (
                id TEXT PRIMARY KEY,
                campaign_id TEXT,
                kind TEXT NOT NULL,
                summary TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT 'null',
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_combatants_combat ON combatants(combat_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_encounter_combatants_encounter ON encounter_combatants(encounter_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_table_entries_table ON random_table_entries(table_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_log_campaign ON event_log(campaign_id)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
