//! Combat system module
//!
//! Turn-based encounter tracking:
//! - Initiative and HP resolution from loose stat blocks
//! - Combatant actions (damage, healing, temp HP, conditions, notes)
//! - Round/turn progression under optimistic concurrency
//! - Persistence with compare-and-swap commits

mod mutation;
mod service;
mod session;
mod stats;
mod store;

use thiserror::Error;

use crate::encounter::EncounterError;
use crate::error::ErrorKind;

pub use mutation::{apply_action, Action, ActionValue, Combatant, Mutation};
pub use service::{
    ActiveCombatant, ApplyOutcome, ApplyRequest, CombatService, CombatView, InitiativeEntry,
    NextTurnRequest, StartOutcome, StartRequest, TurnOutcome, ROW_WRITE_ATTEMPTS,
};
pub use session::{CombatSession, CombatStatus, TurnAdvance};
pub use stats::{
    first_match, numeric, resolve_hp, resolve_initiative, HitPoints, StatBlock, StatRule,
    CURRENT_HP_RULES, INITIATIVE_RULES, MAX_HP_RULES,
};
pub use store::CombatStore;

/// Combat errors
#[derive(Debug, Error)]
pub enum CombatError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("no combatants provided")]
    EmptyRoster,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("combatant {combatant_id} does not belong to combat {combat_id}")]
    WrongSession {
        combatant_id: String,
        combat_id: String,
    },

    #[error("version conflict on combat {combat_id}: caller saw version {expected} but it is now {actual}; fetch the latest state and retry")]
    VersionConflict {
        combat_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("combatant {0} is being updated concurrently; gave up after repeated write races")]
    WriteContention(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CombatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CombatError::InvalidAction(_) => ErrorKind::InvalidAction,
            CombatError::EmptyRoster => ErrorKind::EmptyRoster,
            CombatError::NotFound { .. } => ErrorKind::NotFound,
            CombatError::WrongSession { .. } => ErrorKind::WrongSession,
            CombatError::VersionConflict { .. } => ErrorKind::VersionConflict,
            CombatError::InvalidInput(_) => ErrorKind::InvalidInput,
            CombatError::WriteContention(_)
            | CombatError::Database(_)
            | CombatError::Serialization(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        CombatError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<EncounterError> for CombatError {
    fn from(err: EncounterError) -> Self {
        match err {
            EncounterError::EmptyRoster => CombatError::EmptyRoster,
            EncounterError::InvalidInput(msg) => CombatError::InvalidInput(msg),
            EncounterError::NotFound(id) => CombatError::not_found("encounter", &id),
            EncounterError::Database(e) => CombatError::Database(e),
            EncounterError::Serialization(e) => CombatError::Serialization(e),
        }
    }
}
