//! Combat session state machine
//!
//! A session owns the round number, the turn pointer and a version that
//! increases on every committed change. Transitions here are pure; the
//! store applies them with a compare-and-swap on `(id, version)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CombatError;

/// Session status. Sessions stay active once started; closing them is left
/// to whoever archives the campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatStatus {
    #[default]
    Active,
}

impl CombatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombatStatus::Active => "active",
        }
    }
}

impl FromStr for CombatStatus {
    type Err = CombatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CombatStatus::Active),
            other => Err(CombatError::InvalidInput(format!(
                "unknown combat status \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for CombatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A combat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSession {
    pub id: String,
    pub campaign_id: String,
    pub encounter_id: Option<String>,
    /// Starts at 1
    pub round: i64,
    /// Index of the active combatant in initiative order
    pub turn_index: i64,
    /// Starts at 1, bumped by every committed turn change
    pub version: i64,
    pub status: CombatStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl CombatSession {
    /// A fresh session at round 1, first turn, version 1
    pub fn new(campaign_id: &str, encounter_id: Option<&str>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            encounter_id: encounter_id.map(str::to_string),
            round: 1,
            turn_index: 0,
            version: 1,
            status: CombatStatus::Active,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Fail with `VersionConflict` unless `observed` is the current version
    pub fn check_version(&self, observed: i64) -> Result<(), CombatError> {
        if observed != self.version {
            return Err(CombatError::VersionConflict {
                combat_id: self.id.clone(),
                expected: observed,
                actual: self.version,
            });
        }
        Ok(())
    }

    /// Compute the next turn for a caller that last saw `observed_version`.
    ///
    /// Wrapping past the last combatant starts a new round.
    pub fn advance(
        &self,
        observed_version: i64,
        combatant_count: usize,
    ) -> Result<TurnAdvance, CombatError> {
        self.check_version(observed_version)?;
        if combatant_count == 0 {
            return Err(CombatError::EmptyRoster);
        }

        let count = combatant_count as i64;
        let turn_index = (self.turn_index + 1).rem_euclid(count);
        let round = if turn_index == 0 {
            self.round + 1
        } else {
            self.round
        };

        Ok(TurnAdvance {
            from_version: self.version,
            round,
            turn_index,
            version: self.version + 1,
        })
    }

    /// Apply a committed advance
    pub fn apply(&mut self, advance: &TurnAdvance) {
        self.round = advance.round;
        self.turn_index = advance.turn_index;
        self.version = advance.version;
    }
}

/// Next turn state, valid only while the session is still at `from_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnAdvance {
    pub from_version: i64,
    pub round: i64,
    pub turn_index: i64,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = CombatSession::new("camp-1", Some("enc-1"));
        assert_eq!(session.round, 1);
        assert_eq!(session.turn_index, 0);
        assert_eq!(session.version, 1);
        assert_eq!(session.status, CombatStatus::Active);
        assert_eq!(session.encounter_id.as_deref(), Some("enc-1"));
    }

    #[test]
    fn test_advance_within_round() {
        let session = CombatSession::new("camp", None);
        let next = session.advance(1, 3).unwrap();
        assert_eq!(
            next,
            TurnAdvance {
                from_version: 1,
                round: 1,
                turn_index: 1,
                version: 2
            }
        );
    }

    #[test]
    fn test_turn_wrap_starts_new_round() {
        let mut session = CombatSession::new("camp", None);
        session.turn_index = 2;
        session.version = 3;

        let next = session.advance(3, 3).unwrap();
        assert_eq!(next.turn_index, 0);
        assert_eq!(next.round, 2);
        assert_eq!(next.version, 4);

        session.apply(&next);
        assert_eq!(session.turn_index, 0);
        assert_eq!(session.round, 2);
        assert_eq!(session.version, 4);
    }

    #[test]
    fn test_single_combatant_every_turn_is_a_round() {
        let mut session = CombatSession::new("camp", None);
        for expected_round in 2..5 {
            let next = session.advance(session.version, 1).unwrap();
            session.apply(&next);
            assert_eq!(session.turn_index, 0);
            assert_eq!(session.round, expected_round);
        }
    }

    #[test]
    fn test_stale_version_rejected() {
        let mut session = CombatSession::new("camp", None);
        session.version = 5;

        let err = session.advance(4, 3).unwrap_err();
        match err {
            CombatError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 5);
            }
            other => panic!("expected version conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_no_combatants() {
        let session = CombatSession::new("camp", None);
        assert!(matches!(
            session.advance(1, 0),
            Err(CombatError::EmptyRoster)
        ));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("active".parse::<CombatStatus>().unwrap(), CombatStatus::Active);
        assert!("ended".parse::<CombatStatus>().is_err());
        assert_eq!(CombatStatus::Active.to_string(), "active");
    }
}
