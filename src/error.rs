//! Stable error kinds
//!
//! Every failure surfaced to a caller carries one of these kinds alongside a
//! message naming the offending input.

use serde::Serialize;
use std::fmt;

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unparseable dice notation
    MalformedNotation,
    /// Flat modifier that is not an integer
    InvalidModifier,
    /// Unknown action tag or missing payload
    InvalidAction,
    /// No combatants to fight
    EmptyRoster,
    /// Referenced session, combatant, encounter or table is absent
    NotFound,
    /// Combatant belongs to another session
    WrongSession,
    /// Optimistic concurrency collision
    VersionConflict,
    /// Request field failed validation
    InvalidInput,
    /// Storage failure
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedNotation => "malformed_notation",
            ErrorKind::InvalidModifier => "invalid_modifier",
            ErrorKind::InvalidAction => "invalid_action",
            ErrorKind::EmptyRoster => "empty_roster",
            ErrorKind::NotFound => "not_found",
            ErrorKind::WrongSession => "wrong_session",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether the caller can fix the request and try again
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, ErrorKind::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for kind in [
            ErrorKind::MalformedNotation,
            ErrorKind::InvalidModifier,
            ErrorKind::InvalidAction,
            ErrorKind::EmptyRoster,
            ErrorKind::NotFound,
            ErrorKind::WrongSession,
            ErrorKind::VersionConflict,
            ErrorKind::InvalidInput,
            ErrorKind::Storage,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_storage_is_not_caller_error() {
        assert!(!ErrorKind::Storage.is_caller_error());
        assert!(ErrorKind::VersionConflict.is_caller_error());
    }
}
