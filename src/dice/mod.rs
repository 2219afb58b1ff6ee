//! Dice system
//!
//! Seeded, reproducible dice rolling:
//! - Notation parsing ("2d6+3-1d4", "-d20")
//! - Exploding dice
//! - Advantage/disadvantage on a lone d20
//! - Replay from an echoed seed

mod notation;
mod rng;
mod roller;

use thiserror::Error;

use crate::error::ErrorKind;

pub use notation::{parse_notation, DiceTerm, Notation, MAX_DICE_PER_GROUP, MAX_SIDES};
pub use rng::{generate_seed, SeededRng};
pub use roller::{roll, roll_notation, AdvantageMode, RollOptions, RollResult, MAX_EXPLOSIONS};

/// Dice errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("malformed dice notation: {0}")]
    MalformedNotation(String),

    #[error("unsupported modifier token \"{0}\"")]
    InvalidModifier(String),
}

impl DiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiceError::MalformedNotation(_) => ErrorKind::MalformedNotation,
            DiceError::InvalidModifier(_) => ErrorKind::InvalidModifier,
        }
    }
}
