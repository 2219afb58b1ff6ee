//! Dice roller
//!
//! Evaluates a parsed [`Notation`] against a [`SeededRng`], applying the
//! exploding-die and advantage/disadvantage policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::notation::{parse_notation, DiceTerm, Notation};
use super::rng::SeededRng;
use super::DiceError;

/// Cap on extra draws a single exploding die may chain
pub const MAX_EXPLOSIONS: u32 = 100;

/// Advantage policy for a d20 roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvantageMode {
    /// Roll once
    #[default]
    #[serde(alias = "normal")]
    None,
    /// Roll twice, keep the higher
    #[serde(alias = "adv")]
    Advantage,
    /// Roll twice, keep the lower
    #[serde(alias = "dis")]
    Disadvantage,
}

impl AdvantageMode {
    fn pick(self, first: i64, second: i64) -> i64 {
        match self {
            AdvantageMode::Disadvantage => first.min(second),
            _ => first.max(second),
        }
    }
}

impl FromStr for AdvantageMode {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "normal" => Ok(AdvantageMode::None),
            "advantage" | "adv" => Ok(AdvantageMode::Advantage),
            "disadvantage" | "dis" => Ok(AdvantageMode::Disadvantage),
            other => Err(DiceError::MalformedNotation(format!(
                "unknown advantage mode \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for AdvantageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdvantageMode::None => "none",
            AdvantageMode::Advantage => "advantage",
            AdvantageMode::Disadvantage => "disadvantage",
        };
        write!(f, "{}", s)
    }
}

/// Roll configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOptions {
    #[serde(default)]
    pub advantage: AdvantageMode,
    #[serde(default, alias = "explode")]
    pub exploding: bool,
    /// Seed to replay; a fresh one is generated when absent
    #[serde(default)]
    pub seed: Option<String>,
}

impl RollOptions {
    /// Options with a fixed seed and no policies
    pub fn seeded(seed: impl Into<String>) -> Self {
        Self {
            seed: Some(seed.into()),
            ..Self::default()
        }
    }

    pub fn with_advantage(mut self, advantage: AdvantageMode) -> Self {
        self.advantage = advantage;
        self
    }

    pub fn exploding(mut self, exploding: bool) -> Self {
        self.exploding = exploding;
        self
    }
}

/// Outcome of a roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    /// Every signed contribution in draw order; both d20s under advantage
    pub rolls: Vec<i64>,
    pub total: i64,
    pub narrative: String,
    /// Seed that reproduces this result
    pub seed: String,
}

/// Parse and roll a notation string
pub fn roll(notation: &str, options: &RollOptions) -> Result<RollResult, DiceError> {
    let parsed = parse_notation(notation)?;
    let mut rng = match &options.seed {
        Some(seed) => SeededRng::new(seed.as_str()),
        None => SeededRng::fresh(),
    };
    roll_notation(&parsed, options.advantage, options.exploding, &mut rng)
}

/// Roll an already parsed notation
pub fn roll_notation(
    notation: &Notation,
    advantage: AdvantageMode,
    exploding: bool,
    rng: &mut SeededRng,
) -> Result<RollResult, DiceError> {
    let mut total: i64 = 0;
    let mut rolls = Vec::new();
    let mut breakdown = Vec::with_capacity(notation.terms.len());
    let mut kept = None;

    let advantage_applies = advantage != AdvantageMode::None && notation.is_single_d20();

    for term in &notation.terms {
        match *term {
            DiceTerm::Die { sign, count, sides } if advantage_applies => {
                let sign = i64::from(sign);
                let first = draw(rng, sides, exploding);
                let second = draw(rng, sides, exploding);
                let picked = advantage.pick(first, second);
                let contribution = sign * picked;

                total = accumulate(total, contribution, notation)?;
                rolls.push(sign * first);
                rolls.push(sign * second);
                breakdown.push(format!(
                    "{}{}d{} ({}) => [{}, {}] -> {}",
                    if sign < 0 { "-" } else { "" },
                    count,
                    sides,
                    advantage,
                    first,
                    second,
                    contribution
                ));
                kept = Some(picked);
            }
            DiceTerm::Die { sign, count, sides } => {
                let sign = i64::from(sign);
                let mut faces = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let value = sign * draw(rng, sides, exploding);
                    total = accumulate(total, value, notation)?;
                    rolls.push(value);
                    faces.push(value.to_string());
                }
                breakdown.push(format!("{} => {}", term, faces.join(", ")));
            }
            DiceTerm::Modifier { value } => {
                total = accumulate(total, value, notation)?;
                rolls.push(value);
                breakdown.push(term.to_string());
            }
        }
    }

    let mut narrative = format!("Roll {}", notation.raw);
    if exploding {
        narrative.push_str(" exploding");
    }
    if let Some(picked) = kept {
        narrative.push_str(&format!(" {} applied, kept {}", advantage, picked));
    }
    narrative.push_str(&format!(" -> {} [{}]", total, breakdown.join("; ")));

    Ok(RollResult {
        rolls,
        total,
        narrative,
        seed: rng.seed().to_string(),
    })
}

fn accumulate(total: i64, value: i64, notation: &Notation) -> Result<i64, DiceError> {
    total.checked_add(value).ok_or_else(|| {
        DiceError::MalformedNotation(format!("total of \"{}\" is out of range", notation.raw))
    })
}

/// Draw one die, chaining further draws while an exploding die shows its top face
fn draw(rng: &mut SeededRng, sides: u32, exploding: bool) -> i64 {
    let mut face = rng.roll_die(sides);
    let mut total = i64::from(face);

    // A d1 always shows its top face, so it never explodes
    if exploding && sides > 1 {
        let mut chained = 0;
        while face == sides && chained < MAX_EXPLOSIONS {
            face = rng.roll_die(sides);
            total += i64::from(face);
            chained += 1;
        }
    }

    total
}
