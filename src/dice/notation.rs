//! Dice notation parser
//!
//! Parses notation like "2d6+3", "-d4", "1d20+1d4-2" into signed terms.
//! Whitespace is stripped, then the string is split on sign boundaries, so
//! "2d6+3-1d4" yields the tokens `2d6`, `+3`, `-1d4`. Die terms come first in
//! the parsed output and modifier terms trail, each group in source order.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use super::DiceError;

/// Most dice a single group may roll
pub const MAX_DICE_PER_GROUP: u32 = 1000;

/// Largest die size accepted
pub const MAX_SIDES: u32 = 1_000_000;

/// Die token: optional sign, optional count, `d`, sides
static DIE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)([0-9]*)d([0-9]+)$").unwrap());

/// One signed term of a dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiceTerm {
    /// `count` dice with `sides` faces, added (`sign = 1`) or subtracted (`sign = -1`)
    Die { sign: i8, count: u32, sides: u32 },
    /// Flat signed modifier
    Modifier { value: i64 },
}

impl fmt::Display for DiceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceTerm::Die { sign, count, sides } => {
                let prefix = if *sign < 0 { "-" } else { "+" };
                write!(f, "{}{}d{}", prefix, count, sides)
            }
            DiceTerm::Modifier { value } => write!(f, "{:+}", value),
        }
    }
}

/// A parsed dice expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    /// The notation as supplied, trimmed
    pub raw: String,
    /// Die terms followed by modifier terms
    pub terms: Vec<DiceTerm>,
}

impl Notation {
    /// Whether the expression is exactly one die term of a single d20.
    ///
    /// Modifiers count as terms, so "1d20+3" does not qualify.
    pub fn is_single_d20(&self) -> bool {
        matches!(
            self.terms.as_slice(),
            [DiceTerm::Die { count: 1, sides: 20, .. }]
        )
    }
}

impl std::str::FromStr for Notation {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_notation(s)
    }
}

/// Parse a dice notation string
pub fn parse_notation(notation: &str) -> Result<Notation, DiceError> {
    let raw = notation.trim();
    if raw.is_empty() {
        return Err(DiceError::MalformedNotation(
            "dice notation cannot be empty".to_string(),
        ));
    }

    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let tokens = tokenize(&compact);
    if tokens.is_empty() {
        return Err(DiceError::MalformedNotation(format!(
            "unable to parse dice notation \"{}\"",
            raw
        )));
    }

    let mut dice = Vec::new();
    let mut modifiers = Vec::new();

    for token in tokens {
        if token == "+" || token == "-" {
            return Err(DiceError::MalformedNotation(format!(
                "dangling sign \"{}\" in \"{}\"",
                token, raw
            )));
        }

        if token.contains(['d', 'D']) {
            dice.push(parse_die_token(token)?);
        } else {
            let value: i64 = token
                .parse()
                .map_err(|_| DiceError::InvalidModifier(token.to_string()))?;
            modifiers.push(DiceTerm::Modifier { value });
        }
    }

    dice.extend(modifiers);

    Ok(Notation {
        raw: raw.to_string(),
        terms: dice,
    })
}

/// Split a compacted notation on `+`/`-` boundaries, keeping each sign with its token
fn tokenize(compact: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;

    for (i, c) in compact.char_indices() {
        if (c == '+' || c == '-') && i > start {
            tokens.push(&compact[start..i]);
            start = i;
        }
    }
    if start < compact.len() {
        tokens.push(&compact[start..]);
    }

    tokens
}

fn parse_die_token(token: &str) -> Result<DiceTerm, DiceError> {
    let lowered = token.to_lowercase();
    let caps = DIE_TOKEN.captures(&lowered).ok_or_else(|| {
        DiceError::MalformedNotation(format!("unsupported dice token \"{}\"", token))
    })?;

    let sign = if &caps[1] == "-" { -1 } else { 1 };

    let count: u32 = match &caps[2] {
        "" => 1,
        digits => digits.parse().map_err(|_| {
            DiceError::MalformedNotation(format!("dice count too large in \"{}\"", token))
        })?,
    };
    let sides: u32 = caps[3].parse().map_err(|_| {
        DiceError::MalformedNotation(format!("die size too large in \"{}\"", token))
    })?;

    if count == 0 || sides == 0 {
        return Err(DiceError::MalformedNotation(format!(
            "dice token \"{}\" must have positive count and sides",
            token
        )));
    }
    if count > MAX_DICE_PER_GROUP || sides > MAX_SIDES {
        return Err(DiceError::MalformedNotation(format!(
            "dice token \"{}\" exceeds {} dice of at most {} sides",
            token, MAX_DICE_PER_GROUP, MAX_SIDES
        )));
    }

    Ok(DiceTerm::Die { sign, count, sides })
}
