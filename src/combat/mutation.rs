//! Combatant records and the actions that mutate them
//!
//! Applying an action is a pure function over a [`Combatant`]: no storage is
//! touched, so the same action can be re-applied to a freshly read row.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stats::StatBlock;
use super::CombatError;
use crate::events::make_summary;

/// A combatant taking part in a combat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub combat_id: String,
    pub name: String,
    pub side: String,
    pub max_hp: i64,
    pub current_hp: i64,
    pub temp_hp: i64,
    pub initiative: i64,
    /// Active conditions, in the order they were added
    pub conditions: Vec<String>,
    pub notes: Option<String>,
    pub stats: StatBlock,
    /// Declaration order in the starting roster
    pub position: i64,
    /// Row revision, bumped on every committed write
    #[serde(skip)]
    pub revision: i64,
}

impl Combatant {
    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c == name)
    }
}

/// Numeric or text payload attached to an action request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Number(i64),
    Text(String),
}

impl ActionValue {
    fn as_amount(&self) -> Option<i64> {
        match self {
            ActionValue::Number(n) => Some(*n),
            ActionValue::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            ActionValue::Text(s) => Some(s),
            ActionValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionValue::Number(n) => write!(f, "{}", n),
            ActionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The closed set of combatant actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Temp HP absorbs first, the rest comes off current HP (floored at 0)
    Damage(i64),
    /// Restore HP up to the maximum
    Heal(i64),
    /// Replace temporary HP
    TempHp(i64),
    AddCondition(String),
    RemoveCondition(String),
    /// Replace the free-text note
    CustomNote(String),
}

impl Action {
    /// Build an action from its wire tag and optional payloads
    pub fn from_request(
        tag: &str,
        value: Option<&ActionValue>,
        condition: Option<&str>,
    ) -> Result<Self, CombatError> {
        match tag {
            "damage" => Ok(Action::Damage(amount(tag, value)?)),
            "heal" => Ok(Action::Heal(amount(tag, value)?)),
            "temp_hp" => Ok(Action::TempHp(amount(tag, value)?)),
            "add_condition" => Ok(Action::AddCondition(condition_name(tag, value, condition)?)),
            "remove_condition" => Ok(Action::RemoveCondition(condition_name(
                tag, value, condition,
            )?)),
            "custom_note" => {
                let text = value
                    .and_then(ActionValue::as_text)
                    .or(condition)
                    .ok_or_else(|| {
                        CombatError::InvalidAction("custom_note requires text in value".to_string())
                    })?;
                Ok(Action::CustomNote(text.to_string()))
            }
            other => Err(CombatError::InvalidAction(format!(
                "unknown action \"{}\" (expected damage, heal, temp_hp, add_condition, remove_condition or custom_note)",
                other
            ))),
        }
    }

    /// Wire tag of this action
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Damage(_) => "damage",
            Action::Heal(_) => "heal",
            Action::TempHp(_) => "temp_hp",
            Action::AddCondition(_) => "add_condition",
            Action::RemoveCondition(_) => "remove_condition",
            Action::CustomNote(_) => "custom_note",
        }
    }

    /// Apply the action, returning the updated record and a change summary
    pub fn apply(&self, combatant: &Combatant) -> Mutation {
        let mut updated = combatant.clone();

        match self {
            Action::Damage(amount) => {
                let absorbed = updated.temp_hp.min(*amount);
                updated.temp_hp -= absorbed;
                updated.current_hp = updated
                    .current_hp
                    .saturating_sub(amount.saturating_sub(absorbed))
                    .max(0);
            }
            Action::Heal(amount) => {
                updated.current_hp = updated
                    .current_hp
                    .saturating_add(*amount)
                    .min(updated.max_hp);
            }
            Action::TempHp(amount) => {
                updated.temp_hp = *amount;
            }
            Action::AddCondition(name) => {
                if !updated.has_condition(name) {
                    updated.conditions.push(name.clone());
                }
            }
            Action::RemoveCondition(name) => {
                updated.conditions.retain(|c| c != name);
            }
            Action::CustomNote(text) => {
                updated.notes = Some(text.clone());
            }
        }

        let summary = make_summary(
            &format!("Combat {}", self.tag()),
            &updated.name,
            Some(&format!("hp {}/{}", updated.current_hp, updated.max_hp)),
        );

        Mutation {
            combatant: updated,
            summary,
        }
    }
}

/// Result of applying an action
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub combatant: Combatant,
    pub summary: String,
}

/// Parse and apply an action request in one step
pub fn apply_action(
    combatant: &Combatant,
    tag: &str,
    value: Option<&ActionValue>,
    condition: Option<&str>,
) -> Result<Mutation, CombatError> {
    Ok(Action::from_request(tag, value, condition)?.apply(combatant))
}

/// Non-negative amount for HP actions; negative values clamp to 0
fn amount(tag: &str, value: Option<&ActionValue>) -> Result<i64, CombatError> {
    let value = value.ok_or_else(|| {
        CombatError::InvalidAction(format!("{} requires a numeric value", tag))
    })?;
    let amount = value.as_amount().ok_or_else(|| {
        CombatError::InvalidAction(format!(
            "{} requires a numeric value, got \"{}\"",
            tag, value
        ))
    })?;
    Ok(amount.max(0))
}

fn condition_name(
    tag: &str,
    value: Option<&ActionValue>,
    condition: Option<&str>,
) -> Result<String, CombatError> {
    let name = condition
        .or_else(|| value.and_then(ActionValue::as_text))
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(CombatError::InvalidAction(format!(
            "condition is required for {}",
            tag
        )));
    }
    Ok(name.to_string())
}
