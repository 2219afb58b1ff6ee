//! Stat blocks, initiative and hit point resolution
//!
//! Roster members carry a loosely structured stat block. Initiative and HP are
//! pulled from it with ordered lists of [`StatRule`]s; the first rule that
//! yields a number wins.

use serde_json::Value;

/// Free-form stat block attached to a roster member
pub type StatBlock = serde_json::Map<String, Value>;

/// One way of pulling a number out of a stat block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatRule {
    /// A top-level numeric field
    Field(&'static str),
    /// `field.key` when `field` is an object, otherwise `field` itself
    Nested(&'static str, &'static str),
}

impl StatRule {
    pub fn extract(&self, stats: &StatBlock) -> Option<i64> {
        match self {
            StatRule::Field(name) => stats.get(*name).and_then(numeric),
            StatRule::Nested(name, key) => match stats.get(*name)? {
                Value::Object(inner) => inner.get(*key).and_then(numeric),
                other => numeric(other),
            },
        }
    }
}

/// Initiative sources in priority order
pub const INITIATIVE_RULES: &[StatRule] = &[
    StatRule::Field("initiative"),
    StatRule::Field("initiative_bonus"),
    StatRule::Field("initiativeBonus"),
    StatRule::Field("dex_mod"),
    StatRule::Field("dexMod"),
];

/// Maximum HP sources in priority order
pub const MAX_HP_RULES: &[StatRule] = &[
    StatRule::Field("maxHp"),
    StatRule::Field("max_hp"),
    StatRule::Field("hp_max"),
    StatRule::Nested("hit_points", "max"),
    StatRule::Nested("hp", "max"),
];

/// Current HP sources in priority order
pub const CURRENT_HP_RULES: &[StatRule] = &[
    StatRule::Field("currentHp"),
    StatRule::Field("current_hp"),
    StatRule::Field("hp_current"),
    StatRule::Nested("hit_points", "current"),
    StatRule::Nested("hp", "current"),
];

/// First value produced by `rules`, if any
pub fn first_match(rules: &[StatRule], stats: &StatBlock) -> Option<i64> {
    rules.iter().find_map(|rule| rule.extract(stats))
}

/// Interpret a JSON value as an integer, truncating fractions.
///
/// Numeric strings count; anything else is `None`.
pub fn numeric(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Initiative for the roster member at `index` of a roster of `roster_size`.
///
/// Without stat data the score falls back to `(roster_size - index) * 10`, so
/// earlier-declared members go first.
pub fn resolve_initiative(stats: Option<&StatBlock>, index: usize, roster_size: usize) -> i64 {
    stats
        .and_then(|s| first_match(INITIATIVE_RULES, s))
        .unwrap_or_else(|| fallback_initiative(index, roster_size))
}

fn fallback_initiative(index: usize, roster_size: usize) -> i64 {
    (roster_size.saturating_sub(index) as i64).saturating_mul(10)
}

/// Resolved hit points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitPoints {
    pub max: i64,
    pub current: i64,
}

/// Resolve hit points, clamped so that `0 <= current <= max`
pub fn resolve_hp(stats: Option<&StatBlock>) -> HitPoints {
    let Some(stats) = stats else {
        return HitPoints::default();
    };

    let current = first_match(CURRENT_HP_RULES, stats);
    let max = first_match(MAX_HP_RULES, stats)
        .or(current)
        .unwrap_or(0)
        .max(0);
    let current = current.unwrap_or(max).clamp(0, max);

    HitPoints { max, current }
}
