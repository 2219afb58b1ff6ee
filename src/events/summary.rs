//! Human-readable summaries for audit events

use std::fmt::Write;

/// "<action>: <detail>" with an optional " - <extra>" suffix
pub fn make_summary(action: &str, detail: &str, extra: Option<&str>) -> String {
    match extra {
        Some(extra) => format!("{}: {} - {}", action, detail, extra),
        None => format!("{}: {}", action, detail),
    }
}

/// "N combatants (a side, b side)" with sides in first-seen order
pub fn summarize_roster<'a, I>(roster: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut total = 0;
    let mut sides: Vec<(&str, usize)> = Vec::new();

    for (_name, side) in roster {
        total += 1;
        match sides.iter_mut().find(|(s, _)| *s == side) {
            Some((_, count)) => *count += 1,
            None => sides.push((side, 1)),
        }
    }

    if total == 0 {
        return "empty roster".to_string();
    }

    let mut grouped = String::new();
    for (i, (side, count)) in sides.iter().enumerate() {
        if i > 0 {
            grouped.push_str(", ");
        }
        let _ = write!(grouped, "{} {}", count, side);
    }

    format!("{} combatants ({})", total, grouped)
}

/// "Rolled <table>: <roll> -> <result>"
pub fn summarize_table_roll(table: &str, roll: i64, result: Option<&serde_json::Value>) -> String {
    let rendered = match result {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "no entry".to_string(),
    };
    format!("Rolled {}: {} -> {}", table, roll, rendered)
}
