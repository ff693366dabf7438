//! Achievement commands

use anyhow::Result;

use super::{print_json, GlobalOptions};

/// Evaluate one criteria against `value`, or every criteria against the profile
pub fn evaluate_command(
    options: &GlobalOptions,
    user: &str,
    criteria: Option<&str>,
    value: Option<u64>,
) -> Result<()> {
    let engine = options.open_engine()?;
    let granted = match (criteria, value) {
        (Some(criteria), Some(value)) => engine.evaluate_criteria(user, criteria, value)?,
        _ => engine.evaluate_achievements(user)?,
    };

    if granted.is_empty() {
        println!("No new achievements.");
    }
    for achievement in &granted {
        println!("Achievement unlocked: {}", achievement.achievement_id);
    }

    print_json(&engine.list_user_achievements(user)?)
}
