//! Profile, points and activity commands

use anyhow::Result;

use lexiquest::engine::activity::{ActivityEvent, ActivityKind};

use super::{print_json, GlobalOptions};

pub fn profile_command(options: &GlobalOptions, user: &str) -> Result<()> {
    let engine = options.open_engine()?;
    let profile = engine.profile(user)?;

    let progress = profile.level_progress();
    let streak = profile.streak_info();
    println!(
        "{}: level {} ({}/{} xp), {} points, streak {} (best {})",
        profile.user_id,
        progress.level,
        progress.experience,
        progress.next_level_experience,
        profile.total_points,
        streak.current,
        streak.best
    );
    print_json(&profile)
}

pub fn award_points_command(
    options: &GlobalOptions,
    user: &str,
    points: u64,
    kind: &str,
    description: &str,
) -> Result<()> {
    let engine = options.open_engine()?;
    let award = engine.award_points(user, points, kind, description)?;
    if let Some(level_up) = &award.level_up {
        println!("Level up! {} -> {}", level_up.old_level, level_up.new_level);
    }
    print_json(&award.profile)
}

pub fn adjust_points_command(
    options: &GlobalOptions,
    user: &str,
    delta: i64,
    reason: &str,
) -> Result<()> {
    let engine = options.open_engine()?;
    let award = engine.adjust_points(user, delta, reason)?;
    print_json(&award.profile)
}

pub fn activity_command(
    options: &GlobalOptions,
    user: &str,
    kind: &str,
    score: Option<u32>,
    total: Option<u32>,
    description: Option<String>,
) -> Result<()> {
    let engine = options.open_engine()?;

    let mut event = ActivityEvent::new(user, ActivityKind::parse(kind)?);
    if let (Some(score), Some(total)) = (score, total) {
        event = event.scored(score, total);
    }
    if let Some(description) = description {
        event = event.described(description);
    }

    let outcome = engine.record_activity(&event)?;
    for achievement in &outcome.achievements {
        println!("Achievement unlocked: {}", achievement.achievement_id);
    }
    for completion in &outcome.missions {
        println!("Mission completed: {}", completion.mission.name);
    }
    print_json(&outcome)
}
