//! Leaderboard commands

use anyhow::{bail, Result};

use lexiquest::engine::leaderboard::{LeaderboardCategory, WindowType};

use super::{print_json, GlobalOptions};

pub fn recompute_command(
    options: &GlobalOptions,
    window: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let engine = options.open_engine()?;

    if let (Some(window), Some(category)) = (window, category) {
        let window_type = WindowType::parse(window)?;
        let category = LeaderboardCategory::parse(category)?;
        let ranked = engine.recompute_leaderboard(window_type, category)?;
        println!(
            "{}/{}: ranked {} users",
            window_type.as_str(),
            category.as_str(),
            ranked
        );
        return Ok(());
    }

    let report = engine.recompute_all();
    println!(
        "Recomputed {} leaderboards, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        eprintln!(
            "  {}/{}: {}",
            failure.window_type.as_str(),
            failure.category.as_str(),
            failure.error
        );
    }
    if !report.is_complete() {
        bail!("{} leaderboard units failed", report.failed.len());
    }
    Ok(())
}

pub fn leaderboard_command(
    options: &GlobalOptions,
    window: &str,
    category: &str,
    limit: Option<usize>,
) -> Result<()> {
    let engine = options.open_engine()?;
    let window_type = WindowType::parse(window)?;
    let category = LeaderboardCategory::parse(category)?;

    let entries = engine.get_leaderboard(window_type, category, limit)?;
    if entries.is_empty() {
        println!("No snapshot yet. Run `lexiquest recompute` first.");
        return Ok(());
    }

    println!("{} / {}:\n", window_type.as_str(), category.as_str());
    for entry in &entries {
        println!("  {:>4}. {:<24} {}", entry.rank, entry.user_id, entry.score);
    }
    Ok(())
}

pub fn rank_command(options: &GlobalOptions, user: &str, window: &str, category: &str) -> Result<()> {
    let engine = options.open_engine()?;
    let rank = engine.get_user_rank(
        user,
        WindowType::parse(window)?,
        LeaderboardCategory::parse(category)?,
    )?;
    print_json(&rank)
}
