//! Init command implementation

use anyhow::{bail, Result};

use lexiquest::Config;

use super::GlobalOptions;

/// Default configuration content for lexiquest init
pub const DEFAULT_CONFIG: &str = r#"# LexiQuest Configuration
# =======================

[database]
# path = "/var/lib/lexiquest/gamification.db"   # default: ~/.lexiquest/gamification.db

# Experience needed for level n+1 is floor(base_experience * growth_factor^(n-1))
[leveling]
base_experience = 100
growth_factor = 1.5

# Points granted per activity
[points]
lesson_completed = 20
exercise_completed = 10
perfect_score_bonus = 15
collaboration_submitted = 25

# Composite POINTS score = level*level_weight + experience*experience_weight
#   + achievements*achievement_weight + missions*mission_weight + rewards*reward_weight
[leaderboard]
level_weight = 100
experience_weight = 1
achievement_weight = 50
mission_weight = 25
reward_weight = 10
recompute_interval_secs = 300

[missions]
generation_interval_secs = 3600
# How long a ONCE mission stays open after generation
once_duration_days = 30

[engine]
max_conflict_retries = 3
recent_activity_limit = 20
collaboration_cache_capacity = 256
"#;

/// Write the config file and create the database
pub fn init_command(options: &GlobalOptions, force: bool, seed: bool) -> Result<()> {
    // Default to global config path
    let config_path = options
        .config
        .clone()
        .unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Created: {}", config_path.display());

    let engine = GlobalOptions {
        config: Some(config_path),
        db: options.db.clone(),
    }
    .open_engine()?;
    println!("Database: {}", engine.db().path().display());

    if seed {
        let report = engine.seed_defaults()?;
        println!(
            "Seeded {} rewards, {} achievements, {} mission templates",
            report.rewards, report.achievements, report.mission_templates
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
        parsed.validate().unwrap();
    }
}
