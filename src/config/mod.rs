//! Configuration loading and management

mod io;

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure (`~/.lexiquest/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Experience curve used to derive levels
    #[serde(default)]
    pub leveling: LevelingSettings,

    /// Points granted per activity kind
    #[serde(default)]
    pub points: PointsSettings,

    /// Composite score weights and recompute cadence
    #[serde(default)]
    pub leaderboard: LeaderboardSettings,

    #[serde(default)]
    pub missions: MissionSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `~/.lexiquest/gamification.db` when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelingSettings {
    /// Experience needed to go from level 1 to level 2
    #[serde(default = "default_base_experience")]
    pub base_experience: u64,

    /// Each level's requirement is the previous one times this factor
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsSettings {
    #[serde(default = "default_lesson_points")]
    pub lesson_completed: u64,

    #[serde(default = "default_exercise_points")]
    pub exercise_completed: u64,

    /// Extra points when every question of an exercise was answered correctly
    #[serde(default = "default_perfect_bonus")]
    pub perfect_score_bonus: u64,

    #[serde(default = "default_collaboration_points")]
    pub collaboration_submitted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSettings {
    #[serde(default = "default_level_weight")]
    pub level_weight: i64,

    #[serde(default = "default_experience_weight")]
    pub experience_weight: i64,

    #[serde(default = "default_achievement_weight")]
    pub achievement_weight: i64,

    #[serde(default = "default_mission_weight")]
    pub mission_weight: i64,

    #[serde(default = "default_reward_weight")]
    pub reward_weight: i64,

    #[serde(default = "default_recompute_interval")]
    pub recompute_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSettings {
    #[serde(default = "default_generation_interval")]
    pub generation_interval_secs: u64,

    /// Window length for one-off (ONCE) missions
    #[serde(default = "default_once_duration_days")]
    pub once_duration_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How many times a conflicting write is retried before surfacing CONFLICT
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Number of activity log entries returned with a profile
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,

    #[serde(default = "default_collaboration_cache_capacity")]
    pub collaboration_cache_capacity: usize,
}

fn default_base_experience() -> u64 {
    100
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_lesson_points() -> u64 {
    20
}

fn default_exercise_points() -> u64 {
    10
}

fn default_perfect_bonus() -> u64 {
    15
}

fn default_collaboration_points() -> u64 {
    25
}

fn default_level_weight() -> i64 {
    100
}

fn default_experience_weight() -> i64 {
    1
}

fn default_achievement_weight() -> i64 {
    50
}

fn default_mission_weight() -> i64 {
    25
}

fn default_reward_weight() -> i64 {
    10
}

fn default_recompute_interval() -> u64 {
    300
}

fn default_generation_interval() -> u64 {
    3600
}

fn default_once_duration_days() -> u32 {
    30
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_recent_activity_limit() -> usize {
    20
}

fn default_collaboration_cache_capacity() -> usize {
    256
}

impl Default for LevelingSettings {
    fn default() -> Self {
        Self {
            base_experience: default_base_experience(),
            growth_factor: default_growth_factor(),
        }
    }
}

impl Default for PointsSettings {
    fn default() -> Self {
        Self {
            lesson_completed: default_lesson_points(),
            exercise_completed: default_exercise_points(),
            perfect_score_bonus: default_perfect_bonus(),
            collaboration_submitted: default_collaboration_points(),
        }
    }
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            level_weight: default_level_weight(),
            experience_weight: default_experience_weight(),
            achievement_weight: default_achievement_weight(),
            mission_weight: default_mission_weight(),
            reward_weight: default_reward_weight(),
            recompute_interval_secs: default_recompute_interval(),
        }
    }
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            generation_interval_secs: default_generation_interval(),
            once_duration_days: default_once_duration_days(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            recent_activity_limit: default_recent_activity_limit(),
            collaboration_cache_capacity: default_collaboration_cache_capacity(),
        }
    }
}

impl Config {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.leveling.base_experience == 0 {
            bail!("leveling.base_experience must be at least 1");
        }
        if !(self.leveling.growth_factor >= 1.0) {
            bail!(
                "leveling.growth_factor must be >= 1.0 (got {})",
                self.leveling.growth_factor
            );
        }
        if self.engine.collaboration_cache_capacity == 0 {
            bail!("engine.collaboration_cache_capacity must be at least 1");
        }
        if self.leaderboard.recompute_interval_secs == 0
            || self.missions.generation_interval_secs == 0
        {
            bail!("scheduler intervals must be greater than zero");
        }
        if self.missions.once_duration_days == 0 {
            bail!("missions.once_duration_days must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [leveling]
            growth_factor = 2.0

            [leaderboard]
            mission_weight = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.leveling.base_experience, 100);
        assert!((config.leveling.growth_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.leaderboard.mission_weight, 40);
        assert_eq!(config.leaderboard.level_weight, 100);
        assert_eq!(config.engine.max_conflict_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_shrinking_curve() {
        let mut config = Config::default();
        config.leveling.growth_factor = 0.9;
        assert!(config.validate().is_err());

        config.leveling.growth_factor = 1.5;
        config.leveling.base_experience = 0;
        assert!(config.validate().is_err());
    }
}
