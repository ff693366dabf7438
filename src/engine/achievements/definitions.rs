//! Achievement definitions and per-user achievement records
//!
//! The starter catalog lives in [`DEFAULT_ACHIEVEMENTS`]; definitions added
//! at runtime are stored alongside it in `achievement_definitions`.

use serde::{Deserialize, Serialize};

use super::criteria::CriteriaKey;
use crate::error::{EngineError, EngineResult};

/// A threshold on one criteria key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria: CriteriaKey,
    /// Unlocks once the criteria value reaches this number
    pub requirement: u64,
    pub bonus_points: u64,
    /// Badge reward handed out alongside the achievement
    pub badge_reward_id: Option<String>,
}

impl AchievementDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        criteria: CriteriaKey,
        requirement: u64,
    ) -> EngineResult<Self> {
        let definition = Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            criteria,
            requirement,
            bonus_points: 0,
            badge_reward_id: None,
        };
        definition.validate()?;
        Ok(definition)
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_bonus(mut self, points: u64) -> Self {
        self.bonus_points = points;
        self
    }

    pub fn with_badge(mut self, reward_id: impl Into<String>) -> Self {
        self.badge_reward_id = Some(reward_id.into());
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("achievement id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(EngineError::validation("achievement name must not be empty"));
        }
        if self.requirement == 0 {
            return Err(EngineError::validation(format!(
                "achievement {} needs a requirement of at least 1",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether a criteria value satisfies this definition
    pub fn is_met_by(&self, value: u64) -> bool {
        value >= self.requirement
    }
}

/// Compile-time entry of the starter catalog
#[derive(Debug, Clone, Copy)]
pub struct AchievementSeed {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub criteria: CriteriaKey,
    pub requirement: u64,
    pub bonus_points: u64,
    pub badge_reward_id: Option<&'static str>,
}

impl AchievementSeed {
    pub fn to_definition(&self) -> AchievementDefinition {
        AchievementDefinition {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            criteria: self.criteria,
            requirement: self.requirement,
            bonus_points: self.bonus_points,
            badge_reward_id: self.badge_reward_id.map(str::to_string),
        }
    }
}

/// Starter achievements
pub static DEFAULT_ACHIEVEMENTS: &[AchievementSeed] = &[
    // === LESSONS ===
    AchievementSeed {
        id: "first_lesson",
        name: "First Words",
        description: "Complete your first lesson",
        criteria: CriteriaKey::LessonsCompleted,
        requirement: 1,
        bonus_points: 10,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "ten_lessons",
        name: "Conversationalist",
        description: "Complete 10 lessons",
        criteria: CriteriaKey::LessonsCompleted,
        requirement: 10,
        bonus_points: 50,
        badge_reward_id: Some("badge_conversationalist"),
    },
    AchievementSeed {
        id: "fifty_lessons",
        name: "Storyteller",
        description: "Complete 50 lessons",
        criteria: CriteriaKey::LessonsCompleted,
        requirement: 50,
        bonus_points: 150,
        badge_reward_id: None,
    },
    // === EXERCISES ===
    AchievementSeed {
        id: "ten_exercises",
        name: "Drill Sergeant",
        description: "Complete 10 exercises",
        criteria: CriteriaKey::ExercisesCompleted,
        requirement: 10,
        bonus_points: 25,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "hundred_exercises",
        name: "Grammar Grinder",
        description: "Complete 100 exercises",
        criteria: CriteriaKey::ExercisesCompleted,
        requirement: 100,
        bonus_points: 200,
        badge_reward_id: None,
    },
    // === PERFECT SCORES ===
    AchievementSeed {
        id: "first_perfect",
        name: "Flawless",
        description: "Get every question right in an exercise",
        criteria: CriteriaKey::PerfectScores,
        requirement: 1,
        bonus_points: 15,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "perfectionist",
        name: "Perfectionist",
        description: "Score perfectly 25 times",
        criteria: CriteriaKey::PerfectScores,
        requirement: 25,
        bonus_points: 100,
        badge_reward_id: Some("badge_perfectionist"),
    },
    // === STREAKS ===
    AchievementSeed {
        id: "streak_3",
        name: "Warming Up",
        description: "Practice 3 days in a row",
        criteria: CriteriaKey::StreakMaintained,
        requirement: 3,
        bonus_points: 20,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "streak_7",
        name: "Week of Words",
        description: "Practice 7 days in a row",
        criteria: CriteriaKey::StreakMaintained,
        requirement: 7,
        bonus_points: 75,
        badge_reward_id: Some("badge_week_streak"),
    },
    AchievementSeed {
        id: "streak_30",
        name: "Habit Formed",
        description: "Practice 30 days in a row",
        criteria: CriteriaKey::StreakMaintained,
        requirement: 30,
        bonus_points: 300,
        badge_reward_id: None,
    },
    // === CULTURE ===
    AchievementSeed {
        id: "first_contribution",
        name: "Cultural Ambassador",
        description: "Share your first cultural contribution",
        criteria: CriteriaKey::CulturalContributions,
        requirement: 1,
        bonus_points: 20,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "ten_contributions",
        name: "Community Pillar",
        description: "Share 10 cultural contributions",
        criteria: CriteriaKey::CulturalContributions,
        requirement: 10,
        bonus_points: 100,
        badge_reward_id: Some("badge_community"),
    },
    // === POINTS & LEVELS ===
    AchievementSeed {
        id: "points_1000",
        name: "Point Collector",
        description: "Earn 1,000 points",
        criteria: CriteriaKey::PointsEarned,
        requirement: 1000,
        bonus_points: 50,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "level_5",
        name: "Rising Star",
        description: "Reach level 5",
        criteria: CriteriaKey::LevelReached,
        requirement: 5,
        bonus_points: 50,
        badge_reward_id: None,
    },
    AchievementSeed {
        id: "level_10",
        name: "Fluent Learner",
        description: "Reach level 10",
        criteria: CriteriaKey::LevelReached,
        requirement: 10,
        bonus_points: 150,
        badge_reward_id: Some("badge_fluent"),
    },
];

/// Lifecycle of a user's achievement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementStatus {
    InProgress,
    Completed,
    Failed,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Partial progress towards an achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

impl Progress {
    /// Fraction complete (0.0 - 1.0)
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.current as f32 / self.total as f32).min(1.0)
        }
    }
}

/// One user's record for one achievement; unique per (user, achievement)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_id: String,
    pub status: AchievementStatus,
    pub progress: Progress,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_catalog_is_consistent() {
        let mut ids = HashSet::new();
        for seed in DEFAULT_ACHIEVEMENTS {
            assert!(ids.insert(seed.id), "duplicate achievement {}", seed.id);
            seed.to_definition().validate().unwrap();
        }
    }

    #[test]
    fn test_requirement_must_be_positive() {
        let err = AchievementDefinition::new("zero", "Zero", CriteriaKey::LessonsCompleted, 0)
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[test]
    fn test_progress_fraction() {
        let p = Progress { current: 3, total: 12 };
        assert!((p.fraction() - 0.25).abs() < f32::EPSILON);
        assert_eq!(Progress { current: 20, total: 10 }.fraction(), 1.0);
    }
}
