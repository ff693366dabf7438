//! Leaderboard data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LeaderboardSettings;
use crate::engine::windows::{day_window, month_window, week_window, TimeWindow};
use crate::error::{EngineError, EngineResult};

/// Time range a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowType {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl WindowType {
    pub fn all() -> &'static [WindowType] {
        &[Self::Daily, Self::Weekly, Self::Monthly, Self::AllTime]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::AllTime => "ALL_TIME",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|w| w.as_str() == upper)
            .ok_or_else(|| EngineError::validation(format!("unknown leaderboard window: {}", s)))
    }

    /// Calendar window containing `now`; None for ALL_TIME
    pub fn window_at(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        match self {
            Self::Daily => Some(day_window(now)),
            Self::Weekly => Some(week_window(now)),
            Self::Monthly => Some(month_window(now)),
            Self::AllTime => None,
        }
    }
}

/// Metric a snapshot ranks by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaderboardCategory {
    Points,
    LessonsCompleted,
    ExercisesCompleted,
    PerfectScores,
    LearningStreak,
    CulturalContributions,
}

impl LeaderboardCategory {
    pub fn all() -> &'static [LeaderboardCategory] {
        &[
            Self::Points,
            Self::LessonsCompleted,
            Self::ExercisesCompleted,
            Self::PerfectScores,
            Self::LearningStreak,
            Self::CulturalContributions,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "POINTS",
            Self::LessonsCompleted => "LESSONS_COMPLETED",
            Self::ExercisesCompleted => "EXERCISES_COMPLETED",
            Self::PerfectScores => "PERFECT_SCORES",
            Self::LearningStreak => "LEARNING_STREAK",
            Self::CulturalContributions => "CULTURAL_CONTRIBUTIONS",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| EngineError::validation(format!("unknown leaderboard category: {}", s)))
    }
}

/// Weights of the composite POINTS score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub level: i64,
    pub experience: i64,
    pub achievement: i64,
    pub mission: i64,
    pub reward: i64,
}

impl ScoreWeights {
    pub fn from_settings(settings: &LeaderboardSettings) -> Self {
        Self {
            level: settings.level_weight,
            experience: settings.experience_weight,
            achievement: settings.achievement_weight,
            mission: settings.mission_weight,
            reward: settings.reward_weight,
        }
    }

    /// `level*lw + experience*ew + achievements*aw + missions*mw + rewards*rw`
    pub fn score(&self, inputs: &ScoreInputs) -> i64 {
        inputs.level.saturating_mul(self.level)
            .saturating_add(inputs.experience.saturating_mul(self.experience))
            .saturating_add(inputs.achievements.saturating_mul(self.achievement))
            .saturating_add(inputs.missions.saturating_mul(self.mission))
            .saturating_add(inputs.rewards.saturating_mul(self.reward))
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::from_settings(&LeaderboardSettings::default())
    }
}

/// Per-user figures feeding the composite score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub level: i64,
    pub experience: i64,
    pub achievements: i64,
    pub missions: i64,
    pub rewards: i64,
}

/// One ranked row of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub window_type: WindowType,
    pub category: LeaderboardCategory,
    pub user_id: String,
    pub score: i64,
    /// Dense rank, starting at 1
    pub rank: u32,
    pub computed_at: i64,
}

/// A user's position in a snapshot; rank 0 means not ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankInfo {
    pub rank: u32,
    pub total: u32,
    pub score: Option<i64>,
}

/// One (window, category) unit that could not be recomputed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub window_type: WindowType,
    pub category: LeaderboardCategory,
    pub error: String,
}

/// Outcome of a full recomputation batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: Vec<(WindowType, LeaderboardCategory)>,
    pub failed: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_score_uses_weights() {
        let inputs = ScoreInputs {
            level: 3,
            experience: 40,
            achievements: 2,
            missions: 1,
            rewards: 4,
        };
        // 300 + 40 + 100 + 25 + 40
        assert_eq!(ScoreWeights::default().score(&inputs), 505);

        let flat = ScoreWeights {
            level: 0,
            experience: 1,
            achievement: 0,
            mission: 0,
            reward: 0,
        };
        assert_eq!(flat.score(&inputs), 40);
    }

    #[test]
    fn test_parsing_accepts_cli_spellings() {
        assert_eq!(WindowType::parse("all-time").unwrap(), WindowType::AllTime);
        assert_eq!(
            LeaderboardCategory::parse("learning_streak").unwrap(),
            LeaderboardCategory::LearningStreak
        );
        assert_eq!(WindowType::parse("yearly").unwrap_err().kind(), "VALIDATION");
    }
}
