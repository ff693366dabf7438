//! Profile data models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::levels::LevelProgress;
use super::streaks::StreakInfo;

/// Activity log kinds written by the engine
pub mod kinds {
    pub const LESSON_COMPLETED: &str = "lesson_completed";
    pub const EXERCISE_COMPLETED: &str = "exercise_completed";
    pub const PERFECT_SCORE: &str = "perfect_score";
    pub const CULTURAL_CONTRIBUTION: &str = "cultural_contribution";
    pub const LEVEL_UP: &str = "level_up";
    pub const ACHIEVEMENT_UNLOCKED: &str = "achievement_unlocked";
    pub const MISSION_COMPLETED: &str = "mission_completed";
    pub const REWARD_POINTS: &str = "reward_points";
    pub const ADMIN_CORRECTION: &str = "admin_correction";
}

/// Activity counters tracked per profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub lessons_completed: u32,
    pub exercises_completed: u32,
    pub perfect_scores: u32,
    pub cultural_contributions: u32,
    /// Current daily learning streak
    pub streak: u32,
    pub best_streak: u32,
}

/// Increments applied to [`Counters`] by one activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub lessons_completed: u32,
    pub exercises_completed: u32,
    pub perfect_scores: u32,
    pub cultural_contributions: u32,
}

/// One entry of a profile's activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: String,
    pub description: String,
    pub points_earned: i64,
    /// ms since epoch
    pub timestamp: i64,
}

/// Gamification profile of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub total_points: u64,
    pub level: u32,
    /// Experience inside the current level
    pub experience: u64,
    pub next_level_experience: u64,
    /// Experience accumulated since creation; `level` is derived from it
    pub lifetime_experience: u64,
    pub counters: Counters,
    pub last_activity_day: Option<String>,
    /// Most recent entries, oldest first
    pub recent_activities: Vec<ActivityEntry>,
    /// Optimistic concurrency version, bumped on every write
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    pub fn level_progress(&self) -> LevelProgress {
        LevelProgress {
            level: self.level,
            experience: self.experience,
            next_level_experience: self.next_level_experience,
        }
    }

    /// The stored streak only resets on the next activity; a lapsed one counts as 0
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        if self.streak_info().is_active(today) {
            self.counters.streak
        } else {
            0
        }
    }

    pub fn streak_info(&self) -> StreakInfo {
        StreakInfo {
            current: self.counters.streak,
            best: self.counters.best_streak,
            last_activity_day: self.last_activity_day.clone(),
        }
    }
}
