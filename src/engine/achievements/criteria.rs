//! Achievement criteria keys and how each one reads a profile

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::profile::Profile;
use crate::error::{EngineError, EngineResult};

/// The profile metric an achievement is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriteriaKey {
    LessonsCompleted,
    ExercisesCompleted,
    PerfectScores,
    StreakMaintained,
    CulturalContributions,
    PointsEarned,
    LevelReached,
}

impl CriteriaKey {
    pub fn all() -> &'static [CriteriaKey] {
        &[
            Self::LessonsCompleted,
            Self::ExercisesCompleted,
            Self::PerfectScores,
            Self::StreakMaintained,
            Self::CulturalContributions,
            Self::PointsEarned,
            Self::LevelReached,
        ]
    }

    /// String form used for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessonsCompleted => "LESSONS_COMPLETED",
            Self::ExercisesCompleted => "EXERCISES_COMPLETED",
            Self::PerfectScores => "PERFECT_SCORES",
            Self::StreakMaintained => "STREAK_MAINTAINED",
            Self::CulturalContributions => "CULTURAL_CONTRIBUTIONS",
            Self::PointsEarned => "POINTS_EARNED",
            Self::LevelReached => "LEVEL_REACHED",
        }
    }

    /// Parse a key, accepting any letter case (`lessons_completed` works too)
    pub fn parse(s: &str) -> EngineResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.as_str() == upper)
            .ok_or_else(|| EngineError::validation(format!("unknown criteria key: {}", s)))
    }

    /// Current value of this metric for a profile on `today`
    pub fn value_of(&self, profile: &Profile, today: NaiveDate) -> u64 {
        let counters = &profile.counters;
        match self {
            Self::LessonsCompleted => u64::from(counters.lessons_completed),
            Self::ExercisesCompleted => u64::from(counters.exercises_completed),
            Self::PerfectScores => u64::from(counters.perfect_scores),
            Self::StreakMaintained => u64::from(profile.effective_streak(today)),
            Self::CulturalContributions => u64::from(counters.cultural_contributions),
            Self::PointsEarned => profile.total_points,
            Self::LevelReached => u64::from(profile.level),
        }
    }
}

impl std::fmt::Display for CriteriaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            CriteriaKey::parse("lessons_completed").unwrap(),
            CriteriaKey::LessonsCompleted
        );
        assert_eq!(
            CriteriaKey::parse(" Level_Reached ").unwrap(),
            CriteriaKey::LevelReached
        );
        for key in CriteriaKey::all() {
            assert_eq!(CriteriaKey::parse(key.as_str()).unwrap(), *key);
        }
    }

    #[test]
    fn test_unknown_key_is_validation_error() {
        let err = CriteriaKey::parse("words_learned").unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }
}
