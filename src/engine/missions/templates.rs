//! Mission templates, concrete mission instances and per-user progress

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::profile::{kinds, PointsAward};
use crate::engine::rewards::UserReward;
use crate::engine::windows::{day_start, day_window, month_window, week_window, TimeWindow};
use crate::error::{EngineError, EngineResult};

/// How often a template produces a new mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionFrequency {
    Daily,
    Weekly,
    Monthly,
    Once,
}

impl MissionFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Once => "ONCE",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "ONCE" => Ok(Self::Once),
            _ => Err(EngineError::validation(format!("unknown mission frequency: {}", s))),
        }
    }

    /// The mission window containing `now`.
    ///
    /// ONCE missions start at the current day and last `once_duration_days`.
    pub fn window_at(&self, now: DateTime<Utc>, once_duration_days: u32) -> TimeWindow {
        match self {
            Self::Daily => day_window(now),
            Self::Weekly => week_window(now),
            Self::Monthly => month_window(now),
            Self::Once => {
                let start = day_start(now);
                TimeWindow {
                    start,
                    end: start + Duration::days(i64::from(once_duration_days.max(1))),
                }
            }
        }
    }
}

/// What a mission measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionType {
    CompleteLessons,
    CompleteExercises,
    PerfectScores,
    EarnPoints,
    MaintainStreak,
    CulturalContributions,
}

impl MissionType {
    pub fn all() -> &'static [MissionType] {
        &[
            Self::CompleteLessons,
            Self::CompleteExercises,
            Self::PerfectScores,
            Self::EarnPoints,
            Self::MaintainStreak,
            Self::CulturalContributions,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteLessons => "COMPLETE_LESSONS",
            Self::CompleteExercises => "COMPLETE_EXERCISES",
            Self::PerfectScores => "PERFECT_SCORES",
            Self::EarnPoints => "EARN_POINTS",
            Self::MaintainStreak => "MAINTAIN_STREAK",
            Self::CulturalContributions => "CULTURAL_CONTRIBUTIONS",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| EngineError::validation(format!("unknown mission type: {}", s)))
    }

    /// Activity log kind counted inside the mission window, if the type is a count
    pub fn counted_kind(&self) -> Option<&'static str> {
        match self {
            Self::CompleteLessons => Some(kinds::LESSON_COMPLETED),
            Self::CompleteExercises => Some(kinds::EXERCISE_COMPLETED),
            Self::PerfectScores => Some(kinds::PERFECT_SCORE),
            Self::CulturalContributions => Some(kinds::CULTURAL_CONTRIBUTION),
            Self::EarnPoints | Self::MaintainStreak => None,
        }
    }
}

impl std::fmt::Display for MissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blueprint that the generator expands into time-boxed missions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub frequency: MissionFrequency,
    pub mission_type: MissionType,
    pub base_target_value: u64,
    pub base_reward_points: u64,
    pub badge_reward_id: Option<String>,
    pub min_level: u32,
    pub max_level: Option<u32>,
    /// Free-form tags carried for the content side (e.g. a language or topic)
    pub conditions: BTreeMap<String, String>,
    pub is_active: bool,
}

impl MissionTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        frequency: MissionFrequency,
        mission_type: MissionType,
        target: u64,
        reward_points: u64,
    ) -> EngineResult<Self> {
        let template = Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            frequency,
            mission_type,
            base_target_value: target,
            base_reward_points: reward_points,
            badge_reward_id: None,
            min_level: 1,
            max_level: None,
            conditions: BTreeMap::new(),
            is_active: true,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_badge(mut self, reward_id: impl Into<String>) -> Self {
        self.badge_reward_id = Some(reward_id.into());
        self
    }

    pub fn for_levels(mut self, min_level: u32, max_level: Option<u32>) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() || self.name.trim().is_empty() {
            return Err(EngineError::validation("mission template needs an id and a name"));
        }
        if self.base_target_value == 0 {
            return Err(EngineError::validation(format!(
                "mission template {} needs a target of at least 1",
                self.id
            )));
        }
        if self.min_level == 0 {
            return Err(EngineError::validation("min_level starts at 1"));
        }
        if let Some(max) = self.max_level {
            if max < self.min_level {
                return Err(EngineError::validation(format!(
                    "mission template {} has max_level {} below min_level {}",
                    self.id, max, self.min_level
                )));
            }
        }
        Ok(())
    }
}

/// A template bound to a concrete `[start, end)` window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,
    pub template_id: String,
    pub name: String,
    pub mission_type: MissionType,
    pub target_value: u64,
    pub reward_points: u64,
    pub badge_reward_id: Option<String>,
    pub min_level: u32,
    pub max_level: Option<u32>,
    pub start_at: i64,
    pub end_at: i64,
}

impl Mission {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: Utc.timestamp_millis_opt(self.start_at).single().unwrap_or_default(),
            end: Utc.timestamp_millis_opt(self.end_at).single().unwrap_or_default(),
        }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let now_ms = now.timestamp_millis();
        self.start_at <= now_ms && now_ms < self.end_at
    }

    pub fn accepts_level(&self, level: u32) -> bool {
        level >= self.min_level && self.max_level.is_none_or(|max| level <= max)
    }
}

/// A user's progress on one mission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionProgress {
    pub user_id: String,
    pub mission_id: i64,
    /// Latest value reported by the caller
    pub progress: u64,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl MissionProgress {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Progress counted towards the target, capped at the target
    pub fn capped(&self, target: u64) -> u64 {
        self.progress.min(target)
    }
}

/// A mission completed by one progress update, with its payout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionCompletion {
    pub mission: Mission,
    pub progress: MissionProgress,
    pub points: Option<PointsAward>,
    pub badge: Option<UserReward>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        // 2024-05-01 is a Wednesday
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_windows_per_frequency() {
        let now = at(15, 18);

        let daily = MissionFrequency::Daily.window_at(now, 30);
        assert_eq!(daily.start, at(15, 0));
        assert_eq!(daily.end, at(16, 0));

        let weekly = MissionFrequency::Weekly.window_at(now, 30);
        assert_eq!(weekly.start, at(13, 0));
        assert_eq!(weekly.end, at(20, 0));

        let monthly = MissionFrequency::Monthly.window_at(now, 30);
        assert_eq!(monthly.start, at(1, 0));
        assert_eq!(monthly.end, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

        let once = MissionFrequency::Once.window_at(now, 10);
        assert_eq!(once.start, at(15, 0));
        assert_eq!(once.end, at(25, 0));
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(
            MissionType::parse("complete_exercises").unwrap(),
            MissionType::CompleteExercises
        );
        assert_eq!(MissionType::parse("DANCE").unwrap_err().kind(), "VALIDATION");
        assert_eq!(MissionFrequency::parse("hourly").unwrap_err().kind(), "VALIDATION");
    }

    #[test]
    fn test_template_validation() {
        assert!(MissionTemplate::new("t", "T", MissionFrequency::Daily, MissionType::CompleteLessons, 0, 5)
            .is_err());
        let bad_levels = MissionTemplate::new("t", "T", MissionFrequency::Daily, MissionType::CompleteLessons, 3, 5)
            .unwrap()
            .for_levels(5, Some(2));
        assert!(bad_levels.validate().is_err());
    }

    #[test]
    fn test_level_gate() {
        let mission = Mission {
            id: 1,
            template_id: "t".into(),
            name: "T".into(),
            mission_type: MissionType::CompleteLessons,
            target_value: 3,
            reward_points: 10,
            badge_reward_id: None,
            min_level: 3,
            max_level: Some(5),
            start_at: at(1, 0).timestamp_millis(),
            end_at: at(2, 0).timestamp_millis(),
        };
        assert!(!mission.accepts_level(2));
        assert!(mission.accepts_level(3));
        assert!(mission.accepts_level(5));
        assert!(!mission.accepts_level(6));
        assert!(mission.is_open_at(at(1, 23)));
        assert!(!mission.is_open_at(at(2, 0)));
        assert_eq!(mission.window().start, at(1, 0));
    }
}
