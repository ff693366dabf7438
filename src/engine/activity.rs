//! Activity ingestion
//!
//! Turns one learning event into counter updates, points, achievement
//! unlocks and mission progress, all on the caller's transaction. An unlock
//! or payout that fails is rolled back on its own; the event still counts.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PointsSettings;
use crate::engine::achievements::{AchievementEvaluator, UserAchievement};
use crate::engine::db::CascadeFailure;
use crate::engine::missions::{MissionCompletion, MissionTracker, MissionType};
use crate::engine::profile::{kinds, CounterDelta, LevelUp, PointsLedger, Profile};
use crate::error::{EngineError, EngineResult};

/// Kind of learning event reported by the content side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    LessonCompleted,
    ExerciseCompleted,
    CollaborationSubmitted,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessonCompleted => "LESSON_COMPLETED",
            Self::ExerciseCompleted => "EXERCISE_COMPLETED",
            Self::CollaborationSubmitted => "COLLABORATION_SUBMITTED",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "LESSON_COMPLETED" | "LESSON" => Ok(Self::LessonCompleted),
            "EXERCISE_COMPLETED" | "EXERCISE" => Ok(Self::ExerciseCompleted),
            "COLLABORATION_SUBMITTED" | "COLLABORATION" => Ok(Self::CollaborationSubmitted),
            _ => Err(EngineError::validation(format!("unknown activity kind: {}", s))),
        }
    }

    /// Activity log kind written for this event
    pub fn log_kind(&self) -> &'static str {
        match self {
            Self::LessonCompleted => kinds::LESSON_COMPLETED,
            Self::ExerciseCompleted => kinds::EXERCISE_COMPLETED,
            Self::CollaborationSubmitted => kinds::CULTURAL_CONTRIBUTION,
        }
    }

    fn base_points(&self, points: &PointsSettings) -> u64 {
        match self {
            Self::LessonCompleted => points.lesson_completed,
            Self::ExerciseCompleted => points.exercise_completed,
            Self::CollaborationSubmitted => points.collaboration_submitted,
        }
    }
}

/// A learning event: `(user, kind, score?, totalQuestions?)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: String,
    pub kind: ActivityKind,
    pub score: Option<u32>,
    pub total_questions: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            score: None,
            total_questions: None,
            description: None,
        }
    }

    pub fn scored(mut self, score: u32, total_questions: u32) -> Self {
        self.score = Some(score);
        self.total_questions = Some(total_questions);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(EngineError::validation("user id must not be empty"));
        }
        match (self.score, self.total_questions) {
            (Some(score), Some(total)) if score > total => Err(EngineError::validation(format!(
                "score {} exceeds total questions {}",
                score, total
            ))),
            (Some(_), None) => Err(EngineError::validation("a score needs a question count")),
            _ => Ok(()),
        }
    }

    /// Every question answered correctly
    pub fn is_perfect(&self) -> bool {
        self.kind != ActivityKind::CollaborationSubmitted
            && matches!((self.score, self.total_questions), (Some(s), Some(t)) if t > 0 && s == t)
    }

    fn counter_delta(&self) -> CounterDelta {
        let mut delta = CounterDelta::default();
        match self.kind {
            ActivityKind::LessonCompleted => delta.lessons_completed = 1,
            ActivityKind::ExerciseCompleted => delta.exercises_completed = 1,
            ActivityKind::CollaborationSubmitted => delta.cultural_contributions = 1,
        }
        if self.is_perfect() {
            delta.perfect_scores = 1;
        }
        delta
    }

    /// Mission types whose observed value this event can change
    fn mission_types(&self) -> Vec<MissionType> {
        let mut types = match self.kind {
            ActivityKind::LessonCompleted => vec![MissionType::CompleteLessons],
            ActivityKind::ExerciseCompleted => vec![MissionType::CompleteExercises],
            ActivityKind::CollaborationSubmitted => vec![MissionType::CulturalContributions],
        };
        if self.is_perfect() {
            types.push(MissionType::PerfectScores);
        }
        types.push(MissionType::MaintainStreak);
        // last, so points paid out by the missions above are counted
        types.push(MissionType::EarnPoints);
        types
    }

    fn description(&self) -> String {
        match &self.description {
            Some(d) => d.clone(),
            None => match (self.score, self.total_questions) {
                (Some(s), Some(t)) => format!("{} ({}/{})", self.kind.as_str(), s, t),
                _ => self.kind.as_str().to_string(),
            },
        }
    }
}

/// Everything one event changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub profile: Profile,
    pub points_awarded: u64,
    pub level_ups: Vec<LevelUp>,
    pub streak_extended: bool,
    pub achievements: Vec<UserAchievement>,
    pub missions: Vec<MissionCompletion>,
}

/// Routes one event through every component
#[derive(Debug, Clone)]
pub struct ActivityProcessor {
    ledger: PointsLedger,
    evaluator: AchievementEvaluator,
    tracker: MissionTracker,
    points: PointsSettings,
}

impl ActivityProcessor {
    pub fn new(
        ledger: PointsLedger,
        evaluator: AchievementEvaluator,
        tracker: MissionTracker,
        points: PointsSettings,
    ) -> Self {
        Self {
            ledger,
            evaluator,
            tracker,
            points,
        }
    }

    pub fn apply(
        &self,
        conn: &Connection,
        event: &ActivityEvent,
        now: DateTime<Utc>,
    ) -> EngineResult<ActivityOutcome> {
        event.validate()?;
        let user_id = event.user_id.as_str();

        let counters = self.ledger.record_counters(conn, user_id, event.counter_delta(), now)?;

        let mut level_ups = Vec::new();
        let mut points_awarded = 0;

        let base = event.kind.base_points(&self.points);
        let award = self.ledger.award_points(
            conn,
            user_id,
            base,
            event.kind.log_kind(),
            &event.description(),
            now,
        )?;
        points_awarded += base;
        level_ups.extend(award.level_up);

        if event.is_perfect() {
            let bonus = self.points.perfect_score_bonus;
            let award = self.ledger.award_points(
                conn,
                user_id,
                bonus,
                kinds::PERFECT_SCORE,
                "Perfect score bonus",
                now,
            )?;
            points_awarded += bonus;
            level_ups.extend(award.level_up);
        }

        let mut achievements = self
            .evaluator
            .evaluate_all(conn, user_id, now, CascadeFailure::Skip)?;

        let mut missions = Vec::new();
        for mission_type in event.mission_types() {
            let profile = self.ledger.get(conn, user_id)?;
            missions.extend(self.tracker.update_progress_with(
                conn,
                user_id,
                mission_type,
                now,
                CascadeFailure::Skip,
                |mission| self.tracker.observed_value(conn, &profile, mission),
            )?);
        }
        if !missions.is_empty() {
            // mission payouts can push points or level over a threshold
            achievements.extend(self.evaluator.evaluate_all(
                conn,
                user_id,
                now,
                CascadeFailure::Skip,
            )?);
        }

        debug!(
            "{} {}: +{} points, {} achievements, {} missions",
            user_id,
            event.kind.as_str(),
            points_awarded,
            achievements.len(),
            missions.len()
        );

        Ok(ActivityOutcome {
            profile: self.ledger.get(conn, user_id)?,
            points_awarded,
            level_ups,
            streak_extended: counters.streak_extended,
            achievements,
            missions,
        })
    }
}
