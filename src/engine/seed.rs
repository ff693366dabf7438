//! Starter catalog: rewards, achievements and mission templates
//!
//! Seeding only inserts missing ids, so it is safe to run repeatedly and
//! never overwrites catalog entries edited after the first run.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::engine::achievements::{AchievementEvaluator, DEFAULT_ACHIEVEMENTS};
use crate::engine::missions::{MissionFrequency, MissionGenerator, MissionTemplate, MissionType};
use crate::engine::rewards::{RewardDefinition, RewardEngine, RewardTrigger, RewardValue};
use crate::error::EngineResult;

/// How many catalog rows a seed run inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub rewards: usize,
    pub achievements: usize,
    pub mission_templates: usize,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.rewards + self.achievements + self.mission_templates
    }
}

fn badge(id: &str, name: &str, icon: &str) -> EngineResult<RewardDefinition> {
    Ok(RewardDefinition::new(
        id,
        name,
        RewardValue::Badge {
            badge_id: id.trim_start_matches("badge_").to_string(),
            icon: Some(icon.to_string()),
        },
    )?
    .triggered_by(RewardTrigger::AchievementUnlocked))
}

pub fn default_rewards() -> EngineResult<Vec<RewardDefinition>> {
    Ok(vec![
        badge("badge_conversationalist", "Conversationalist", "speech_balloon")?,
        badge("badge_perfectionist", "Perfectionist", "bullseye")?,
        badge("badge_week_streak", "Week of Words", "fire")?,
        badge("badge_community", "Community Pillar", "handshake")?,
        badge("badge_fluent", "Fluent Learner", "globe")?,
        badge("badge_weekly_champion", "Weekly Champion", "trophy")?
            .triggered_by(RewardTrigger::MissionCompleted),
        RewardDefinition::new("bonus_points_50", "Bonus 50", RewardValue::Points { amount: 50 })?
            .described("Fifty bonus points")
            .triggered_by(RewardTrigger::LevelReached),
        RewardDefinition::new(
            "double_xp_weekend",
            "Double XP Weekend",
            RewardValue::Experience {
                multiplier: 2.0,
                duration_hours: 48,
            },
        )?
        .costing(300)
        .expiring_after_days(14),
        RewardDefinition::new(
            "premium_discount_20",
            "20% off Premium",
            RewardValue::Discount {
                percentage: 20,
                applies_to: Some("premium_subscription".to_string()),
            },
        )?
        .costing(500)
        .expiring_after_days(30),
        RewardDefinition::new(
            "avatar_sombrero",
            "Sombrero",
            RewardValue::Customization {
                item: "sombrero".to_string(),
                slot: "hat".to_string(),
            },
        )?
        .costing(150),
        RewardDefinition::new(
            "story_pack_folklore",
            "Folklore Story Pack",
            RewardValue::ExclusiveContent {
                content_id: "stories/folklore".to_string(),
            },
        )?
        .costing(400),
        RewardDefinition::new(
            "festival_invite",
            "Festival Live Session",
            RewardValue::Cultural {
                event_name: "Dia de los Muertos live session".to_string(),
                region: Some("MX".to_string()),
            },
        )?
        .costing(250)
        .limited(100)
        .expiring_after_days(7),
    ])
}

pub fn default_mission_templates() -> EngineResult<Vec<MissionTemplate>> {
    Ok(vec![
        MissionTemplate::new(
            "daily_lessons",
            "Daily Practice",
            MissionFrequency::Daily,
            MissionType::CompleteLessons,
            2,
            30,
        )?
        .described("Complete 2 lessons today"),
        MissionTemplate::new(
            "daily_exercises",
            "Exercise Routine",
            MissionFrequency::Daily,
            MissionType::CompleteExercises,
            5,
            25,
        )?
        .described("Complete 5 exercises today"),
        MissionTemplate::new(
            "weekly_perfect",
            "Sharp Week",
            MissionFrequency::Weekly,
            MissionType::PerfectScores,
            3,
            75,
        )?
        .described("Get 3 perfect scores this week"),
        MissionTemplate::new(
            "weekly_points",
            "Point Hunter",
            MissionFrequency::Weekly,
            MissionType::EarnPoints,
            500,
            100,
        )?
        .described("Earn 500 points this week")
        .with_badge("badge_weekly_champion")
        .for_levels(2, None),
        MissionTemplate::new(
            "monthly_culture",
            "Culture Month",
            MissionFrequency::Monthly,
            MissionType::CulturalContributions,
            4,
            150,
        )?
        .described("Share 4 cultural contributions this month"),
        MissionTemplate::new(
            "welcome_streak",
            "Welcome Streak",
            MissionFrequency::Once,
            MissionType::MaintainStreak,
            3,
            50,
        )?
        .described("Practice 3 days in a row")
        .for_levels(1, Some(5)),
    ])
}

/// Install the starter catalog; existing ids are left untouched
pub fn seed_defaults(
    conn: &Connection,
    rewards: &RewardEngine,
    evaluator: &AchievementEvaluator,
    generator: &MissionGenerator,
    now: DateTime<Utc>,
) -> EngineResult<SeedReport> {
    let mut report = SeedReport::default();

    // rewards first: achievements and templates reference badges
    for definition in default_rewards()? {
        if rewards.insert_definition(conn, &definition, now)? {
            report.rewards += 1;
        }
    }
    for seed in DEFAULT_ACHIEVEMENTS {
        if evaluator.insert_definition(conn, &seed.to_definition(), now)? {
            report.achievements += 1;
        }
    }
    for template in default_mission_templates()? {
        if generator.insert_template(conn, &template, now)? {
            report.mission_templates += 1;
        }
    }

    Ok(report)
}
