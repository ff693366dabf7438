//! Mission generation, progress and one-time payout

mod common;

use chrono::Duration;
use common::{lesson, test_engine, TestEngine};
use lexiquest::engine::missions::{MissionFrequency, MissionTemplate, MissionType};
use lexiquest::engine::profile::kinds;
use lexiquest::engine::rewards::{RewardDefinition, RewardValue};
use lexiquest::EngineError;

fn daily(id: &str, mission_type: MissionType, target: u64, points: u64) -> MissionTemplate {
    MissionTemplate::new(id, id, MissionFrequency::Daily, mission_type, target, points).unwrap()
}

fn with_template(template: MissionTemplate) -> TestEngine {
    let t = test_engine();
    assert!(t.engine.create_mission_template(&template).unwrap());
    assert_eq!(t.engine.generate_missions().unwrap().len(), 1);
    t
}

#[test]
fn test_completion_pays_exactly_once() {
    let t = with_template(daily("five_lessons", MissionType::CompleteLessons, 5, 40));
    let engine = &t.engine;

    assert!(engine
        .update_mission_progress("ana", MissionType::CompleteLessons, 2)
        .unwrap()
        .is_empty());
    assert!(engine
        .update_mission_progress("ana", MissionType::CompleteLessons, 4)
        .unwrap()
        .is_empty());

    let completed = engine
        .update_mission_progress("ana", MissionType::CompleteLessons, 6)
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].progress.progress, 6);
    assert_eq!(engine.profile("ana").unwrap().total_points, 40);

    assert!(engine
        .update_mission_progress("ana", MissionType::CompleteLessons, 7)
        .unwrap()
        .is_empty());
    let profile = engine.profile("ana").unwrap();
    assert_eq!(profile.total_points, 40);
    let payouts = profile
        .recent_activities
        .iter()
        .filter(|a| a.kind == kinds::MISSION_COMPLETED)
        .count();
    assert_eq!(payouts, 1);

    // latest reported value is kept
    let progress = engine.user_mission_progress("ana").unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].progress.progress, 7);
    assert!(progress[0].progress.is_completed());
}

#[test]
fn test_generation_is_idempotent_per_window() {
    let t = with_template(daily("daily_lessons", MissionType::CompleteLessons, 2, 30));
    let engine = &t.engine;

    assert!(engine.generate_missions().unwrap().is_empty());

    t.clock.advance(Duration::days(1));
    assert_eq!(engine.generate_missions().unwrap().len(), 1);
    assert_eq!(engine.active_missions().unwrap().len(), 1);

    engine.set_mission_template_active("daily_lessons", false).unwrap();
    t.clock.advance(Duration::days(1));
    assert!(engine.generate_missions().unwrap().is_empty());
    assert!(engine.active_missions().unwrap().is_empty());
}

#[test]
fn test_once_template_generates_a_single_mission() {
    let t = with_template(
        MissionTemplate::new(
            "welcome",
            "Welcome",
            MissionFrequency::Once,
            MissionType::MaintainStreak,
            3,
            50,
        )
        .unwrap(),
    );
    t.clock.advance(Duration::days(2));
    assert!(t.engine.generate_missions().unwrap().is_empty());
}

#[test]
fn test_activity_counts_inside_the_mission_window() {
    let t = with_template(daily("daily_lessons", MissionType::CompleteLessons, 2, 30));
    let engine = &t.engine;

    let first = engine.record_activity(&lesson("ana")).unwrap();
    assert!(first.missions.is_empty());

    let second = engine.record_activity(&lesson("ana")).unwrap();
    assert_eq!(second.missions.len(), 1);
    assert_eq!(second.missions[0].mission.template_id, "daily_lessons");
    assert_eq!(second.profile.total_points, 2 * 20 + 30);

    // yesterday's lessons do not count towards today's mission
    t.clock.advance(Duration::days(1));
    engine.generate_missions().unwrap();
    let next_day = engine.record_activity(&lesson("ana")).unwrap();
    assert!(next_day.missions.is_empty());

    let progress = engine.user_mission_progress("ana").unwrap();
    assert_eq!(progress.len(), 2);
    // newest window first
    assert_eq!(progress[0].progress.progress, 1);
    assert!(!progress[0].progress.is_completed());
    assert!(progress[1].progress.is_completed());
}

#[test]
fn test_level_range_gates_missions() {
    let t = with_template(
        daily("veterans", MissionType::CompleteLessons, 1, 10).for_levels(2, None),
    );
    let engine = &t.engine;

    let outcome = engine.record_activity(&lesson("ana")).unwrap();
    assert!(outcome.missions.is_empty());
    assert!(engine.user_mission_progress("ana").unwrap().is_empty());

    engine.award_points("ana", 200, "manual", "catch-up").unwrap();
    let outcome = engine.record_activity(&lesson("ana")).unwrap();
    assert_eq!(outcome.missions.len(), 1);
}

#[test]
fn test_mission_badge_is_awarded_with_payout() {
    let t = test_engine();
    let engine = &t.engine;
    engine
        .create_reward(
            &RewardDefinition::new(
                "badge_champion",
                "Champion",
                RewardValue::Badge {
                    badge_id: "champion".to_string(),
                    icon: None,
                },
            )
            .unwrap(),
        )
        .unwrap();
    engine
        .create_mission_template(
            &daily("champion", MissionType::EarnPoints, 100, 25).with_badge("badge_champion"),
        )
        .unwrap();
    engine.generate_missions().unwrap();

    let completed = engine
        .update_mission_progress("ana", MissionType::EarnPoints, 120)
        .unwrap();
    assert_eq!(completed.len(), 1);
    let badge = completed[0].badge.as_ref().expect("badge granted");
    assert_eq!(badge.reward_id, "badge_champion");
    assert!(badge.metadata["source"].starts_with("mission:"));
}

fn sold_out_badge(t: &TestEngine, id: &str) {
    t.engine
        .create_reward(
            &RewardDefinition::new(
                id,
                id,
                RewardValue::Badge {
                    badge_id: id.to_string(),
                    icon: None,
                },
            )
            .unwrap()
            .limited(1),
        )
        .unwrap();
    t.engine.award_reward("someone_else", id).unwrap();
}

#[test]
fn test_failed_mission_badge_rolls_back_the_payout() {
    let t = test_engine();
    let engine = &t.engine;
    sold_out_badge(&t, "badge_gold");
    engine
        .create_mission_template(
            &daily("gold", MissionType::CompleteExercises, 3, 60).with_badge("badge_gold"),
        )
        .unwrap();
    engine.generate_missions().unwrap();
    engine.award_points("ana", 5, "manual", "").unwrap();

    let err = engine
        .update_mission_progress("ana", MissionType::CompleteExercises, 3)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    assert_eq!(engine.profile("ana").unwrap().total_points, 5);
    assert!(engine.user_mission_progress("ana").unwrap().is_empty());
    let badge = engine
        .list_rewards()
        .unwrap()
        .into_iter()
        .find(|r| r.id == "badge_gold")
        .unwrap();
    assert_eq!(badge.times_awarded, 1);
}

#[test]
fn test_failed_mission_badge_keeps_the_lesson_and_progress() {
    let t = test_engine();
    let engine = &t.engine;
    sold_out_badge(&t, "badge_gold");
    engine
        .create_mission_template(
            &daily("gold", MissionType::CompleteLessons, 1, 60).with_badge("badge_gold"),
        )
        .unwrap();
    engine.generate_missions().unwrap();

    let outcome = engine.record_activity(&lesson("ana")).unwrap();
    assert!(outcome.missions.is_empty());
    assert_eq!(outcome.profile.counters.lessons_completed, 1);
    assert_eq!(outcome.profile.total_points, 20);

    let progress = engine.user_mission_progress("ana").unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].progress.progress, 1);
    assert!(!progress[0].progress.is_completed());
}
