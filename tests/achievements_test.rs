//! Achievement unlocks driven by recorded activity

mod common;

use chrono::Duration;
use common::{exercise, lesson, test_engine, TestEngine};
use lexiquest::engine::achievements::{AchievementDefinition, AchievementStatus, CriteriaKey};
use lexiquest::engine::rewards::{RewardDefinition, RewardValue};
use lexiquest::EngineError;

fn ten_lessons() -> AchievementDefinition {
    AchievementDefinition::new("ten_lessons", "Ten Lessons", CriteriaKey::LessonsCompleted, 10)
        .unwrap()
        .with_bonus(40)
}

#[test]
fn test_threshold_grants_exactly_once() {
    let t = test_engine();
    let engine = &t.engine;
    assert!(engine.create_achievement(&ten_lessons()).unwrap());

    for i in 1..=12 {
        let outcome = engine.record_activity(&lesson("ana")).unwrap();
        let unlocked: Vec<_> = outcome
            .achievements
            .iter()
            .filter(|a| a.achievement_id == "ten_lessons")
            .collect();
        if i == 10 {
            assert_eq!(unlocked.len(), 1, "unlock on the tenth lesson");
            assert_eq!(unlocked[0].status, AchievementStatus::Completed);
        } else {
            assert!(unlocked.is_empty(), "no unlock on lesson {}", i);
        }
    }

    let records: Vec<_> = engine
        .list_user_achievements("ana")
        .unwrap()
        .into_iter()
        .filter(|a| a.achievement_id == "ten_lessons")
        .collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].completed_at.is_some());

    // twelve lessons plus the one-time bonus
    assert_eq!(engine.profile("ana").unwrap().total_points, 12 * 20 + 40);
}

#[test]
fn test_evaluating_twice_grants_nothing_new() {
    let t = test_engine();
    let engine = &t.engine;
    engine.create_achievement(&ten_lessons()).unwrap();
    engine
        .create_achievement(
            &AchievementDefinition::new("first_perfect", "Flawless", CriteriaKey::PerfectScores, 1)
                .unwrap(),
        )
        .unwrap();

    engine.record_activity(&exercise("ana", 6, 6)).unwrap();
    assert!(engine.evaluate_achievements("ana").unwrap().is_empty());
    assert!(engine.evaluate_achievements("ana").unwrap().is_empty());

    let perfect: Vec<_> = engine
        .list_user_achievements("ana")
        .unwrap()
        .into_iter()
        .filter(|a| a.status == AchievementStatus::Completed)
        .map(|a| a.achievement_id)
        .collect();
    assert_eq!(perfect, vec!["first_perfect".to_string()]);
}

#[test]
fn test_explicit_criteria_value_and_badge() {
    let t = test_engine();
    let engine = &t.engine;
    engine
        .create_reward(
            &RewardDefinition::new(
                "badge_marathon",
                "Marathon",
                RewardValue::Badge {
                    badge_id: "marathon".to_string(),
                    icon: None,
                },
            )
            .unwrap(),
        )
        .unwrap();
    engine
        .create_achievement(
            &AchievementDefinition::new("marathon", "Marathon", CriteriaKey::StreakMaintained, 30)
                .unwrap()
                .with_badge("badge_marathon"),
        )
        .unwrap();
    engine.award_points("ana", 0, "manual", "sign-up").unwrap();

    assert!(engine.evaluate_criteria("ana", "streak_maintained", 29).unwrap().is_empty());
    let granted = engine.evaluate_criteria("ana", "STREAK_MAINTAINED", 30).unwrap();
    assert_eq!(granted.len(), 1);

    let rewards = engine.list_user_rewards("ana").unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].reward_id, "badge_marathon");
    assert_eq!(
        rewards[0].metadata.get("source").map(String::as_str),
        Some("achievement:marathon")
    );

    assert!(matches!(
        engine.evaluate_criteria("ana", "karma", 1).unwrap_err(),
        EngineError::Validation(_)
    ));
}

#[test]
fn test_badge_must_exist_before_linking() {
    let t = test_engine();
    let err = t
        .engine
        .create_achievement(
            &AchievementDefinition::new("ghost", "Ghost", CriteriaKey::LevelReached, 5)
                .unwrap()
                .with_badge("badge_missing"),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[test]
fn test_progress_variant_and_failure_are_terminal() {
    let t = test_engine();
    let engine = &t.engine;
    engine
        .create_achievement(
            &AchievementDefinition::new("collector", "Collector", CriteriaKey::PointsEarned, 1_000_000)
                .unwrap(),
        )
        .unwrap();
    engine.create_achievement(&ten_lessons()).unwrap();
    engine.award_points("ana", 5, "manual", "").unwrap();

    let partial = engine.track_achievement_progress("ana", "ten_lessons", 4).unwrap();
    assert_eq!(partial.status, AchievementStatus::InProgress);
    assert_eq!((partial.progress.current, partial.progress.total), (4, 10));

    let done = engine.track_achievement_progress("ana", "ten_lessons", 10).unwrap();
    assert_eq!(done.status, AchievementStatus::Completed);

    engine.track_achievement_progress("ana", "collector", 10).unwrap();
    let failed = engine.fail_achievement("ana", "collector").unwrap();
    assert_eq!(failed.status, AchievementStatus::Failed);

    // terminal records are never reopened
    let still_failed = engine
        .track_achievement_progress("ana", "collector", 2_000_000)
        .unwrap();
    assert_eq!(still_failed.status, AchievementStatus::Failed);
}

fn badge(id: &str) -> RewardDefinition {
    RewardDefinition::new(
        id,
        id,
        RewardValue::Badge {
            badge_id: id.to_string(),
            icon: None,
        },
    )
    .unwrap()
}

fn times_awarded(t: &TestEngine, reward_id: &str) -> u32 {
    t.engine
        .list_rewards()
        .unwrap()
        .into_iter()
        .find(|r| r.id == reward_id)
        .map(|r| r.times_awarded)
        .unwrap()
}

#[test]
fn test_retired_badge_does_not_drop_the_lesson() {
    let t = test_engine();
    let engine = &t.engine;
    engine.create_reward(&badge("badge_first")).unwrap();
    engine
        .create_achievement(
            &AchievementDefinition::new("first", "First", CriteriaKey::LessonsCompleted, 1)
                .unwrap()
                .with_bonus(50)
                .with_badge("badge_first"),
        )
        .unwrap();
    engine.set_reward_active("badge_first", false).unwrap();

    let outcome = engine.record_activity(&lesson("ana")).unwrap();
    assert!(outcome.achievements.is_empty());
    assert_eq!(outcome.profile.counters.lessons_completed, 1);
    // base lesson points only; the bonus rolled back with the grant
    assert_eq!(outcome.profile.total_points, 20);
    assert!(engine.list_user_achievements("ana").unwrap().is_empty());
    assert!(engine.list_user_rewards("ana").unwrap().is_empty());

    // once the badge is back the unlock goes through
    engine.set_reward_active("badge_first", true).unwrap();
    let retry = engine.record_activity(&lesson("ana")).unwrap();
    assert_eq!(retry.achievements.len(), 1);
    assert_eq!(retry.profile.total_points, 2 * 20 + 50);
    assert_eq!(times_awarded(&t, "badge_first"), 1);
}

#[test]
fn test_failed_badge_rolls_back_a_direct_evaluation() {
    let t = test_engine();
    let engine = &t.engine;
    engine.create_reward(&badge("badge_rare").limited(1)).unwrap();
    engine
        .create_achievement(
            &AchievementDefinition::new("rare", "Rare", CriteriaKey::LevelReached, 1)
                .unwrap()
                .with_bonus(100)
                .with_badge("badge_rare"),
        )
        .unwrap();

    // ben takes the only badge
    engine.evaluate_criteria("ben", "LEVEL_REACHED", 1).unwrap();
    assert_eq!(times_awarded(&t, "badge_rare"), 1);

    engine.award_points("ana", 10, "manual", "").unwrap();
    let err = engine.evaluate_criteria("ana", "LEVEL_REACHED", 1).unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    assert_eq!(engine.profile("ana").unwrap().total_points, 10);
    assert!(engine.list_user_achievements("ana").unwrap().is_empty());
    assert!(engine.list_user_rewards("ana").unwrap().is_empty());
    assert_eq!(times_awarded(&t, "badge_rare"), 1);
}

#[test]
fn test_lapsed_streak_does_not_meet_streak_criteria() {
    let t = test_engine();
    let engine = &t.engine;
    for _ in 0..5 {
        engine.record_activity(&lesson("ana")).unwrap();
        t.clock.advance(Duration::days(1));
    }
    t.clock.advance(Duration::days(30));
    engine
        .create_achievement(
            &AchievementDefinition::new("steady", "Steady", CriteriaKey::StreakMaintained, 3)
                .unwrap(),
        )
        .unwrap();

    assert!(engine.evaluate_achievements("ana").unwrap().is_empty());
}
