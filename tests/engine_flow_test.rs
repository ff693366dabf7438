//! End-to-end flows over the seeded starter catalog

mod common;

use common::{collaboration, exercise, lesson, test_engine};
use lexiquest::engine::missions::MissionType;
use lexiquest::EngineError;

#[test]
fn test_seed_is_idempotent_and_complete() {
    let t = test_engine();
    let engine = &t.engine;

    let first = engine.seed_defaults().unwrap();
    assert!(first.rewards > 0 && first.achievements > 0 && first.mission_templates > 0);
    assert_eq!(engine.seed_defaults().unwrap().total(), 0);

    assert_eq!(engine.list_rewards().unwrap().len(), first.rewards);
    assert_eq!(engine.list_achievements().unwrap().len(), first.achievements);
    assert_eq!(
        engine.list_mission_templates().unwrap().len(),
        first.mission_templates
    );
}

#[test]
fn test_first_lessons_unlock_and_complete_daily_mission() {
    let t = test_engine();
    let engine = &t.engine;
    engine.seed_defaults().unwrap();
    assert!(!engine.generate_missions().unwrap().is_empty());

    let first = engine.record_activity(&lesson("ana")).unwrap();
    assert!(first
        .achievements
        .iter()
        .any(|a| a.achievement_id == "first_lesson"));
    assert!(first.missions.is_empty());

    let second = engine.record_activity(&lesson("ana")).unwrap();
    let completed: Vec<_> = second
        .missions
        .iter()
        .map(|m| m.mission.template_id.as_str())
        .collect();
    assert_eq!(completed, vec!["daily_lessons"]);

    // nothing is granted twice on a third lesson
    let third = engine.record_activity(&lesson("ana")).unwrap();
    assert!(third.achievements.is_empty());
    assert!(third.missions.is_empty());
}

#[test]
fn test_perfect_exercise_awards_bonus_entry() {
    let t = test_engine();
    let engine = &t.engine;

    let outcome = engine.record_activity(&exercise("ana", 10, 10)).unwrap();
    assert_eq!(outcome.points_awarded, 10 + 15);
    assert_eq!(outcome.profile.counters.perfect_scores, 1);
    let kinds: Vec<_> = outcome
        .profile
        .recent_activities
        .iter()
        .map(|a| a.kind.as_str())
        .collect();
    assert_eq!(kinds, vec!["exercise_completed", "perfect_score"]);

    let imperfect = engine.record_activity(&exercise("ana", 9, 10)).unwrap();
    assert_eq!(imperfect.points_awarded, 10);
    assert_eq!(imperfect.profile.counters.perfect_scores, 1);

    assert!(matches!(
        engine.record_activity(&exercise("ana", 11, 10)).unwrap_err(),
        EngineError::Validation(_)
    ));
}

#[test]
fn test_collaboration_stats_cache_is_invalidated() {
    let t = test_engine();
    let engine = &t.engine;

    assert_eq!(engine.collaboration_stats("ana").unwrap().contributions, 0);

    engine.record_activity(&collaboration("ana")).unwrap();
    let stats = engine.collaboration_stats("ana").unwrap();
    assert_eq!(stats.contributions, 1);
    assert_eq!(stats.points, 25);
    assert_eq!(stats.last_contribution(), Some(engine.now()));

    engine.record_activity(&collaboration("ana")).unwrap();
    assert_eq!(engine.collaboration_stats("ana").unwrap().contributions, 2);
}

#[test]
fn test_reset_keeps_catalogs() {
    let t = test_engine();
    let engine = &t.engine;
    engine.seed_defaults().unwrap();
    engine.generate_missions().unwrap();
    engine.record_activity(&lesson("ana")).unwrap();
    engine
        .update_mission_progress("ana", MissionType::CompleteExercises, 5)
        .unwrap();

    engine.reset().unwrap();

    assert!(matches!(
        engine.profile("ana").unwrap_err(),
        EngineError::NotFound { .. }
    ));
    assert!(engine.user_mission_progress("ana").unwrap().is_empty());
    assert!(engine.list_user_achievements("ana").unwrap().is_empty());
    assert!(!engine.list_rewards().unwrap().is_empty());
    assert!(!engine.list_mission_templates().unwrap().is_empty());
}
