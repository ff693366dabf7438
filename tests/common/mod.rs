//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use lexiquest::engine::activity::{ActivityEvent, ActivityKind};
use lexiquest::engine::db::GameDb;
use lexiquest::{Config, GamificationEngine, ManualClock};

/// An engine on a throwaway database, driven by a manual clock
pub struct TestEngine {
    pub engine: GamificationEngine,
    pub clock: ManualClock,
    _dir: TempDir,
}

/// Monday 2024-05-06 09:00 UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

pub fn test_engine() -> TestEngine {
    test_engine_with(Config::default())
}

pub fn test_engine_with(config: Config) -> TestEngine {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = GameDb::open(&dir.path().join("gamification.db")).expect("Failed to open database");
    let clock = ManualClock::new(start_time());
    let engine = GamificationEngine::new(db, &config, Arc::new(clock.clone()));
    TestEngine {
        engine,
        clock,
        _dir: dir,
    }
}

pub fn lesson(user: &str) -> ActivityEvent {
    ActivityEvent::new(user, ActivityKind::LessonCompleted)
}

pub fn exercise(user: &str, score: u32, total: u32) -> ActivityEvent {
    ActivityEvent::new(user, ActivityKind::ExerciseCompleted).scored(score, total)
}

pub fn collaboration(user: &str) -> ActivityEvent {
    ActivityEvent::new(user, ActivityKind::CollaborationSubmitted)
}
