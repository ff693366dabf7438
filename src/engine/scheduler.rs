//! Background cadences: mission generation and leaderboard recomputation
//!
//! Both jobs run on the blocking pool since the engine talks to SQLite
//! synchronously. Leaderboard units run as independent tasks, so one failing
//! (window, category) leaves the others untouched.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::leaderboard::{BatchReport, LeaderboardCategory, UnitFailure, WindowType};
use super::GamificationEngine;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};

/// Create the shutdown channel handed to [`Scheduler::run`]
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub struct Scheduler {
    engine: GamificationEngine,
    mission_interval: Duration,
    leaderboard_interval: Duration,
}

impl Scheduler {
    pub fn new(engine: GamificationEngine, config: &Config) -> Self {
        Self::with_intervals(
            engine,
            Duration::from_secs(config.missions.generation_interval_secs.max(1)),
            Duration::from_secs(config.leaderboard.recompute_interval_secs.max(1)),
        )
    }

    pub fn with_intervals(
        engine: GamificationEngine,
        mission_interval: Duration,
        leaderboard_interval: Duration,
    ) -> Self {
        Self {
            engine,
            mission_interval,
            leaderboard_interval,
        }
    }

    /// Tick both cadences until `shutdown` flips to true or its sender drops
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut missions = tokio::time::interval(self.mission_interval);
        missions.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut leaderboards = tokio::time::interval(self.leaderboard_interval);
        leaderboards.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Scheduler started (missions every {:?}, leaderboards every {:?})",
            self.mission_interval, self.leaderboard_interval
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = missions.tick() => {
                    match self.generate_missions().await {
                        Ok(created) => debug!("Mission tick created {} missions", created),
                        Err(e) => error!("Mission generation failed: {}", e),
                    }
                }
                _ = leaderboards.tick() => {
                    let report = self.recompute_leaderboards().await;
                    debug!(
                        "Leaderboard tick: {} ok, {} failed",
                        report.succeeded.len(),
                        report.failed.len()
                    );
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Generate missions for the current windows and sweep lapsed rewards
    pub async fn generate_missions(&self) -> EngineResult<usize> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            let created = engine.generate_missions()?.len();
            engine.sweep_expired_rewards()?;
            Ok(created)
        })
        .await
        .map_err(|e| EngineError::Storage(format!("mission task failed: {}", e)))?
    }

    /// Recompute every (window, category) as its own task
    pub async fn recompute_leaderboards(&self) -> BatchReport {
        let mut tasks = JoinSet::new();
        for window_type in WindowType::all().iter().copied() {
            for category in LeaderboardCategory::all().iter().copied() {
                let engine = self.engine.clone();
                tasks.spawn_blocking(move || {
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        engine.recompute_leaderboard(window_type, category)
                    }))
                    .unwrap_or_else(|_| {
                        Err(EngineError::Storage("leaderboard unit panicked".to_string()))
                    });
                    (window_type, category, result)
                });
            }
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((window_type, category, Ok(_))) => {
                    report.succeeded.push((window_type, category))
                }
                Ok((window_type, category, Err(err))) => {
                    warn!(
                        "Leaderboard {}/{} failed: {}",
                        window_type.as_str(),
                        category.as_str(),
                        err
                    );
                    report.failed.push(UnitFailure {
                        window_type,
                        category,
                        error: err.to_string(),
                    });
                }
                Err(e) => warn!("Leaderboard task was cancelled: {}", e),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::GameDb;
    use crate::engine::profile::kinds;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn engine(dir: &std::path::Path) -> GamificationEngine {
        let db = GameDb::open(&dir.join("game.db")).unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap());
        GamificationEngine::new(db, &Config::default(), Arc::new(clock))
    }

    #[tokio::test]
    async fn test_recompute_runs_every_unit() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        engine.award_points("ana", 40, kinds::LESSON_COMPLETED, "l1").unwrap();
        engine.award_points("ben", 90, kinds::LESSON_COMPLETED, "l2").unwrap();

        let scheduler = Scheduler::with_intervals(
            engine.clone(),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let report = scheduler.recompute_leaderboards().await;
        assert!(report.is_complete());
        assert_eq!(
            report.succeeded.len(),
            WindowType::all().len() * LeaderboardCategory::all().len()
        );

        let rank = engine
            .get_user_rank("ben", WindowType::AllTime, LeaderboardCategory::Points)
            .unwrap();
        assert_eq!(rank.rank, 1);
        assert_eq!(rank.total, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        engine.seed_defaults().unwrap();

        let scheduler = Scheduler::with_intervals(
            engine.clone(),
            Duration::from_millis(20),
            Duration::from_millis(20),
        );
        let (tx, rx) = shutdown_channel();
        let handle = tokio::spawn(scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();

        // the first tick fires immediately, so today's missions exist
        assert!(!engine.active_missions().unwrap().is_empty());
    }
}
