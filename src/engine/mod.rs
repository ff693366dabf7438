//! Gamification rules engine
//!
//! Turns learning activity into points, levels, rewards, achievements,
//! mission completions and leaderboard ranks, persisted in SQLite
//! (`~/.lexiquest/gamification.db`).
//!
//! # Architecture
//!
//! ```text
//!   activity events
//!         │
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Points/Leveling │◄────│  Achievements   │────►│     Rewards     │
//! │    (ledger)     │◄────│    Missions     │────►│                 │
//! └────────┬────────┘     └────────┬────────┘     └────────┬────────┘
//!          └───────────────────────┼───────────────────────┘
//!                                  ▼
//!                     gamification.db (one writer)
//!                                  ▲
//!                       read-only  │
//!                     ┌─────────────────┐
//!                     │   Leaderboard   │
//!                     └─────────────────┘
//! ```
//!
//! Every public operation runs as one transaction. A CONFLICT (stale profile
//! version or a busy database) rolls the transaction back and the operation
//! is retried up to `engine.max_conflict_retries` times.
//!
//! # Usage
//!
//! ```ignore
//! let engine = GamificationEngine::open(&config)?;
//! engine.seed_defaults()?;
//!
//! let outcome = engine.record_activity(
//!     &ActivityEvent::new("ana", ActivityKind::ExerciseCompleted).scored(10, 10),
//! )?;
//!
//! engine.recompute_all();
//! let rank = engine.get_user_rank("ana", WindowType::Weekly, LeaderboardCategory::Points)?;
//! ```

pub mod achievements;
pub mod activity;
pub mod cache;
pub mod db;
pub mod leaderboard;
pub mod missions;
pub mod profile;
pub mod rewards;
pub mod scheduler;
pub mod seed;
pub mod windows;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};

use achievements::{AchievementDefinition, AchievementEvaluator, CriteriaKey, UserAchievement};
use activity::{ActivityEvent, ActivityKind, ActivityOutcome, ActivityProcessor};
use cache::{BoundedCache, CollaborationStats};
use db::{CascadeFailure, GameDb};
use leaderboard::{
    dense_rank, BatchReport, LeaderboardCategory, LeaderboardEntry, LeaderboardRanker, RankInfo,
    ScoreWeights, UnitFailure, WindowType,
};
use missions::{
    Mission, MissionCompletion, MissionGenerator, MissionTemplate, MissionTracker, MissionType,
    UserMission,
};
use profile::{LevelCurve, PointsAward, PointsLedger, Profile};
use rewards::{RewardDefinition, RewardEngine, RewardGrant, RewardStatus, UserReward};
use seed::SeedReport;

/// Entry point for every gamification operation
#[derive(Clone)]
pub struct GamificationEngine {
    db: GameDb,
    clock: Arc<dyn Clock>,
    ledger: PointsLedger,
    rewards: RewardEngine,
    evaluator: AchievementEvaluator,
    generator: MissionGenerator,
    tracker: MissionTracker,
    ranker: LeaderboardRanker,
    activity: ActivityProcessor,
    collaboration_cache: Arc<Mutex<BoundedCache<String, CollaborationStats>>>,
    max_conflict_retries: u32,
}

impl GamificationEngine {
    /// Open the configured database with the system clock
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let db = GameDb::open(&config.database_path())?;
        Ok(Self::new(db, config, Arc::new(SystemClock)))
    }

    pub fn new(db: GameDb, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let ledger = PointsLedger::new(
            LevelCurve::from_settings(&config.leveling),
            config.engine.recent_activity_limit,
        );
        let rewards = RewardEngine::new(ledger.clone());
        let evaluator = AchievementEvaluator::new(ledger.clone(), rewards.clone());
        let generator = MissionGenerator::new(rewards.clone(), config.missions.once_duration_days);
        let tracker = MissionTracker::new(ledger.clone(), rewards.clone());
        let activity = ActivityProcessor::new(
            ledger.clone(),
            evaluator.clone(),
            tracker.clone(),
            config.points.clone(),
        );

        Self {
            db,
            clock,
            ledger,
            rewards,
            evaluator,
            generator,
            tracker,
            ranker: LeaderboardRanker::new(ScoreWeights::from_settings(&config.leaderboard)),
            activity,
            collaboration_cache: Arc::new(Mutex::new(BoundedCache::new(
                config.engine.collaboration_cache_capacity,
            ))),
            max_conflict_retries: config.engine.max_conflict_retries,
        }
    }

    pub fn db(&self) -> &GameDb {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run one transactional operation, retrying on CONFLICT
    fn write<T>(
        &self,
        operation: &str,
        f: impl Fn(&Transaction<'_>, DateTime<Utc>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut attempt = 0;
        loop {
            let now = self.clock.now();
            match self.db.write(|tx| f(tx, now)) {
                Err(err) if err.is_retryable() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!("{} conflicted (attempt {}): {}", operation, attempt, err);
                    std::thread::sleep(Duration::from_millis(5 * u64::from(attempt)));
                }
                result => return result,
            }
        }
    }

    fn invalidate_collaboration(&self, user_id: &str) {
        if let Ok(mut cache) = self.collaboration_cache.lock() {
            cache.invalidate(&user_id.to_string());
        }
    }

    // ========================================
    // POINTS & PROFILES
    // ========================================

    pub fn profile(&self, user_id: &str) -> EngineResult<Profile> {
        self.db.read(|conn| self.ledger.get(conn, user_id))
    }

    /// Grant points; creates the profile on first use
    pub fn award_points(
        &self,
        user_id: &str,
        points: u64,
        kind: &str,
        description: &str,
    ) -> EngineResult<PointsAward> {
        self.write("award points", |tx, now| {
            self.ledger.award_points(tx, user_id, points, kind, description, now)
        })
    }

    /// Administrative correction, the only path that may lower totals
    pub fn adjust_points(&self, user_id: &str, delta: i64, reason: &str) -> EngineResult<PointsAward> {
        let award = self.write("adjust points", |tx, now| {
            self.ledger.adjust_points(tx, user_id, delta, reason, now)
        })?;
        self.invalidate_collaboration(user_id);
        Ok(award)
    }

    /// Feed one learning event through every component
    pub fn record_activity(&self, event: &ActivityEvent) -> EngineResult<ActivityOutcome> {
        let outcome = self.write("record activity", |tx, now| self.activity.apply(tx, event, now))?;
        if event.kind == ActivityKind::CollaborationSubmitted {
            self.invalidate_collaboration(&event.user_id);
        }
        Ok(outcome)
    }

    /// Cultural collaboration totals, served from the bounded cache
    pub fn collaboration_stats(&self, user_id: &str) -> EngineResult<CollaborationStats> {
        let key = user_id.to_string();
        let cache_lock = || {
            self.collaboration_cache
                .lock()
                .map_err(|_| EngineError::Storage("collaboration cache poisoned".to_string()))
        };
        if let Some(stats) = cache_lock()?.get(&key) {
            return Ok(stats);
        }
        let stats = self.db.read(|conn| CollaborationStats::load(conn, user_id))?;
        cache_lock()?.insert(key, stats.clone());
        Ok(stats)
    }

    // ========================================
    // REWARDS
    // ========================================

    /// Create or update a catalog entry
    pub fn create_reward(&self, definition: &RewardDefinition) -> EngineResult<RewardDefinition> {
        self.write("create reward", |tx, now| {
            self.rewards.upsert_definition(tx, definition, now)
        })
    }

    pub fn list_rewards(&self) -> EngineResult<Vec<RewardDefinition>> {
        self.db.read(|conn| self.rewards.list_definitions(conn))
    }

    pub fn set_reward_active(&self, reward_id: &str, active: bool) -> EngineResult<()> {
        self.write("set reward active", |tx, _| {
            self.rewards.set_active(tx, reward_id, active)
        })
    }

    pub fn award_reward(&self, user_id: &str, reward_id: &str) -> EngineResult<RewardGrant> {
        self.write("award reward", |tx, now| {
            self.rewards.award(tx, user_id, reward_id, &Default::default(), now)
        })
    }

    pub fn consume_reward(&self, user_id: &str, reward_id: &str) -> EngineResult<UserReward> {
        self.write("consume reward", |tx, now| {
            self.rewards.consume(tx, user_id, reward_id, now)
        })
    }

    /// Read-time status of the user's latest instance of a reward
    pub fn check_reward_expiry(&self, user_id: &str, reward_id: &str) -> EngineResult<RewardStatus> {
        let now = self.clock.now();
        self.db
            .read(|conn| self.rewards.check_expiry(conn, user_id, reward_id, now))
    }

    pub fn list_user_rewards(&self, user_id: &str) -> EngineResult<Vec<UserReward>> {
        let now = self.clock.now();
        self.db
            .read(|conn| self.rewards.list_user_rewards(conn, user_id, now))
    }

    /// Persist EXPIRED for lapsed rewards; reads report it either way
    pub fn sweep_expired_rewards(&self) -> EngineResult<usize> {
        self.write("sweep rewards", |tx, now| self.rewards.sweep_expired(tx, now))
    }

    // ========================================
    // ACHIEVEMENTS
    // ========================================

    pub fn create_achievement(&self, definition: &AchievementDefinition) -> EngineResult<bool> {
        self.write("create achievement", |tx, now| {
            self.evaluator.insert_definition(tx, definition, now)
        })
    }

    pub fn list_achievements(&self) -> EngineResult<Vec<AchievementDefinition>> {
        self.db.read(|conn| self.evaluator.list_definitions(conn))
    }

    /// Evaluate every criteria against the stored profile; returns new grants only
    pub fn evaluate_achievements(&self, user_id: &str) -> EngineResult<Vec<UserAchievement>> {
        self.write("evaluate achievements", |tx, now| {
            self.evaluator.evaluate_all(tx, user_id, now, CascadeFailure::Abort)
        })
    }

    /// Evaluate one criteria key against a caller-supplied value
    pub fn evaluate_criteria(
        &self,
        user_id: &str,
        criteria_key: &str,
        current_value: u64,
    ) -> EngineResult<Vec<UserAchievement>> {
        let criteria = CriteriaKey::parse(criteria_key)?;
        self.write("evaluate criteria", |tx, now| {
            self.evaluator.evaluate(tx, user_id, criteria, current_value, now)
        })
    }

    pub fn track_achievement_progress(
        &self,
        user_id: &str,
        achievement_id: &str,
        current: u64,
    ) -> EngineResult<UserAchievement> {
        self.write("track achievement", |tx, now| {
            self.evaluator.track_progress(tx, user_id, achievement_id, current, now)
        })
    }

    pub fn fail_achievement(&self, user_id: &str, achievement_id: &str) -> EngineResult<UserAchievement> {
        self.write("fail achievement", |tx, now| {
            self.evaluator.fail(tx, user_id, achievement_id, now)
        })
    }

    pub fn list_user_achievements(&self, user_id: &str) -> EngineResult<Vec<UserAchievement>> {
        self.db
            .read(|conn| self.evaluator.list_user_achievements(conn, user_id))
    }

    // ========================================
    // MISSIONS
    // ========================================

    pub fn create_mission_template(&self, template: &MissionTemplate) -> EngineResult<bool> {
        self.write("create mission template", |tx, now| {
            self.generator.insert_template(tx, template, now)
        })
    }

    pub fn list_mission_templates(&self) -> EngineResult<Vec<MissionTemplate>> {
        self.db.read(|conn| self.generator.list_templates(conn))
    }

    pub fn set_mission_template_active(&self, template_id: &str, active: bool) -> EngineResult<()> {
        self.write("set template active", |tx, _| {
            self.generator.set_template_active(tx, template_id, active)
        })
    }

    /// Expand active templates into missions for the current windows
    pub fn generate_missions(&self) -> EngineResult<Vec<Mission>> {
        self.write("generate missions", |tx, now| self.generator.generate(tx, now))
    }

    /// Report the caller's current total for a mission type (latest value wins)
    pub fn update_mission_progress(
        &self,
        user_id: &str,
        mission_type: MissionType,
        value: u64,
    ) -> EngineResult<Vec<MissionCompletion>> {
        self.write("update mission progress", |tx, now| {
            self.tracker.update_progress(tx, user_id, mission_type, value, now)
        })
    }

    /// Missions open right now
    pub fn active_missions(&self) -> EngineResult<Vec<Mission>> {
        let now = self.clock.now();
        self.db.read(|conn| self.tracker.open_missions(conn, None, now))
    }

    pub fn user_mission_progress(&self, user_id: &str) -> EngineResult<Vec<UserMission>> {
        self.db.read(|conn| self.tracker.user_progress(conn, user_id))
    }

    // ========================================
    // LEADERBOARDS
    // ========================================

    /// Recompute one snapshot; scoring runs on a separate read connection
    pub fn recompute_leaderboard(
        &self,
        window_type: WindowType,
        category: LeaderboardCategory,
    ) -> EngineResult<usize> {
        let now = self.clock.now();
        let reader = self.db.open_reader()?;
        let scores = self.ranker.compute_scores(&reader, window_type, category, now)?;
        drop(reader);

        let entries = dense_rank(scores, window_type, category, now.timestamp_millis());
        self.write("store leaderboard", |tx, _| {
            self.ranker.replace_snapshot(tx, window_type, category, &entries)
        })?;
        Ok(entries.len())
    }

    /// Recompute every (window, category); one failing unit does not stop the rest
    pub fn recompute_all(&self) -> BatchReport {
        let mut report = BatchReport::default();
        for window_type in WindowType::all() {
            for category in LeaderboardCategory::all() {
                match self.recompute_leaderboard(*window_type, *category) {
                    Ok(_) => report.succeeded.push((*window_type, *category)),
                    Err(err) => {
                        warn!(
                            "Leaderboard {}/{} failed: {}",
                            window_type.as_str(),
                            category.as_str(),
                            err
                        );
                        report.failed.push(UnitFailure {
                            window_type: *window_type,
                            category: *category,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        report
    }

    pub fn get_leaderboard(
        &self,
        window_type: WindowType,
        category: LeaderboardCategory,
        limit: Option<usize>,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        self.db
            .read(|conn| self.ranker.get_leaderboard(conn, window_type, category, limit))
    }

    pub fn get_user_rank(
        &self,
        user_id: &str,
        window_type: WindowType,
        category: LeaderboardCategory,
    ) -> EngineResult<RankInfo> {
        self.db
            .read(|conn| self.ranker.get_user_rank(conn, user_id, window_type, category))
    }

    // ========================================
    // MAINTENANCE
    // ========================================

    /// Install the starter catalog (idempotent)
    pub fn seed_defaults(&self) -> EngineResult<SeedReport> {
        let report = self.write("seed", |tx, now| {
            seed::seed_defaults(tx, &self.rewards, &self.evaluator, &self.generator, now)
        })?;
        info!("Seeded {} catalog entries", report.total());
        Ok(report)
    }

    /// Delete all per-user progress, keeping the catalogs
    pub fn reset(&self) -> EngineResult<()> {
        self.db.reset_progress()?;
        if let Ok(mut cache) = self.collaboration_cache.lock() {
            cache.clear();
        }
        info!("Reset all gamification progress");
        Ok(())
    }
}
