//! Points & Leveling: the only code path that writes profile rows
//!
//! Every write checks the row's `version` column and bumps it. A write that
//! finds a different version than it read fails with CONFLICT, which the
//! engine retries. Other components never touch `profiles` directly.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::levels::{LevelCurve, LevelProgress, LevelUp};
use super::models::{kinds, ActivityEntry, CounterDelta, Counters, Profile};
use super::streaks::StreakInfo;
use crate::error::{EngineError, EngineResult};

const PROFILE_COLUMNS: &str = "user_id, total_points, level, experience, next_level_experience, \
     lifetime_experience, lessons_completed, exercises_completed, perfect_scores, \
     cultural_contributions, streak, best_streak, last_activity_day, version, created_at, updated_at";

/// Outcome of a point grant or correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAward {
    pub profile: Profile,
    pub level_up: Option<LevelUp>,
}

/// Outcome of a counter update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterUpdate {
    pub profile: Profile,
    pub streak_extended: bool,
}

/// Single authorized mutator of points, experience, level and counters
#[derive(Debug, Clone)]
pub struct PointsLedger {
    curve: LevelCurve,
    recent_limit: usize,
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: row.get(0)?,
        total_points: row.get(1)?,
        level: row.get(2)?,
        experience: row.get(3)?,
        next_level_experience: row.get(4)?,
        lifetime_experience: row.get(5)?,
        counters: Counters {
            lessons_completed: row.get(6)?,
            exercises_completed: row.get(7)?,
            perfect_scores: row.get(8)?,
            cultural_contributions: row.get(9)?,
            streak: row.get(10)?,
            best_streak: row.get(11)?,
        },
        last_activity_day: row.get(12)?,
        recent_activities: Vec::new(),
        version: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn validate_user_id(user_id: &str) -> EngineResult<()> {
    if user_id.trim().is_empty() {
        return Err(EngineError::validation("user id must not be empty"));
    }
    Ok(())
}

/// Append an entry to the activity log
pub(crate) fn log_activity(
    conn: &Connection,
    user_id: &str,
    kind: &str,
    description: &str,
    points: i64,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO activity_log (user_id, kind, description, points, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, kind, description, points, now.timestamp_millis()],
    )?;
    Ok(())
}

impl PointsLedger {
    pub fn new(curve: LevelCurve, recent_limit: usize) -> Self {
        Self {
            curve,
            recent_limit,
        }
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    /// Load a profile with its recent activity, if it exists
    pub fn find(&self, conn: &Connection, user_id: &str) -> EngineResult<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = ?1", PROFILE_COLUMNS);
        let profile = conn
            .query_row(&sql, [user_id], profile_from_row)
            .optional()?;

        match profile {
            Some(mut profile) => {
                profile.recent_activities = self.recent_activities(conn, user_id)?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// Load a profile that must already exist
    pub fn get(&self, conn: &Connection, user_id: &str) -> EngineResult<Profile> {
        self.find(conn, user_id)?
            .ok_or_else(|| EngineError::not_found("profile", user_id))
    }

    /// Load a profile, creating an empty one on first use
    pub fn ensure(&self, conn: &Connection, user_id: &str, now: DateTime<Utc>) -> EngineResult<Profile> {
        validate_user_id(user_id)?;
        let start = self.curve.progress_for(0);
        let now_ms = now.timestamp_millis();
        let created = conn.execute(
            "INSERT OR IGNORE INTO profiles
                (user_id, level, experience, next_level_experience, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?4)",
            params![user_id, start.level, start.next_level_experience, now_ms],
        )?;
        if created > 0 {
            info!("Created gamification profile for {}", user_id);
        }
        self.get(conn, user_id)
    }

    fn recent_activities(&self, conn: &Connection, user_id: &str) -> EngineResult<Vec<ActivityEntry>> {
        let mut stmt = conn.prepare(
            "SELECT kind, description, points, created_at FROM activity_log
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, self.recent_limit as i64], |row| {
            Ok(ActivityEntry {
                kind: row.get(0)?,
                description: row.get(1)?,
                points_earned: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?;
        let mut entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    fn save_totals(
        conn: &Connection,
        profile: &Profile,
        total_points: u64,
        lifetime_experience: u64,
        progress: LevelProgress,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let updated = conn.execute(
            "UPDATE profiles SET total_points = ?1, lifetime_experience = ?2, level = ?3,
                 experience = ?4, next_level_experience = ?5, version = version + 1, updated_at = ?6
             WHERE user_id = ?7 AND version = ?8",
            params![
                total_points,
                lifetime_experience,
                progress.level,
                progress.experience,
                progress.next_level_experience,
                now.timestamp_millis(),
                profile.user_id,
                profile.version,
            ],
        )?;
        if updated == 0 {
            return Err(EngineError::Conflict(format!(
                "profile {} changed while awarding points",
                profile.user_id
            )));
        }
        Ok(())
    }

    fn log_level_up(
        conn: &Connection,
        user_id: &str,
        old_level: u32,
        new_level: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<LevelUp>> {
        if new_level <= old_level {
            return Ok(None);
        }
        log_activity(
            conn,
            user_id,
            kinds::LEVEL_UP,
            &format!("Reached level {}", new_level),
            0,
            now,
        )?;
        info!("{} leveled up: {} -> {}", user_id, old_level, new_level);
        Ok(Some(LevelUp {
            old_level,
            new_level,
        }))
    }

    /// Add points (and the same amount of experience) to a profile.
    ///
    /// Creates the profile if needed and always appends an activity entry,
    /// even for zero points. A level-up appends a zero-point `level_up` entry.
    pub fn award_points(
        &self,
        conn: &Connection,
        user_id: &str,
        points: u64,
        kind: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<PointsAward> {
        if kind.trim().is_empty() {
            return Err(EngineError::validation("activity kind must not be empty"));
        }
        let profile = self.ensure(conn, user_id, now)?;

        let mut level_up = None;
        if points > 0 {
            let total_points = profile.total_points.saturating_add(points);
            let lifetime = profile.lifetime_experience.saturating_add(points);
            let progress = self.curve.progress_for(lifetime);
            Self::save_totals(conn, &profile, total_points, lifetime, progress, now)?;
            log_activity(conn, user_id, kind, description, points as i64, now)?;
            level_up = Self::log_level_up(conn, user_id, profile.level, progress.level, now)?;
        } else {
            log_activity(conn, user_id, kind, description, 0, now)?;
        }

        Ok(PointsAward {
            profile: self.get(conn, user_id)?,
            level_up,
        })
    }

    /// Administrative correction; the only path allowed to lower totals.
    ///
    /// Totals and lifetime experience are clamped at zero and the level is
    /// re-derived from the corrected lifetime experience.
    pub fn adjust_points(
        &self,
        conn: &Connection,
        user_id: &str,
        delta: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<PointsAward> {
        if reason.trim().is_empty() {
            return Err(EngineError::validation("a correction needs a reason"));
        }
        let profile = self.get(conn, user_id)?;

        let apply = |value: u64| -> u64 {
            if delta >= 0 {
                value.saturating_add(delta as u64)
            } else {
                value.saturating_sub(delta.unsigned_abs())
            }
        };
        let total_points = apply(profile.total_points);
        let lifetime = apply(profile.lifetime_experience);
        let progress = self.curve.progress_for(lifetime);

        Self::save_totals(conn, &profile, total_points, lifetime, progress, now)?;
        log_activity(conn, user_id, kinds::ADMIN_CORRECTION, reason, delta, now)?;
        let level_up = Self::log_level_up(conn, user_id, profile.level, progress.level, now)?;
        if progress.level < profile.level {
            info!(
                "{} corrected down: level {} -> {}",
                user_id, profile.level, progress.level
            );
        }

        Ok(PointsAward {
            profile: self.get(conn, user_id)?,
            level_up,
        })
    }

    /// Bump activity counters and register the day on the learning streak
    pub fn record_counters(
        &self,
        conn: &Connection,
        user_id: &str,
        delta: CounterDelta,
        now: DateTime<Utc>,
    ) -> EngineResult<CounterUpdate> {
        let profile = self.ensure(conn, user_id, now)?;
        let update = profile.streak_info().register(now.date_naive());
        let StreakInfo {
            current,
            best,
            last_activity_day,
        } = update.streak;

        let updated = conn.execute(
            "UPDATE profiles SET
                 lessons_completed = lessons_completed + ?1,
                 exercises_completed = exercises_completed + ?2,
                 perfect_scores = perfect_scores + ?3,
                 cultural_contributions = cultural_contributions + ?4,
                 streak = ?5, best_streak = ?6, last_activity_day = ?7,
                 version = version + 1, updated_at = ?8
             WHERE user_id = ?9 AND version = ?10",
            params![
                delta.lessons_completed,
                delta.exercises_completed,
                delta.perfect_scores,
                delta.cultural_contributions,
                current,
                best,
                last_activity_day,
                now.timestamp_millis(),
                user_id,
                profile.version,
            ],
        )?;
        if updated == 0 {
            return Err(EngineError::Conflict(format!(
                "profile {} changed while recording activity",
                user_id
            )));
        }

        Ok(CounterUpdate {
            profile: self.get(conn, user_id)?,
            streak_extended: update.extended,
        })
    }
}
