//! Mission Tracker - per-user progress and one-time completion payouts
//!
//! Progress is "latest observed value wins": every update overwrites the
//! stored value. Completion is guarded by `completed_at IS NULL`, so the
//! payout runs exactly once per (user, mission).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::generator::{mission_from_row, MISSION_COLUMNS};
use super::templates::{Mission, MissionCompletion, MissionProgress, MissionType};
use crate::engine::db::{with_savepoint, CascadeFailure};
use crate::engine::profile::{kinds, PointsLedger, Profile};
use crate::engine::rewards::RewardEngine;
use crate::error::{EngineError, EngineResult};

const PROGRESS_COLUMNS: &str = "user_id, mission_id, progress, completed_at, updated_at";

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<MissionProgress> {
    Ok(MissionProgress {
        user_id: row.get(0)?,
        mission_id: row.get(1)?,
        progress: row.get(2)?,
        completed_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// A mission together with one user's progress on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMission {
    pub mission: Mission,
    pub progress: MissionProgress,
}

#[derive(Debug, Clone)]
pub struct MissionTracker {
    ledger: PointsLedger,
    rewards: RewardEngine,
}

impl MissionTracker {
    pub fn new(ledger: PointsLedger, rewards: RewardEngine) -> Self {
        Self { ledger, rewards }
    }

    /// Missions whose window contains `now`, optionally of one type
    pub fn open_missions(
        &self,
        conn: &Connection,
        mission_type: Option<MissionType>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Mission>> {
        let now_ms = now.timestamp_millis();
        let sql = format!(
            "SELECT {} FROM missions
             WHERE start_at <= ?1 AND end_at > ?1 AND (?2 IS NULL OR mission_type = ?2)
             ORDER BY start_at, id",
            MISSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![now_ms, mission_type.map(|t| t.as_str())],
            mission_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_mission(&self, conn: &Connection, mission_id: i64) -> EngineResult<Mission> {
        let sql = format!("SELECT {} FROM missions WHERE id = ?1", MISSION_COLUMNS);
        conn.query_row(&sql, [mission_id], mission_from_row)
            .optional()?
            .ok_or_else(|| EngineError::not_found("mission", mission_id.to_string()))
    }

    pub fn find_progress(
        &self,
        conn: &Connection,
        user_id: &str,
        mission_id: i64,
    ) -> EngineResult<Option<MissionProgress>> {
        let sql = format!(
            "SELECT {} FROM mission_progress WHERE user_id = ?1 AND mission_id = ?2",
            PROGRESS_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![user_id, mission_id], progress_from_row)
            .optional()?)
    }

    /// Every mission the user has reported progress on, newest window first
    pub fn user_progress(&self, conn: &Connection, user_id: &str) -> EngineResult<Vec<UserMission>> {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.template_id, m.name, m.mission_type, m.target_value, m.reward_points,
                    m.badge_reward_id, m.min_level, m.max_level, m.start_at, m.end_at,
                    p.user_id, p.mission_id, p.progress, p.completed_at, p.updated_at
             FROM mission_progress p JOIN missions m ON m.id = p.mission_id
             WHERE p.user_id = ?1
             ORDER BY m.start_at DESC, m.id",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok(UserMission {
                mission: mission_from_row(row)?,
                progress: MissionProgress {
                    user_id: row.get(11)?,
                    mission_id: row.get(12)?,
                    progress: row.get(13)?,
                    completed_at: row.get(14)?,
                    updated_at: row.get(15)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Report the caller's current total for a mission type
    pub fn update_progress(
        &self,
        conn: &Connection,
        user_id: &str,
        mission_type: MissionType,
        value: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<MissionCompletion>> {
        self.update_progress_with(
            conn,
            user_id,
            mission_type,
            now,
            CascadeFailure::Abort,
            |_| Ok(value),
        )
    }

    /// Like [`update_progress`](Self::update_progress), but the value is
    /// computed per mission (e.g. a count inside each mission's window).
    ///
    /// With [`CascadeFailure::Skip`] a payout that fails leaves the mission
    /// uncompleted with its new progress stored; the next update retries it.
    pub fn update_progress_with<F>(
        &self,
        conn: &Connection,
        user_id: &str,
        mission_type: MissionType,
        now: DateTime<Utc>,
        on_failure: CascadeFailure,
        mut observe: F,
    ) -> EngineResult<Vec<MissionCompletion>>
    where
        F: FnMut(&Mission) -> EngineResult<u64>,
    {
        let profile = self.ledger.ensure(conn, user_id, now)?;
        let now_ms = now.timestamp_millis();
        let mut completions = Vec::new();

        for mission in self.open_missions(conn, Some(mission_type), now)? {
            if !mission.accepts_level(profile.level) {
                debug!(
                    "{} at level {} is outside mission {} level range",
                    user_id, profile.level, mission.id
                );
                continue;
            }
            let value = observe(&mission)?;

            conn.execute(
                "INSERT INTO mission_progress (user_id, mission_id, progress, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, mission_id) DO UPDATE SET
                    progress = excluded.progress,
                    updated_at = excluded.updated_at",
                params![user_id, mission.id, value, now_ms],
            )?;

            if value < mission.target_value {
                continue;
            }
            let mission_id = mission.id;
            // completion marker and payout commit or roll back together
            let outcome = with_savepoint(conn, "mission_payout", || {
                let completed = conn.execute(
                    "UPDATE mission_progress SET completed_at = ?1
                     WHERE user_id = ?2 AND mission_id = ?3 AND completed_at IS NULL",
                    params![now_ms, user_id, mission.id],
                )?;
                if completed == 0 {
                    return Ok(None);
                }
                self.pay_out(conn, user_id, mission, now).map(Some)
            });
            match outcome {
                Ok(Some(completion)) => completions.push(completion),
                Ok(None) => {}
                Err(e) if on_failure == CascadeFailure::Skip => {
                    warn!("{} could not complete mission {}: {}", user_id, mission_id, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(completions)
    }

    fn pay_out(
        &self,
        conn: &Connection,
        user_id: &str,
        mission: Mission,
        now: DateTime<Utc>,
    ) -> EngineResult<MissionCompletion> {
        let points = self.ledger.award_points(
            conn,
            user_id,
            mission.reward_points,
            kinds::MISSION_COMPLETED,
            &format!("Mission completed: {}", mission.name),
            now,
        )?;

        let badge = match &mission.badge_reward_id {
            Some(reward_id) => {
                let metadata = BTreeMap::from([(
                    "source".to_string(),
                    format!("mission:{}", mission.id),
                )]);
                Some(self.rewards.award(conn, user_id, reward_id, &metadata, now)?.reward)
            }
            None => None,
        };

        let progress = self
            .find_progress(conn, user_id, mission.id)?
            .ok_or_else(|| EngineError::not_found("mission progress", mission.id.to_string()))?;
        info!("{} completed mission {} ({})", user_id, mission.id, mission.name);

        Ok(MissionCompletion {
            mission,
            progress,
            points: Some(points),
            badge,
        })
    }

    /// The engine's own observation of a user's total for a mission
    ///
    /// Count types count matching activity inside the mission window,
    /// EARN_POINTS sums points earned in the window, and MAINTAIN_STREAK
    /// reads the current streak.
    pub fn observed_value(
        &self,
        conn: &Connection,
        profile: &Profile,
        mission: &Mission,
    ) -> EngineResult<u64> {
        let value: i64 = match mission.mission_type {
            MissionType::MaintainStreak => i64::from(profile.counters.streak),
            MissionType::EarnPoints => conn.query_row(
                "SELECT COALESCE(SUM(points), 0) FROM activity_log
                 WHERE user_id = ?1 AND points > 0 AND kind != ?2
                   AND created_at >= ?3 AND created_at < ?4",
                params![
                    profile.user_id,
                    kinds::ADMIN_CORRECTION,
                    mission.start_at,
                    mission.end_at
                ],
                |r| r.get(0),
            )?,
            other => {
                let kind = other.counted_kind().unwrap_or_default();
                conn.query_row(
                    "SELECT COUNT(*) FROM activity_log
                     WHERE user_id = ?1 AND kind = ?2 AND created_at >= ?3 AND created_at < ?4",
                    params![profile.user_id, kind, mission.start_at, mission.end_at],
                    |r| r.get(0),
                )?
            }
        };
        Ok(value.max(0) as u64)
    }
}
