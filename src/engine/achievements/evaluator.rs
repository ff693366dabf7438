//! Achievement Evaluator
//!
//! Grants at most one record per (user, achievement). The primary key of
//! `user_achievements` is the idempotency key; a grant never overwrites a
//! COMPLETED or FAILED record, so re-evaluation is a no-op.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::criteria::CriteriaKey;
use super::definitions::{AchievementDefinition, AchievementStatus, Progress, UserAchievement};
use crate::engine::db::{with_savepoint, CascadeFailure};
use crate::engine::profile::{kinds, PointsLedger};
use crate::engine::rewards::RewardEngine;
use crate::error::{EngineError, EngineResult};

const DEFINITION_COLUMNS: &str =
    "id, name, description, criteria_key, requirement, bonus_points, badge_reward_id";

const USER_COLUMNS: &str =
    "user_id, achievement_id, status, progress_current, progress_total, completed_at, updated_at";

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<AchievementDefinition> {
    let key: String = row.get(3)?;
    let criteria = CriteriaKey::parse(&key)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(AchievementDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        criteria,
        requirement: row.get(4)?,
        bonus_points: row.get(5)?,
        badge_reward_id: row.get(6)?,
    })
}

fn user_achievement_from_row(row: &Row<'_>) -> rusqlite::Result<UserAchievement> {
    let status: String = row.get(2)?;
    let status = AchievementStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            Box::new(EngineError::Storage(format!("unknown achievement status: {}", status))),
        )
    })?;
    Ok(UserAchievement {
        user_id: row.get(0)?,
        achievement_id: row.get(1)?,
        status,
        progress: Progress {
            current: row.get(3)?,
            total: row.get(4)?,
        },
        completed_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Matches profile metrics against achievement thresholds
#[derive(Debug, Clone)]
pub struct AchievementEvaluator {
    ledger: PointsLedger,
    rewards: RewardEngine,
}

impl AchievementEvaluator {
    pub fn new(ledger: PointsLedger, rewards: RewardEngine) -> Self {
        Self { ledger, rewards }
    }

    // ========================================
    // CATALOG
    // ========================================

    /// Insert a definition unless the id is taken; returns whether it was written
    pub fn insert_definition(
        &self,
        conn: &Connection,
        definition: &AchievementDefinition,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        definition.validate()?;
        if let Some(badge) = &definition.badge_reward_id {
            self.rewards.get_definition(conn, badge)?;
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO achievement_definitions
                (id, name, description, criteria_key, requirement, bonus_points, badge_reward_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                definition.id,
                definition.name,
                definition.description,
                definition.criteria.as_str(),
                definition.requirement,
                definition.bonus_points,
                definition.badge_reward_id,
                now.timestamp_millis(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_definition(&self, conn: &Connection, id: &str) -> EngineResult<AchievementDefinition> {
        let sql = format!("SELECT {} FROM achievement_definitions WHERE id = ?1", DEFINITION_COLUMNS);
        conn.query_row(&sql, [id], definition_from_row)
            .optional()?
            .ok_or_else(|| EngineError::not_found("achievement", id))
    }

    pub fn list_definitions(&self, conn: &Connection) -> EngineResult<Vec<AchievementDefinition>> {
        let sql = format!(
            "SELECT {} FROM achievement_definitions ORDER BY criteria_key, requirement, id",
            DEFINITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], definition_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn definitions_for(
        &self,
        conn: &Connection,
        criteria: CriteriaKey,
    ) -> EngineResult<Vec<AchievementDefinition>> {
        let sql = format!(
            "SELECT {} FROM achievement_definitions WHERE criteria_key = ?1 ORDER BY requirement, id",
            DEFINITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([criteria.as_str()], definition_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================
    // USER RECORDS
    // ========================================

    pub fn find_user_achievement(
        &self,
        conn: &Connection,
        user_id: &str,
        achievement_id: &str,
    ) -> EngineResult<Option<UserAchievement>> {
        let sql = format!(
            "SELECT {} FROM user_achievements WHERE user_id = ?1 AND achievement_id = ?2",
            USER_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![user_id, achievement_id], user_achievement_from_row)
            .optional()?)
    }

    pub fn list_user_achievements(
        &self,
        conn: &Connection,
        user_id: &str,
    ) -> EngineResult<Vec<UserAchievement>> {
        let sql = format!(
            "SELECT {} FROM user_achievements WHERE user_id = ?1
             ORDER BY completed_at IS NULL, completed_at, achievement_id",
            USER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], user_achievement_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Complete an achievement and pay out its bonus and badge.
    ///
    /// Returns None when the record is already terminal.
    fn grant(
        &self,
        conn: &Connection,
        user_id: &str,
        definition: &AchievementDefinition,
        current: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<UserAchievement>> {
        let now_ms = now.timestamp_millis();
        let written = conn.execute(
            "INSERT INTO user_achievements
                (user_id, achievement_id, status, progress_current, progress_total, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id, achievement_id) DO UPDATE SET
                status = excluded.status,
                progress_current = excluded.progress_current,
                progress_total = excluded.progress_total,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
             WHERE user_achievements.status = ?7",
            params![
                user_id,
                definition.id,
                AchievementStatus::Completed.as_str(),
                current.min(definition.requirement),
                definition.requirement,
                now_ms,
                AchievementStatus::InProgress.as_str(),
            ],
        )?;
        if written == 0 {
            debug!("{} already has a final record for {}", user_id, definition.id);
            return Ok(None);
        }

        self.ledger.award_points(
            conn,
            user_id,
            definition.bonus_points,
            kinds::ACHIEVEMENT_UNLOCKED,
            &format!("Achievement unlocked: {}", definition.name),
            now,
        )?;

        if let Some(badge) = &definition.badge_reward_id {
            let metadata = BTreeMap::from([(
                "source".to_string(),
                format!("achievement:{}", definition.id),
            )]);
            self.rewards.award(conn, user_id, badge, &metadata, now)?;
        }

        info!("{} unlocked achievement {}", user_id, definition.id);
        self.find_user_achievement(conn, user_id, &definition.id)
    }

    /// Grant every achievement on `criteria` whose requirement `current_value` meets.
    ///
    /// Returns only the records created or completed by this call. A failed
    /// grant (e.g. a retired badge) fails the whole call.
    pub fn evaluate(
        &self,
        conn: &Connection,
        user_id: &str,
        criteria: CriteriaKey,
        current_value: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<UserAchievement>> {
        self.evaluate_with(conn, user_id, criteria, current_value, now, CascadeFailure::Abort)
    }

    fn evaluate_with(
        &self,
        conn: &Connection,
        user_id: &str,
        criteria: CriteriaKey,
        current_value: u64,
        now: DateTime<Utc>,
        on_failure: CascadeFailure,
    ) -> EngineResult<Vec<UserAchievement>> {
        self.ledger.ensure(conn, user_id, now)?;
        let mut granted = Vec::new();
        for definition in self.definitions_for(conn, criteria)? {
            if !definition.is_met_by(current_value) {
                continue;
            }
            // record, bonus and badge commit or roll back together
            let outcome = with_savepoint(conn, "achievement_grant", || {
                self.grant(conn, user_id, &definition, current_value, now)
            });
            match outcome {
                Ok(Some(record)) => granted.push(record),
                Ok(None) => {}
                Err(e) if on_failure == CascadeFailure::Skip => {
                    warn!("{} could not unlock {}: {}", user_id, definition.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(granted)
    }

    /// Evaluate every criteria key against the user's stored profile.
    ///
    /// Bonus points can unlock POINTS_EARNED or LEVEL_REACHED achievements,
    /// so evaluation repeats until a pass grants nothing new. With
    /// [`CascadeFailure::Skip`] a grant that fails is left for a later call.
    pub fn evaluate_all(
        &self,
        conn: &Connection,
        user_id: &str,
        now: DateTime<Utc>,
        on_failure: CascadeFailure,
    ) -> EngineResult<Vec<UserAchievement>> {
        let mut granted = Vec::new();
        loop {
            let profile = self.ledger.get(conn, user_id)?;
            let mut pass = Vec::new();
            for key in CriteriaKey::all() {
                pass.extend(self.evaluate_with(
                    conn,
                    user_id,
                    *key,
                    key.value_of(&profile, now.date_naive()),
                    now,
                    on_failure,
                )?);
            }
            if pass.is_empty() {
                break;
            }
            granted.extend(pass);
        }
        Ok(granted)
    }

    /// Record incremental progress on one achievement.
    ///
    /// Completes the achievement when `current` reaches its requirement.
    /// Terminal records are returned unchanged.
    pub fn track_progress(
        &self,
        conn: &Connection,
        user_id: &str,
        achievement_id: &str,
        current: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<UserAchievement> {
        let definition = self.get_definition(conn, achievement_id)?;
        self.ledger.ensure(conn, user_id, now)?;

        if let Some(existing) = self.find_user_achievement(conn, user_id, achievement_id)? {
            if existing.status.is_terminal() {
                return Ok(existing);
            }
        }

        if definition.is_met_by(current) {
            if let Some(record) = self.grant(conn, user_id, &definition, current, now)? {
                return Ok(record);
            }
        } else {
            conn.execute(
                "INSERT INTO user_achievements
                    (user_id, achievement_id, status, progress_current, progress_total, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, achievement_id) DO UPDATE SET
                    progress_current = excluded.progress_current,
                    progress_total = excluded.progress_total,
                    updated_at = excluded.updated_at",
                params![
                    user_id,
                    achievement_id,
                    AchievementStatus::InProgress.as_str(),
                    current,
                    definition.requirement,
                    now.timestamp_millis(),
                ],
            )?;
        }

        self.find_user_achievement(conn, user_id, achievement_id)?
            .ok_or_else(|| EngineError::not_found("user achievement", achievement_id))
    }

    /// Mark an in-progress achievement as failed (terminal)
    pub fn fail(
        &self,
        conn: &Connection,
        user_id: &str,
        achievement_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<UserAchievement> {
        let existing = self
            .find_user_achievement(conn, user_id, achievement_id)?
            .ok_or_else(|| {
                EngineError::not_found("user achievement", format!("{}/{}", user_id, achievement_id))
            })?;
        if existing.status != AchievementStatus::InProgress {
            return Err(EngineError::InvalidState(format!(
                "achievement {} is {} and cannot fail",
                achievement_id,
                existing.status.as_str()
            )));
        }

        conn.execute(
            "UPDATE user_achievements SET status = ?1, updated_at = ?2
             WHERE user_id = ?3 AND achievement_id = ?4 AND status = ?5",
            params![
                AchievementStatus::Failed.as_str(),
                now.timestamp_millis(),
                user_id,
                achievement_id,
                AchievementStatus::InProgress.as_str(),
            ],
        )?;
        info!("{} failed achievement {}", user_id, achievement_id);

        self.find_user_achievement(conn, user_id, achievement_id)?
            .ok_or_else(|| EngineError::not_found("user achievement", achievement_id))
    }
}
