//! Reward Engine - catalog storage and the per-user reward lifecycle
//!
//! Instances move ACTIVE -> CONSUMED or ACTIVE -> EXPIRED and never back.
//! Expiry is evaluated lazily against the clock; [`RewardEngine::sweep_expired`]
//! only pre-materializes what reads would already report.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::definitions::{
    RewardDefinition, RewardStatus, RewardTrigger, RewardType, RewardValue, UserReward,
};
use crate::engine::profile::{kinds, PointsAward, PointsLedger};
use crate::error::{EngineError, EngineResult};

const DEFINITION_COLUMNS: &str = "id, name, description, reward_type, reward_trigger, points_cost, \
     is_active, limited_quantity, times_awarded, expiration_days, value";

const USER_REWARD_COLUMNS: &str =
    "id, user_id, reward_id, status, awarded_at, expires_at, consumed_at, metadata";

/// Result of an award call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardGrant {
    pub reward: UserReward,
    /// False when an already-held badge was returned instead of a new instance
    pub newly_awarded: bool,
    /// Set when the reward credited points
    pub points: Option<PointsAward>,
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<RewardDefinition> {
    let stored_type: String = row.get(3)?;
    let trigger: String = row.get(4)?;
    let value: String = row.get(10)?;

    let value: RewardValue = serde_json::from_str(&value).map_err(|e| conversion_error(10, e))?;
    if value.reward_type().as_str() != stored_type {
        return Err(conversion_error(
            3,
            EngineError::Storage(format!(
                "reward type {} does not match payload {}",
                stored_type,
                value.reward_type().as_str()
            )),
        ));
    }
    let trigger = RewardTrigger::from_str(&trigger).ok_or_else(|| {
        conversion_error(4, EngineError::Storage(format!("unknown reward trigger: {}", trigger)))
    })?;

    Ok(RewardDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        trigger,
        points_cost: row.get(5)?,
        is_active: row.get(6)?,
        limited_quantity: row.get(7)?,
        times_awarded: row.get(8)?,
        expiration_days: row.get(9)?,
        value,
    })
}

fn user_reward_from_row(row: &Row<'_>) -> rusqlite::Result<UserReward> {
    let status: String = row.get(3)?;
    let metadata: String = row.get(7)?;

    let status = RewardStatus::from_str(&status).ok_or_else(|| {
        conversion_error(3, EngineError::Storage(format!("unknown reward status: {}", status)))
    })?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata).map_err(|e| conversion_error(7, e))?;

    Ok(UserReward {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reward_id: row.get(2)?,
        status,
        awarded_at: row.get(4)?,
        expires_at: row.get(5)?,
        consumed_at: row.get(6)?,
        metadata,
    })
}

/// Owns reward definitions and user reward instances
#[derive(Debug, Clone)]
pub struct RewardEngine {
    ledger: PointsLedger,
}

impl RewardEngine {
    pub fn new(ledger: PointsLedger) -> Self {
        Self { ledger }
    }

    // ========================================
    // CATALOG
    // ========================================

    /// Insert a definition unless one with the same id exists.
    ///
    /// Returns whether a row was written.
    pub fn insert_definition(
        &self,
        conn: &Connection,
        definition: &RewardDefinition,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        definition.validate()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO reward_definitions
                (id, name, description, reward_type, reward_trigger, points_cost, is_active,
                 limited_quantity, times_awarded, expiration_days, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11)",
            params![
                definition.id,
                definition.name,
                definition.description,
                definition.reward_type().as_str(),
                definition.trigger.as_str(),
                definition.points_cost,
                definition.is_active,
                definition.limited_quantity,
                definition.expiration_days,
                serde_json::to_string(&definition.value)?,
                now.timestamp_millis(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Create or replace a definition, preserving how often it was awarded
    pub fn upsert_definition(
        &self,
        conn: &Connection,
        definition: &RewardDefinition,
        now: DateTime<Utc>,
    ) -> EngineResult<RewardDefinition> {
        definition.validate()?;
        conn.execute(
            "INSERT INTO reward_definitions
                (id, name, description, reward_type, reward_trigger, points_cost, is_active,
                 limited_quantity, times_awarded, expiration_days, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                reward_type = excluded.reward_type,
                reward_trigger = excluded.reward_trigger,
                points_cost = excluded.points_cost,
                is_active = excluded.is_active,
                limited_quantity = excluded.limited_quantity,
                expiration_days = excluded.expiration_days,
                value = excluded.value",
            params![
                definition.id,
                definition.name,
                definition.description,
                definition.reward_type().as_str(),
                definition.trigger.as_str(),
                definition.points_cost,
                definition.is_active,
                definition.limited_quantity,
                definition.expiration_days,
                serde_json::to_string(&definition.value)?,
                now.timestamp_millis(),
            ],
        )?;
        self.get_definition(conn, &definition.id)
    }

    pub fn find_definition(&self, conn: &Connection, id: &str) -> EngineResult<Option<RewardDefinition>> {
        let sql = format!("SELECT {} FROM reward_definitions WHERE id = ?1", DEFINITION_COLUMNS);
        Ok(conn.query_row(&sql, [id], definition_from_row).optional()?)
    }

    pub fn get_definition(&self, conn: &Connection, id: &str) -> EngineResult<RewardDefinition> {
        self.find_definition(conn, id)?
            .ok_or_else(|| EngineError::not_found("reward", id))
    }

    pub fn list_definitions(&self, conn: &Connection) -> EngineResult<Vec<RewardDefinition>> {
        let sql = format!("SELECT {} FROM reward_definitions ORDER BY id", DEFINITION_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], definition_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Enable or retire a catalog entry
    pub fn set_active(&self, conn: &Connection, id: &str, active: bool) -> EngineResult<()> {
        let updated = conn.execute(
            "UPDATE reward_definitions SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(EngineError::not_found("reward", id));
        }
        Ok(())
    }

    // ========================================
    // INSTANCES
    // ========================================

    fn instances(
        &self,
        conn: &Connection,
        user_id: &str,
        reward_id: &str,
    ) -> EngineResult<Vec<UserReward>> {
        let sql = format!(
            "SELECT {} FROM user_rewards WHERE user_id = ?1 AND reward_id = ?2
             ORDER BY awarded_at DESC, id DESC",
            USER_REWARD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, reward_id], user_reward_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn load_instance(&self, conn: &Connection, id: i64) -> EngineResult<UserReward> {
        let sql = format!("SELECT {} FROM user_rewards WHERE id = ?1", USER_REWARD_COLUMNS);
        conn.query_row(&sql, [id], user_reward_from_row)
            .optional()?
            .ok_or_else(|| EngineError::not_found("user reward", id.to_string()))
    }

    /// Grant a reward instance to a user.
    ///
    /// Badges are held at most once at a time: awarding a badge the user
    /// still holds returns that instance with `newly_awarded = false`.
    /// POINTS rewards credit their amount through the points ledger in the
    /// same transaction.
    pub fn award(
        &self,
        conn: &Connection,
        user_id: &str,
        reward_id: &str,
        metadata: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> EngineResult<RewardGrant> {
        let definition = self.get_definition(conn, reward_id)?;
        if !definition.is_active {
            return Err(EngineError::InvalidState(format!(
                "reward {} is not active",
                reward_id
            )));
        }
        self.ledger.ensure(conn, user_id, now)?;

        if definition.reward_type() == RewardType::Badge {
            let held = self
                .instances(conn, user_id, reward_id)?
                .into_iter()
                .find(|r| r.effective_status(now) != RewardStatus::Expired);
            if let Some(reward) = held {
                debug!("{} already holds badge {}", user_id, reward_id);
                return Ok(RewardGrant {
                    reward,
                    newly_awarded: false,
                    points: None,
                });
            }
        }

        if definition.remaining() == Some(0) {
            return Err(EngineError::InvalidState(format!(
                "reward {} is sold out ({} awarded)",
                reward_id, definition.times_awarded
            )));
        }
        let claimed = conn.execute(
            "UPDATE reward_definitions SET times_awarded = times_awarded + 1
             WHERE id = ?1 AND (limited_quantity IS NULL OR times_awarded < limited_quantity)",
            [reward_id],
        )?;
        if claimed == 0 {
            return Err(EngineError::Conflict(format!(
                "reward {} changed while awarding",
                reward_id
            )));
        }

        let expires_at = definition
            .expiration_days
            .map(|days| (now + Duration::days(i64::from(days))).timestamp_millis());
        conn.execute(
            "INSERT INTO user_rewards (user_id, reward_id, status, awarded_at, expires_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                reward_id,
                RewardStatus::Active.as_str(),
                now.timestamp_millis(),
                expires_at,
                serde_json::to_string(metadata)?,
            ],
        )?;
        let reward = self.load_instance(conn, conn.last_insert_rowid())?;

        let points = match definition.value {
            RewardValue::Points { amount } => Some(self.ledger.award_points(
                conn,
                user_id,
                amount,
                kinds::REWARD_POINTS,
                &format!("Reward: {}", definition.name),
                now,
            )?),
            _ => None,
        };

        info!("Awarded reward {} to {}", reward_id, user_id);
        Ok(RewardGrant {
            reward,
            newly_awarded: true,
            points,
        })
    }

    /// Consume a held reward.
    ///
    /// Picks the instance closest to expiring among those still usable. When
    /// none is usable the most recent instance decides the error.
    pub fn consume(
        &self,
        conn: &Connection,
        user_id: &str,
        reward_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<UserReward> {
        let instances = self.instances(conn, user_id, reward_id)?;

        let usable = instances
            .iter()
            .filter(|r| r.effective_status(now).can_transition_to(RewardStatus::Consumed))
            .min_by_key(|r| (r.expires_at.unwrap_or(i64::MAX), r.awarded_at, r.id));

        let Some(target) = usable else {
            let latest = instances
                .first()
                .ok_or_else(|| EngineError::not_found("user reward", format!("{}/{}", user_id, reward_id)))?;
            return Err(match latest.effective_status(now) {
                RewardStatus::Consumed => EngineError::AlreadyConsumed {
                    reward_id: reward_id.to_string(),
                },
                _ => EngineError::Expired {
                    reward_id: reward_id.to_string(),
                },
            });
        };

        let updated = conn.execute(
            "UPDATE user_rewards SET status = ?1, consumed_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                RewardStatus::Consumed.as_str(),
                now.timestamp_millis(),
                target.id,
                RewardStatus::Active.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(EngineError::Conflict(format!(
                "reward instance {} changed while consuming",
                target.id
            )));
        }

        info!("{} consumed reward {}", user_id, reward_id);
        self.load_instance(conn, target.id)
    }

    /// Effective status of the user's most recent instance of a reward
    pub fn check_expiry(
        &self,
        conn: &Connection,
        user_id: &str,
        reward_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<RewardStatus> {
        self.instances(conn, user_id, reward_id)?
            .first()
            .map(|r| r.effective_status(now))
            .ok_or_else(|| EngineError::not_found("user reward", format!("{}/{}", user_id, reward_id)))
    }

    /// All of a user's rewards, newest first, with expiry applied
    pub fn list_user_rewards(
        &self,
        conn: &Connection,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<UserReward>> {
        let sql = format!(
            "SELECT {} FROM user_rewards WHERE user_id = ?1 ORDER BY awarded_at DESC, id DESC",
            USER_REWARD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], user_reward_from_row)?;
        let mut rewards = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for reward in &mut rewards {
            reward.status = reward.effective_status(now);
        }
        Ok(rewards)
    }

    /// Persist EXPIRED for every active instance past its expiry
    pub fn sweep_expired(&self, conn: &Connection, now: DateTime<Utc>) -> EngineResult<usize> {
        let swept = conn.execute(
            "UPDATE user_rewards SET status = ?1
             WHERE status = ?2 AND expires_at IS NOT NULL AND expires_at <= ?3",
            params![
                RewardStatus::Expired.as_str(),
                RewardStatus::Active.as_str(),
                now.timestamp_millis(),
            ],
        )?;
        if swept > 0 {
            info!("Marked {} rewards as expired", swept);
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::memory_connection;
    use crate::engine::profile::LevelCurve;
    use chrono::TimeZone;

    fn setup() -> (Connection, RewardEngine, PointsLedger) {
        let ledger = PointsLedger::new(LevelCurve::default(), 20);
        (memory_connection(), RewardEngine::new(ledger.clone()), ledger)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn no_meta() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn add(conn: &Connection, engine: &RewardEngine, def: RewardDefinition) {
        assert!(engine.insert_definition(conn, &def, t0()).unwrap());
    }

    #[test]
    fn test_points_reward_credits_profile() {
        let (conn, engine, ledger) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("bonus50", "Bonus", RewardValue::Points { amount: 50 }).unwrap(),
        );

        let grant = engine.award(&conn, "ana", "bonus50", &no_meta(), t0()).unwrap();
        assert!(grant.newly_awarded);
        assert_eq!(grant.reward.status, RewardStatus::Active);
        assert_eq!(grant.points.unwrap().profile.total_points, 50);
        assert_eq!(ledger.get(&conn, "ana").unwrap().total_points, 50);
        assert_eq!(engine.get_definition(&conn, "bonus50").unwrap().times_awarded, 1);
    }

    #[test]
    fn test_limited_reward_sells_out() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new(
                "tickets",
                "Festival ticket",
                RewardValue::Cultural {
                    event_name: "Dia de los Muertos".into(),
                    region: Some("MX".into()),
                },
            )
            .unwrap()
            .limited(2),
        );

        engine.award(&conn, "ana", "tickets", &no_meta(), t0()).unwrap();
        engine.award(&conn, "ben", "tickets", &no_meta(), t0()).unwrap();
        let err = engine.award(&conn, "cai", "tickets", &no_meta(), t0()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATE");
        assert_eq!(engine.get_definition(&conn, "tickets").unwrap().times_awarded, 2);
    }

    #[test]
    fn test_inactive_and_unknown_rewards() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("old", "Retired", RewardValue::Content {
                content_id: "c1".into(),
            })
            .unwrap()
            .inactive(),
        );
        assert_eq!(
            engine.award(&conn, "ana", "old", &no_meta(), t0()).unwrap_err().kind(),
            "INVALID_STATE"
        );
        assert_eq!(
            engine.award(&conn, "ana", "nope", &no_meta(), t0()).unwrap_err().kind(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_badge_is_held_once() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("polyglot", "Polyglot", RewardValue::Badge {
                badge_id: "polyglot".into(),
                icon: None,
            })
            .unwrap(),
        );

        let first = engine.award(&conn, "ana", "polyglot", &no_meta(), t0()).unwrap();
        let second = engine.award(&conn, "ana", "polyglot", &no_meta(), t0()).unwrap();
        assert!(!second.newly_awarded);
        assert_eq!(first.reward.id, second.reward.id);
        assert_eq!(engine.list_user_rewards(&conn, "ana", t0()).unwrap().len(), 1);
    }

    #[test]
    fn test_consume_then_consume_again() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("hat", "Hat", RewardValue::Customization {
                item: "beret".into(),
                slot: "head".into(),
            })
            .unwrap(),
        );
        engine.award(&conn, "ana", "hat", &no_meta(), t0()).unwrap();

        let consumed = engine.consume(&conn, "ana", "hat", t0()).unwrap();
        assert_eq!(consumed.status, RewardStatus::Consumed);
        assert_eq!(consumed.consumed_at, Some(t0().timestamp_millis()));

        let err = engine.consume(&conn, "ana", "hat", t0()).unwrap_err();
        assert_eq!(
            err,
            EngineError::AlreadyConsumed {
                reward_id: "hat".into()
            }
        );
        assert_eq!(
            engine.consume(&conn, "ben", "hat", t0()).unwrap_err().kind(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_lazy_expiry_and_sweep() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("deal", "Discount", RewardValue::Discount {
                percentage: 25,
                applies_to: None,
            })
            .unwrap()
            .expiring_after_days(7),
        );
        engine.award(&conn, "ana", "deal", &no_meta(), t0()).unwrap();

        let later = t0() + Duration::days(8);
        assert_eq!(
            engine.check_expiry(&conn, "ana", "deal", later).unwrap(),
            RewardStatus::Expired
        );
        let err = engine.consume(&conn, "ana", "deal", later).unwrap_err();
        assert_eq!(err.kind(), "EXPIRED");

        // stored status is still ACTIVE until a sweep runs
        let stored: String = conn
            .query_row("SELECT status FROM user_rewards", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "ACTIVE");

        assert_eq!(engine.sweep_expired(&conn, later).unwrap(), 1);
        assert_eq!(engine.sweep_expired(&conn, later).unwrap(), 0);
        let listed = engine.list_user_rewards(&conn, "ana", later).unwrap();
        assert_eq!(listed[0].status, RewardStatus::Expired);
    }

    #[test]
    fn test_consume_prefers_usable_instance() {
        let (conn, engine, _) = setup();
        add(
            &conn,
            &engine,
            RewardDefinition::new("lesson", "Bonus lesson", RewardValue::ExclusiveContent {
                content_id: "lesson-42".into(),
            })
            .unwrap(),
        );
        engine.award(&conn, "ana", "lesson", &no_meta(), t0()).unwrap();
        engine
            .award(&conn, "ana", "lesson", &no_meta(), t0() + Duration::hours(1))
            .unwrap();

        let first = engine.consume(&conn, "ana", "lesson", t0() + Duration::hours(2)).unwrap();
        let second = engine.consume(&conn, "ana", "lesson", t0() + Duration::hours(2)).unwrap();
        assert_ne!(first.id, second.id);
        assert!(engine.consume(&conn, "ana", "lesson", t0() + Duration::hours(2)).is_err());
    }

    #[test]
    fn test_upsert_keeps_award_count() {
        let (conn, engine, _) = setup();
        let def = RewardDefinition::new("bonus", "Bonus", RewardValue::Points { amount: 10 }).unwrap();
        engine.upsert_definition(&conn, &def, t0()).unwrap();
        engine.award(&conn, "ana", "bonus", &no_meta(), t0()).unwrap();

        let renamed = RewardDefinition::new("bonus", "Bigger bonus", RewardValue::Points { amount: 20 })
            .unwrap()
            .triggered_by(RewardTrigger::LevelReached);
        let stored = engine.upsert_definition(&conn, &renamed, t0()).unwrap();
        assert_eq!(stored.name, "Bigger bonus");
        assert_eq!(stored.trigger, RewardTrigger::LevelReached);
        assert_eq!(stored.times_awarded, 1);
        assert!(!engine.insert_definition(&conn, &def, t0()).unwrap());
    }
}
