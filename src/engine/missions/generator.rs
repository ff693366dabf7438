//! Mission template catalog and instance generation
//!
//! Generation is idempotent: `missions` is unique on (template_id, start_at),
//! so running the job twice in the same window creates nothing new.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::templates::{Mission, MissionFrequency, MissionTemplate, MissionType};
use crate::engine::rewards::RewardEngine;
use crate::error::{EngineError, EngineResult};

const TEMPLATE_COLUMNS: &str = "id, name, description, frequency, mission_type, base_target_value, \
     base_reward_points, badge_reward_id, min_level, max_level, conditions, is_active";

pub(crate) const MISSION_COLUMNS: &str = "id, template_id, name, mission_type, target_value, \
     reward_points, badge_reward_id, min_level, max_level, start_at, end_at";

fn parse_failure(idx: usize, err: EngineError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<MissionTemplate> {
    let frequency: String = row.get(3)?;
    let mission_type: String = row.get(4)?;
    let conditions: String = row.get(10)?;

    let conditions: BTreeMap<String, String> = serde_json::from_str(&conditions)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(MissionTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        frequency: MissionFrequency::parse(&frequency).map_err(|e| parse_failure(3, e))?,
        mission_type: MissionType::parse(&mission_type).map_err(|e| parse_failure(4, e))?,
        base_target_value: row.get(5)?,
        base_reward_points: row.get(6)?,
        badge_reward_id: row.get(7)?,
        min_level: row.get(8)?,
        max_level: row.get(9)?,
        conditions,
        is_active: row.get(11)?,
    })
}

pub(crate) fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<Mission> {
    let mission_type: String = row.get(3)?;
    Ok(Mission {
        id: row.get(0)?,
        template_id: row.get(1)?,
        name: row.get(2)?,
        mission_type: MissionType::parse(&mission_type).map_err(|e| parse_failure(3, e))?,
        target_value: row.get(4)?,
        reward_points: row.get(5)?,
        badge_reward_id: row.get(6)?,
        min_level: row.get(7)?,
        max_level: row.get(8)?,
        start_at: row.get(9)?,
        end_at: row.get(10)?,
    })
}

/// Stores templates and expands them into missions
#[derive(Debug, Clone)]
pub struct MissionGenerator {
    rewards: RewardEngine,
    once_duration_days: u32,
}

impl MissionGenerator {
    pub fn new(rewards: RewardEngine, once_duration_days: u32) -> Self {
        Self {
            rewards,
            once_duration_days,
        }
    }

    /// Insert a template unless the id is taken; returns whether it was written
    pub fn insert_template(
        &self,
        conn: &Connection,
        template: &MissionTemplate,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        template.validate()?;
        if let Some(badge) = &template.badge_reward_id {
            self.rewards.get_definition(conn, badge)?;
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO mission_templates
                (id, name, description, frequency, mission_type, base_target_value,
                 base_reward_points, badge_reward_id, min_level, max_level, conditions,
                 is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                template.id,
                template.name,
                template.description,
                template.frequency.as_str(),
                template.mission_type.as_str(),
                template.base_target_value,
                template.base_reward_points,
                template.badge_reward_id,
                template.min_level,
                template.max_level,
                serde_json::to_string(&template.conditions)?,
                template.is_active,
                now.timestamp_millis(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_template(&self, conn: &Connection, id: &str) -> EngineResult<MissionTemplate> {
        let sql = format!("SELECT {} FROM mission_templates WHERE id = ?1", TEMPLATE_COLUMNS);
        conn.query_row(&sql, [id], template_from_row)
            .optional()?
            .ok_or_else(|| EngineError::not_found("mission template", id))
    }

    pub fn list_templates(&self, conn: &Connection) -> EngineResult<Vec<MissionTemplate>> {
        let sql = format!("SELECT {} FROM mission_templates ORDER BY id", TEMPLATE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], template_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_template_active(&self, conn: &Connection, id: &str, active: bool) -> EngineResult<()> {
        let updated = conn.execute(
            "UPDATE mission_templates SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(EngineError::not_found("mission template", id));
        }
        Ok(())
    }

    fn has_any_mission(conn: &Connection, template_id: &str) -> EngineResult<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM missions WHERE template_id = ?1 LIMIT 1",
                [template_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Create the current-window mission for every active template.
    ///
    /// Returns only missions created by this call.
    pub fn generate(&self, conn: &Connection, now: DateTime<Utc>) -> EngineResult<Vec<Mission>> {
        let mut created = Vec::new();
        for template in self.list_templates(conn)?.into_iter().filter(|t| t.is_active) {
            if template.frequency == MissionFrequency::Once && Self::has_any_mission(conn, &template.id)? {
                continue;
            }
            let window = template.frequency.window_at(now, self.once_duration_days);
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO missions
                    (template_id, name, mission_type, target_value, reward_points,
                     badge_reward_id, min_level, max_level, start_at, end_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    template.id,
                    template.name,
                    template.mission_type.as_str(),
                    template.base_target_value,
                    template.base_reward_points,
                    template.badge_reward_id,
                    template.min_level,
                    template.max_level,
                    window.start_ms(),
                    window.end_ms(),
                ],
            )?;
            if inserted == 0 {
                debug!("Mission for {} already exists in this window", template.id);
                continue;
            }
            let sql = format!("SELECT {} FROM missions WHERE id = ?1", MISSION_COLUMNS);
            created.push(conn.query_row(&sql, [conn.last_insert_rowid()], mission_from_row)?);
        }
        if !created.is_empty() {
            info!("Generated {} missions", created.len());
        }
        Ok(created)
    }
}
