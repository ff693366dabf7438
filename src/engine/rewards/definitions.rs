//! Reward catalog definitions and per-user reward instances
//!
//! A reward's payload is a tagged union keyed by its type. The type column is
//! derived from the payload, so a definition can never carry a payload of the
//! wrong shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Kind of reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    Points,
    Badge,
    Achievement,
    Discount,
    ExclusiveContent,
    Customization,
    Cultural,
    Experience,
    Content,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "POINTS",
            Self::Badge => "BADGE",
            Self::Achievement => "ACHIEVEMENT",
            Self::Discount => "DISCOUNT",
            Self::ExclusiveContent => "EXCLUSIVE_CONTENT",
            Self::Customization => "CUSTOMIZATION",
            Self::Cultural => "CULTURAL",
            Self::Experience => "EXPERIENCE",
            Self::Content => "CONTENT",
        }
    }
}

/// What causes a reward to be handed out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardTrigger {
    #[default]
    Manual,
    AchievementUnlocked,
    MissionCompleted,
    LevelReached,
}

impl RewardTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::AchievementUnlocked => "ACHIEVEMENT_UNLOCKED",
            Self::MissionCompleted => "MISSION_COMPLETED",
            Self::LevelReached => "LEVEL_REACHED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MANUAL" => Some(Self::Manual),
            "ACHIEVEMENT_UNLOCKED" => Some(Self::AchievementUnlocked),
            "MISSION_COMPLETED" => Some(Self::MissionCompleted),
            "LEVEL_REACHED" => Some(Self::LevelReached),
            _ => None,
        }
    }
}

/// Typed reward payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardValue {
    /// Points credited through Points & Leveling when awarded
    Points { amount: u64 },
    Badge {
        badge_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },
    Achievement { achievement_id: String },
    Discount {
        percentage: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<String>,
    },
    ExclusiveContent { content_id: String },
    Customization { item: String, slot: String },
    Cultural {
        event_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    Experience { multiplier: f64, duration_hours: u32 },
    Content { content_id: String },
}

fn require_text(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl RewardValue {
    pub fn reward_type(&self) -> RewardType {
        match self {
            Self::Points { .. } => RewardType::Points,
            Self::Badge { .. } => RewardType::Badge,
            Self::Achievement { .. } => RewardType::Achievement,
            Self::Discount { .. } => RewardType::Discount,
            Self::ExclusiveContent { .. } => RewardType::ExclusiveContent,
            Self::Customization { .. } => RewardType::Customization,
            Self::Cultural { .. } => RewardType::Cultural,
            Self::Experience { .. } => RewardType::Experience,
            Self::Content { .. } => RewardType::Content,
        }
    }

    /// Check the payload's shape constraints
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Self::Points { amount } => {
                if *amount == 0 {
                    return Err(EngineError::validation("points reward must grant at least 1 point"));
                }
            }
            Self::Badge { badge_id, .. } => require_text("badge_id", badge_id)?,
            Self::Achievement { achievement_id } => require_text("achievement_id", achievement_id)?,
            Self::Discount { percentage, .. } => {
                if !(1..=100).contains(percentage) {
                    return Err(EngineError::validation(format!(
                        "discount percentage must be 1-100 (got {})",
                        percentage
                    )));
                }
            }
            Self::ExclusiveContent { content_id } | Self::Content { content_id } => {
                require_text("content_id", content_id)?
            }
            Self::Customization { item, slot } => {
                require_text("item", item)?;
                require_text("slot", slot)?;
            }
            Self::Cultural { event_name, .. } => require_text("event_name", event_name)?,
            Self::Experience {
                multiplier,
                duration_hours,
            } => {
                if !multiplier.is_finite() || *multiplier <= 1.0 {
                    return Err(EngineError::validation(format!(
                        "experience multiplier must be greater than 1.0 (got {})",
                        multiplier
                    )));
                }
                if *duration_hours == 0 {
                    return Err(EngineError::validation("experience boost needs a duration"));
                }
            }
        }
        Ok(())
    }
}

/// Reward catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger: RewardTrigger,
    /// Catalog price shown to users; not charged by the engine
    pub points_cost: u64,
    pub is_active: bool,
    /// Total instances that may ever be awarded; None means unlimited
    pub limited_quantity: Option<u32>,
    pub times_awarded: u32,
    pub expiration_days: Option<u32>,
    pub value: RewardValue,
}

impl RewardDefinition {
    /// Build a validated definition
    pub fn new(id: impl Into<String>, name: impl Into<String>, value: RewardValue) -> EngineResult<Self> {
        let id = id.into();
        let name = name.into();
        require_text("reward id", &id)?;
        require_text("reward name", &name)?;
        value.validate()?;
        Ok(Self {
            id,
            name,
            description: String::new(),
            trigger: RewardTrigger::Manual,
            points_cost: 0,
            is_active: true,
            limited_quantity: None,
            times_awarded: 0,
            expiration_days: None,
            value,
        })
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn triggered_by(mut self, trigger: RewardTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn costing(mut self, points: u64) -> Self {
        self.points_cost = points;
        self
    }

    pub fn limited(mut self, quantity: u32) -> Self {
        self.limited_quantity = Some(quantity);
        self
    }

    pub fn expiring_after_days(mut self, days: u32) -> Self {
        self.expiration_days = Some(days);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn reward_type(&self) -> RewardType {
        self.value.reward_type()
    }

    pub fn remaining(&self) -> Option<u32> {
        self.limited_quantity
            .map(|limit| limit.saturating_sub(self.times_awarded))
    }

    /// Re-check invariants (used for definitions read from callers or storage)
    pub fn validate(&self) -> EngineResult<()> {
        require_text("reward id", &self.id)?;
        require_text("reward name", &self.name)?;
        if self.limited_quantity == Some(0) {
            return Err(EngineError::validation("limited quantity must be at least 1"));
        }
        if self.expiration_days == Some(0) {
            return Err(EngineError::validation("expiration_days must be at least 1"));
        }
        self.value.validate()
    }
}

/// Lifecycle status of a per-user reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    Active,
    Consumed,
    Expired,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Consumed => "CONSUMED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "CONSUMED" => Some(Self::Consumed),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Only ACTIVE may move, and only forward
    pub fn can_transition_to(&self, next: RewardStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Consumed) | (Self::Active, Self::Expired)
        )
    }
}

/// A reward instance held by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReward {
    pub id: i64,
    pub user_id: String,
    pub reward_id: String,
    /// Status as stored; see [`UserReward::effective_status`]
    pub status: RewardStatus,
    pub awarded_at: i64,
    pub expires_at: Option<i64>,
    pub consumed_at: Option<i64>,
    pub metadata: BTreeMap<String, String>,
}

impl UserReward {
    /// Status with expiry applied lazily at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> RewardStatus {
        match (self.status, self.expires_at) {
            (RewardStatus::Active, Some(expires_at)) if now.timestamp_millis() >= expires_at => {
                RewardStatus::Expired
            }
            (status, _) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_serializes_with_type_tag() {
        let value = RewardValue::Discount {
            percentage: 20,
            applies_to: None,
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"DISCOUNT","percentage":20}"#);

        let parsed: RewardValue =
            serde_json::from_str(r#"{"type":"POINTS","amount":50}"#).unwrap();
        assert_eq!(parsed, RewardValue::Points { amount: 50 });
        assert_eq!(parsed.reward_type(), RewardType::Points);
    }

    #[test]
    fn test_payload_shape_is_validated() {
        assert!(RewardDefinition::new("d", "Deal", RewardValue::Discount {
            percentage: 120,
            applies_to: None
        })
        .is_err());
        assert!(RewardDefinition::new("x", "Boost", RewardValue::Experience {
            multiplier: 0.5,
            duration_hours: 24
        })
        .is_err());
        assert!(RewardDefinition::new("p", "Zero", RewardValue::Points { amount: 0 }).is_err());
        assert!(RewardDefinition::new("b", "Badge", RewardValue::Badge {
            badge_id: " ".into(),
            icon: None
        })
        .is_err());

        let ok = RewardDefinition::new("c", "Costume", RewardValue::Customization {
            item: "sombrero".into(),
            slot: "hat".into(),
        })
        .unwrap()
        .limited(3);
        assert_eq!(ok.reward_type(), RewardType::Customization);
        assert_eq!(ok.remaining(), Some(3));
    }

    #[test]
    fn test_status_transitions_are_one_directional() {
        use RewardStatus::*;
        assert!(Active.can_transition_to(Consumed));
        assert!(Active.can_transition_to(Expired));
        for terminal in [Consumed, Expired] {
            for next in [Active, Consumed, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_effective_status_applies_expiry() {
        let awarded = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let reward = UserReward {
            id: 1,
            user_id: "ana".into(),
            reward_id: "r".into(),
            status: RewardStatus::Active,
            awarded_at: awarded.timestamp_millis(),
            expires_at: Some((awarded + chrono::Duration::days(7)).timestamp_millis()),
            consumed_at: None,
            metadata: BTreeMap::new(),
        };
        assert_eq!(reward.effective_status(awarded), RewardStatus::Active);
        assert_eq!(
            reward.effective_status(awarded + chrono::Duration::days(8)),
            RewardStatus::Expired
        );

        let consumed = UserReward {
            status: RewardStatus::Consumed,
            ..reward
        };
        assert_eq!(
            consumed.effective_status(awarded + chrono::Duration::days(8)),
            RewardStatus::Consumed
        );
    }
}
