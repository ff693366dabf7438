//! Reward catalog and per-user reward lifecycle

mod definitions;
mod engine;

pub use definitions::{
    RewardDefinition, RewardStatus, RewardTrigger, RewardType, RewardValue, UserReward,
};
pub use engine::{RewardEngine, RewardGrant};
