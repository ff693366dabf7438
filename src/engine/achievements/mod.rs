//! Achievement catalog and evaluation

mod criteria;
mod definitions;
mod evaluator;

pub use criteria::CriteriaKey;
pub use definitions::{
    AchievementDefinition, AchievementSeed, AchievementStatus, Progress, UserAchievement,
    DEFAULT_ACHIEVEMENTS,
};
pub use evaluator::AchievementEvaluator;
