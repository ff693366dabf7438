//! Profile store plus Points & Leveling

mod ledger;
mod levels;
mod models;
mod streaks;

#[cfg(test)]
pub(crate) use ledger::log_activity;
pub use ledger::{CounterUpdate, PointsAward, PointsLedger};
pub use levels::{LevelCurve, LevelProgress, LevelUp, MAX_LEVEL};
pub use models::{kinds, ActivityEntry, CounterDelta, Counters, Profile};
pub use streaks::{StreakInfo, StreakUpdate};
