//! LexiQuest - gamification for language learning
//!
//! LexiQuest turns learning activity (lessons, exercises, cultural
//! collaborations) into points, levels, rewards, achievements, missions and
//! leaderboard ranks. All state lives in one SQLite database and every
//! operation is a single transaction.
//!
//! ## Components
//!
//! 1. **Points & Leveling**: the points ledger, level curve and streaks
//! 2. **Rewards**: catalog, grants, consumption and expiry
//! 3. **Achievements**: threshold criteria with one-shot grants
//! 4. **Missions**: time-windowed goals generated from templates
//! 5. **Leaderboards**: periodic ranked snapshots per window and category
//!
//! [`engine::GamificationEngine`] is the entry point for all of them.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::GamificationEngine;
pub use error::{EngineError, EngineResult};
