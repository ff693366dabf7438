//! Ranked leaderboard snapshots per (window, category)

mod models;
mod ranker;

pub use models::{
    BatchReport, LeaderboardCategory, LeaderboardEntry, RankInfo, ScoreInputs, ScoreWeights,
    UnitFailure, WindowType,
};
pub use ranker::{dense_rank, LeaderboardRanker};
