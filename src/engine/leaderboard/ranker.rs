//! Leaderboard Ranker
//!
//! Scores are read from profiles, the activity log and the achievement,
//! mission and reward tables; the ranker never writes to any of them. Each
//! (window, category) snapshot is replaced wholesale in one transaction.
//!
//! Ranking is dense: users are ordered by score descending (user id breaks
//! ties for display order), tied scores share a rank and the next distinct
//! score takes the next integer.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::models::{
    LeaderboardCategory, LeaderboardEntry, RankInfo, ScoreInputs, ScoreWeights, WindowType,
};
use crate::engine::achievements::AchievementStatus;
use crate::engine::profile::kinds;
use crate::engine::windows::day_bucket;
use crate::error::{EngineError, EngineResult};

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LeaderboardEntry> {
    let window: String = row.get(0)?;
    let category: String = row.get(1)?;
    let conversion = |idx: usize, e: EngineError| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    };
    Ok(LeaderboardEntry {
        window_type: WindowType::parse(&window).map_err(|e| conversion(0, e))?,
        category: LeaderboardCategory::parse(&category).map_err(|e| conversion(1, e))?,
        user_id: row.get(2)?,
        score: row.get(3)?,
        rank: row.get(4)?,
        computed_at: row.get(5)?,
    })
}

/// Assign dense ranks to `(user_id, score)` pairs
pub fn dense_rank(
    mut scores: Vec<(String, i64)>,
    window_type: WindowType,
    category: LeaderboardCategory,
    computed_at: i64,
) -> Vec<LeaderboardEntry> {
    scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut entries = Vec::with_capacity(scores.len());
    let mut rank = 0u32;
    let mut previous: Option<i64> = None;
    for (user_id, score) in scores {
        if previous != Some(score) {
            rank += 1;
            previous = Some(score);
        }
        entries.push(LeaderboardEntry {
            window_type,
            category,
            user_id,
            score,
            rank,
            computed_at,
        });
    }
    entries
}

/// Computes and stores ranked snapshots
#[derive(Debug, Clone)]
pub struct LeaderboardRanker {
    weights: ScoreWeights,
}

impl LeaderboardRanker {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Score every profile for one (window, category) at `now`
    pub fn compute_scores(
        &self,
        conn: &Connection,
        window_type: WindowType,
        category: LeaderboardCategory,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<(String, i64)>> {
        let (start, end) = match window_type.window_at(now) {
            Some(window) => (window.start_ms(), window.end_ms()),
            None => (i64::MIN, i64::MAX),
        };
        let all_time = window_type == WindowType::AllTime;

        match category {
            LeaderboardCategory::Points => self.composite_scores(conn, all_time, start, end),
            LeaderboardCategory::LearningStreak => {
                // a streak without activity today or yesterday has lapsed
                let yesterday = day_bucket(now - Duration::days(1));
                query_scores(
                    conn,
                    "SELECT user_id,
                        CASE WHEN last_activity_day >= ?1 THEN streak ELSE 0 END
                     FROM profiles",
                    params![yesterday],
                )
            }
            counted => {
                let (column, kind) = match counted {
                    LeaderboardCategory::LessonsCompleted => {
                        ("lessons_completed", kinds::LESSON_COMPLETED)
                    }
                    LeaderboardCategory::ExercisesCompleted => {
                        ("exercises_completed", kinds::EXERCISE_COMPLETED)
                    }
                    LeaderboardCategory::PerfectScores => ("perfect_scores", kinds::PERFECT_SCORE),
                    _ => ("cultural_contributions", kinds::CULTURAL_CONTRIBUTION),
                };
                if all_time {
                    let sql = format!("SELECT user_id, {} FROM profiles", column);
                    query_scores(conn, &sql, params![])
                } else {
                    query_scores(
                        conn,
                        "SELECT p.user_id,
                            (SELECT COUNT(*) FROM activity_log a
                             WHERE a.user_id = p.user_id AND a.kind = ?1
                               AND a.created_at >= ?2 AND a.created_at < ?3)
                         FROM profiles p",
                        params![kind, start, end],
                    )
                }
            }
        }
    }

    fn composite_scores(
        &self,
        conn: &Connection,
        all_time: bool,
        start: i64,
        end: i64,
    ) -> EngineResult<Vec<(String, i64)>> {
        // ALL_TIME uses experience within the current level; windows use points earned in them
        let experience = if all_time {
            "p.experience"
        } else {
            "(SELECT COALESCE(SUM(a.points), 0) FROM activity_log a
              WHERE a.user_id = p.user_id AND a.points > 0 AND a.kind != ?4
                AND a.created_at >= ?1 AND a.created_at < ?2)"
        };
        let sql = format!(
            "SELECT p.user_id, p.level, {},
                (SELECT COUNT(*) FROM user_achievements ua
                 WHERE ua.user_id = p.user_id AND ua.status = ?3
                   AND ua.completed_at >= ?1 AND ua.completed_at < ?2),
                (SELECT COUNT(*) FROM mission_progress mp
                 WHERE mp.user_id = p.user_id AND mp.completed_at IS NOT NULL
                   AND mp.completed_at >= ?1 AND mp.completed_at < ?2),
                (SELECT COUNT(*) FROM user_rewards ur
                 WHERE ur.user_id = p.user_id
                   AND ur.awarded_at >= ?1 AND ur.awarded_at < ?2)
             FROM profiles p",
            experience
        );

        let mut stmt = conn.prepare(&sql)?;
        let status = AchievementStatus::Completed.as_str();
        let map = |row: &Row<'_>| -> rusqlite::Result<(String, ScoreInputs)> {
            Ok((
                row.get(0)?,
                ScoreInputs {
                    level: row.get(1)?,
                    experience: row.get(2)?,
                    achievements: row.get(3)?,
                    missions: row.get(4)?,
                    rewards: row.get(5)?,
                },
            ))
        };
        let rows = if all_time {
            stmt.query_map(params![start, end, status], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![start, end, status, kinds::ADMIN_CORRECTION], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(rows
            .into_iter()
            .map(|(user_id, inputs)| (user_id, self.weights.score(&inputs)))
            .collect())
    }

    /// Replace the stored snapshot for one (window, category)
    pub fn replace_snapshot(
        &self,
        conn: &Connection,
        window_type: WindowType,
        category: LeaderboardCategory,
        entries: &[LeaderboardEntry],
    ) -> EngineResult<()> {
        conn.execute(
            "DELETE FROM leaderboard_entries WHERE window_type = ?1 AND category = ?2",
            params![window_type.as_str(), category.as_str()],
        )?;
        let mut stmt = conn.prepare(
            "INSERT INTO leaderboard_entries (window_type, category, user_id, score, rank, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for entry in entries {
            stmt.execute(params![
                entry.window_type.as_str(),
                entry.category.as_str(),
                entry.user_id,
                entry.score,
                entry.rank,
                entry.computed_at,
            ])?;
        }
        debug!(
            "Stored {} entries for {}/{}",
            entries.len(),
            window_type.as_str(),
            category.as_str()
        );
        Ok(())
    }

    /// Current snapshot in rank order
    pub fn get_leaderboard(
        &self,
        conn: &Connection,
        window_type: WindowType,
        category: LeaderboardCategory,
        limit: Option<usize>,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT window_type, category, user_id, score, rank, computed_at
             FROM leaderboard_entries
             WHERE window_type = ?1 AND category = ?2
             ORDER BY rank, user_id
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![window_type.as_str(), category.as_str(), limit],
            entry_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A user's rank in the current snapshot; rank 0 when absent
    pub fn get_user_rank(
        &self,
        conn: &Connection,
        user_id: &str,
        window_type: WindowType,
        category: LeaderboardCategory,
    ) -> EngineResult<RankInfo> {
        let total: u32 = conn.query_row(
            "SELECT COUNT(*) FROM leaderboard_entries WHERE window_type = ?1 AND category = ?2",
            params![window_type.as_str(), category.as_str()],
            |r| r.get(0),
        )?;
        let found: Option<(u32, i64)> = conn
            .query_row(
                "SELECT rank, score FROM leaderboard_entries
                 WHERE window_type = ?1 AND category = ?2 AND user_id = ?3",
                params![window_type.as_str(), category.as_str(), user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        Ok(match found {
            Some((rank, score)) => RankInfo {
                rank,
                total,
                score: Some(score),
            },
            None => RankInfo {
                rank: 0,
                total,
                score: None,
            },
        })
    }
}

fn query_scores(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> EngineResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::memory_connection;
    use crate::engine::profile::{log_activity, CounterDelta, LevelCurve, PointsLedger};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 17, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_dense_rank_shares_ties() {
        let scores = vec![
            ("dan".to_string(), 50),
            ("ana".to_string(), 90),
            ("cai".to_string(), 90),
            ("ben".to_string(), 70),
            ("eve".to_string(), 50),
        ];
        let entries = dense_rank(scores, WindowType::AllTime, LeaderboardCategory::Points, 0);
        let ranked: Vec<_> = entries.iter().map(|e| (e.user_id.as_str(), e.rank)).collect();
        assert_eq!(
            ranked,
            vec![("ana", 1), ("cai", 1), ("ben", 2), ("dan", 3), ("eve", 3)]
        );
        for pair in entries.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert!(pair[0].rank <= pair[1].rank);
        }
    }

    #[test]
    fn test_composite_all_time_score() {
        let conn = memory_connection();
        let ledger = PointsLedger::new(LevelCurve::default(), 20);
        // level 2 with 50 experience into it
        ledger.award_points(&conn, "ana", 150, "seed", "x", now()).unwrap();
        ledger.award_points(&conn, "ben", 20, "seed", "x", now()).unwrap();

        let ranker = LeaderboardRanker::new(ScoreWeights::default());
        let mut scores = ranker
            .compute_scores(&conn, WindowType::AllTime, LeaderboardCategory::Points, now())
            .unwrap();
        scores.sort();
        assert_eq!(scores, vec![("ana".to_string(), 250), ("ben".to_string(), 120)]);
    }

    #[test]
    fn test_windowed_counts_only_include_the_window() {
        let conn = memory_connection();
        let ledger = PointsLedger::new(LevelCurve::default(), 20);
        ledger.ensure(&conn, "ana", now()).unwrap();
        ledger
            .record_counters(
                &conn,
                "ana",
                CounterDelta {
                    lessons_completed: 3,
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        log_activity(&conn, "ana", kinds::LESSON_COMPLETED, "old", 0, now() - Duration::days(2)).unwrap();
        log_activity(&conn, "ana", kinds::LESSON_COMPLETED, "new", 0, now()).unwrap();

        let ranker = LeaderboardRanker::new(ScoreWeights::default());
        let daily = ranker
            .compute_scores(&conn, WindowType::Daily, LeaderboardCategory::LessonsCompleted, now())
            .unwrap();
        assert_eq!(daily, vec![("ana".to_string(), 1)]);
        let all_time = ranker
            .compute_scores(&conn, WindowType::AllTime, LeaderboardCategory::LessonsCompleted, now())
            .unwrap();
        assert_eq!(all_time, vec![("ana".to_string(), 3)]);
    }

    #[test]
    fn test_snapshot_replace_and_rank_lookup() {
        let conn = memory_connection();
        let ranker = LeaderboardRanker::new(ScoreWeights::default());
        let window = WindowType::Weekly;
        let category = LeaderboardCategory::LearningStreak;

        let first = dense_rank(
            vec![("ana".into(), 5), ("ben".into(), 3)],
            window,
            category,
            1,
        );
        ranker.replace_snapshot(&conn, window, category, &first).unwrap();
        let second = dense_rank(vec![("ben".into(), 9)], window, category, 2);
        ranker.replace_snapshot(&conn, window, category, &second).unwrap();

        let board = ranker.get_leaderboard(&conn, window, category, None).unwrap();
        assert_eq!(board, second);

        let ben = ranker.get_user_rank(&conn, "ben", window, category).unwrap();
        assert_eq!(ben, RankInfo { rank: 1, total: 1, score: Some(9) });
        let ana = ranker.get_user_rank(&conn, "ana", window, category).unwrap();
        assert_eq!(ana.rank, 0);
        assert_eq!(ana.total, 1);

        // other snapshots are untouched
        assert!(ranker
            .get_leaderboard(&conn, WindowType::Daily, category, Some(10))
            .unwrap()
            .is_empty());
    }
}
