//! SQLite database connection and schema management for gamification state
//!
//! One writer connection lives behind a mutex; every engine call runs as a
//! single transaction on it. Read-mostly batch work (leaderboard scoring)
//! opens its own read-only connection so it never holds the writer lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::error::{EngineError, EngineResult};

/// Shared handle to the gamification database
#[derive(Clone)]
pub struct GameDb {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl GameDb {
    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL lets leaderboard readers run alongside the writer
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an independent read-only connection
    pub fn open_reader(&self) -> EngineResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;
        Ok(conn)
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Storage("database lock poisoned".to_string()))
    }

    /// Run `f` inside one immediate transaction; any error rolls everything back.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a read-only closure on the writer connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> EngineResult<T>) -> EngineResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Self::run_migrations(&conn)?;
        Ok(())
    }

    /// Run any pending migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: collaboration lookups scan activity_log by (user, kind)
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_activity_user_kind
                    ON activity_log(user_id, kind, created_at);
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        Ok(())
    }

    /// Delete all per-user gamification state, keeping the catalogs
    pub fn reset_progress(&self) -> EngineResult<()> {
        self.write(|tx| {
            tx.execute_batch(
                r#"
                DELETE FROM leaderboard_entries;
                DELETE FROM mission_progress;
                DELETE FROM user_achievements;
                DELETE FROM user_rewards;
                DELETE FROM activity_log;
                DELETE FROM profiles;
                UPDATE reward_definitions SET times_awarded = 0;
                "#,
            )?;
            Ok(())
        })
    }
}

/// What a cascade (bonus, badge, mission payout) does when one grant fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeFailure {
    /// Return the error; the caller's transaction rolls back
    Abort,
    /// Undo only the failed grant and carry on
    Skip,
}

/// Run `f` inside a savepoint on `conn`.
///
/// On error every write `f` made is undone, the rest of the enclosing
/// transaction is kept and the error is returned.
pub fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce() -> EngineResult<T>,
) -> EngineResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;
    match f() {
        Ok(out) => {
            conn.execute_batch(&format!("RELEASE {}", name))?;
            Ok(out)
        }
        Err(e) => {
            conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))?;
            Err(e)
        }
    }
}

/// In-memory connection with the full schema, for unit tests
#[cfg(test)]
pub(crate) fn memory_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database");
    conn.execute_batch(SCHEMA_SQL).expect("schema");
    conn
}

/// SQL schema for the gamification database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);

-- One gamification profile per user
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    total_points INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 1,
    experience INTEGER NOT NULL DEFAULT 0,
    next_level_experience INTEGER NOT NULL,
    lifetime_experience INTEGER NOT NULL DEFAULT 0,
    lessons_completed INTEGER NOT NULL DEFAULT 0,
    exercises_completed INTEGER NOT NULL DEFAULT 0,
    perfect_scores INTEGER NOT NULL DEFAULT 0,
    cultural_contributions INTEGER NOT NULL DEFAULT 0,
    streak INTEGER NOT NULL DEFAULT 0,
    best_streak INTEGER NOT NULL DEFAULT 0,
    last_activity_day TEXT,
    version INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Append-only activity log (also feeds windowed leaderboards and missions)
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES profiles(user_id),
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    points INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_log(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_activity_kind ON activity_log(kind, created_at);

-- Reward catalog
CREATE TABLE IF NOT EXISTS reward_definitions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    reward_type TEXT NOT NULL,
    reward_trigger TEXT NOT NULL,
    points_cost INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    limited_quantity INTEGER,
    times_awarded INTEGER NOT NULL DEFAULT 0,
    expiration_days INTEGER,
    value TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Per-user reward instances
CREATE TABLE IF NOT EXISTS user_rewards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    reward_id TEXT NOT NULL REFERENCES reward_definitions(id),
    status TEXT NOT NULL,
    awarded_at INTEGER NOT NULL,
    expires_at INTEGER,
    consumed_at INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_user_rewards_user ON user_rewards(user_id, reward_id);
CREATE INDEX IF NOT EXISTS idx_user_rewards_expiry ON user_rewards(status, expires_at);

-- Achievement catalog
CREATE TABLE IF NOT EXISTS achievement_definitions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    criteria_key TEXT NOT NULL,
    requirement INTEGER NOT NULL,
    bonus_points INTEGER NOT NULL DEFAULT 0,
    badge_reward_id TEXT REFERENCES reward_definitions(id),
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_achievement_criteria ON achievement_definitions(criteria_key);

-- Per-user achievements; the primary key is the idempotency key
CREATE TABLE IF NOT EXISTS user_achievements (
    user_id TEXT NOT NULL,
    achievement_id TEXT NOT NULL REFERENCES achievement_definitions(id),
    status TEXT NOT NULL,
    progress_current INTEGER NOT NULL DEFAULT 0,
    progress_total INTEGER NOT NULL,
    completed_at INTEGER,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, achievement_id)
);

-- Mission templates and their time-boxed instances
CREATE TABLE IF NOT EXISTS mission_templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    frequency TEXT NOT NULL,
    mission_type TEXT NOT NULL,
    base_target_value INTEGER NOT NULL,
    base_reward_points INTEGER NOT NULL DEFAULT 0,
    badge_reward_id TEXT REFERENCES reward_definitions(id),
    min_level INTEGER NOT NULL DEFAULT 1,
    max_level INTEGER,
    conditions TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    template_id TEXT NOT NULL REFERENCES mission_templates(id),
    name TEXT NOT NULL,
    mission_type TEXT NOT NULL,
    target_value INTEGER NOT NULL,
    reward_points INTEGER NOT NULL DEFAULT 0,
    badge_reward_id TEXT,
    min_level INTEGER NOT NULL DEFAULT 1,
    max_level INTEGER,
    start_at INTEGER NOT NULL,
    end_at INTEGER NOT NULL,
    UNIQUE (template_id, start_at)
);
CREATE INDEX IF NOT EXISTS idx_missions_window ON missions(mission_type, start_at, end_at);

CREATE TABLE IF NOT EXISTS mission_progress (
    user_id TEXT NOT NULL,
    mission_id INTEGER NOT NULL REFERENCES missions(id),
    progress INTEGER NOT NULL DEFAULT 0,
    completed_at INTEGER,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, mission_id)
);

-- Leaderboard snapshots, replaced wholesale per (window_type, category)
CREATE TABLE IF NOT EXISTS leaderboard_entries (
    window_type TEXT NOT NULL,
    category TEXT NOT NULL,
    user_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    rank INTEGER NOT NULL,
    computed_at INTEGER NOT NULL,
    PRIMARY KEY (window_type, category, user_id)
);
CREATE INDEX IF NOT EXISTS idx_leaderboard_rank ON leaderboard_entries(window_type, category, rank);
"#;
