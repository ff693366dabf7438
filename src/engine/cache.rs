//! Bounded per-user cache of collaboration statistics
//!
//! Entries are evicted oldest-insert first once the cache is full. Writers
//! that record a collaboration or correct a profile must call
//! [`BoundedCache::invalidate`] for the user.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::engine::profile::kinds;
use crate::error::EngineResult;

/// A fixed-capacity map with insertion-order eviction
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn invalidate(&mut self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A user's cultural collaboration totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationStats {
    pub user_id: String,
    pub contributions: u64,
    pub points: i64,
    pub last_contribution_at: Option<i64>,
}

impl CollaborationStats {
    pub fn last_contribution(&self) -> Option<DateTime<Utc>> {
        self.last_contribution_at
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// Aggregate from the activity log
    pub fn load(conn: &Connection, user_id: &str) -> EngineResult<Self> {
        let (contributions, points, last): (i64, i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(points), 0), MAX(created_at)
             FROM activity_log WHERE user_id = ?1 AND kind = ?2",
            params![user_id, kinds::CULTURAL_CONTRIBUTION],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        Ok(Self {
            user_id: user_id.to_string(),
            contributions: contributions.max(0) as u64,
            points,
            last_contribution_at: last,
        })
    }
}
