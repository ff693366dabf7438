//! Daily learning streak tracking

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::windows::parse_day_bucket;

/// Streak state as stored on a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakInfo {
    pub current: u32,
    pub best: u32,
    pub last_activity_day: Option<String>,
}

/// Result of registering activity on a given day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: StreakInfo,
    /// True when the count changed (new day)
    pub extended: bool,
}

impl StreakInfo {
    /// Check if the streak is still alive on `today` (activity today or yesterday)
    pub fn is_active(&self, today: NaiveDate) -> bool {
        let Some(last) = self.last_activity_day.as_deref().and_then(parse_day_bucket) else {
            return false;
        };
        (today - last).num_days() <= 1
    }

    /// Register activity on `today`.
    ///
    /// Same day: unchanged. Next day: +1. Any gap (or unparseable history): restart at 1.
    pub fn register(&self, today: NaiveDate) -> StreakUpdate {
        let last = self.last_activity_day.as_deref().and_then(parse_day_bucket);

        let current = match last {
            Some(last) if last == today => {
                return StreakUpdate {
                    streak: self.clone(),
                    extended: false,
                };
            }
            Some(last) if (today - last).num_days() == 1 => self.current + 1,
            _ => 1,
        };

        StreakUpdate {
            streak: StreakInfo {
                current,
                best: self.best.max(current),
                last_activity_day: Some(today.format("%Y-%m-%d").to_string()),
            },
            extended: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_first_activity_starts_streak() {
        let update = StreakInfo::default().register(day(1));
        assert!(update.extended);
        assert_eq!(update.streak.current, 1);
        assert_eq!(update.streak.best, 1);
        assert_eq!(update.streak.last_activity_day.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn test_consecutive_days_extend_and_same_day_is_noop() {
        let s1 = StreakInfo::default().register(day(1)).streak;
        let s2 = s1.register(day(2)).streak;
        assert_eq!(s2.current, 2);

        let same = s2.register(day(2));
        assert!(!same.extended);
        assert_eq!(same.streak, s2);
    }

    #[test]
    fn test_gap_resets_but_keeps_best() {
        let mut streak = StreakInfo::default();
        for d in 1..=4 {
            streak = streak.register(day(d)).streak;
        }
        assert_eq!(streak.current, 4);

        let after_gap = streak.register(day(7)).streak;
        assert_eq!(after_gap.current, 1);
        assert_eq!(after_gap.best, 4);
        assert!(after_gap.is_active(day(8)));
        assert!(!after_gap.is_active(day(9)));
    }
}
