//! Experience and level curve
//!
//! Level 1 requires `base_experience` to advance; each following level
//! requires the previous requirement times `growth_factor` (rounded down).
//! A profile's level is always derived from its lifetime experience, so
//! the curve is the single source of truth for level transitions.

use serde::{Deserialize, Serialize};

use crate::config::LevelingSettings;

/// Upper bound on levels, so a flat curve cannot loop forever
pub const MAX_LEVEL: u32 = 500;

/// Level curve parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    base_experience: u64,
    growth_factor: f64,
}

/// Where a given amount of lifetime experience lands on the curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    /// Experience accumulated inside the current level
    pub experience: u64,
    /// Experience the current level requires before the next level-up
    pub next_level_experience: u64,
}

/// A level up event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

impl LevelCurve {
    pub fn new(base_experience: u64, growth_factor: f64) -> Self {
        Self {
            base_experience: base_experience.max(1),
            growth_factor: if growth_factor >= 1.0 { growth_factor } else { 1.0 },
        }
    }

    pub fn from_settings(settings: &LevelingSettings) -> Self {
        Self::new(settings.base_experience, settings.growth_factor)
    }

    fn grow(&self, requirement: u64) -> u64 {
        ((requirement as f64) * self.growth_factor).floor().max(1.0) as u64
    }

    /// Place lifetime experience on the curve
    pub fn progress_for(&self, lifetime_experience: u64) -> LevelProgress {
        let mut level = 1;
        let mut remaining = lifetime_experience;
        let mut requirement = self.base_experience;

        while remaining >= requirement && level < MAX_LEVEL {
            remaining -= requirement;
            level += 1;
            requirement = self.grow(requirement);
        }

        LevelProgress {
            level,
            experience: remaining,
            next_level_experience: requirement,
        }
    }

    /// Monotonic step function from lifetime experience to level
    pub fn level_of(&self, lifetime_experience: u64) -> u32 {
        self.progress_for(lifetime_experience).level
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::from_settings(&LevelingSettings::default())
    }
}

impl LevelProgress {
    /// Progress fraction towards the next level (0.0 - 1.0)
    pub fn fraction(&self) -> f32 {
        if self.next_level_experience == 0 {
            1.0
        } else {
            (self.experience as f32 / self.next_level_experience as f32).min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_experience() {
        let curve = LevelCurve::default();
        assert_eq!(curve.level_of(0), 1);
        assert_eq!(curve.level_of(99), 1);
        assert_eq!(curve.level_of(100), 2);
        // 100 + 150
        assert_eq!(curve.level_of(249), 2);
        assert_eq!(curve.level_of(250), 3);
        // 100 + 150 + 225
        assert_eq!(curve.level_of(475), 4);
    }

    #[test]
    fn test_progress_wraps_experience() {
        let curve = LevelCurve::default();
        let progress = curve.progress_for(150);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.experience, 50);
        assert_eq!(progress.next_level_experience, 150);
        assert!((progress.fraction() - 0.333).abs() < 0.01);
    }

    #[test]
    fn test_requirements_grow_by_factor() {
        let curve = LevelCurve::default();
        assert_eq!(curve.progress_for(0).next_level_experience, 100);
        assert_eq!(curve.progress_for(100).next_level_experience, 150);
        let third = curve.progress_for(250);
        assert_eq!((third.level, third.experience), (3, 0));
        assert_eq!(third.next_level_experience, 225);
    }

    #[test]
    fn test_level_is_monotonic() {
        let curve = LevelCurve::new(40, 1.3);
        let mut last = 0;
        for xp in (0..20_000).step_by(37) {
            let level = curve.level_of(xp);
            assert!(level >= last, "level dropped at {} xp", xp);
            last = level;
        }
    }

    #[test]
    fn test_flat_curve_is_capped() {
        let curve = LevelCurve::new(1, 1.0);
        assert_eq!(curve.level_of(u64::MAX), MAX_LEVEL);
    }
}
