//! Simulation tunables
//!
//! Grouped by concern. Population-dependent values are exposed as functions
//! next to the thresholds they read.

/// Tick and arena timing constants
pub mod tick {
    /// Logic tick interval in milliseconds
    pub const TICK_MS: u64 = 30;
    /// Maximum ticks a single late frame may catch up on
    pub const MAX_CATCH_UP_TICKS: u32 = 8;
    /// Default arena width in pixels
    pub const DEFAULT_WIDTH: f32 = 1280.0;
    /// Default arena height in pixels
    pub const DEFAULT_HEIGHT: f32 = 720.0;
    /// Default displacement multiplier applied to velocity each step
    pub const DEFAULT_SPEED_MULTIPLIER: f32 = 2.5;
    /// Accepted speed multiplier range
    pub const SPEED_MULTIPLIER_MIN: f32 = 0.5;
    pub const SPEED_MULTIPLIER_MAX: f32 = 15.0;
}

/// Bubble radius constants
pub mod radius {
    /// Radius a freshly spawned bubble starts at before growing
    pub const SPAWN: f32 = 4.0;
    /// Fraction of the remaining gap closed per tick while animating
    pub const ANIMATION_RATE: f32 = 0.2;
    /// Gap under which the animation snaps to its target
    pub const SNAP_EPSILON: f32 = 0.05;
}

/// Movement constants
pub mod movement {
    /// Initial speed (pixels per step) for normal bubbles
    pub const INITIAL_SPEED: f32 = 3.0;
    /// Population above which the movement phase is integrated in parallel
    pub const PARALLEL_THRESHOLD: usize = 8_192;
}

/// Collision detection constants
pub mod collision {
    /// Live population at or below which every unordered pair is tested
    pub const EXHAUSTIVE_LIMIT: usize = 3_000;
    /// Random partners tested per bubble per tick above the exhaustive limit
    pub const SAMPLES_PER_BUBBLE: usize = 3;
    /// Cell size for the uniform grid strategy, as a multiple of the largest radius
    pub const GRID_CELL_RADIUS_FACTOR: f32 = 2.0;
}

/// Damage constants
pub mod damage {
    /// Starting and maximum health for normal bubbles
    pub const MAX_HEALTH: f32 = 100.0;
    /// Base bubble-bubble damage below the first population threshold
    pub const BASE: f32 = 10.0;
    /// Bubble-bubble damage between the two population thresholds
    pub const DENSE: f32 = 25.0;
    /// Bubble-bubble damage above the upper threshold
    pub const CROWDED: f32 = 50.0;
    /// Population at which damage starts scaling up
    pub const DENSE_THRESHOLD: usize = 1_000;
    /// Population above which damage is at its maximum
    pub const CROWDED_THRESHOLD: usize = 5_000;
    /// Minimum interval between accepted bubble-bubble hits on one bubble (ms)
    pub const BUBBLE_COOLDOWN_MS: u64 = 50;
    /// Minimum interval between accepted super-entity hits on one bubble (ms)
    pub const SUPER_COOLDOWN_MS: u64 = 250;
}

/// Death queue constants
pub mod lifecycle {
    /// Death delay at low population (visible "pop")
    pub const DEATH_DELAY_SPARSE_MS: u64 = 300;
    /// Death delay between the population thresholds
    pub const DEATH_DELAY_DENSE_MS: u64 = 60;
    /// Death delay at very high population
    pub const DEATH_DELAY_CROWDED_MS: u64 = 0;
    /// Removals processed per tick at low population
    pub const REMOVAL_BUDGET_SPARSE: usize = 100;
    /// Removals processed per tick between the thresholds
    pub const REMOVAL_BUDGET_DENSE: usize = 500;
    /// Removals processed per tick at very high population
    pub const REMOVAL_BUDGET_CROWDED: usize = 2_000;
}

/// Spike (thorn) constants
pub mod spikes {
    /// Damage dealt per contact episode
    pub const DAMAGE: f32 = 20.0;
    /// Default spike size in pixels
    pub const DEFAULT_SIZE: f32 = 30.0;
    /// Accepted spike size range
    pub const SIZE_MIN: f32 = 10.0;
    pub const SIZE_MAX: f32 = 50.0;
    /// Accepted spike count range
    pub const COUNT_MIN: usize = 1;
    pub const COUNT_MAX: usize = 20;
    /// Minimum spacing between two spikes on the same side
    pub const MIN_SPACING: f32 = 30.0;
    /// Placement attempts before a spike is dropped
    pub const MAX_PLACEMENT_ATTEMPTS: u32 = 50;
    /// Extra clearance added when pushing a bubble off a spike
    pub const PUSH_CLEARANCE: f32 = 1.0;
}

/// Spawn placement constants
pub mod spawn {
    /// Attempts to find a non-overlapping position before accepting the last candidate
    pub const MAX_ATTEMPTS: u32 = 100;
}

/// Super-entity (boss) constants
pub mod boss {
    /// Default maximum health of the super-entity
    pub const SUPER_MAX_HEALTH: f32 = 1_000.0;
    /// Super-entity radius in pixels
    pub const SUPER_RADIUS: f32 = 60.0;
    /// Super-entity speed (pixels per step)
    pub const SUPER_SPEED: f32 = 2.5;
    /// Damage a normal bubble takes per accepted super contact
    pub const CONTACT_DAMAGE: f32 = 20.0;
    /// Fraction of the super-entity's current health lost per contact
    pub const CONTACT_HEALTH_FRACTION: f32 = 0.12;
}

/// Super-entity projectile constants
pub mod projectile {
    /// Projectile radius in pixels
    pub const RADIUS: f32 = 6.0;
    /// Projectile speed (pixels per step, before the speed multiplier)
    pub const SPEED: f32 = 7.0;
    /// Default interval between volleys (ms)
    pub const DEFAULT_FIRE_INTERVAL_MS: u64 = 1_500;
    /// Shortest accepted volley interval (ms)
    pub const MIN_FIRE_INTERVAL_MS: u64 = 100;
}

/// Roster polling and stats delivery constants
pub mod io {
    /// Interval between roster polls while a Normal round is loaded (ms)
    pub const ROSTER_POLL_MS: u64 = 2_000;
    /// Interval between stats flushes (ms)
    pub const STATS_FLUSH_MS: u64 = 3_000;
}

/// Target radius for a live population (denser arenas get smaller bubbles)
pub fn radius_for_count(count: usize) -> f32 {
    match count {
        0..=10 => 50.0,
        11..=50 => 45.0,
        51..=100 => 40.0,
        101..=500 => 35.0,
        501..=1_000 => 30.0,
        1_001..=5_000 => 25.0,
        5_001..=10_000 => 20.0,
        10_001..=50_000 => 15.0,
        50_001..=100_000 => 10.0,
        _ => 5.0,
    }
}

/// Bubble-bubble damage for a live population
pub fn damage_for_population(count: usize) -> f32 {
    use damage::*;
    if count < DENSE_THRESHOLD {
        BASE
    } else if count <= CROWDED_THRESHOLD {
        DENSE
    } else {
        CROWDED
    }
}

/// Death delay (ms) for a live population
pub fn death_delay_ms(count: usize) -> u64 {
    use damage::{CROWDED_THRESHOLD, DENSE_THRESHOLD};
    use lifecycle::*;
    if count > CROWDED_THRESHOLD {
        DEATH_DELAY_CROWDED_MS
    } else if count > DENSE_THRESHOLD {
        DEATH_DELAY_DENSE_MS
    } else {
        DEATH_DELAY_SPARSE_MS
    }
}

/// Maximum removals processed in one tick for a live population
pub fn removal_budget(count: usize) -> usize {
    use damage::{CROWDED_THRESHOLD, DENSE_THRESHOLD};
    use lifecycle::*;
    if count > CROWDED_THRESHOLD {
        REMOVAL_BUDGET_CROWDED
    } else if count > DENSE_THRESHOLD {
        REMOVAL_BUDGET_DENSE
    } else {
        REMOVAL_BUDGET_SPARSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_table_edges() {
        assert_eq!(radius_for_count(0), 50.0);
        assert_eq!(radius_for_count(10), 50.0);
        assert_eq!(radius_for_count(11), 45.0);
        assert_eq!(radius_for_count(1_000), 30.0);
        assert_eq!(radius_for_count(1_001), 25.0);
        assert_eq!(radius_for_count(100_000), 10.0);
        assert_eq!(radius_for_count(100_001), 5.0);
    }

    #[test]
    fn test_radius_shrinks_with_population() {
        let mut last = f32::MAX;
        for n in [1, 20, 80, 400, 900, 4_000, 9_000, 40_000, 90_000, 200_000] {
            let r = radius_for_count(n);
            assert!(r <= last);
            last = r;
        }
    }

    #[test]
    fn test_damage_scales_with_population() {
        assert_eq!(damage_for_population(3), 10.0);
        assert_eq!(damage_for_population(999), 10.0);
        assert_eq!(damage_for_population(1_000), 25.0);
        assert_eq!(damage_for_population(5_000), 25.0);
        assert_eq!(damage_for_population(5_001), 50.0);
    }

    #[test]
    fn test_death_delay_shrinks_with_population() {
        assert_eq!(death_delay_ms(10), 300);
        assert_eq!(death_delay_ms(2_000), 60);
        assert_eq!(death_delay_ms(20_000), 0);
    }

    #[test]
    fn test_removal_budget_grows_with_population() {
        assert!(removal_budget(10) < removal_budget(2_000));
        assert!(removal_budget(2_000) < removal_budget(20_000));
    }
}
