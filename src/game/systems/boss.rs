//! Super-entity movement and volley timing

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::game::constants::boss::SUPER_SPEED;
use crate::game::constants::projectile::MIN_FIRE_INTERVAL_MS;
use crate::game::state::{Arena, DamageType, Projectile, ProjectileId, SuperEntity};
use crate::game::systems::movement;
use crate::util::vec2::Vec2;

/// How volleys are triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FireMode {
    /// Only on an explicit `fire_super` call
    #[default]
    Manual,
    /// On a timer while the round runs
    Auto,
}

impl fmt::Display for FireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FireMode::Manual => "manual",
            FireMode::Auto => "auto",
        })
    }
}

impl FromStr for FireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(FireMode::Manual),
            "auto" | "automatic" => Ok(FireMode::Auto),
            other => Err(format!("unknown fire mode '{}'", other)),
        }
    }
}

/// Per-round volley state
#[derive(Debug, Clone)]
pub struct FireControl {
    mode: FireMode,
    interval_ms: u64,
    enabled_types: Vec<DamageType>,
    /// Simulation time of the last volley
    last_fire_ms: Option<u64>,
    /// Simulation time the auto timer was armed
    armed_at_ms: u64,
    next_projectile_id: ProjectileId,
}

impl FireControl {
    /// `enabled_types` empty disables firing entirely
    pub fn new(mode: FireMode, interval_ms: u64, enabled_types: Vec<DamageType>) -> Self {
        Self {
            mode,
            interval_ms: interval_ms.max(MIN_FIRE_INTERVAL_MS),
            enabled_types,
            last_fire_ms: None,
            armed_at_ms: 0,
            next_projectile_id: 1,
        }
    }

    pub fn mode(&self) -> FireMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        !self.enabled_types.is_empty()
    }

    /// Start the auto timer (called when the round starts or resumes)
    pub fn arm(&mut self, now_ms: u64) {
        self.armed_at_ms = now_ms;
        self.last_fire_ms = None;
    }

    fn cooled_down(&self, now_ms: u64) -> bool {
        let since = self.last_fire_ms.unwrap_or(self.armed_at_ms);
        now_ms.saturating_sub(since) >= self.interval_ms
    }

    /// Whether the timer wants a volley this tick
    pub fn auto_due(&self, now_ms: u64) -> bool {
        self.mode == FireMode::Auto && self.is_enabled() && self.cooled_down(now_ms)
    }

    /// Whether a manual trigger is accepted now (rate-limited by the interval)
    pub fn manual_ready(&self, now_ms: u64) -> bool {
        self.is_enabled() && (self.last_fire_ms.is_none() || self.cooled_down(now_ms))
    }

    /// Build one volley: a projectile per compass direction, each with a
    /// damage type drawn uniformly from the enabled set
    pub fn volley<R: Rng + ?Sized>(&mut self, boss: &SuperEntity, now_ms: u64, rng: &mut R) -> Vec<Projectile> {
        self.last_fire_ms = Some(now_ms);
        Vec2::compass()
            .into_iter()
            .filter_map(|dir| {
                let damage_type = *self.enabled_types.choose(rng)?;
                let id = self.next_projectile_id;
                self.next_projectile_id += 1;
                Some(Projectile::new(id, boss.position + dir * boss.radius, dir, damage_type))
            })
            .collect()
    }
}

/// Give the super-entity its opening heading
pub fn launch<R: Rng + ?Sized>(boss: &mut SuperEntity, rng: &mut R) {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    boss.velocity = Vec2::from_angle(angle) * SUPER_SPEED;
}

/// Move the super-entity one step, bouncing off walls like a bubble
pub fn update(boss: &mut SuperEntity, arena: Arena, speed: f32) {
    let radius = boss.radius.min(arena.max_radius());
    movement::move_body(&mut boss.position, &mut boss.velocity, radius, speed, arena);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn boss() -> SuperEntity {
        SuperEntity::new(Vec2::new(300.0, 300.0), 1000.0, None)
    }

    #[test]
    fn test_volley_eight_directions() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut fire = FireControl::new(FireMode::Manual, 1500, DamageType::ALL.to_vec());
        let shots = fire.volley(&boss(), 0, &mut rng);
        assert_eq!(shots.len(), 8);
        let ids: std::collections::HashSet<_> = shots.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 8);
        for p in &shots {
            assert!((p.velocity.length() - 7.0).abs() < 1e-4);
            assert!((p.position.distance_sq_to(Vec2::new(300.0, 300.0)).sqrt() - 60.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_volley_uses_enabled_types_only() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut fire = FireControl::new(FireMode::Auto, 1500, vec![DamageType::Frost]);
        let shots = fire.volley(&boss(), 0, &mut rng);
        assert!(shots.iter().all(|p| p.damage_type == DamageType::Frost));
    }

    #[test]
    fn test_disabled_never_fires() {
        let fire = FireControl::new(FireMode::Auto, 1500, Vec::new());
        assert!(!fire.auto_due(10_000));
        assert!(!fire.manual_ready(10_000));
    }

    #[test]
    fn test_auto_timer() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut fire = FireControl::new(FireMode::Auto, 1500, DamageType::ALL.to_vec());
        fire.arm(300);
        assert!(!fire.auto_due(1_500));
        assert!(fire.auto_due(1_800));
        fire.volley(&boss(), 1_800, &mut rng);
        assert!(!fire.auto_due(3_000));
        assert!(fire.auto_due(3_300));
    }

    #[test]
    fn test_manual_rate_limited() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut fire = FireControl::new(FireMode::Manual, 1500, DamageType::ALL.to_vec());
        assert!(fire.manual_ready(0));
        assert!(!fire.auto_due(5_000));
        fire.volley(&boss(), 0, &mut rng);
        assert!(!fire.manual_ready(1_000));
        assert!(fire.manual_ready(1_500));
    }

    #[test]
    fn test_interval_floor() {
        let fire = FireControl::new(FireMode::Auto, 5, DamageType::ALL.to_vec());
        assert!(!fire.auto_due(50));
        assert!(fire.auto_due(100));
    }

    #[test]
    fn test_launch_speed() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut b = boss();
        launch(&mut b, &mut rng);
        assert!((b.velocity.length() - SUPER_SPEED).abs() < 1e-4);
    }

    #[test]
    fn test_fire_mode_parse() {
        assert_eq!("AUTO".parse::<FireMode>(), Ok(FireMode::Auto));
        assert!("burst".parse::<FireMode>().is_err());
    }
}
