//! Super-entity projectile flight and impact
//!
//! A projectile is removed the tick it leaves the arena or the tick it
//! strikes a bubble. When several bubbles are in reach the nearest one takes
//! the hit; there is no penetration.

use crate::game::state::{Arena, BubbleId, DamageType, Projectile};
use crate::game::store::BubbleStore;

/// A projectile that landed on a bubble this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileHit {
    pub victim: BubbleId,
    pub damage_type: DamageType,
}

/// Advance every projectile one step and collect impacts
pub fn update(projectiles: &mut Vec<Projectile>, store: &BubbleStore, arena: Arena, speed: f32) -> Vec<ProjectileHit> {
    let mut hits = Vec::new();

    projectiles.retain_mut(|p| {
        p.position += p.velocity * speed;
        if !arena.contains_point(p.position) {
            return false;
        }
        match nearest_hit(store, p) {
            Some(victim) => {
                hits.push(ProjectileHit { victim, damage_type: p.damage_type });
                false
            }
            None => true,
        }
    });
    hits
}

/// Nearest live bubble overlapping the projectile
fn nearest_hit(store: &BubbleStore, p: &Projectile) -> Option<BubbleId> {
    let mut best: Option<(f32, BubbleId)> = None;
    for row in 0..store.len() {
        if store.is_dying(row) {
            continue;
        }
        let b = store.row(row);
        let dx = b.x - p.position.x;
        let dy = b.y - p.position.y;
        let d2 = dx * dx + dy * dy;
        let reach = b.radius + p.radius();
        if d2 >= reach * reach {
            continue;
        }
        if best.map_or(true, |(bd, _)| d2 < bd) {
            best = Some((d2, b.id));
        }
    }
    best.map(|(_, id)| id)
}
