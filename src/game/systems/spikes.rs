//! Wall spikes: placement and contact
//!
//! A contact deals fixed damage and pushes the bubble strictly clear of the
//! spike footprint, so one contact episode is counted once even though the
//! bubble may keep drifting toward the wall.

use rand::Rng;
use tracing::debug;

use crate::game::constants::spikes::{MAX_PLACEMENT_ATTEMPTS, MIN_SPACING, PUSH_CLEARANCE};
use crate::game::state::{Arena, BubbleId, Side, Spike};
use crate::game::store::BubbleStore;

/// Place up to `count` spikes of `size`. Each spike picks a random wall and
/// retries its offset until it is more than `MIN_SPACING` from every spike on
/// the same wall; a spike that exhausts its attempts is dropped.
pub fn place<R: Rng + ?Sized>(arena: &Arena, count: usize, size: f32, rng: &mut R) -> Vec<Spike> {
    let mut placed: Vec<Spike> = Vec::with_capacity(count);

    for _ in 0..count {
        let side = Side::ALL[rng.gen_range(0..Side::ALL.len())];
        let span = arena.side_length(side) - size.max(MIN_SPACING);
        if span <= 0.0 {
            continue;
        }

        let mut accepted = None;
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let offset = rng.gen_range(0.0..span);
            let clear = placed
                .iter()
                .filter(|s| s.side == side)
                .all(|s| (s.offset - offset).abs() > MIN_SPACING);
            if clear {
                accepted = Some(offset);
                break;
            }
        }

        match accepted {
            Some(offset) => placed.push(Spike { side, offset, size }),
            None => debug!(?side, "Spike placement exhausted its attempts; dropped"),
        }
    }
    placed
}

/// Side-specific contact test between a circle and a spike footprint
#[inline]
pub fn touches(spike: &Spike, arena: &Arena, x: f32, y: f32, r: f32) -> bool {
    let (min, max) = spike.footprint(arena);
    let along = match spike.side {
        Side::Top | Side::Bottom => x + r >= min.x && x - r <= max.x,
        Side::Left | Side::Right => y + r >= min.y && y - r <= max.y,
    };
    along
        && match spike.side {
            Side::Top => y - r <= max.y,
            Side::Bottom => y + r >= min.y,
            Side::Left => x - r <= max.x,
            Side::Right => x + r >= min.x,
        }
}

/// Test every live bubble against every spike. On contact the bubble is moved
/// to the safe side of the spike and its velocity is pointed away from the
/// wall (speed unchanged). Returns the ids that took a spike hit.
pub fn apply(store: &mut BubbleStore, spikes: &[Spike], arena: &Arena) -> Vec<BubbleId> {
    let mut hit = Vec::new();
    if spikes.is_empty() {
        return hit;
    }
    let cols = store.columns_mut();

    for i in 0..cols.x.len() {
        if cols.dying[i] {
            continue;
        }
        let r = cols.radius[i];
        let Some(spike) = spikes
            .iter()
            .find(|s| touches(s, arena, cols.x[i], cols.y[i], r))
        else {
            continue;
        };

        let (min, max) = spike.footprint(arena);
        match spike.side {
            Side::Top => {
                cols.y[i] = max.y + r + PUSH_CLEARANCE;
                cols.vy[i] = cols.vy[i].abs();
            }
            Side::Bottom => {
                cols.y[i] = min.y - r - PUSH_CLEARANCE;
                cols.vy[i] = -cols.vy[i].abs();
            }
            Side::Left => {
                cols.x[i] = max.x + r + PUSH_CLEARANCE;
                cols.vx[i] = cols.vx[i].abs();
            }
            Side::Right => {
                cols.x[i] = min.x - r - PUSH_CLEARANCE;
                cols.vx[i] = -cols.vx[i].abs();
            }
        }
        hit.push(cols.ids[i]);
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::spikes::DEFAULT_SIZE;
    use crate::game::state::ImageRef;
    use crate::game::store::Bubble;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store_with(x: f32, y: f32, vx: f32, vy: f32) -> BubbleStore {
        let mut store = BubbleStore::new();
        let id = store.alloc_id();
        store
            .append(Bubble {
                id,
                x,
                y,
                vx,
                vy,
                radius: 10.0,
                target_radius: 10.0,
                health: 100.0,
                image: ImageRef(0),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_place_respects_spacing() {
        let arena = Arena::new(1280.0, 720.0);
        let mut rng = StdRng::seed_from_u64(5);
        let spikes = place(&arena, 20, DEFAULT_SIZE, &mut rng);
        assert!(!spikes.is_empty());
        assert!(spikes.len() <= 20);
        for (i, a) in spikes.iter().enumerate() {
            for b in spikes.iter().skip(i + 1) {
                if a.side == b.side {
                    assert!((a.offset - b.offset).abs() > MIN_SPACING);
                }
            }
            let (min, max) = a.footprint(&arena);
            assert!(min.x >= 0.0 && max.x <= arena.width);
            assert!(min.y >= 0.0 && max.y <= arena.height);
        }
    }

    #[test]
    fn test_place_drops_when_crowded() {
        // Each wall fits only a couple of spikes; the rest are dropped
        let arena = Arena::new(100.0, 100.0);
        let mut rng = StdRng::seed_from_u64(11);
        let spikes = place(&arena, 20, 30.0, &mut rng);
        assert!(spikes.len() < 20);
    }

    #[test]
    fn test_place_tiny_arena_yields_none() {
        let arena = Arena::new(20.0, 20.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(place(&arena, 5, 30.0, &mut rng).is_empty());
    }

    #[test]
    fn test_top_spike_hits_once_per_episode() {
        let arena = Arena::new(400.0, 300.0);
        let spikes = [Spike { side: Side::Top, offset: 100.0, size: 30.0 }];
        // Edge crosses the spike footprint, still moving toward the wall
        let mut store = store_with(115.0, 35.0, 0.0, -2.0);

        let hits = apply(&mut store, &spikes, &arena);
        assert_eq!(hits.len(), 1);
        let b = store.row(0);
        assert_eq!(b.y, 30.0 + 10.0 + PUSH_CLEARANCE);
        assert_eq!(b.vy, 2.0);

        // Same tick re-check and the following check both miss
        assert!(apply(&mut store, &spikes, &arena).is_empty());
    }

    #[test]
    fn test_side_specific_contact() {
        let arena = Arena::new(400.0, 300.0);
        let right = Spike { side: Side::Right, offset: 100.0, size: 30.0 };
        assert!(touches(&right, &arena, 365.0, 110.0, 10.0));
        assert!(!touches(&right, &arena, 355.0, 110.0, 10.0));
        assert!(!touches(&right, &arena, 365.0, 200.0, 10.0));

        let bottom = Spike { side: Side::Bottom, offset: 0.0, size: 30.0 };
        assert!(touches(&bottom, &arena, 20.0, 265.0, 10.0));
        assert!(!touches(&bottom, &arena, 80.0, 265.0, 10.0));
    }

    #[test]
    fn test_push_preserves_speed() {
        let arena = Arena::new(400.0, 300.0);
        let spikes = [Spike { side: Side::Left, offset: 50.0, size: 30.0 }];
        let mut store = store_with(35.0, 60.0, -3.0, 4.0);
        apply(&mut store, &spikes, &arena);
        let b = store.row(0);
        assert_eq!((b.vx, b.vy), (3.0, 4.0));
        assert_eq!(b.x, 41.0);
    }
}
