//! Movement and boundary phase
//!
//! Integrates `v * speed` per step, animates radii toward their target and
//! reflects off the arena walls. Reflection only flips the sign of a velocity
//! component, so speed is conserved across bounces.

#[cfg(feature = "parallel_movement")]
use rayon::prelude::*;

#[cfg(feature = "parallel_movement")]
use crate::game::constants::movement::PARALLEL_THRESHOLD;
use crate::game::constants::radius::{ANIMATION_RATE, SNAP_EPSILON};
use crate::game::state::Arena;
use crate::game::store::BubbleStore;
use crate::util::vec2::Vec2;

/// Keep a coordinate inside `[r, extent - r]`, pointing the velocity back
/// inward on contact. A body wider than the extent is pinned to its middle.
#[inline]
pub fn bounce_axis(pos: f32, vel: f32, r: f32, extent: f32) -> (f32, f32) {
    if 2.0 * r >= extent {
        return (extent * 0.5, vel);
    }
    if pos - r <= 0.0 {
        (r, vel.abs())
    } else if pos + r >= extent {
        (extent - r, -vel.abs())
    } else {
        (pos, vel)
    }
}

#[inline]
fn animate_radius(r: f32, target: f32) -> f32 {
    let gap = target - r;
    if gap.abs() < SNAP_EPSILON {
        target
    } else {
        r + gap * ANIMATION_RATE
    }
}

#[inline]
#[allow(clippy::too_many_arguments)]
fn step_row(
    x: &mut f32,
    y: &mut f32,
    vx: &mut f32,
    vy: &mut f32,
    r: &mut f32,
    target: f32,
    speed: f32,
    arena: Arena,
) {
    *x += *vx * speed;
    *y += *vy * speed;
    *r = animate_radius(*r, target).min(arena.max_radius());
    let (nx, nvx) = bounce_axis(*x, *vx, *r, arena.width);
    let (ny, nvy) = bounce_axis(*y, *vy, *r, arena.height);
    *x = nx;
    *vx = nvx;
    *y = ny;
    *vy = nvy;
}

/// Advance every row one step
pub fn update(store: &mut BubbleStore, arena: Arena, speed: f32) {
    let n = store.len();
    let cols = store.columns_mut();

    #[cfg(feature = "parallel_movement")]
    {
        if n > PARALLEL_THRESHOLD {
            (
                cols.x.par_iter_mut(),
                cols.y.par_iter_mut(),
                cols.vx.par_iter_mut(),
                cols.vy.par_iter_mut(),
                cols.radius.par_iter_mut(),
                cols.target_radius.par_iter(),
            )
                .into_par_iter()
                .for_each(|(x, y, vx, vy, r, &t)| step_row(x, y, vx, vy, r, t, speed, arena));
            return;
        }
    }

    for i in 0..n {
        step_row(
            &mut cols.x[i],
            &mut cols.y[i],
            &mut cols.vx[i],
            &mut cols.vy[i],
            &mut cols.radius[i],
            cols.target_radius[i],
            speed,
            arena,
        );
    }
}

/// Re-apply wall containment without moving (after collision pushes)
pub fn contain(store: &mut BubbleStore, arena: Arena) {
    let cols = store.columns_mut();
    for i in 0..cols.x.len() {
        let r = cols.radius[i].min(arena.max_radius());
        cols.radius[i] = r;
        let (x, vx) = bounce_axis(cols.x[i], cols.vx[i], r, arena.width);
        let (y, vy) = bounce_axis(cols.y[i], cols.vy[i], r, arena.height);
        cols.x[i] = x;
        cols.vx[i] = vx;
        cols.y[i] = y;
        cols.vy[i] = vy;
    }
}

/// Move a singleton body (the super-entity) with the same wall rules
pub fn move_body(position: &mut Vec2, velocity: &mut Vec2, radius: f32, speed: f32, arena: Arena) {
    *position += *velocity * speed;
    contain_body(position, velocity, radius, arena);
}

pub fn contain_body(position: &mut Vec2, velocity: &mut Vec2, radius: f32, arena: Arena) {
    let (x, vx) = bounce_axis(position.x, velocity.x, radius, arena.width);
    let (y, vy) = bounce_axis(position.y, velocity.y, radius, arena.height);
    *position = Vec2::new(x, y);
    *velocity = Vec2::new(vx, vy);
}
