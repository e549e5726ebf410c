//! Bubble-bubble and bubble-super collision response
//!
//! Overlapping circles are separated along the line between centers, the
//! overlap split evenly. If they are approaching, the velocity components
//! along the normal are exchanged (equal-mass elastic form). No damping is
//! applied. Damage is not decided here; contacts are reported to the caller.

use rand::Rng;
use smallvec::SmallVec;

use crate::game::spatial::{overlaps, CollisionStrategy, PairFinder};
use crate::game::state::{BubbleId, SuperEntity};
use crate::game::store::{BubbleStore, ColumnsMut};
use crate::util::vec2::Vec2;

/// Bubbles touching the super-entity in one tick
pub type SuperContacts = SmallVec<[BubbleId; 8]>;

/// Unit normal from `a` to `b` and the center distance. Coincident centers
/// get an arbitrary fixed normal so they still separate.
#[inline]
fn contact_normal(dx: f32, dy: f32) -> (f32, f32, f32) {
    let dist = (dx * dx + dy * dy).sqrt();
    if dist > f32::EPSILON {
        (dx / dist, dy / dist, dist)
    } else {
        (1.0, 0.0, 0.0)
    }
}

/// Resolve all bubble-bubble overlaps for this tick. Dying rows are skipped.
/// Each resolved contact is appended to `contacts` as an id pair.
///
/// Exhaustive testing walks `i < j` directly instead of collecting the
/// quadratic pair list.
pub fn resolve_bubbles<R: Rng + ?Sized>(
    store: &mut BubbleStore,
    finder: &mut PairFinder,
    rng: &mut R,
    contacts: &mut Vec<(BubbleId, BubbleId)>,
) {
    contacts.clear();
    let mut cols = store.columns_mut();
    let n = cols.x.len();

    if finder.strategy().resolve(n) == CollisionStrategy::Exhaustive {
        for i in 0..n {
            for j in (i + 1)..n {
                resolve_pair(&mut cols, i, j, contacts);
            }
        }
        return;
    }

    let pairs = finder.candidates(cols.x, cols.y, cols.radius, rng);
    for &(i, j) in pairs {
        resolve_pair(&mut cols, i, j, contacts);
    }
}

#[inline]
fn resolve_pair(cols: &mut ColumnsMut<'_>, i: usize, j: usize, contacts: &mut Vec<(BubbleId, BubbleId)>) {
    if cols.dying[i] || cols.dying[j] {
        return;
    }
    let (ri, rj) = (cols.radius[i], cols.radius[j]);
    if !overlaps(cols.x[i], cols.y[i], ri, cols.x[j], cols.y[j], rj) {
        return;
    }

    let (nx, ny, dist) = contact_normal(cols.x[j] - cols.x[i], cols.y[j] - cols.y[i]);
    let half = (ri + rj - dist) * 0.5;
    cols.x[i] -= nx * half;
    cols.y[i] -= ny * half;
    cols.x[j] += nx * half;
    cols.y[j] += ny * half;

    let vi = cols.vx[i] * nx + cols.vy[i] * ny;
    let vj = cols.vx[j] * nx + cols.vy[j] * ny;
    // Relative velocity of j w.r.t. i along the normal
    if vj - vi < 0.0 {
        let exchange = vj - vi;
        cols.vx[i] += exchange * nx;
        cols.vy[i] += exchange * ny;
        cols.vx[j] -= exchange * nx;
        cols.vy[j] -= exchange * ny;
    }

    contacts.push((cols.ids[i], cols.ids[j]));
}

/// Resolve overlaps between every live bubble and the super-entity.
/// Returns the ids in contact this tick.
pub fn resolve_super(store: &mut BubbleStore, boss: &mut SuperEntity) -> SuperContacts {
    let mut touching = SuperContacts::new();
    let cols = store.columns_mut();

    for i in 0..cols.x.len() {
        if cols.dying[i] {
            continue;
        }
        let r = cols.radius[i];
        if !overlaps(boss.position.x, boss.position.y, boss.radius, cols.x[i], cols.y[i], r) {
            continue;
        }

        let (nx, ny, dist) =
            contact_normal(cols.x[i] - boss.position.x, cols.y[i] - boss.position.y);
        let half = (boss.radius + r - dist) * 0.5;
        boss.position -= Vec2::new(nx, ny) * half;
        cols.x[i] += nx * half;
        cols.y[i] += ny * half;

        let vs = boss.velocity.x * nx + boss.velocity.y * ny;
        let vb = cols.vx[i] * nx + cols.vy[i] * ny;
        if vb - vs < 0.0 {
            let exchange = vb - vs;
            boss.velocity += Vec2::new(nx, ny) * exchange;
            cols.vx[i] -= exchange * nx;
            cols.vy[i] -= exchange * ny;
        }

        touching.push(cols.ids[i]);
    }
    touching
}
