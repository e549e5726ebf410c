//! Columnar bubble storage (Structure of Arrays)
//!
//! Every live bubble occupies one row across parallel columns, indexed
//! `0..len()`. Rows are compacted with swap-remove, so row order is NOT
//! spawn order; anything that must survive a removal keys off the stable
//! `BubbleId`, never the row index.

use bitvec::prelude::*;
use hashbrown::HashMap;

use crate::game::constants::damage::MAX_HEALTH;
use crate::game::state::{BubbleId, BubbleView, ImageRef};

/// Initial column capacity for a fresh store
const INITIAL_CAPACITY: usize = 64;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Bubble id {0} is already present")]
    DuplicateId(BubbleId),
}

/// One full bubble row, used for appends and point reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bubble {
    pub id: BubbleId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub target_radius: f32,
    pub health: f32,
    pub image: ImageRef,
}

/// Mutable borrow of every column at once, for the tick systems
pub struct ColumnsMut<'a> {
    pub ids: &'a [BubbleId],
    pub x: &'a mut [f32],
    pub y: &'a mut [f32],
    pub vx: &'a mut [f32],
    pub vy: &'a mut [f32],
    pub radius: &'a mut [f32],
    pub target_radius: &'a mut [f32],
    pub health: &'a mut [f32],
    pub image: &'a [ImageRef],
    pub dying: &'a BitSlice,
}

/// Bubble entity store
#[derive(Debug, Clone)]
pub struct BubbleStore {
    ids: Vec<BubbleId>,
    x: Vec<f32>,
    y: Vec<f32>,
    vx: Vec<f32>,
    vy: Vec<f32>,
    radius: Vec<f32>,
    target_radius: Vec<f32>,
    health: Vec<f32>,
    image: Vec<ImageRef>,
    /// Set once health reaches zero; the row stays until the death queue removes it
    dying: BitVec,
    dying_count: usize,
    /// Stable id -> current row
    index_of: HashMap<BubbleId, usize>,
    capacity: usize,
    /// Monotonic id source owned by this store (never reused)
    next_id: BubbleId,
}

impl Default for BubbleStore {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}

impl BubbleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            vx: Vec::with_capacity(capacity),
            vy: Vec::with_capacity(capacity),
            radius: Vec::with_capacity(capacity),
            target_radius: Vec::with_capacity(capacity),
            health: Vec::with_capacity(capacity),
            image: Vec::with_capacity(capacity),
            dying: BitVec::with_capacity(capacity),
            dying_count: 0,
            index_of: HashMap::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Number of rows (live + dying)
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rows whose health is still above zero
    #[inline]
    pub fn alive_count(&self) -> usize {
        self.ids.len() - self.dying_count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocate the next stable id
    pub fn alloc_id(&mut self) -> BubbleId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Guarantee room for at least `n` rows, doubling the capacity as needed.
    /// Existing rows and their id->row mapping are untouched.
    pub fn ensure_capacity(&mut self, n: usize) {
        if n <= self.capacity {
            return;
        }
        let mut new_capacity = self.capacity.max(1);
        while new_capacity < n {
            new_capacity *= 2;
        }
        let extra = new_capacity - self.ids.len();
        self.ids.reserve_exact(extra);
        self.x.reserve_exact(extra);
        self.y.reserve_exact(extra);
        self.vx.reserve_exact(extra);
        self.vy.reserve_exact(extra);
        self.radius.reserve_exact(extra);
        self.target_radius.reserve_exact(extra);
        self.health.reserve_exact(extra);
        self.image.reserve_exact(extra);
        self.dying.reserve(extra);
        self.index_of.reserve(extra);
        self.capacity = new_capacity;
    }

    /// Append a row at the end of the active range
    pub fn append(&mut self, bubble: Bubble) -> Result<usize, StoreError> {
        if self.index_of.contains_key(&bubble.id) {
            return Err(StoreError::DuplicateId(bubble.id));
        }
        self.ensure_capacity(self.ids.len() + 1);

        let row = self.ids.len();
        self.ids.push(bubble.id);
        self.x.push(bubble.x);
        self.y.push(bubble.y);
        self.vx.push(bubble.vx);
        self.vy.push(bubble.vy);
        self.radius.push(bubble.radius);
        self.target_radius.push(bubble.target_radius);
        let health = bubble.health.clamp(0.0, MAX_HEALTH);
        self.health.push(health);
        self.image.push(bubble.image);
        let dying = health <= 0.0;
        self.dying.push(dying);
        if dying {
            self.dying_count += 1;
        }
        self.index_of.insert(bubble.id, row);
        // Ids handed in from outside must not collide with future allocations
        if bubble.id >= self.next_id {
            self.next_id = bubble.id + 1;
        }
        Ok(row)
    }

    /// Swap-remove a bubble by id. The last row moves into the hole and its
    /// id->row entry is updated. Unknown ids are a no-op.
    pub fn remove_by_id(&mut self, id: BubbleId) -> Option<Bubble> {
        let row = self.index_of.remove(&id)?;
        let removed = self.row(row);
        let last = self.ids.len() - 1;

        self.ids.swap_remove(row);
        self.x.swap_remove(row);
        self.y.swap_remove(row);
        self.vx.swap_remove(row);
        self.vy.swap_remove(row);
        self.radius.swap_remove(row);
        self.target_radius.swap_remove(row);
        self.health.swap_remove(row);
        self.image.swap_remove(row);
        if self.dying.swap_remove(row) {
            self.dying_count -= 1;
        }

        if row != last {
            let moved = self.ids[row];
            self.index_of.insert(moved, row);
        }
        Some(removed)
    }

    /// Current row of a live id
    #[inline]
    pub fn index_of(&self, id: BubbleId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    #[inline]
    pub fn contains(&self, id: BubbleId) -> bool {
        self.index_of.contains_key(&id)
    }

    /// Read a full row by id
    pub fn get(&self, id: BubbleId) -> Option<Bubble> {
        self.index_of(id).map(|row| self.row(row))
    }

    /// Read a full row by index (panics when out of range)
    pub fn row(&self, row: usize) -> Bubble {
        Bubble {
            id: self.ids[row],
            x: self.x[row],
            y: self.y[row],
            vx: self.vx[row],
            vy: self.vy[row],
            radius: self.radius[row],
            target_radius: self.target_radius[row],
            health: self.health[row],
            image: self.image[row],
        }
    }

    #[inline]
    pub fn ids(&self) -> &[BubbleId] {
        &self.ids
    }

    #[inline]
    pub fn health(&self) -> &[f32] {
        &self.health
    }

    #[inline]
    pub fn xs(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn ys(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn images(&self) -> &[ImageRef] {
        &self.image
    }

    #[inline]
    pub fn is_dying(&self, row: usize) -> bool {
        self.dying[row]
    }

    /// Borrow every column mutably
    pub fn columns_mut(&mut self) -> ColumnsMut<'_> {
        ColumnsMut {
            ids: &self.ids,
            x: &mut self.x,
            y: &mut self.y,
            vx: &mut self.vx,
            vy: &mut self.vy,
            radius: &mut self.radius,
            target_radius: &mut self.target_radius,
            health: &mut self.health,
            image: &self.image,
            dying: &self.dying,
        }
    }

    /// Subtract health from a row, clamped to `[0, MAX_HEALTH]`. Returns the new health.
    pub fn apply_damage(&mut self, row: usize, amount: f32) -> f32 {
        let h = (self.health[row] - amount).clamp(0.0, MAX_HEALTH);
        self.health[row] = h;
        h
    }

    /// Flag a row as dying. Returns false if it already was.
    pub fn mark_dying(&mut self, row: usize) -> bool {
        if self.dying[row] {
            return false;
        }
        self.dying.set(row, true);
        self.dying_count += 1;
        true
    }

    /// Set every row's target radius
    pub fn retarget(&mut self, target: f32) {
        self.target_radius.iter_mut().for_each(|t| *t = target);
    }

    /// Set a row's velocity
    pub fn set_velocity(&mut self, row: usize, vx: f32, vy: f32) {
        self.vx[row] = vx;
        self.vy[row] = vy;
    }

    /// Drop every row. The id counter keeps running so ids are never reused.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.x.clear();
        self.y.clear();
        self.vx.clear();
        self.vy.clear();
        self.radius.clear();
        self.target_radius.clear();
        self.health.clear();
        self.image.clear();
        self.dying.clear();
        self.dying_count = 0;
        self.index_of.clear();
    }

    /// Immutable render-ready copy of the current rows
    pub fn snapshot(&self) -> Vec<BubbleView> {
        (0..self.ids.len())
            .map(|row| BubbleView {
                id: self.ids[row],
                x: self.x[row],
                y: self.y[row],
                radius: self.radius[row],
                health: self.health[row],
                image: self.image[row],
                dying: self.dying[row],
            })
            .collect()
    }

    /// Ids of rows still alive
    pub fn alive_ids(&self) -> impl Iterator<Item = BubbleId> + '_ {
        self.ids
            .iter()
            .enumerate()
            .filter(|(row, _)| !self.dying[*row])
            .map(|(_, &id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn bubble(id: BubbleId, x: f32) -> Bubble {
        Bubble {
            id,
            x,
            y: 10.0,
            vx: 1.0,
            vy: -1.0,
            radius: 5.0,
            target_radius: 10.0,
            health: 100.0,
            image: ImageRef(id),
        }
    }

    fn filled(n: u32) -> BubbleStore {
        let mut store = BubbleStore::with_capacity(2);
        for i in 0..n {
            let id = store.alloc_id();
            store.append(bubble(id, i as f32)).unwrap();
        }
        store
    }

    #[test]
    fn test_append_and_lookup() {
        let store = filled(3);
        assert_eq!(store.len(), 3);
        for id in 1..=3 {
            let row = store.index_of(id).unwrap();
            assert_eq!(store.ids()[row], id);
        }
    }

    #[test]
    fn test_append_duplicate_id_rejected() {
        let mut store = filled(2);
        let err = store.append(bubble(1, 0.0)).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ensure_capacity_doubles_and_preserves() {
        let mut store = filled(5);
        let before = store.snapshot();
        store.ensure_capacity(100);
        assert_eq!(store.capacity(), 128);
        assert_eq!(store.snapshot(), before);
        for view in &before {
            assert_eq!(store.get(view.id).unwrap().x, view.x);
        }
    }

    #[test]
    fn test_growth_through_appends() {
        let store = filled(9);
        assert!(store.capacity() >= 9);
        assert!(store.capacity().is_power_of_two());
    }

    #[test]
    fn test_position_columns_follow_rows() {
        let mut store = filled(4);
        store.remove_by_id(1);
        assert_eq!(store.xs(), &[3.0, 1.0, 2.0]);
        assert_eq!(store.ys(), &[10.0, 10.0, 10.0]);
        assert_eq!(store.xs().len(), store.ids().len());
    }

    #[test]
    fn test_swap_remove_moves_last_row() {
        let mut store = filled(5);
        let removed = store.remove_by_id(2).unwrap();
        assert_eq!(removed.id, 2);
        assert_eq!(store.len(), 4);
        // Id 5 was last and now occupies the hole
        assert_eq!(store.index_of(5), Some(1));
        assert_eq!(store.get(5).unwrap().x, 4.0);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_remove_preserves_other_ids() {
        let mut store = filled(6);
        let before: Vec<BubbleId> = store.ids().to_vec();
        let last_id = *before.last().unwrap();
        store.remove_by_id(3);

        for (row, &id) in before.iter().enumerate() {
            if id == 3 || id == last_id {
                continue;
            }
            assert_eq!(store.ids()[row], id);
        }

        let snap = store.snapshot();
        let unique: HashSet<BubbleId> = snap.iter().map(|b| b.id).collect();
        assert_eq!(snap.len(), 5);
        assert_eq!(unique.len(), 5);
        assert!(!unique.contains(&3));
    }

    #[test]
    fn test_remove_last_row() {
        let mut store = filled(3);
        store.remove_by_id(3).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.index_of(1), Some(0));
        assert_eq!(store.index_of(2), Some(1));
    }

    #[test]
    fn test_remove_stale_id_is_noop() {
        let mut store = filled(3);
        assert!(store.remove_by_id(2).is_some());
        assert!(store.remove_by_id(2).is_none());
        assert!(store.remove_by_id(999).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dying_tracking_survives_swap() {
        let mut store = filled(4);
        let row = store.index_of(4).unwrap();
        store.apply_damage(row, 500.0);
        assert!(store.mark_dying(row));
        assert!(!store.mark_dying(row));
        assert_eq!(store.alive_count(), 3);

        // Removing id 1 moves id 4 (dying) into row 0
        store.remove_by_id(1);
        let moved = store.index_of(4).unwrap();
        assert_eq!(moved, 0);
        assert!(store.is_dying(moved));
        assert_eq!(store.alive_count(), 2);

        store.remove_by_id(4);
        assert_eq!(store.alive_count(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_apply_damage_clamps() {
        let mut store = filled(1);
        assert_eq!(store.apply_damage(0, 30.0), 70.0);
        assert_eq!(store.apply_damage(0, -100.0), 100.0);
        assert_eq!(store.apply_damage(0, 1000.0), 0.0);
    }

    #[test]
    fn test_ids_never_reused_after_clear() {
        let mut store = filled(3);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.alloc_id(), 4);
    }

    #[test]
    fn test_external_id_bumps_generator() {
        let mut store = BubbleStore::new();
        store.append(bubble(40, 0.0)).unwrap();
        assert_eq!(store.alloc_id(), 41);
    }

    #[test]
    fn test_alive_ids_skip_dying() {
        let mut store = filled(3);
        let row = store.index_of(2).unwrap();
        store.mark_dying(row);
        let alive: Vec<BubbleId> = store.alive_ids().collect();
        assert_eq!(alive, vec![1, 3]);
    }
}
