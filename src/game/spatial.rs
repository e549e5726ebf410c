//! Candidate pair detection for bubble-bubble collisions
//!
//! Three strategies share one output shape (row index pairs `(i, j)` with
//! `i < j`); the collision system re-tests overlap on current positions, so a
//! strategy may over-report but the exact test is always squared-distance.
//!
//! - Exhaustive: every unordered pair. Deterministic, O(n²).
//! - Sampled: each row tests a fixed number of uniformly random partners per
//!   tick. Bounded cost; pairs are eventually tested with high probability.
//! - Grid: uniform spatial hash, each row only meets its own and adjacent cells.

use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use rand::Rng;
use rustc_hash::FxBuildHasher;

use crate::game::constants::collision::{
    EXHAUSTIVE_LIMIT, GRID_CELL_RADIUS_FACTOR, SAMPLES_PER_BUBBLE,
};

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for row vectors within cells
const CELL_INITIAL_CAPACITY: usize = 8;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Pair detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionStrategy {
    /// Exhaustive up to `EXHAUSTIVE_LIMIT` rows, sampled above
    #[default]
    Auto,
    Exhaustive,
    Sampled,
    Grid,
}

impl CollisionStrategy {
    /// Concrete strategy used for a population of `n` rows
    pub fn resolve(self, n: usize) -> CollisionStrategy {
        match self {
            CollisionStrategy::Auto if n <= EXHAUSTIVE_LIMIT => CollisionStrategy::Exhaustive,
            CollisionStrategy::Auto => CollisionStrategy::Sampled,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionStrategy::Auto => "auto",
            CollisionStrategy::Exhaustive => "exhaustive",
            CollisionStrategy::Sampled => "sampled",
            CollisionStrategy::Grid => "grid",
        }
    }
}

impl fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CollisionStrategy::Auto),
            "exhaustive" | "all" => Ok(CollisionStrategy::Exhaustive),
            "sampled" | "sample" => Ok(CollisionStrategy::Sampled),
            "grid" | "hash" => Ok(CollisionStrategy::Grid),
            other => Err(format!("unknown collision strategy '{}'", other)),
        }
    }
}

/// Uniform spatial hash over store rows
pub struct SpatialGrid {
    inv_cell_size: f32,
    cells: HashMap<CellKey, Vec<usize>, FxBuildHasher>,
}

impl SpatialGrid {
    /// Cell size should be at least twice the largest radius so that any
    /// overlapping pair lands in the same or adjacent cells
    pub fn new(cell_size: f32) -> Self {
        Self {
            inv_cell_size: 1.0 / cell_size.max(1.0),
            cells: HashMap::with_capacity_and_hasher(GRID_INITIAL_CAPACITY, FxBuildHasher),
        }
    }

    /// Change the cell size; clears the grid
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.inv_cell_size = 1.0 / cell_size.max(1.0);
        self.cells.clear();
    }

    /// Empty every cell, keeping allocations
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    #[inline]
    fn position_to_cell(&self, x: f32, y: f32) -> CellKey {
        (
            (x * self.inv_cell_size).floor() as i32,
            (y * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    pub fn insert(&mut self, row: usize, x: f32, y: f32) {
        let key = self.position_to_cell(x, y);
        self.cells
            .entry(key)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push(row);
    }

    /// Visit each potential pair once: within a cell, then against the
    /// right, bottom, bottom-right and bottom-left neighbours
    pub fn for_each_potential_collision<F>(&self, mut callback: F)
    where
        F: FnMut(usize, usize),
    {
        for (&(cx, cy), rows) in &self.cells {
            for i in 0..rows.len() {
                for j in (i + 1)..rows.len() {
                    callback(rows[i], rows[j]);
                }
            }
            for offset in [(1, 0), (0, 1), (1, 1), (-1, 1)] {
                if let Some(other) = self.cells.get(&(cx + offset.0, cy + offset.1)) {
                    for &a in rows {
                        for &b in other {
                            callback(a, b);
                        }
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> SpatialGridStats {
        let non_empty_cells = self.cells.values().filter(|c| !c.is_empty()).count();
        let total_entries: usize = self.cells.values().map(|c| c.len()).sum();
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);

        SpatialGridStats {
            non_empty_cells,
            total_entries,
            max_per_cell,
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_entries: usize,
    pub max_per_cell: usize,
}

/// Reusable pair collector
///
/// Keeps the pair buffer and grid between ticks to avoid per-tick allocation.
#[derive(Default)]
pub struct PairFinder {
    strategy: CollisionStrategy,
    pairs: Vec<(usize, usize)>,
    grid: SpatialGrid,
}

impl PairFinder {
    pub fn new(strategy: CollisionStrategy) -> Self {
        Self {
            strategy,
            pairs: Vec::with_capacity(1024),
            grid: SpatialGrid::default(),
        }
    }

    pub fn strategy(&self) -> CollisionStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: CollisionStrategy) {
        self.strategy = strategy;
    }

    /// Collect candidate pairs for the current rows. `x`, `y` and `radius`
    /// must have equal length.
    pub fn candidates<R: Rng + ?Sized>(
        &mut self,
        x: &[f32],
        y: &[f32],
        radius: &[f32],
        rng: &mut R,
    ) -> &[(usize, usize)] {
        let n = x.len();
        self.pairs.clear();
        if n < 2 {
            return &self.pairs;
        }

        match self.strategy.resolve(n) {
            CollisionStrategy::Exhaustive | CollisionStrategy::Auto => {
                for i in 0..n {
                    for j in (i + 1)..n {
                        self.pairs.push((i, j));
                    }
                }
            }
            CollisionStrategy::Sampled => {
                for i in 0..n {
                    for _ in 0..SAMPLES_PER_BUBBLE {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            self.pairs.push((i.min(j), i.max(j)));
                        }
                    }
                }
            }
            CollisionStrategy::Grid => {
                let max_radius = radius.iter().copied().fold(1.0f32, f32::max);
                self.grid.set_cell_size(max_radius * GRID_CELL_RADIUS_FACTOR);
                for row in 0..n {
                    self.grid.insert(row, x[row], y[row]);
                }
                let pairs = &mut self.pairs;
                self.grid.for_each_potential_collision(|a, b| {
                    pairs.push((a.min(b), a.max(b)));
                });
            }
        }
        &self.pairs
    }
}

/// Squared-distance overlap test (no square root)
#[inline]
pub fn overlaps(ax: f32, ay: f32, ar: f32, bx: f32, by: f32, br: f32) -> bool {
    let dx = bx - ax;
    let dy = by - ay;
    let reach = ar + br;
    dx * dx + dy * dy < reach * reach
}
