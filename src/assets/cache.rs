//! Byte-budgeted approximate LRU cache
//!
//! Every entry carries a byte cost and a last-use stamp. When an insert
//! pushes the total over budget, the oldest entries are evicted in one batch
//! down to 90% of the budget. The entry just inserted always survives, even
//! if it alone exceeds the budget.

use std::hash::Hash;

use hashbrown::{Equivalent, HashMap};
use rustc_hash::FxBuildHasher;

struct Slot<V> {
    value: V,
    bytes: usize,
    last_used: u64,
}

pub struct ByteLru<K, V> {
    entries: HashMap<K, Slot<V>, FxBuildHasher>,
    budget: usize,
    bytes: usize,
    clock: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone, V: Clone> ByteLru<K, V> {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::with_hasher(FxBuildHasher),
            budget,
            bytes: 0,
            clock: 0,
            evictions: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up and mark as recently used
    pub fn get<Q: Hash + Equivalent<K> + ?Sized>(&mut self, key: &Q) -> Option<V> {
        let now = self.tick();
        let slot = self.entries.get_mut(key)?;
        slot.last_used = now;
        Some(slot.value.clone())
    }

    pub fn contains<Q: Hash + Equivalent<K> + ?Sized>(&self, key: &Q) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; returns how many entries were evicted
    pub fn insert(&mut self, key: K, value: V, bytes: usize) -> usize {
        let now = self.tick();
        if let Some(old) = self.entries.insert(key.clone(), Slot { value, bytes, last_used: now }) {
            self.bytes -= old.bytes;
        }
        self.bytes += bytes;

        if self.bytes <= self.budget {
            return 0;
        }
        self.evict_to(self.budget / 10 * 9, &key)
    }

    fn evict_to(&mut self, target: usize, keep: &K) -> usize {
        let mut order: Vec<(u64, K)> = self
            .entries
            .iter()
            .filter(|(k, _)| *k != keep)
            .map(|(k, slot)| (slot.last_used, k.clone()))
            .collect();
        order.sort_unstable_by_key(|(used, _)| *used);

        let mut evicted = 0;
        for (_, key) in order {
            if self.bytes <= target {
                break;
            }
            if let Some(slot) = self.entries.remove(&key) {
                self.bytes -= slot.bytes;
                evicted += 1;
            }
        }
        self.evictions += evicted as u64;
        evicted
    }

    pub fn remove<Q: Hash + Equivalent<K> + ?Sized>(&mut self, key: &Q) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.bytes -= slot.bytes;
        Some(slot.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}
