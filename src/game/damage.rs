//! Damage gating, death queue and kill attribution
//!
//! Every table here is keyed by the stable `BubbleId`; row indices move on
//! every swap-remove and are never stored.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::game::state::{Attacker, BubbleId};

/// Which damage path a hit arrives through. Each path has its own cooldown
/// clock so one source cannot starve the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitPath {
    /// Bubble-bubble contact
    Bubble,
    /// Super-entity contact
    Super,
}

/// Damage & lifecycle bookkeeping for one round
#[derive(Debug, Default)]
pub struct DamageLedger {
    /// Last accepted bubble-path hit per victim (simulation ms)
    bubble_hits: FxHashMap<BubbleId, u64>,
    /// Last accepted super-path hit per victim (simulation ms)
    super_hits: FxHashMap<BubbleId, u64>,
    /// Most recent damage source per victim
    last_damager: FxHashMap<BubbleId, Attacker>,
    /// Bubbles at zero health waiting out the death delay, in marking order
    dying: VecDeque<(BubbleId, u64)>,
    /// Ids due for removal, processed under a per-tick budget
    removals: VecDeque<BubbleId>,
}

impl DamageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a hit on `victim` through `path` if its cooldown has elapsed.
    /// Records the hit time when accepted.
    pub fn try_accept(&mut self, victim: BubbleId, path: HitPath, now_ms: u64, cooldown_ms: u64) -> bool {
        let clock = match path {
            HitPath::Bubble => &mut self.bubble_hits,
            HitPath::Super => &mut self.super_hits,
        };
        if let Some(&last) = clock.get(&victim) {
            if now_ms.saturating_sub(last) < cooldown_ms {
                return false;
            }
        }
        clock.insert(victim, now_ms);
        true
    }

    /// Record the latest damage source against a victim
    pub fn attribute(&mut self, victim: BubbleId, attacker: Attacker) {
        self.last_damager.insert(victim, attacker);
    }

    pub fn last_damager(&self, victim: BubbleId) -> Option<Attacker> {
        self.last_damager.get(&victim).copied()
    }

    /// Start the death delay for a bubble whose health reached zero
    pub fn mark_dying(&mut self, victim: BubbleId, now_ms: u64) {
        self.dying.push_back((victim, now_ms));
    }

    /// Move every bubble whose death delay has elapsed onto the removal queue
    pub fn promote_due(&mut self, now_ms: u64, delay_ms: u64) {
        while let Some(&(id, since)) = self.dying.front() {
            if now_ms.saturating_sub(since) < delay_ms {
                break;
            }
            self.dying.pop_front();
            self.removals.push_back(id);
        }
    }

    /// Take at most `budget` ids off the removal queue
    pub fn take_removals(&mut self, budget: usize) -> Vec<BubbleId> {
        let n = budget.min(self.removals.len());
        self.removals.drain(..n).collect()
    }

    /// Drop every table entry for a removed bubble, returning the last
    /// damager (if any) so the caller can credit the kill once
    pub fn forget(&mut self, victim: BubbleId) -> Option<Attacker> {
        self.bubble_hits.remove(&victim);
        self.super_hits.remove(&victim);
        self.last_damager.remove(&victim)
    }

    /// Bubbles still inside their death delay
    pub fn dying_len(&self) -> usize {
        self.dying.len()
    }

    /// Ids queued for removal but not yet processed
    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    /// True when no death is waiting on a delay or on the removal budget
    pub fn is_settled(&self) -> bool {
        self.dying.is_empty() && self.removals.is_empty()
    }

    pub fn clear(&mut self) {
        self.bubble_hits.clear();
        self.super_hits.clear();
        self.last_damager.clear();
        self.dying.clear();
        self.removals.clear();
    }
}
