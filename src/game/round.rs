//! Round state machine and tick orchestration
//!
//! ```text
//! Unselected -> Loaded(mode) -> Running(mode) -> Ended(mode, outcome)
//!                  ^                                   |
//!                  +------------- reset ---------------+
//!      back_out returns to Unselected from anywhere
//! ```
//!
//! A round owns the bubble store, the optional super-entity and its
//! projectiles, the damage ledger and the stats recorder. Nothing else
//! mutates them; readers take a `Snapshot` between ticks.
//!
//! Roster loading is asynchronous and lives outside: `select_mode` and
//! `reset` hand back a `RosterRequest` whose `epoch` must be echoed to
//! `apply_roster`. Any result carrying an older epoch is discarded, so a
//! late fetch can never repopulate a round that has moved on.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::game::constants::{
    boss as boss_consts, damage, death_delay_ms, damage_for_population, movement as movement_consts,
    radius, radius_for_count, removal_budget, spawn, spikes as spike_consts,
};
use crate::game::damage::{DamageLedger, HitPath};
use crate::game::match_result::{self, check_round_end, LeaderboardEntry, Outcome};
use crate::game::spatial::PairFinder;
use crate::game::state::{
    Arena, Attacker, BubbleId, BubbleView, ImageRef, ImageTable, ModeKind, Projectile, ProjectileView, Spike,
    SuperEntity, SuperView,
};
use crate::game::store::{Bubble, BubbleStore};
use crate::game::systems::boss::FireControl;
use crate::game::systems::{boss, collision, movement, projectile, spikes};
use crate::roster::{Roster, RosterError};
use crate::stats::{StatsBatch, StatsRecorder};
use crate::util::vec2::Vec2;

/// Where the round is in its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Unselected,
    Loaded(ModeKind),
    Running(ModeKind),
    Ended(ModeKind, Outcome),
}

impl Phase {
    pub fn mode(&self) -> Option<ModeKind> {
        match self {
            Phase::Unselected => None,
            Phase::Loaded(m) | Phase::Running(m) | Phase::Ended(m, _) => Some(*m),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Unselected => "unselected",
            Phase::Loaded(_) => "loaded",
            Phase::Running(_) => "running",
            Phase::Ended(..) => "ended",
        }
    }
}

/// Mode-specific state; boss-only fields are unreachable in Normal mode
#[derive(Debug)]
enum Mode {
    Normal,
    Boss {
        /// `None` once the super-entity has died
        super_entity: Option<SuperEntity>,
        projectiles: Vec<Projectile>,
        fire: FireControl,
    },
}

impl Mode {
    fn super_entity(&self) -> Option<&SuperEntity> {
        match self {
            Mode::Boss { super_entity, .. } => super_entity.as_ref(),
            Mode::Normal => None,
        }
    }
}

/// Ask the roster collaborator for the images of `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterRequest {
    pub epoch: u64,
    pub mode: ModeKind,
}

/// Render-ready copy of a round between ticks
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time_ms: u64,
    pub phase: &'static str,
    pub mode: Option<ModeKind>,
    pub paused: bool,
    pub arena: Arena,
    pub bubbles: Vec<BubbleView>,
    pub super_entity: Option<SuperView>,
    pub projectiles: Vec<ProjectileView>,
    pub spikes: Vec<Spike>,
    pub outcome: Option<Outcome>,
}

/// One simulation round
pub struct Round {
    config: SimConfig,
    arena: Arena,
    phase: Phase,
    mode: Mode,
    paused: bool,

    store: BubbleStore,
    images: ImageTable,
    ledger: DamageLedger,
    finder: PairFinder,
    spikes: Vec<Spike>,
    rng: StdRng,

    tick: u64,
    now_ms: u64,
    epoch: u64,
    round_id: Uuid,
    stats: StatsRecorder,

    contacts: Vec<(BubbleId, BubbleId)>,
    snapshot: Option<Arc<Snapshot>>,
}

impl Round {
    pub fn new(config: &SimConfig, seed: u64) -> Self {
        let arena = Arena::new(config.arena.width, config.arena.height);
        let mut rng = StdRng::seed_from_u64(seed);
        let spikes = place_spikes(config, &arena, &mut rng);

        Self {
            config: config.clone(),
            arena,
            phase: Phase::Unselected,
            mode: Mode::Normal,
            paused: false,
            store: BubbleStore::new(),
            images: ImageTable::new(),
            ledger: DamageLedger::new(),
            finder: PairFinder::new(config.round.collision),
            spikes,
            rng,
            tick: 0,
            now_ms: 0,
            epoch: 0,
            round_id: Uuid::nil(),
            stats: StatsRecorder::new(),
            contacts: Vec::with_capacity(256),
            snapshot: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_)) && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn arena(&self) -> Arena {
        self.arena
    }

    pub fn store(&self) -> &BubbleStore {
        &self.store
    }

    pub fn images(&self) -> &ImageTable {
        &self.images
    }

    pub fn spikes(&self) -> &[Spike] {
        &self.spikes
    }

    pub fn super_entity(&self) -> Option<&SuperEntity> {
        self.mode.super_entity()
    }

    pub fn projectile_count(&self) -> usize {
        match &self.mode {
            Mode::Boss { projectiles, .. } => projectiles.len(),
            Mode::Normal => 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn time_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    pub fn tick_ms(&self) -> u64 {
        self.config.round.tick_ms
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.phase {
            Phase::Ended(_, outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Top `n` live bubbles by health
    pub fn leaderboard(&self, n: usize) -> Vec<LeaderboardEntry> {
        match_result::leaderboard(&self.store, &self.images, n)
    }

    /// Stats recorded since the last call
    pub fn take_stats(&mut self) -> Vec<StatsBatch> {
        self.stats.drain()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Select a mode. Clears every entity and starts a fresh load; the
    /// returned request must be fulfilled through `apply_roster`.
    /// Ignored while a round is running.
    pub fn select_mode(&mut self, mode: ModeKind) -> Option<RosterRequest> {
        if matches!(self.phase, Phase::Running(_)) {
            warn!(mode = mode.as_str(), "Mode selection ignored while a round is running");
            return None;
        }
        Some(self.load(mode))
    }

    /// Apply a roster fetch result. Stale epochs and results arriving
    /// outside `Loaded` are dropped. In Normal mode a repeat result merges
    /// newly listed images; in Boss mode only the first result is used.
    /// Returns the number of bubbles spawned.
    pub fn apply_roster(&mut self, epoch: u64, result: Result<Roster, RosterError>) -> usize {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Dropping stale roster result");
            return 0;
        }
        let Phase::Loaded(mode) = self.phase else {
            return 0;
        };
        let roster = match result {
            Ok(roster) => roster,
            Err(e) => {
                warn!(mode = mode.as_str(), "Roster fetch failed, round stays empty: {}", e);
                return 0;
            }
        };

        let spawned = match mode {
            ModeKind::Normal => {
                let mut fresh: Vec<String> = Vec::new();
                for url in roster.images {
                    if !self.images.contains(&url) && !fresh.contains(&url) {
                        fresh.push(url);
                    }
                }
                self.spawn_bubbles(&fresh, true)
            }
            ModeKind::Boss => {
                if !self.store.is_empty() || self.mode.super_entity().is_some() {
                    return 0;
                }
                let spawned = self.spawn_bubbles(&roster.images, false);
                let image = roster.super_image.as_deref().map(|url| self.images.intern(url));
                let center = Vec2::new(self.arena.width * 0.5, self.arena.height * 0.5);
                let super_entity = SuperEntity::new(center, self.config.boss.super_health, image);
                if let Mode::Boss { super_entity: slot, .. } = &mut self.mode {
                    *slot = Some(super_entity);
                }
                spawned
            }
        };

        if spawned > 0 {
            info!(mode = mode.as_str(), spawned, total = self.store.len(), "Roster applied");
        }
        self.mark_dirty();
        spawned
    }

    /// Start the loaded round. Stationary bubbles (and the super-entity)
    /// get their opening velocity here. A round with nothing to fight
    /// (no bubbles in Normal, no super-entity in Boss) stays `Loaded`.
    pub fn start(&mut self) -> bool {
        let Phase::Loaded(mode) = self.phase else {
            return false;
        };
        let populated = match mode {
            ModeKind::Normal => !self.store.is_empty(),
            ModeKind::Boss => self.mode.super_entity().is_some(),
        };
        if !populated {
            debug!(mode = mode.as_str(), "Start refused: no entities loaded");
            return false;
        }

        for row in 0..self.store.len() {
            let b = self.store.row(row);
            if b.vx == 0.0 && b.vy == 0.0 {
                let v = random_heading(&mut self.rng) * movement_consts::INITIAL_SPEED;
                self.store.set_velocity(row, v.x, v.y);
            }
        }

        let now = self.now_ms;
        if let Mode::Boss { super_entity, fire, .. } = &mut self.mode {
            if let Some(s) = super_entity.as_mut() {
                boss::launch(s, &mut self.rng);
            }
            fire.arm(now);
        }

        self.phase = Phase::Running(mode);
        self.paused = false;
        info!(
            round = %self.round_id,
            mode = mode.as_str(),
            bubbles = self.store.len(),
            "Round started"
        );
        self.mark_dirty();
        true
    }

    pub fn pause(&mut self) -> bool {
        if !matches!(self.phase, Phase::Running(_)) || self.paused {
            return false;
        }
        self.paused = true;
        self.mark_dirty();
        true
    }

    pub fn resume(&mut self) -> bool {
        if !matches!(self.phase, Phase::Running(_)) || !self.paused {
            return false;
        }
        self.paused = false;
        self.mark_dirty();
        true
    }

    /// Reload fresh entities in the same mode
    pub fn reset(&mut self) -> Option<RosterRequest> {
        let mode = self.phase.mode()?;
        Some(self.load(mode))
    }

    /// Return to mode selection, clearing everything
    pub fn back_out(&mut self) {
        self.clear_entities();
        self.epoch += 1;
        self.phase = Phase::Unselected;
        self.mode = Mode::Normal;
        self.stats.begin(Uuid::nil(), None);
        self.mark_dirty();
    }

    /// Change the arena bounds. Spikes are re-placed; bubbles are pulled
    /// back inside immediately.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.arena = Arena::new(width, height);
        self.config.arena.width = self.arena.width;
        self.config.arena.height = self.arena.height;
        self.spikes = place_spikes(&self.config, &self.arena, &mut self.rng);
        movement::contain(&mut self.store, self.arena);
        if let Mode::Boss { super_entity: Some(s), .. } = &mut self.mode {
            let r = s.radius.min(self.arena.max_radius());
            movement::contain_body(&mut s.position, &mut s.velocity, r, self.arena);
        }
        self.mark_dirty();
    }

    /// Trigger a super-entity volley now. Rate-limited by the fire interval;
    /// returns the number of projectiles launched.
    pub fn fire_super(&mut self) -> usize {
        if !self.is_running() {
            return 0;
        }
        let now = self.now_ms;
        let Mode::Boss { super_entity: Some(s), projectiles, fire } = &mut self.mode else {
            return 0;
        };
        if !fire.manual_ready(now) {
            return 0;
        }
        let volley = fire.volley(s, now, &mut self.rng);
        let n = volley.len();
        projectiles.extend(volley);
        self.mark_dirty();
        n
    }

    fn load(&mut self, mode: ModeKind) -> RosterRequest {
        self.clear_entities();
        self.epoch += 1;
        self.round_id = Uuid::new_v4();
        self.stats.begin(self.round_id, Some(mode));
        self.mode = match mode {
            ModeKind::Normal => Mode::Normal,
            ModeKind::Boss => Mode::Boss {
                super_entity: None,
                projectiles: Vec::new(),
                fire: FireControl::new(
                    self.config.boss.fire_mode,
                    self.config.boss.fire_interval_ms,
                    self.config.boss.active_damage_types(),
                ),
            },
        };
        self.phase = Phase::Loaded(mode);
        self.paused = false;
        self.mark_dirty();
        RosterRequest {
            epoch: self.epoch,
            mode,
        }
    }

    fn clear_entities(&mut self) {
        self.store.clear();
        self.images.clear();
        self.ledger.clear();
        self.contacts.clear();
        if let Mode::Boss { super_entity, projectiles, .. } = &mut self.mode {
            *super_entity = None;
            projectiles.clear();
        }
    }

    /// Spawn one bubble per image at a random non-overlapping position
    fn spawn_bubbles(&mut self, urls: &[String], moving: bool) -> usize {
        if urls.is_empty() {
            return 0;
        }
        let total = self.store.len() + urls.len();
        let target = radius_for_count(total).min(self.arena.max_radius());
        self.store.ensure_capacity(total);

        for url in urls {
            let image = self.images.intern(url);
            let (x, y) = self.find_spawn_point(target);
            let v = if moving {
                random_heading(&mut self.rng) * movement_consts::INITIAL_SPEED
            } else {
                Vec2::ZERO
            };
            let id = self.store.alloc_id();
            let bubble = Bubble {
                id,
                x,
                y,
                vx: v.x,
                vy: v.y,
                radius: radius::SPAWN.min(target),
                target_radius: target,
                health: damage::MAX_HEALTH,
                image,
            };
            if let Err(e) = self.store.append(bubble) {
                warn!("Spawn skipped: {}", e);
            }
        }
        self.store.retarget(radius_for_count(self.store.alive_count()).min(self.arena.max_radius()));
        urls.len()
    }

    fn find_spawn_point(&mut self, target: f32) -> (f32, f32) {
        let min_dist_sq = (2.0 * target) * (2.0 * target);
        let (lo_x, hi_x) = spawn_range(target, self.arena.width);
        let (lo_y, hi_y) = spawn_range(target, self.arena.height);

        let mut candidate = (lo_x, lo_y);
        for _ in 0..spawn::MAX_ATTEMPTS {
            candidate = (sample(&mut self.rng, lo_x, hi_x), sample(&mut self.rng, lo_y, hi_y));
            let clear = self.store.xs().iter().zip(self.store.ys()).all(|(&x, &y)| {
                let dx = x - candidate.0;
                let dy = y - candidate.1;
                dx * dx + dy * dy >= min_dist_sq
            });
            if clear {
                break;
            }
        }
        candidate
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one logic tick. Returns false (and does nothing) unless the round
    /// is running and not paused.
    ///
    /// Phase order: movement/boundary, collisions, spikes, projectiles,
    /// death queue, win check, snapshot invalidation.
    pub fn tick(&mut self) -> bool {
        let Phase::Running(kind) = self.phase else {
            return false;
        };
        if self.paused {
            return false;
        }

        self.tick += 1;
        self.now_ms += self.config.round.tick_ms;
        let now = self.now_ms;
        let speed = self.config.round.speed_multiplier;
        let alive_before = self.store.alive_count();

        // Movement and walls
        movement::update(&mut self.store, self.arena, speed);
        if let Mode::Boss { super_entity: Some(s), .. } = &mut self.mode {
            boss::update(s, self.arena, speed);
        }

        // Bubble-bubble
        collision::resolve_bubbles(&mut self.store, &mut self.finder, &mut self.rng, &mut self.contacts);
        if kind == ModeKind::Normal {
            self.apply_bubble_damage(now, alive_before);
        }

        // Bubble-super
        self.apply_super_contacts(now);

        movement::contain(&mut self.store, self.arena);

        // Spikes
        if self.config.round.spikes_enabled {
            for id in spikes::apply(&mut self.store, &self.spikes, &self.arena) {
                if let Some(row) = self.store.index_of(id) {
                    self.store.apply_damage(row, spike_consts::DAMAGE);
                }
            }
            movement::contain(&mut self.store, self.arena);
        }

        // Projectiles
        self.update_projectiles(now, speed);

        // Deaths
        self.reap(now);
        self.process_death_queue(now);

        if self.store.alive_count() != alive_before {
            let target = radius_for_count(self.store.alive_count()).min(self.arena.max_radius());
            self.store.retarget(target);
        }

        // Win check
        if let Some(outcome) = check_round_end(kind, &self.store, self.mode.super_entity()) {
            self.end_round(kind, outcome);
        }

        self.mark_dirty();
        true
    }

    fn identity_of(&self, attacker: Attacker) -> String {
        match attacker {
            Attacker::Bubble(image) => self.images.identity(image).unwrap_or_default().to_string(),
            Attacker::Super => self.super_identity(),
        }
    }

    fn super_identity(&self) -> String {
        match_result::super_identity(&self.images, self.mode.super_entity().and_then(|s| s.image))
    }

    fn image_of(&self, id: BubbleId) -> Option<ImageRef> {
        self.store.get(id).map(|b| b.image)
    }

    fn apply_bubble_damage(&mut self, now: u64, population: usize) {
        let amount = damage_for_population(population);
        let contacts = std::mem::take(&mut self.contacts);

        for &(a, b) in &contacts {
            for (victim, attacker) in [(a, b), (b, a)] {
                if !self.ledger.try_accept(victim, HitPath::Bubble, now, damage::BUBBLE_COOLDOWN_MS) {
                    continue;
                }
                let (Some(row), Some(attacker_image)) = (self.store.index_of(victim), self.image_of(attacker)) else {
                    continue;
                };
                self.store.apply_damage(row, amount);
                self.ledger.attribute(victim, Attacker::Bubble(attacker_image));
                let who = self.identity_of(Attacker::Bubble(attacker_image));
                self.stats.record_hit(&who);
            }
        }
        self.contacts = contacts;
    }

    fn apply_super_contacts(&mut self, now: u64) {
        let touching = match &mut self.mode {
            Mode::Boss { super_entity: Some(s), .. } => collision::resolve_super(&mut self.store, s),
            _ => return,
        };
        if touching.is_empty() {
            return;
        }
        let super_name = self.super_identity();

        for id in touching {
            if !self.ledger.try_accept(id, HitPath::Super, now, damage::SUPER_COOLDOWN_MS) {
                continue;
            }
            let Some(row) = self.store.index_of(id) else {
                continue;
            };
            self.store.apply_damage(row, boss_consts::CONTACT_DAMAGE);
            self.ledger.attribute(id, Attacker::Super);
            self.stats.record_hit(&super_name);

            let image = self.store.row(row).image;
            if let Mode::Boss { super_entity: Some(s), .. } = &mut self.mode {
                s.absorb_contact();
            }
            let who = self.identity_of(Attacker::Bubble(image));
            self.stats.record_hit(&who);
        }

        if let Mode::Boss { super_entity: Some(s), .. } = &mut self.mode {
            s.settle_health();
        }
    }

    fn update_projectiles(&mut self, now: u64, speed: f32) {
        let Mode::Boss { super_entity, projectiles, fire } = &mut self.mode else {
            return;
        };
        if let Some(s) = super_entity.as_ref() {
            if fire.auto_due(now) {
                projectiles.extend(fire.volley(s, now, &mut self.rng));
            }
        }
        if projectiles.is_empty() {
            return;
        }

        let hits = projectile::update(projectiles, &self.store, self.arena, speed);
        if hits.is_empty() {
            return;
        }
        let super_name = self.super_identity();
        for hit in hits {
            if let Some(row) = self.store.index_of(hit.victim) {
                self.store.apply_damage(row, hit.damage_type.damage());
                self.ledger.attribute(hit.victim, Attacker::Super);
                self.stats.record_hit(&super_name);
            }
        }
    }

    /// Flag every bubble that reached zero health this tick
    fn reap(&mut self, now: u64) {
        for row in 0..self.store.len() {
            if self.store.health()[row] <= 0.0 && self.store.mark_dying(row) {
                let id = self.store.ids()[row];
                self.ledger.mark_dying(id, now);
            }
        }
    }

    fn process_death_queue(&mut self, now: u64) {
        let alive = self.store.alive_count();
        self.ledger.promote_due(now, death_delay_ms(alive));

        for id in self.ledger.take_removals(removal_budget(alive)) {
            let removed = self.store.remove_by_id(id);
            let killer = self.ledger.forget(id);
            if removed.is_none() {
                continue;
            }
            if let Some(attacker) = killer {
                let who = self.identity_of(attacker);
                self.stats.record_kill(&who);
            }
        }
    }

    fn end_round(&mut self, kind: ModeKind, outcome: Outcome) {
        let super_image = self.mode.super_entity().and_then(|s| s.image);
        let winners = outcome.winner_identities(&self.images, super_image);
        info!(
            round = %self.round_id,
            mode = kind.as_str(),
            tick = self.tick,
            winners = ?winners,
            "Round ended"
        );
        self.stats.record_winners(winners);

        if let Mode::Boss { super_entity, projectiles, .. } = &mut self.mode {
            projectiles.clear();
            if super_entity.as_ref().map_or(false, |s| !s.is_alive()) {
                *super_entity = None;
            }
        }
        self.ledger.clear();
        self.phase = Phase::Ended(kind, outcome);
        self.paused = false;
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    fn mark_dirty(&mut self) {
        self.snapshot = None;
    }

    /// Render-ready view of the round. Built at most once between changes.
    pub fn snapshot(&mut self) -> Arc<Snapshot> {
        if let Some(snap) = &self.snapshot {
            return snap.clone();
        }
        let (super_entity, projectiles) = match &self.mode {
            Mode::Boss { super_entity, projectiles, .. } => (
                super_entity.as_ref().map(SuperView::from),
                projectiles.iter().map(ProjectileView::from).collect(),
            ),
            Mode::Normal => (None, Vec::new()),
        };
        let snap = Arc::new(Snapshot {
            tick: self.tick,
            time_ms: self.now_ms,
            phase: self.phase.name(),
            mode: self.phase.mode(),
            paused: self.paused,
            arena: self.arena,
            bubbles: self.store.snapshot(),
            super_entity,
            projectiles,
            spikes: if self.config.round.spikes_enabled { self.spikes.clone() } else { Vec::new() },
            outcome: self.outcome().cloned(),
        });
        self.snapshot = Some(snap.clone());
        snap
    }
}

fn place_spikes(config: &SimConfig, arena: &Arena, rng: &mut StdRng) -> Vec<Spike> {
    if !config.round.spikes_enabled {
        return Vec::new();
    }
    let placed = spikes::place(arena, config.round.spike_count, config.round.spike_size, rng);
    if placed.len() < config.round.spike_count {
        debug!(requested = config.round.spike_count, placed = placed.len(), "Fewer spikes than requested");
    }
    placed
}

fn random_heading(rng: &mut StdRng) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
}

/// Center range that keeps a circle of radius `r` inside `extent`
fn spawn_range(r: f32, extent: f32) -> (f32, f32) {
    if 2.0 * r >= extent {
        (extent * 0.5, extent * 0.5)
    } else {
        (r, extent - r)
    }
}

fn sample(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::DamageType;
    use crate::game::systems::boss::FireMode;

    fn roster(n: usize, prefix: &str) -> Roster {
        Roster {
            images: (0..n).map(|i| format!("/{}/p{}.png", prefix, i)).collect(),
            super_image: None,
        }
    }

    fn loaded(mode: ModeKind, n: usize, config: SimConfig) -> Round {
        let mut round = Round::new(&config, 7);
        let req = round.select_mode(mode).unwrap();
        let prefix = if mode == ModeKind::Boss { "bossimgs" } else { "images" };
        assert_eq!(round.apply_roster(req.epoch, Ok(roster(n, prefix))), n);
        round
    }

    fn place(round: &mut Round, id: BubbleId, x: f32, y: f32, vx: f32, vy: f32) {
        let row = round.store.index_of(id).unwrap();
        let cols = round.store.columns_mut();
        cols.x[row] = x;
        cols.y[row] = y;
        cols.vx[row] = vx;
        cols.vy[row] = vy;
        cols.radius[row] = 20.0;
        cols.target_radius[row] = 20.0;
    }

    fn health(round: &Round, id: BubbleId) -> f32 {
        round.store.get(id).unwrap().health
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut round = Round::new(&SimConfig::default(), 1);
        assert_eq!(round.phase(), &Phase::Unselected);
        assert!(!round.start());
        assert!(!round.tick());

        let req = round.select_mode(ModeKind::Normal).unwrap();
        assert_eq!(round.phase(), &Phase::Loaded(ModeKind::Normal));
        round.apply_roster(req.epoch, Ok(roster(5, "images")));
        assert_eq!(round.store().len(), 5);

        assert!(round.start());
        assert!(round.is_running());
        assert!(round.select_mode(ModeKind::Boss).is_none());
        assert!(round.tick());

        round.back_out();
        assert_eq!(round.phase(), &Phase::Unselected);
        assert!(round.store().is_empty());
    }

    #[test]
    fn test_roster_failure_leaves_empty_loaded() {
        let mut round = Round::new(&SimConfig::default(), 1);
        let req = round.select_mode(ModeKind::Normal).unwrap();
        let n = round.apply_roster(req.epoch, Err(RosterError::Request("down".into())));
        assert_eq!(n, 0);
        assert_eq!(round.phase(), &Phase::Loaded(ModeKind::Normal));
        assert!(round.store().is_empty());

        // Retry by reselecting
        let req = round.select_mode(ModeKind::Normal).unwrap();
        assert_eq!(round.apply_roster(req.epoch, Ok(roster(3, "images"))), 3);
    }

    #[test]
    fn test_stale_roster_ignored() {
        let mut round = Round::new(&SimConfig::default(), 1);
        let old = round.select_mode(ModeKind::Normal).unwrap();
        let new = round.select_mode(ModeKind::Boss).unwrap();
        assert_ne!(old.epoch, new.epoch);
        assert_eq!(round.apply_roster(old.epoch, Ok(roster(4, "images"))), 0);
        assert!(round.store().is_empty());
    }

    #[test]
    fn test_normal_roster_merge() {
        let mut round = Round::new(&SimConfig::default(), 1);
        let req = round.select_mode(ModeKind::Normal).unwrap();
        round.apply_roster(req.epoch, Ok(roster(3, "images")));
        let first: Vec<BubbleId> = round.store().ids().to_vec();

        assert_eq!(round.apply_roster(req.epoch, Ok(roster(5, "images"))), 2);
        assert_eq!(round.store().len(), 5);
        for id in first {
            assert!(round.store().contains(id));
        }
        // Targets follow the new population
        let row = round.store().row(0);
        assert_eq!(row.target_radius, radius_for_count(5));
    }

    #[test]
    fn test_spawn_inside_arena_and_small() {
        let round = loaded(ModeKind::Normal, 40, SimConfig::default());
        let arena = round.arena();
        for row in 0..round.store().len() {
            let b = round.store().row(row);
            assert_eq!(b.radius, radius::SPAWN);
            assert_eq!(b.target_radius, 45.0);
            assert!(b.x >= b.target_radius && b.x <= arena.width - b.target_radius);
            assert!(b.y >= b.target_radius && b.y <= arena.height - b.target_radius);
            assert!((b.vx * b.vx + b.vy * b.vy).sqrt() > 2.99);
        }
    }

    #[test]
    fn test_boss_spawn_stationary_until_start() {
        let mut round = loaded(ModeKind::Boss, 4, SimConfig::default());
        assert!(round.super_entity().is_some());
        for row in 0..4 {
            let b = round.store().row(row);
            assert_eq!((b.vx, b.vy), (0.0, 0.0));
        }
        round.start();
        for row in 0..4 {
            let b = round.store().row(row);
            assert!(b.vx != 0.0 || b.vy != 0.0);
        }
        assert!(round.super_entity().unwrap().velocity.length() > 0.0);
    }

    #[test]
    fn test_normal_pair_collision_scenario() {
        let mut round = loaded(ModeKind::Normal, 3, SimConfig::default());
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        place(&mut round, a, 300.0, 300.0, 1.0, 0.0);
        place(&mut round, b, 335.0, 300.0, -1.0, 0.0);
        place(&mut round, c, 900.0, 500.0, 0.0, 0.0);
        round.start();
        place(&mut round, c, 900.0, 500.0, 0.0, 0.0);
        round.tick();

        assert_eq!(health(&round, a), 90.0);
        assert_eq!(health(&round, b), 90.0);
        assert_eq!(health(&round, c), 100.0);
    }

    #[test]
    fn test_winner_on_same_tick() {
        let mut round = loaded(ModeKind::Normal, 2, SimConfig::default());
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        place(&mut round, ids[0], 300.0, 300.0, 0.0, 0.0);
        place(&mut round, ids[1], 600.0, 300.0, 0.0, 0.0);
        round.start();
        place(&mut round, ids[0], 300.0, 300.0, 0.0, 0.0);
        place(&mut round, ids[1], 600.0, 300.0, 0.0, 0.0);

        let row = round.store.index_of(ids[1]).unwrap();
        round.store.apply_damage(row, 100.0);
        let before = round.tick_count();
        round.tick();

        assert_eq!(round.tick_count(), before + 1);
        match round.outcome() {
            Some(Outcome::Winner { id, .. }) => assert_eq!(*id, ids[0]),
            other => panic!("expected winner, got {:?}", other),
        }
        assert!(!round.tick());
        let stats = round.take_stats();
        assert!(stats.iter().any(|b| b.winners == vec!["p0.png".to_string()]));
    }

    #[test]
    fn test_single_bubble_wins_immediately() {
        let mut round = loaded(ModeKind::Normal, 1, SimConfig::default());
        round.start();
        round.tick();
        assert!(matches!(round.outcome(), Some(Outcome::Winner { .. })));
    }

    #[test]
    fn test_empty_normal_round_does_not_start() {
        let mut round = Round::new(&SimConfig::default(), 1);
        round.select_mode(ModeKind::Normal);
        assert!(!round.start());
        assert!(!round.tick());
        assert_eq!(round.phase(), &Phase::Loaded(ModeKind::Normal));
        assert_eq!(round.outcome(), None);
    }

    #[test]
    fn test_boss_without_super_does_not_start() {
        let mut round = Round::new(&SimConfig::default(), 1);
        let req = round.select_mode(ModeKind::Boss).unwrap();
        assert!(!round.start());

        round.apply_roster(req.epoch, Err(RosterError::Request("down".into())));
        assert!(round.super_entity().is_none());
        assert!(!round.start());
        assert!(!round.tick());
        assert_eq!(round.phase(), &Phase::Loaded(ModeKind::Boss));
        assert_eq!(round.outcome(), None);
        assert!(round.take_stats().is_empty());
    }

    #[test]
    fn test_population_never_increases() {
        let mut config = SimConfig::default();
        config.arena.width = 400.0;
        config.arena.height = 300.0;
        let mut round = loaded(ModeKind::Normal, 60, config);
        round.start();
        let mut last = round.store().alive_count();
        for _ in 0..3_000 {
            if !round.tick() {
                break;
            }
            let alive = round.store().alive_count();
            assert!(alive <= last);
            last = alive;
        }
        assert!(last < 60);
    }

    #[test]
    fn test_containment_whole_round() {
        let mut config = SimConfig::default();
        config.arena.width = 500.0;
        config.arena.height = 400.0;
        config.round.spikes_enabled = true;
        config.round.spike_count = 8;
        config.round.speed_multiplier = 6.0;
        let mut round = loaded(ModeKind::Normal, 30, config);
        round.start();
        for _ in 0..600 {
            if !round.tick() {
                break;
            }
            let arena = round.arena();
            for row in 0..round.store().len() {
                let b = round.store().row(row);
                assert!(b.x >= b.radius - 1e-3 && b.x <= arena.width - b.radius + 1e-3);
                assert!(b.y >= b.radius - 1e-3 && b.y <= arena.height - b.radius + 1e-3);
            }
        }
    }

    #[test]
    fn test_kill_credited_once() {
        let mut round = loaded(ModeKind::Normal, 3, SimConfig::default());
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        place(&mut round, ids[0], 300.0, 300.0, 1.0, 0.0);
        place(&mut round, ids[1], 335.0, 300.0, -1.0, 0.0);
        place(&mut round, ids[2], 900.0, 500.0, 0.0, 0.0);
        let row = round.store.index_of(ids[1]).unwrap();
        round.store.apply_damage(row, 95.0);

        round.tick();
        assert!(round.store().is_dying(round.store().index_of(ids[1]).unwrap()));
        // Wait out the death delay
        for _ in 0..20 {
            round.tick();
        }
        assert!(!round.store().contains(ids[1]));
        let kills: u32 = round
            .take_stats()
            .iter()
            .filter_map(|b| b.kills.get("p0.png"))
            .sum();
        assert_eq!(kills, 1);
    }

    #[test]
    fn test_boss_normals_do_not_damage_each_other() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        let mut round = loaded(ModeKind::Boss, 2, config);
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
            s.position = Vec2::new(1100.0, 600.0);
            s.velocity = Vec2::ZERO;
        }
        place(&mut round, ids[0], 300.0, 300.0, 1.0, 0.0);
        place(&mut round, ids[1], 335.0, 300.0, -1.0, 0.0);
        round.tick();
        assert_eq!(health(&round, ids[0]), 100.0);
        assert_eq!(health(&round, ids[1]), 100.0);
    }

    #[test]
    fn test_boss_contact_compounds() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        let mut round = loaded(ModeKind::Boss, 3, config);
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
            s.position = Vec2::new(400.0, 360.0);
            s.velocity = Vec2::ZERO;
        }
        // Two normals touching the super from opposite sides, one far away
        place(&mut round, ids[0], 325.0, 360.0, 0.0, 0.0);
        place(&mut round, ids[1], 475.0, 360.0, 0.0, 0.0);
        place(&mut round, ids[2], 1100.0, 100.0, 0.0, 0.0);
        round.tick();

        let s = round.super_entity().unwrap();
        assert_eq!(s.health, 774.0);
        assert_eq!(health(&round, ids[0]), 80.0);
        assert_eq!(health(&round, ids[1]), 80.0);
        assert_eq!(health(&round, ids[2]), 100.0);
    }

    #[test]
    fn test_boss_contact_floors_once_per_tick() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        config.boss.super_health = 1001.0;
        let mut round = loaded(ModeKind::Boss, 2, config);
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
            s.position = Vec2::new(400.0, 360.0);
            s.velocity = Vec2::ZERO;
        }
        place(&mut round, ids[0], 325.0, 360.0, 0.0, 0.0);
        place(&mut round, ids[1], 475.0, 360.0, 0.0, 0.0);
        round.tick();

        assert_eq!(round.super_entity().unwrap().health, 775.0);
    }

    #[test]
    fn test_super_cooldown_gates_repeat_contact() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        let mut round = loaded(ModeKind::Boss, 2, config);
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        place(&mut round, ids[1], 1100.0, 100.0, 0.0, 0.0);
        for _ in 0..2 {
            if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
                s.position = Vec2::new(400.0, 360.0);
                s.velocity = Vec2::ZERO;
            }
            place(&mut round, ids[0], 325.0, 360.0, 0.0, 0.0);
            round.tick();
        }
        // Second tick is 30 ms later, inside the 250 ms cooldown
        assert_eq!(round.super_entity().unwrap().health, 880.0);
        assert_eq!(health(&round, ids[0]), 80.0);
    }

    #[test]
    fn test_boss_super_defeated() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        config.boss.super_health = 1.0;
        let mut round = loaded(ModeKind::Boss, 2, config);
        let ids: Vec<BubbleId> = round.store().ids().to_vec();
        round.start();
        if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
            s.position = Vec2::new(400.0, 360.0);
            s.velocity = Vec2::ZERO;
        }
        place(&mut round, ids[0], 325.0, 360.0, 0.0, 0.0);
        place(&mut round, ids[1], 1100.0, 100.0, 0.0, 0.0);
        round.tick();

        match round.outcome() {
            Some(Outcome::SuperDefeated { survivors }) => assert_eq!(survivors.len(), 2),
            other => panic!("expected super defeated, got {:?}", other),
        }
        assert!(round.super_entity().is_none());
    }

    #[test]
    fn test_boss_super_wins_when_normals_gone() {
        let mut config = SimConfig::default();
        config.boss.powers_enabled = false;
        let mut round = loaded(ModeKind::Boss, 1, config);
        round.start();
        round.store.apply_damage(0, 100.0);
        round.tick();
        assert_eq!(round.outcome(), Some(&Outcome::SuperWins));
    }

    #[test]
    fn test_manual_fire_rate_limited() {
        let mut config = SimConfig::default();
        config.boss.fire_mode = FireMode::Manual;
        config.boss.damage_types = vec![DamageType::Lightning];
        let mut round = loaded(ModeKind::Boss, 2, config);
        assert_eq!(round.fire_super(), 0);
        round.start();
        assert_eq!(round.fire_super(), 8);
        assert_eq!(round.fire_super(), 0);
        assert_eq!(round.projectile_count(), 8);
    }

    #[test]
    fn test_projectile_hit_damages_and_credits_super() {
        let mut config = SimConfig::default();
        config.round.spikes_enabled = false;
        config.boss.fire_mode = FireMode::Manual;
        config.boss.damage_types = vec![DamageType::Lightning];
        let mut round = loaded(ModeKind::Boss, 1, config);
        let id = round.store().ids()[0];
        round.start();
        if let Mode::Boss { super_entity: Some(s), .. } = &mut round.mode {
            s.position = Vec2::new(400.0, 360.0);
            s.velocity = Vec2::ZERO;
        }
        // Directly above the super, clear of its body, in the upward shot's path
        place(&mut round, id, 400.0, 265.0, 0.0, 0.0);
        round.take_stats();

        assert_eq!(round.fire_super(), 8);
        round.tick();

        assert_eq!(health(&round, id), 100.0 - DamageType::Lightning.damage());
        assert_eq!(round.projectile_count(), 7);
        assert_eq!(round.ledger.last_damager(id), Some(Attacker::Super));
        let super_name = round.super_identity();
        let hits: u32 = round
            .take_stats()
            .iter()
            .filter_map(|b| b.hits.get(&super_name))
            .sum();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_auto_fire_produces_projectiles() {
        let mut config = SimConfig::default();
        config.boss.fire_mode = FireMode::Auto;
        config.boss.fire_interval_ms = 300;
        let mut round = loaded(ModeKind::Boss, 2, config);
        round.start();
        let mut seen = false;
        for _ in 0..20 {
            round.tick();
            if round.projectile_count() > 0 {
                seen = true;
                break;
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_pause_stops_ticks() {
        let mut round = loaded(ModeKind::Normal, 5, SimConfig::default());
        round.start();
        assert!(round.pause());
        assert!(!round.tick());
        assert!(!round.pause());
        assert!(round.resume());
        assert!(round.tick());
    }

    #[test]
    fn test_reset_reloads_same_mode() {
        let mut round = loaded(ModeKind::Boss, 3, SimConfig::default());
        let first_round = round.round_id();
        round.start();
        let req = round.reset().unwrap();
        assert_eq!(req.mode, ModeKind::Boss);
        assert_eq!(round.phase(), &Phase::Loaded(ModeKind::Boss));
        assert!(round.store().is_empty());
        assert!(round.super_entity().is_none());
        assert_ne!(round.round_id(), first_round);
        assert_eq!(round.apply_roster(req.epoch, Ok(roster(2, "bossimgs"))), 2);
    }

    #[test]
    fn test_resize_reclamps_and_replaces_spikes() {
        let mut config = SimConfig::default();
        config.round.spikes_enabled = true;
        config.round.spike_count = 4;
        let mut round = loaded(ModeKind::Normal, 20, config);
        round.resize(300.0, 200.0);
        let arena = round.arena();
        for row in 0..round.store().len() {
            let b = round.store().row(row);
            assert!(b.x <= arena.width - b.radius && b.y <= arena.height - b.radius);
        }
        for spike in round.spikes() {
            let (_, max) = spike.footprint(&arena);
            assert!(max.x <= 300.0 && max.y <= 200.0);
        }
    }

    #[test]
    fn test_snapshot_cached_between_ticks() {
        let mut round = loaded(ModeKind::Normal, 5, SimConfig::default());
        let a = round.snapshot();
        let b = round.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
        round.start();
        round.tick();
        let c = round.snapshot();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.tick, 1);
        assert_eq!(c.bubbles.len(), 5);
        assert_eq!(c.phase, "running");
    }

    #[test]
    fn test_leaderboard_top_n() {
        let round = loaded(ModeKind::Normal, 20, SimConfig::default());
        let board = round.leaderboard(12);
        assert_eq!(board.len(), 12);
        assert!(board.iter().all(|e| e.identity.ends_with(".png")));
    }
}
