use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::{boss, io, projectile, spikes, tick};
use crate::game::spatial::CollisionStrategy;
use crate::game::state::{DamageType, ModeKind};
use crate::game::systems::boss::FireMode;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Arena must be at least 1x1, got {0}x{1}")]
    ArenaSize(f32, f32),
    #[error("Tick interval must be > 0")]
    TickInterval,
    #[error("Speed multiplier {0} outside {1}-{2}")]
    Speed(f32, f32, f32),
    #[error("Spike count {0} outside {1}-{2}")]
    SpikeCount(usize, usize, usize),
    #[error("Spike size {0} outside {1}-{2}")]
    SpikeSize(f32, f32, f32),
    #[error("Super health must be > 0")]
    SuperHealth,
    #[error("Fire interval must be at least {0} ms")]
    FireInterval(u64),
    #[error("Super powers enabled with no damage types selected")]
    NoDamageTypes,
    #[error("Texture pipeline needs at least one worker")]
    TextureWorkers,
    #[error("Texture budget must be > 0")]
    TextureBudget,
}

/// Arena dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: tick::DEFAULT_WIDTH,
            height: tick::DEFAULT_HEIGHT,
        }
    }
}

/// Per-round tunables
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    /// Mode selected on startup by the headless runner
    pub mode: ModeKind,
    /// Logic tick interval (ms)
    pub tick_ms: u64,
    /// Displacement multiplier applied to velocity each step
    pub speed_multiplier: f32,
    pub spikes_enabled: bool,
    pub spike_count: usize,
    pub spike_size: f32,
    pub collision: CollisionStrategy,
    /// Fixed RNG seed; random when unset
    pub seed: Option<u64>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            mode: ModeKind::Normal,
            tick_ms: tick::TICK_MS,
            speed_multiplier: tick::DEFAULT_SPEED_MULTIPLIER,
            spikes_enabled: false,
            spike_count: spikes::COUNT_MIN,
            spike_size: spikes::DEFAULT_SIZE,
            collision: CollisionStrategy::Auto,
            seed: None,
        }
    }
}

/// Boss-mode tunables
#[derive(Debug, Clone, PartialEq)]
pub struct BossConfig {
    pub super_health: f32,
    /// Whether the super-entity fires projectiles at all
    pub powers_enabled: bool,
    pub damage_types: Vec<DamageType>,
    pub fire_mode: FireMode,
    pub fire_interval_ms: u64,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            super_health: boss::SUPER_MAX_HEALTH,
            powers_enabled: true,
            damage_types: DamageType::ALL.to_vec(),
            fire_mode: FireMode::Auto,
            fire_interval_ms: projectile::DEFAULT_FIRE_INTERVAL_MS,
        }
    }
}

impl BossConfig {
    /// Damage types the volley may draw from; empty when powers are off
    pub fn active_damage_types(&self) -> Vec<DamageType> {
        if self.powers_enabled {
            self.damage_types.clone()
        } else {
            Vec::new()
        }
    }
}

/// Image roster and texture pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfig {
    /// Local roster root (`images/`, `bossimgs/`, `superbubbleimg/`)
    pub image_dir: Option<PathBuf>,
    /// HTTP roster API base URL (requires the `http` feature)
    pub api_url: Option<String>,
    pub texture_workers: usize,
    pub texture_budget_bytes: usize,
    pub roster_poll_ms: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            image_dir: None,
            api_url: None,
            texture_workers: 2,
            texture_budget_bytes: 64 * 1024 * 1024,
            roster_poll_ms: io::ROSTER_POLL_MS,
        }
    }
}

/// Stats delivery settings
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    /// Stats endpoint (requires the `http` feature); logged only when unset
    pub url: Option<String>,
    pub flush_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            url: None,
            flush_ms: io::STATS_FLUSH_MS,
        }
    }
}

/// Headless runner settings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunnerConfig {
    /// Write the final rendered frame here as PNG
    pub frame_out: Option<PathBuf>,
    /// Serve Prometheus metrics on this port
    pub metrics_port: Option<u16>,
}

/// Full simulator configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimConfig {
    pub arena: ArenaConfig,
    pub round: RoundConfig,
    pub boss: BossConfig,
    pub assets: AssetConfig,
    pub stats: StatsConfig,
    pub runner: RunnerConfig,
}

/// Read and parse an environment variable, warning (and returning None) when malformed
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(w) = env_parse::<f32>("ARENA_WIDTH") {
            if w >= 1.0 {
                config.arena.width = w;
            } else {
                tracing::warn!("ARENA_WIDTH must be >= 1, using default");
            }
        }
        if let Some(h) = env_parse::<f32>("ARENA_HEIGHT") {
            if h >= 1.0 {
                config.arena.height = h;
            } else {
                tracing::warn!("ARENA_HEIGHT must be >= 1, using default");
            }
        }

        if let Some(ms) = env_parse::<u64>("ARENA_TICK_MS") {
            if ms > 0 {
                config.round.tick_ms = ms;
            } else {
                tracing::warn!("ARENA_TICK_MS must be > 0, using default");
            }
        }
        if let Some(speed) = env_parse::<f32>("ARENA_SPEED") {
            if (tick::SPEED_MULTIPLIER_MIN..=tick::SPEED_MULTIPLIER_MAX).contains(&speed) {
                config.round.speed_multiplier = speed;
            } else {
                tracing::warn!(
                    "ARENA_SPEED must be {}-{}, using default",
                    tick::SPEED_MULTIPLIER_MIN,
                    tick::SPEED_MULTIPLIER_MAX
                );
            }
        }
        if let Some(enabled) = env_bool("ARENA_SPIKES") {
            config.round.spikes_enabled = enabled;
        }
        if let Some(count) = env_parse::<usize>("ARENA_SPIKE_COUNT") {
            if (spikes::COUNT_MIN..=spikes::COUNT_MAX).contains(&count) {
                config.round.spike_count = count;
            } else {
                tracing::warn!("ARENA_SPIKE_COUNT must be {}-{}, using default", spikes::COUNT_MIN, spikes::COUNT_MAX);
            }
        }
        if let Some(size) = env_parse::<f32>("ARENA_SPIKE_SIZE") {
            if (spikes::SIZE_MIN..=spikes::SIZE_MAX).contains(&size) {
                config.round.spike_size = size;
            } else {
                tracing::warn!("ARENA_SPIKE_SIZE must be {}-{}, using default", spikes::SIZE_MIN, spikes::SIZE_MAX);
            }
        }
        if let Some(strategy) = env_parse::<CollisionStrategy>("ARENA_COLLISION") {
            config.round.collision = strategy;
        }
        if let Some(seed) = env_parse::<u64>("ARENA_SEED") {
            config.round.seed = Some(seed);
        }
        if let Some(mode) = env_parse::<ModeKind>("ARENA_MODE") {
            config.round.mode = mode;
        }

        if let Some(health) = env_parse::<f32>("ARENA_SUPER_HEALTH") {
            if health > 0.0 {
                config.boss.super_health = health;
            } else {
                tracing::warn!("ARENA_SUPER_HEALTH must be > 0, using default");
            }
        }
        if let Some(enabled) = env_bool("ARENA_SUPER_POWERS") {
            config.boss.powers_enabled = enabled;
        }
        if let Ok(list) = std::env::var("ARENA_SUPER_TYPES") {
            let mut types = Vec::new();
            for item in list.split(',').filter(|s| !s.trim().is_empty()) {
                match item.parse::<DamageType>() {
                    Ok(t) if !types.contains(&t) => types.push(t),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("ARENA_SUPER_TYPES: {}", e),
                }
            }
            if types.is_empty() {
                tracing::warn!("ARENA_SUPER_TYPES has no valid entries, using default");
            } else {
                config.boss.damage_types = types;
            }
        }
        if let Some(mode) = env_parse::<FireMode>("ARENA_FIRE_MODE") {
            config.boss.fire_mode = mode;
        }
        if let Some(ms) = env_parse::<u64>("ARENA_FIRE_INTERVAL_MS") {
            if ms >= projectile::MIN_FIRE_INTERVAL_MS {
                config.boss.fire_interval_ms = ms;
            } else {
                tracing::warn!(
                    "ARENA_FIRE_INTERVAL_MS must be >= {}, using default",
                    projectile::MIN_FIRE_INTERVAL_MS
                );
            }
        }

        if let Ok(dir) = std::env::var("ARENA_IMAGE_DIR") {
            config.assets.image_dir = Some(PathBuf::from(dir));
        }
        if let Ok(url) = std::env::var("ARENA_API_URL") {
            config.assets.api_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(workers) = env_parse::<usize>("ARENA_TEXTURE_WORKERS") {
            if (1..=64).contains(&workers) {
                config.assets.texture_workers = workers;
            } else {
                tracing::warn!("ARENA_TEXTURE_WORKERS must be 1-64, using default");
            }
        }
        if let Some(mb) = env_parse::<usize>("ARENA_TEXTURE_BUDGET_MB") {
            if mb > 0 {
                config.assets.texture_budget_bytes = mb * 1024 * 1024;
            } else {
                tracing::warn!("ARENA_TEXTURE_BUDGET_MB must be > 0, using default");
            }
        }

        if let Ok(url) = std::env::var("ARENA_STATS_URL") {
            config.stats.url = Some(url);
        }

        if let Ok(path) = std::env::var("ARENA_FRAME_OUT") {
            config.runner.frame_out = Some(PathBuf::from(path));
        }
        if let Some(port) = env_parse::<u16>("METRICS_PORT") {
            if port > 0 {
                config.runner.metrics_port = Some(port);
            } else {
                tracing::warn!("METRICS_PORT must be > 0, metrics disabled");
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena.width < 1.0 || self.arena.height < 1.0 {
            return Err(ConfigError::ArenaSize(self.arena.width, self.arena.height));
        }
        if self.round.tick_ms == 0 {
            return Err(ConfigError::TickInterval);
        }
        let speed = self.round.speed_multiplier;
        if !(tick::SPEED_MULTIPLIER_MIN..=tick::SPEED_MULTIPLIER_MAX).contains(&speed) {
            return Err(ConfigError::Speed(speed, tick::SPEED_MULTIPLIER_MIN, tick::SPEED_MULTIPLIER_MAX));
        }
        if self.round.spikes_enabled {
            let count = self.round.spike_count;
            if !(spikes::COUNT_MIN..=spikes::COUNT_MAX).contains(&count) {
                return Err(ConfigError::SpikeCount(count, spikes::COUNT_MIN, spikes::COUNT_MAX));
            }
            let size = self.round.spike_size;
            if !(spikes::SIZE_MIN..=spikes::SIZE_MAX).contains(&size) {
                return Err(ConfigError::SpikeSize(size, spikes::SIZE_MIN, spikes::SIZE_MAX));
            }
        }
        if self.boss.super_health <= 0.0 {
            return Err(ConfigError::SuperHealth);
        }
        if self.boss.fire_interval_ms < projectile::MIN_FIRE_INTERVAL_MS {
            return Err(ConfigError::FireInterval(projectile::MIN_FIRE_INTERVAL_MS));
        }
        if self.boss.powers_enabled && self.boss.damage_types.is_empty() {
            return Err(ConfigError::NoDamageTypes);
        }
        if self.assets.texture_workers == 0 {
            return Err(ConfigError::TextureWorkers);
        }
        if self.assets.texture_budget_bytes == 0 {
            return Err(ConfigError::TextureBudget);
        }
        Ok(())
    }
}
