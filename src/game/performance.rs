//! Tick performance monitoring
//!
//! Tracks logic tick durations against the tick budget and provides signals
//! for the renderer:
//! - Texture requests stop when ticks run critically long
//! - The sprite cap shrinks when the budget is exceeded

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Performance status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PerformanceStatus {
    /// Plenty of headroom
    Excellent,
    /// Normal operation
    Good,
    /// Degraded, still drawing textures
    Warning,
    /// Stop requesting new textures
    Critical,
    /// Sustained overload, shed sprites too
    Catastrophic,
}

impl PerformanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceStatus::Excellent => "excellent",
            PerformanceStatus::Good => "good",
            PerformanceStatus::Warning => "warning",
            PerformanceStatus::Critical => "critical",
            PerformanceStatus::Catastrophic => "catastrophic",
        }
    }

    /// Numeric level for metrics (0 = excellent)
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn can_request_textures(&self) -> bool {
        *self < PerformanceStatus::Critical
    }

    pub fn should_shed_sprites(&self) -> bool {
        matches!(self, PerformanceStatus::Catastrophic)
    }
}

/// Rolling monitor of tick durations
pub struct PerformanceMonitor {
    tick_durations: VecDeque<Duration>,
    max_samples: usize,
    /// Target tick duration (budget)
    target_tick_duration: Duration,
    excellent_threshold: f32,
    warning_threshold: f32,
    critical_threshold: f32,
    catastrophic_threshold: f32,
    status: PerformanceStatus,
    tick_start: Option<Instant>,
    last_entity_count: usize,
}

impl PerformanceMonitor {
    /// Budget is one logic tick of `tick_ms` milliseconds
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick_durations: VecDeque::with_capacity(100),
            max_samples: 100, // ~3 seconds at 30 ms
            target_tick_duration: Duration::from_millis(tick_ms.max(1)),
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            catastrophic_threshold: 1.5,
            status: PerformanceStatus::Excellent,
            tick_start: None,
            last_entity_count: 0,
        }
    }

    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    pub fn tick_end(&mut self, entity_count: usize) {
        if let Some(start) = self.tick_start.take() {
            self.record_tick(start.elapsed());
            self.last_entity_count = entity_count;
        }
    }

    /// Record a tick duration measured elsewhere
    pub fn record_tick(&mut self, duration: Duration) {
        self.tick_durations.push_back(duration);
        while self.tick_durations.len() > self.max_samples {
            self.tick_durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        if self.tick_durations.len() < 10 {
            return;
        }

        let ratio = self.budget_ratio();
        self.status = if ratio < self.excellent_threshold {
            PerformanceStatus::Excellent
        } else if ratio < self.warning_threshold {
            PerformanceStatus::Good
        } else if ratio < self.critical_threshold {
            PerformanceStatus::Warning
        } else if ratio < self.catastrophic_threshold {
            PerformanceStatus::Critical
        } else {
            PerformanceStatus::Catastrophic
        };
    }

    fn budget_ratio(&self) -> f32 {
        self.average_tick_duration().as_secs_f32() / self.target_tick_duration.as_secs_f32()
    }

    pub fn average_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.tick_durations.iter().sum();
        sum / self.tick_durations.len() as u32
    }

    /// Tick duration at percentile `p` (0..=1) of the window
    pub fn percentile_tick_duration(&self, p: f32) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.tick_durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * p.clamp(0.0, 1.0)) as usize;
        sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(Duration::ZERO)
    }

    pub fn p50_tick_duration(&self) -> Duration {
        self.percentile_tick_duration(0.5)
    }

    pub fn p95_tick_duration(&self) -> Duration {
        self.percentile_tick_duration(0.95)
    }

    pub fn p99_tick_duration(&self) -> Duration {
        self.percentile_tick_duration(0.99)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    /// Budget usage as percentage (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        self.budget_ratio() * 100.0
    }

    pub fn can_request_textures(&self) -> bool {
        self.status.can_request_textures()
    }

    pub fn last_entity_count(&self) -> usize {
        self.last_entity_count
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, {} bubbles",
            self.status,
            self.budget_usage_percent(),
            self.last_entity_count
        )
    }

    /// Sprite cap scaled by headroom. Full `cap` while under half the
    /// budget; over budget it drops to three quarters of the bubbles last
    /// ticked.
    pub fn sprite_budget(&self, cap: usize) -> usize {
        if self.tick_durations.len() < 10 {
            return cap;
        }

        let used = self.budget_ratio();
        if used < 0.5 {
            cap
        } else if used >= 1.0 {
            let reduced = (self.last_entity_count.min(cap) as f32 * 0.75).max(1.0) as usize;
            reduced.min(cap)
        } else {
            // 50% usage keeps everything, 100% keeps three quarters
            let scale = 1.0 - (used - 0.5) * 0.5;
            ((cap as f32 * scale).ceil() as usize).clamp(1, cap)
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(crate::game::constants::tick::TICK_MS)
    }
}
