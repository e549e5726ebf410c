//! Fixed-timestep accumulator
//!
//! Frames arrive at whatever rate the caller drives them; logic ticks run at
//! a fixed interval. A late frame runs several ticks, an early one runs none.
//! Backlog beyond `MAX_CATCH_UP_TICKS` is dropped so one long stall cannot
//! snowball into ever-longer frames.

use std::time::Duration;

use crate::game::constants::tick::MAX_CATCH_UP_TICKS;

#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
    max_ticks: u32,
    /// Ticks discarded by the catch-up clamp since creation
    dropped: u64,
}

impl FixedStep {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_millis(1)),
            accumulator: Duration::ZERO,
            max_ticks: MAX_CATCH_UP_TICKS,
            dropped: 0,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Feed frame time; returns how many ticks to run now
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;

        let mut ticks = 0;
        while self.accumulator >= self.step && ticks < self.max_ticks {
            self.accumulator -= self.step;
            ticks += 1;
        }

        if self.accumulator >= self.step {
            let backlog = (self.accumulator.as_nanos() / self.step.as_nanos()) as u64;
            self.dropped += backlog;
            // Keep the sub-step remainder only
            self.accumulator = Duration::from_nanos((self.accumulator.as_nanos() % self.step.as_nanos()) as u64);
        }
        ticks
    }

    /// Fraction of a step accumulated but not yet simulated (0..1)
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.step.as_secs_f32()
    }

    /// Forget any accumulated time (after a pause or reset)
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}
