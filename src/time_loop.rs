//! Simulation clock with adaptive step bookkeeping
//!
//! The time loop owns the current time, the step counter and the step
//! size bounds. It never decides step sizes itself; the Newton solver
//! proposes them and reports what was actually used, the loop clamps
//! proposals to the configured bounds and clips the working step to the
//! remaining interval so the run lands exactly on the end time.

use std::time::Instant;

use crate::config::TimeConfig;

/// Relative tolerance for "have we reached the end" checks; absorbs the
/// rounding residue of summed step sizes.
const END_SNAP_REL: f64 = 1e-12;

#[derive(Debug)]
pub struct TimeLoop {
    time: f64,
    dt: f64,
    min_dt: f64,
    max_dt: f64,
    end_time: f64,
    step_index: usize,
    started: Option<Instant>,
}

impl TimeLoop {
    pub fn new(config: &TimeConfig) -> Self {
        TimeLoop {
            time: 0.0,
            dt: config.initial_dt.clamp(config.min_dt, config.max_dt),
            min_dt: config.min_dt,
            max_dt: config.max_dt,
            end_time: config.end_time,
            step_index: 0,
            started: None,
        }
    }

    /// Start the wall-clock timer for the final report.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn min_step_size(&self) -> f64 {
        self.min_dt
    }

    /// Simulated time still ahead of us.
    pub fn remaining(&self) -> f64 {
        (self.end_time - self.time).max(0.0)
    }

    /// Step size to attempt next: the working step clipped to the
    /// remaining interval. The final clipped step may undercut the
    /// configured minimum; landing on the end time takes precedence.
    pub fn step_size(&self) -> f64 {
        self.dt.min(self.remaining())
    }

    pub fn finished(&self) -> bool {
        self.remaining() <= self.end_time * END_SNAP_REL
    }

    /// Advance the clock by the step size the solver actually accepted,
    /// snapping to the end time when the residue is pure rounding noise.
    pub fn advance_time_step(&mut self, accepted: f64) {
        debug_assert!(accepted > 0.0);
        self.time += accepted;
        self.step_index += 1;
        if (self.end_time - self.time).abs() <= self.end_time * END_SNAP_REL {
            self.time = self.end_time;
        }
    }

    /// Propose the next working step; clamped to the configured bounds.
    pub fn set_time_step_size(&mut self, dt: f64) {
        self.dt = dt.clamp(self.min_dt, self.max_dt);
    }

    /// Lower the step size cap, shrinking the working step if needed.
    pub fn set_max_time_step_size(&mut self, max_dt: f64) {
        self.max_dt = max_dt.max(self.min_dt);
        self.dt = self.dt.min(self.max_dt);
    }

    /// Wall-clock seconds since [`TimeLoop::start`].
    pub fn elapsed(&self) -> f64 {
        self.started.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}
