//! Simulation clock.
//!
//! Real elapsed time is accumulated into a lag value and consumed in fixed
//! steps. Stages up to `Animate` run once per step, the per-frame stages
//! see the leftover lag as the interpolation residual.

use crate::engine::EngineConfig;
use std::time::Duration;

/// Timing handed to every system update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepTime {
    /// Simulated seconds covered by this step (scaled).
    pub dt: f32,
    /// Real seconds covered by this step.
    pub real_dt: f32,
    /// Simulated seconds still unconsumed once this step is taken.
    pub residual: f32,
    pub real_residual: f32,
}

pub struct FixedTimestep {
    step: f32,
    time_scale: f32,
    max_ticks: u32,
    variable: bool,
    lag: f32,
    frame_real_dt: f32,
    tick_count: u64,
    simulated: Duration,
}

impl FixedTimestep {
    pub fn new(tick_rate_hz: f32, max_ticks_per_frame: u32) -> Self {
        Self {
            step: 1.0 / tick_rate_hz.max(1.0),
            time_scale: 1.0,
            max_ticks: max_ticks_per_frame.max(1),
            variable: false,
            lag: 0.0,
            frame_real_dt: 0.0,
            tick_count: 0,
            simulated: Duration::ZERO,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut clock = Self::new(config.tick_rate_hz, config.max_ticks_per_frame);
        clock.time_scale = config.time_scale.max(0.0);
        clock.variable = config.variable_timestep;
        clock
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// Ticks run since creation.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Simulated time covered by all ticks so far.
    pub fn total_time(&self) -> Duration {
        self.simulated
    }

    /// Start a frame that took `real_elapsed` seconds. Returns how many
    /// ticks to run.
    ///
    /// In fixed mode lag beyond `max_ticks_per_frame` steps is dropped so a
    /// long stall does not trigger a catch-up spiral. Variable mode always
    /// runs a single tick covering the whole frame.
    pub fn begin_frame(&mut self, real_elapsed: f32) -> u32 {
        let real_elapsed = real_elapsed.max(0.0);
        self.frame_real_dt = real_elapsed;
        if self.variable {
            return 1;
        }

        self.lag += real_elapsed * self.time_scale;
        let due = (self.lag / self.step) as u32;
        if due > self.max_ticks {
            let dropped = due - self.max_ticks;
            tracing::warn!(
                behind_secs = self.lag - self.max_ticks as f32 * self.step,
                dropped,
                "can't catch up, skipping simulation ticks"
            );
            self.lag -= dropped as f32 * self.step;
            return self.max_ticks;
        }
        due
    }

    /// Consume one tick and return its timing.
    pub fn tick(&mut self) -> StepTime {
        let time = if self.variable {
            let dt = self.frame_real_dt * self.time_scale;
            StepTime {
                dt,
                real_dt: self.frame_real_dt,
                residual: 0.0,
                real_residual: 0.0,
            }
        } else {
            self.lag = (self.lag - self.step).max(0.0);
            StepTime {
                dt: self.step,
                real_dt: self.unscale(self.step),
                residual: self.lag,
                real_residual: self.unscale(self.lag),
            }
        };
        self.tick_count += 1;
        self.simulated += Duration::from_secs_f32(time.dt);
        time
    }

    /// Timing for the once-per-frame stages after all ticks ran.
    ///
    /// In fixed mode `dt` is always one step, also on frames that ran no
    /// tick; `residual` is the lag left for interpolating past the last
    /// tick.
    pub fn frame_time(&self) -> StepTime {
        if self.variable {
            return StepTime {
                dt: self.frame_real_dt * self.time_scale,
                real_dt: self.frame_real_dt,
                residual: 0.0,
                real_residual: 0.0,
            };
        }
        StepTime {
            dt: self.step,
            real_dt: self.unscale(self.step),
            residual: self.lag,
            real_residual: self.unscale(self.lag),
        }
    }

    fn unscale(&self, value: f32) -> f32 {
        if self.time_scale > 0.0 {
            value / self.time_scale
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_a_full_step() {
        let mut clock = FixedTimestep::new(60.0, 8);
        assert_eq!(clock.begin_frame(0.01), 0);
        assert_eq!(clock.begin_frame(0.01), 1);
        let t = clock.tick();
        assert!((t.dt - 1.0 / 60.0).abs() < 1e-6);
        assert!((t.residual - (0.02 - 1.0 / 60.0)).abs() < 1e-5);
        assert_eq!(t.residual, clock.frame_time().residual);
        assert!(clock.frame_time().residual < clock.step());
        assert_eq!(clock.tick_count(), 1);
    }

    #[test]
    fn residual_excludes_the_running_step() {
        let mut clock = FixedTimestep::new(10.0, 8);
        assert_eq!(clock.begin_frame(0.25), 2);
        let first = clock.tick();
        let second = clock.tick();
        assert!((first.residual - 0.15).abs() < 1e-5);
        assert!((second.residual - 0.05).abs() < 1e-5);

        // A frame without a tick still reports one step.
        assert_eq!(clock.begin_frame(0.01), 0);
        let frame = clock.frame_time();
        assert!((frame.dt - 0.1).abs() < 1e-6);
        assert!((frame.residual - 0.06).abs() < 1e-5);
    }

    #[test]
    fn long_stall_is_bounded() {
        let mut clock = FixedTimestep::new(100.0, 4);
        assert_eq!(clock.begin_frame(1.0), 4);
        for _ in 0..4 {
            clock.tick();
        }
        assert!(clock.frame_time().residual < clock.step() * 1.01);
    }

    #[test]
    fn time_scale_speeds_up_simulation() {
        let mut clock = FixedTimestep::new(8.0, 16);
        clock.set_time_scale(2.0);
        assert_eq!(clock.begin_frame(0.5), 8);
        let t = clock.tick();
        assert_eq!(t.dt, 0.125);
        assert_eq!(t.real_dt, 0.0625);
    }

    #[test]
    fn variable_mode_runs_one_tick_with_real_delta() {
        let config = EngineConfig {
            variable_timestep: true,
            ..EngineConfig::default()
        };
        let mut clock = FixedTimestep::from_config(&config);
        assert_eq!(clock.begin_frame(0.123), 1);
        let t = clock.tick();
        assert!((t.dt - 0.123).abs() < 1e-6);
        assert_eq!(t.residual, 0.0);
    }
}
