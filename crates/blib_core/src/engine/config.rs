use crate::engine::EngineError;
use serde::{Deserialize, Serialize};

/// Simulation and scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed simulation rate.
    pub tick_rate_hz: f32,
    /// Upper bound on ticks run to catch up in one frame.
    pub max_ticks_per_frame: u32,
    /// Run exactly one tick per frame with the real frame delta.
    pub variable_timestep: bool,
    pub time_scale: f32,
    /// Background worker threads; 0 picks the number of CPUs.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            max_ticks_per_frame: 8,
            variable_timestep: false,
            time_scale: 1.0,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| Err(EngineError::InvalidConfig { reason });
        if !(self.tick_rate_hz.is_finite() && self.tick_rate_hz >= 1.0) {
            return invalid(format!("tick_rate_hz must be >= 1, got {}", self.tick_rate_hz));
        }
        if self.max_ticks_per_frame == 0 {
            return invalid("max_ticks_per_frame must be at least 1".into());
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            return invalid(format!("time_scale must be >= 0, got {}", self.time_scale));
        }
        Ok(())
    }
}
