use crate::RenderError;
use serde::{Deserialize, Serialize};

/// Upper bound on buffered frames; pending-copy masks are a `u8`.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of independently buffered copies of dynamic descriptor data.
    pub frames_in_flight: u32,
    /// Object slots per scene for rarely changing objects.
    pub static_capacity: u32,
    /// Object slots per scene for objects updated most frames.
    pub dynamic_capacity: u32,
    /// Observer size before the first resize, in pixels.
    pub initial_size: [u32; 2],
    /// Try to open a GPU device. When false, or when no adapter is found,
    /// descriptor uploads go to an in-memory mirror.
    pub use_gpu: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            static_capacity: 1024,
            dynamic_capacity: 1024,
            initial_size: [1280, 720],
            use_gpu: false,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(RenderError::InvalidConfig {
                reason: format!(
                    "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                    self.frames_in_flight
                ),
            });
        }
        if self.static_capacity == 0 && self.dynamic_capacity == 0 {
            return Err(RenderError::InvalidConfig {
                reason: "scenes need at least one object slot".into(),
            });
        }
        if self.initial_size.contains(&0) {
            return Err(RenderError::InvalidConfig {
                reason: format!("initial_size must be non-zero, got {:?}", self.initial_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_in_flight_is_bounded() {
        assert!(RenderConfig::default().validate().is_ok());
        for frames in [0, 9] {
            let config = RenderConfig {
                frames_in_flight: frames,
                ..RenderConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{"frames_in_flight": 3}"#).unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.static_capacity, 1024);
    }
}
