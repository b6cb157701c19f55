//! Math re-exports and small deterministic helpers.

pub use glam::*;

/// SplitMix64 generator. Reproducible across platforms, used for demo
/// content and for randomized test sequences.
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in `[min, max)`.
    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

/// Model matrix for a 2D transform placed at depth `z`.
pub fn model_2d(position: Vec2, rotation: f32, scale: Vec2, z: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        scale.extend(1.0),
        Quat::from_rotation_z(rotation),
        position.extend(z),
    )
}
