use crate::gpu::GpuContext;
use crate::scene::Scene;
use blib_core::math::UVec2;

/// Handed to allocation hooks: asset creation, resize and task creation.
#[derive(Clone, Copy)]
pub struct InitContext<'a> {
    pub gpu: Option<&'a GpuContext>,
    pub observer_size: UVec2,
    pub frames_in_flight: u32,
}

impl<'a> InitContext<'a> {
    pub fn new(gpu: Option<&'a GpuContext>, observer_size: UVec2, frames_in_flight: u32) -> Self {
        Self {
            gpu,
            observer_size,
            frames_in_flight,
        }
    }

    pub fn headless(observer_size: UVec2, frames_in_flight: u32) -> Self {
        Self::new(None, observer_size, frames_in_flight)
    }
}

/// Handed to per-frame hooks.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub gpu: Option<&'a GpuContext>,
    pub scene: Option<&'a Scene>,
    pub observer_size: UVec2,
    /// Index of the frame in flight being recorded.
    pub frame: u32,
}

impl<'a> ExecutionContext<'a> {
    pub fn headless(observer_size: UVec2, frame: u32) -> Self {
        Self {
            gpu: None,
            scene: None,
            observer_size,
            frame,
        }
    }
}
