use crate::engine::{EngineContext, SystemDescriptor, SystemError};
use crate::time::StepTime;
use parking_lot::Mutex;
use std::any::Any;

/// Upcast helper so registered systems can be looked up by type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behavior run every tick or frame from one [`FrameStage`](crate::engine::FrameStage).
pub trait System: AsAny + Send {
    /// Declared component access; used for write-conflict checks.
    fn descriptor(&self) -> SystemDescriptor;

    /// Called once, before the first update.
    fn init(&mut self, _ctx: &mut EngineContext) -> Result<(), SystemError> {
        Ok(())
    }

    /// `stage_mutex` is shared with the frame tasks of the same stage.
    fn update(&mut self, ctx: &mut EngineContext, stage_mutex: &Mutex<()>, time: &StepTime);
}
