use crate::ecs::EcsError;
use crate::engine::FrameStage;
use thiserror::Error;

/// Boxed error returned by [`System::init`](crate::engine::System::init).
pub type SystemError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while registering a system.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemRegistrationError {
    #[error("system '{name}' is already registered")]
    DuplicateType { name: &'static str },

    #[error("component '{component}' in stage {stage} is already written by '{existing}', rejected '{requested}'")]
    ComponentWriteConflict {
        component: &'static str,
        stage: FrameStage,
        existing: String,
        requested: String,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registration(#[from] SystemRegistrationError),

    #[error("system '{system}' failed to initialize: {source}")]
    SystemInit {
        system: String,
        #[source]
        source: SystemError,
    },

    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Ecs(#[from] EcsError),
}
