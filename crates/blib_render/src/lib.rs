//! BLIB rendering core.
//!
//! Scenes mirror ECS component data into per-object descriptor records,
//! buffered once per frame in flight. Observers draw scenes through a
//! render graph of tasks and pooled assets. The render systems tie both to
//! the engine's frame stages.
//!
//! ```ignore
//! let mut renderer = Renderer::from_config(RenderConfig::default())?;
//! let sprite = renderer.register_pipeline("sprite", &[TRANSFORM_2D, TEXTURE]);
//! let scene = renderer.create_scene();
//! renderer.add_default_observer(scene)?;
//! systems::install(&mut engine, renderer)?;
//! ```

pub mod components;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod gpu;
pub mod graph;
pub mod renderer;
pub mod scene;
pub mod systems;

pub use config::RenderConfig;
pub use error::{GpuError, GraphError, RenderError, SceneError};
pub use renderer::{Observer, Renderer};

pub use wgpu;
