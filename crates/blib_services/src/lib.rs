//! Engine services: settings persistence and logging bootstrap.

pub mod logging;
pub mod settings;

pub use logging::init_logging;
pub use settings::{LoggingSettings, Settings, SettingsError};
