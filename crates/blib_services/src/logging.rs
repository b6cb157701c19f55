use crate::{Settings, SettingsError};

/// Install the global `tracing` subscriber described by `settings`.
/// Fails if a subscriber is already installed.
pub fn init_logging(settings: &Settings) -> Result<(), SettingsError> {
    let level = settings.logging.max_level()?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(settings.logging.ansi)
        .with_thread_names(settings.logging.thread_names)
        .try_init()
        .map_err(|err| SettingsError::Logging(err.to_string()))?;
    tracing::debug!(%level, "logging initialized");
    Ok(())
}
