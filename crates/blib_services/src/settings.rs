//! Settings file handling.
//!
//! Every section uses `#[serde(default)]`, so a file only needs the keys
//! it changes.

use blib_core::engine::EngineConfig;
use blib_render::RenderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings: {reason}")]
    Invalid { reason: String },

    #[error("failed to install logger: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Maximum level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    pub ansi: bool,
    pub thread_names: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            ansi: true,
            thread_names: false,
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Result<tracing::Level, SettingsError> {
        tracing::Level::from_str(self.level.trim()).map_err(|_| SettingsError::Invalid {
            reason: format!("unknown log level '{}'", self.level),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub render: RenderConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |reason: String| SettingsError::Invalid { reason };
        self.engine.validate().map_err(|e| invalid(e.to_string()))?;
        self.render.validate().map_err(|e| invalid(e.to_string()))?;
        self.logging.max_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings =
            Settings::from_json(r#"{ "render": { "frames_in_flight": 3 }, "logging": { "level": "debug" } }"#)
                .unwrap();
        assert_eq!(settings.render.frames_in_flight, 3);
        assert_eq!(settings.render.static_capacity, RenderConfig::default().static_capacity);
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.logging.max_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            r#"{ "render": { "frames_in_flight": 0 } }"#,
            r#"{ "engine": { "tick_rate_hz": 0.0 } }"#,
            r#"{ "logging": { "level": "loud" } }"#,
        ] {
            assert!(matches!(
                Settings::from_json(text),
                Err(SettingsError::Invalid { .. })
            ));
        }
        assert!(matches!(
            Settings::from_json("{ not json"),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("blib-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.engine.tick_rate_hz = 30.0;
        settings.render.dynamic_capacity = 64;
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);

        let missing = Settings::load(path.with_extension("missing"));
        assert!(matches!(missing, Err(SettingsError::Io { .. })));
    }
}
