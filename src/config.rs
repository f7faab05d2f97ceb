//! JSON settings file
//!
//! Holds the four key bindings and the rotation delay. A missing file is created with
//! the defaults, and those defaults are used for the same run.

use crate::mapping::{KeyMap, KeySymbol, MappingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

const MAX_READ_TIMEOUT_MS: u64 = u32::MAX as u64;

/// What the polling loop does after a non-timeout read error
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Log the error and keep polling
    #[default]
    Continue,
    /// Stop polling and release the device
    Abort,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid delay {0}: must be a non-negative number of seconds that fits a Duration")]
    InvalidDelay(f64),

    #[error("Invalid read timeout {0} ms: must be between 1 and {max} ms", max = u32::MAX)]
    InvalidReadTimeout(u64),

    #[error("Invalid key for \"{field}\": {source}")]
    InvalidKey {
        field: &'static str,
        #[source]
        source: MappingError,
    },
}

/// Contents of the settings file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Settings {
    pub down: String,
    pub up: String,
    pub left: String,
    pub right: String,
    /// Seconds between two rotation events
    pub delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_read_error: Option<ReadErrorPolicy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            down: "d".to_string(),
            up: "a".to_string(),
            left: "s".to_string(),
            right: "a".to_string(),
            delay: 0.2,
            read_timeout_ms: None,
            on_read_error: None,
        }
    }
}

impl Settings {
    /// Validates the bindings and the delay
    pub fn key_map(&self) -> Result<KeyMap, ConfigError> {
        let parse = |field: &'static str, value: &str| {
            value
                .parse::<KeySymbol>()
                .map_err(|source| ConfigError::InvalidKey { field, source })
        };
        let delay = Duration::try_from_secs_f64(self.delay)
            .map_err(|_| ConfigError::InvalidDelay(self.delay))?;

        Ok(KeyMap::new(
            parse("down", &self.down)?,
            parse("up", &self.up)?,
            parse("left", &self.left)?,
            parse("right", &self.right)?,
            delay,
        ))
    }

    /// libusb takes the timeout as a 32-bit millisecond count where 0 means no limit
    pub fn read_timeout(&self) -> Result<Duration, ConfigError> {
        match self.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS) {
            ms @ 1..=MAX_READ_TIMEOUT_MS => Ok(Duration::from_millis(ms)),
            ms => Err(ConfigError::InvalidReadTimeout(ms)),
        }
    }

    pub fn read_error_policy(&self) -> ReadErrorPolicy {
        self.on_read_error.unwrap_or_default()
    }
}

/// `settings.json` in the current working directory
pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    Ok(cwd.join(DEFAULT_SETTINGS_FILE))
}

/// Loads the settings, writing and returning the defaults when the file is missing
pub async fn load_or_create(path: &Path) -> Result<Settings, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if tokio::fs::try_exists(path).await.map_err(io_error)? {
        let content = tokio::fs::read_to_string(path).await.map_err(io_error)?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Loaded settings from {}", path.display());
        debug!("Settings: {:?}", settings);
        return Ok(settings);
    }

    let settings = Settings::default();
    save(path, &settings).await?;
    info!("No settings found, wrote defaults to {}", path.display());
    Ok(settings)
}

/// Writes `settings` as pretty-printed JSON, creating parent directories
pub async fn save(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let content = serde_json::to_string_pretty(settings).map_err(ConfigError::Serialize)?;
    tokio::fs::write(path, content).await.map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Direction;

    #[tokio::test]
    async fn missing_file_writes_and_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = load_or_create(&path).await.unwrap();
        assert_eq!(settings, Settings::default());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "down": "d",
                "up": "a",
                "left": "s",
                "right": "a",
                "delay": 0.2
            })
        );

        // second run reads the file back
        assert_eq!(load_or_create(&path).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn existing_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"down":"enter","up":"esc","left":"left","right":"right","delay":0,
                "read_timeout_ms":250,"on_read_error":"abort"}"#,
        )
        .unwrap();

        let settings = load_or_create(&path).await.unwrap();
        let key_map = settings.key_map().unwrap();
        assert_eq!(key_map.key(Direction::Down).name(), "enter");
        assert_eq!(key_map.delay(), Duration::ZERO);
        assert_eq!(settings.read_timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(settings.read_error_policy(), ReadErrorPolicy::Abort);
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"down":"d"}"#).unwrap();

        let err = load_or_create(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn optional_fields_default() {
        let settings = Settings::default();
        assert_eq!(settings.read_timeout().unwrap(), Duration::from_millis(1000));
        assert_eq!(settings.read_error_policy(), ReadErrorPolicy::Continue);
    }

    #[test]
    fn negative_nan_or_huge_delay_is_rejected() {
        for delay in [-0.1, f64::NAN, f64::INFINITY, 1e20] {
            let settings = Settings {
                delay,
                ..Settings::default()
            };
            assert!(matches!(
                settings.key_map(),
                Err(ConfigError::InvalidDelay(_))
            ));
        }
    }

    #[test]
    fn unknown_key_names_the_field() {
        let settings = Settings {
            left: "hyper".to_string(),
            ..Settings::default()
        };
        let err = settings.key_map().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { field: "left", .. }));
    }

    #[test]
    fn read_timeout_outside_libusb_range_is_rejected() {
        // 2^32 ms would wrap to 0, which libusb reads as "no timeout"
        for ms in [0, u64::from(u32::MAX) + 1, u64::MAX] {
            let settings = Settings {
                read_timeout_ms: Some(ms),
                ..Settings::default()
            };
            assert!(matches!(
                settings.read_timeout(),
                Err(ConfigError::InvalidReadTimeout(v)) if v == ms
            ));
        }

        let settings = Settings {
            read_timeout_ms: Some(u64::from(u32::MAX)),
            ..Settings::default()
        };
        assert_eq!(
            settings.read_timeout().unwrap(),
            Duration::from_millis(u64::from(u32::MAX))
        );
    }
}
