use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::PitwallError;
use crate::engine::{DEFAULT_TIME_WINDOW_S, WindowMode};

use super::REFRESH_RATE_MS;

const CONFIG_DIR_NAME: &str = "pitwall";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub time_window_s: f64,
    pub refresh_rate_ms: u64,
    pub x_mode: WindowMode,
    pub selected_driver: Option<String>,
    pub playback_speed: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            time_window_s: DEFAULT_TIME_WINDOW_S,
            refresh_rate_ms: REFRESH_RATE_MS,
            x_mode: WindowMode::Time,
            selected_driver: None,
            playback_speed: 1.,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, PitwallError> {
        Ok(dirs::config_dir()
            .ok_or(PitwallError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Reads the config saved by a previous run, if there is one.
    pub fn from_local_file() -> Result<Option<Self>, PitwallError> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Option<Self>, PitwallError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file =
            File::open(config_path).map_err(|e| PitwallError::ConfigIOError { source: e })?;
        let config = serde_json::from_reader(file)
            .map_err(|e| PitwallError::ConfigSerializeError { source: e })?;
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), PitwallError> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), PitwallError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PitwallError::ConfigIOError { source: e })?;
        }

        let file =
            File::create(config_path).map_err(|e| PitwallError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, self)
            .map_err(|e| PitwallError::ConfigSerializeError { source: e })
    }

    pub fn validate(&self) -> Result<(), PitwallError> {
        if !(self.time_window_s.is_finite() && self.time_window_s > 0.) {
            return Err(PitwallError::InvalidUserInput {
                field: "time_window_s".to_string(),
                reason: format!("must be a positive number of seconds, got {}", self.time_window_s),
            });
        }
        if self.refresh_rate_ms == 0 {
            return Err(PitwallError::InvalidUserInput {
                field: "refresh_rate_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.playback_speed.is_finite() && self.playback_speed > 0.) {
            return Err(PitwallError::InvalidUserInput {
                field: "playback_speed".to_string(),
                reason: format!("must be positive, got {}", self.playback_speed),
            });
        }
        Ok(())
    }

    /// The time window to buffer with, `window` taking precedence over the
    /// saved value. Both go through [`validate`](Self::validate).
    pub fn resolve_time_window(&self, window: Option<f64>) -> Result<f64, PitwallError> {
        let config = AppConfig {
            time_window_s: window.unwrap_or(self.time_window_s),
            ..self.clone()
        };
        config.validate()?;
        Ok(config.time_window_s)
    }
}
