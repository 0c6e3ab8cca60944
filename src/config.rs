//! Persistent configuration model and defaults.

use crate::player::QualityMode;
use anyhow::Result;
use log::warn;
use std::path::PathBuf;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Per-channel playback defaults applied at engine startup.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Gain multiplier used by the buffered backend when boost is on.
    #[serde(default = "default_boost_gain")]
    pub boost_gain: f32,
    #[serde(default)]
    pub quality_mode: QualityMode,
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// Overrides the platform data directory for the session database.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_volume() -> f32 {
    1.0
}

fn default_speed() -> f32 {
    1.0
}

fn default_boost_gain() -> f32 {
    1.8
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            volume: default_volume(),
            speed: default_speed(),
            boost_gain: default_boost_gain(),
            quality_mode: QualityMode::default(),
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("counterpoint").join("config.toml"))
    }

    /// Read the config file, falling back to defaults when it is missing
    /// or malformed. A broken config never blocks startup.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Config::default();
        };
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Config::default();
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("config: failed to parse {}: {e}", path.display());
                Config::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.playback.volume, 1.0);
        assert_eq!(config.playback.speed, 1.0);
        assert_eq!(config.playback.quality_mode, QualityMode::Standard);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn partial_config_round_trips() {
        let config: Config = toml::from_str(
            "[playback]\nspeed = 1.5\nquality_mode = \"boost\"\n",
        )
        .unwrap();
        assert_eq!(config.playback.speed, 1.5);
        assert_eq!(config.playback.quality_mode, QualityMode::Boost);
        assert_eq!(config.playback.volume, 1.0);

        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed, config);
    }
}
