//! # Configuration Management
//!
//! Loads and parses configuration from `companion-config.toml`: the user's
//! location, prayer-calculation preferences, and audio/recitation settings.
//! Missing or invalid files fall back to defaults, so the application
//! always starts.

use crate::prayer::{AsrJuristicMethod, CalculationMethod, HighLatitudeRule, PrayerTime};
use crate::sync::RepeatMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration loaded from companion-config.toml
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// User location; prayer calculation is unavailable without one
    #[serde(default)]
    pub location: LocationConfig,
    /// Prayer-time calculation preferences
    #[serde(default)]
    pub prayer: PrayerConfig,
    /// Recitation audio preferences
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Where prayer times are computed for.
///
/// Coordinates are optional: without them the calculator reports
/// "unavailable" instead of guessing a location.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// IANA timezone identifier
    pub timezone: String,
    /// Human-readable label for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Prayer-time calculation preferences.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayerConfig {
    pub method: CalculationMethod,
    pub asr_method: AsrJuristicMethod,
    pub high_latitude_rule: HighLatitudeRule,
    /// Per-prayer additive minute offsets for local mosque convention
    #[serde(default)]
    pub adjustments_minutes: BTreeMap<PrayerTime, i64>,
}

/// Recitation audio preferences.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Reciter identifier selecting which timing tables apply
    pub reciter: String,
    pub repeat_mode: RepeatMode,
    /// Pause before auto-advancing into the next surah (continuous mode)
    pub auto_advance_delay_secs: f64,
    /// Position tick cadence the host player is asked to use
    pub tick_interval_ms: u64,
    /// Directory holding the per-reciter quran-align documents
    pub timing_dir: PathBuf,
    /// On-disk mirror for fetched timing tables; `None` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            latitude: None,
            longitude: None,
            timezone: "UTC".to_string(),
            city: None,
        }
    }
}

impl Default for PrayerConfig {
    fn default() -> Self {
        PrayerConfig {
            // The app's primary audience follows the Jafari convention
            method: CalculationMethod::Jafari,
            asr_method: AsrJuristicMethod::Shafii,
            high_latitude_rule: HighLatitudeRule::MiddleOfNight,
            adjustments_minutes: BTreeMap::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            reciter: "mishary_rashid_alafasy".to_string(),
            repeat_mode: RepeatMode::Off,
            auto_advance_delay_secs: 1.0,
            tick_interval_ms: 100,
            timing_dir: PathBuf::from("timing-data"),
            cache_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            location: LocationConfig::default(),
            prayer: PrayerConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from companion-config.toml in the working
    /// directory, falling back to defaults if missing or invalid.
    pub fn load() -> Self {
        Self::load_from_path("companion-config.toml")
    }

    /// Load configuration from the given path, falling back to defaults if
    /// the file doesn't exist or fails to parse.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("invalid config file format: {e}; using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save the current configuration to the given path.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// The auto-advance delay in milliseconds, as the synchronizer takes it.
    pub fn auto_advance_delay_ms(&self) -> u32 {
        (self.audio.auto_advance_delay_secs.max(0.0) * 1000.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.prayer.method, CalculationMethod::Jafari);
        assert_eq!(config.prayer.asr_method, AsrJuristicMethod::Shafii);
        assert_eq!(
            config.prayer.high_latitude_rule,
            HighLatitudeRule::MiddleOfNight
        );
        assert_eq!(config.location.timezone, "UTC");
        assert!(config.location.latitude.is_none());
        assert_eq!(config.audio.reciter, "mishary_rashid_alafasy");
        assert_eq!(config.audio.repeat_mode, RepeatMode::Off);
        assert_eq!(config.auto_advance_delay_ms(), 1000);
    }

    #[test]
    fn config_roundtrip() {
        let mut config = Config::default();
        config.location.latitude = Some(32.61);
        config.location.longitude = Some(44.03);
        config.location.timezone = "Asia/Baghdad".to_string();
        config.prayer.adjustments_minutes.insert(PrayerTime::Fajr, -3);
        config.audio.repeat_mode = RepeatMode::Continuous;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.location.latitude, Some(32.61));
        assert_eq!(parsed.location.timezone, "Asia/Baghdad");
        assert_eq!(parsed.prayer.adjustments_minutes[&PrayerTime::Fajr], -3);
        assert_eq!(parsed.audio.repeat_mode, RepeatMode::Continuous);
    }

    #[test]
    fn load_nonexistent_file_falls_back_to_default() {
        let config = Config::load_from_path("/nonexistent/path");
        assert_eq!(config.prayer.method, CalculationMethod::Jafari);
    }

    #[test]
    fn invalid_file_falls_back_to_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not valid [ toml").unwrap();
        let config = Config::load_from_path(file.path());
        assert_eq!(config.location.timezone, "UTC");
    }

    #[test]
    fn parses_partial_config() {
        // Only a location section: everything else defaults
        let toml_str = r#"
            [location]
            latitude = 35.69
            longitude = 51.39
            timezone = "Asia/Tehran"
            city = "Tehran"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.location.city.as_deref(), Some("Tehran"));
        assert_eq!(config.prayer.method, CalculationMethod::Jafari);
        assert_eq!(config.audio.tick_interval_ms, 100);
    }
}
