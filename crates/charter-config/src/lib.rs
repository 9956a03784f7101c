//! Configuration management for charter.
//!
//! Loads configuration from TOML files. Every section and field has a default,
//! so a partial file only overrides what it names.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use charter_core::Resolution;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    WriteError(#[from] toml::ser::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub data: DataConfig,
    pub fetch: FetchConfig,
    pub replay: ReplayConfig,
    pub drawing: DrawingConfig,
    pub logging: LoggingConfig,
    pub indicators: IndicatorConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./config.toml`
    /// 2. `~/.config/charter/config.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load(Self::default_path()) {
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("charter").join("config.toml");
            if let Ok(config) = Self::load(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.toml")
    }
}

/// What to show on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub symbol: String,
    pub resolution: Resolution,
    /// Row cap sent with every query.
    pub row_limit: usize,
    /// Latest date the chart may show. `None` means no ceiling.
    pub end_date: Option<NaiveDate>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            symbol: "002951".to_string(),
            resolution: Resolution::Daily,
            row_limit: 1000,
            end_date: None,
        }
    }
}

/// Data source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Kline server base URL.
    pub base_url: String,
    pub timeout_secs: u64,
    /// Read per-year CSV files from here instead of the server.
    pub csv_root: Option<PathBuf>,
    /// Added to date-only stamps of daily rows.
    pub daily_utc_offset_secs: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 30,
            csv_root: None,
            daily_utc_offset_secs: 0,
        }
    }
}

impl DataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scroll-triggered loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Load more once the visible range is this close to a data edge.
    pub buffer_days: i64,
    /// Days requested per load, before the per-resolution cap.
    pub load_days: i64,
    /// Nothing is requested before this date.
    pub earliest_date: NaiveDate,
    /// Bars kept in the store.
    pub max_bars: usize,
    /// Consecutive chained checks before the guard resets.
    pub max_check_depth: u32,
    pub zoom_debounce_ms: u64,
    pub pan_debounce_ms: u64,
    pub zoom_settle_ms: u64,
    pub pan_settle_ms: u64,
    /// How long a range change counts as a zoom after a scale change.
    pub zoom_hold_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            buffer_days: 5,
            load_days: 60,
            earliest_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            max_bars: 10_000,
            max_check_depth: 3,
            zoom_debounce_ms: 300,
            pan_debounce_ms: 1000,
            zoom_settle_ms: 100,
            pan_settle_ms: 200,
            zoom_hold_ms: 500,
        }
    }
}

impl FetchConfig {
    pub fn debounce(&self, zooming: bool) -> Duration {
        Duration::from_millis(if zooming {
            self.zoom_debounce_ms
        } else {
            self.pan_debounce_ms
        })
    }

    pub fn settle(&self, zooming: bool) -> Duration {
        Duration::from_millis(if zooming {
            self.zoom_settle_ms
        } else {
            self.pan_settle_ms
        })
    }

    pub fn zoom_hold(&self) -> Duration {
        Duration::from_millis(self.zoom_hold_ms)
    }

    /// Days per request at `resolution`.
    pub fn window_days(&self, resolution: Resolution) -> i64 {
        self.load_days.min(resolution.max_window_days()).max(1)
    }
}

/// Bar replay and stride playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub speed: f64,
    pub min_interval_ms: u64,
    /// Tick interval at speed 1.0.
    pub base_interval_ms: u64,
    /// Minutes accumulated into one bar by stride mode.
    pub stride_target_minutes: u32,
    /// Minutes added per stride step.
    pub stride_step_minutes: u32,
    /// Row cap for the minute feed of one replay day.
    pub minute_row_limit: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            min_interval_ms: 50,
            base_interval_ms: 1000,
            stride_target_minutes: 240,
            stride_step_minutes: 60,
            minute_row_limit: 2400,
        }
    }
}

impl ReplayConfig {
    /// Playback tick interval: `max(min_interval, base_interval / speed)`.
    pub fn interval(&self, speed: f64) -> Duration {
        let base = self.base_interval_ms as f64;
        let ms = if speed.is_finite() && speed > 0.0 {
            base / speed
        } else {
            base
        };
        Duration::from_millis((ms as u64).max(self.min_interval_ms))
    }
}

/// Annotation tool tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    pub snap_threshold_px: f32,
    /// Bars on each side of the pointer considered for snapping.
    pub snap_neighbors: usize,
    pub hit_threshold_px: f32,
    pub hit_throttle_ms: u64,
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            snap_threshold_px: 20.0,
            snap_neighbors: 2,
            hit_threshold_px: 5.0,
            hit_throttle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub ring_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { ring_capacity: 1000 }
    }
}

/// Moving-average overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ma_windows: Vec<usize>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ma_windows: vec![5, 10, 20],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.symbol, "002951");
        assert_eq!(config.general.resolution, Resolution::Daily);
        assert_eq!(config.fetch.max_bars, 10_000);
        assert_eq!(config.indicators.ma_windows, vec![5, 10, 20]);
    }

    #[test]
    fn test_window_days_per_resolution() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.window_days(Resolution::Daily), 60);
        assert_eq!(fetch.window_days(Resolution::Min5), 20);
        assert_eq!(fetch.window_days(Resolution::Min1), 4);
    }

    #[test]
    fn test_replay_interval() {
        let replay = ReplayConfig::default();
        assert_eq!(replay.interval(1.0), Duration::from_millis(1000));
        assert_eq!(replay.interval(4.0), Duration::from_millis(250));
        assert_eq!(replay.interval(100.0), Duration::from_millis(50));
        assert_eq!(replay.interval(0.0), Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[general]
symbol = "600000"
resolution = "60"
end_date = "2024-03-01"

[fetch]
buffer_days = 10

[indicators]
ma_windows = [5, 30]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.symbol, "600000");
        assert_eq!(config.general.resolution, Resolution::Min60);
        assert_eq!(config.general.end_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(config.fetch.buffer_days, 10);
        assert_eq!(config.fetch.load_days, 60);
        assert_eq!(config.indicators.ma_windows, vec![5, 30]);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("charter-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.general.resolution = Resolution::Custom(45);
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }
}
