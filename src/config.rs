use std::{path::Path, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::ReplayError;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "gridcast";

/// Cap on frames kept in memory for one session (~500MB of race telemetry)
pub const MAX_FRAMES_IN_MEMORY: usize = 50_000;
/// Recording rate of the upstream telemetry
pub const FRAMES_PER_SECOND: f64 = 25.0;
pub const FRAME_SKIP: usize = 5;
pub const BASE_INTERVAL_MS: u64 = 100;
pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 4.0;
/// Corridor width around the centerline, in track units (meters)
pub const TRACK_WIDTH: f64 = 200.0;

/// Tuning knobs for the replay engine. Every field has a default so a partial
/// config file only overrides what it names.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    pub max_frames_in_memory: usize,
    pub frames_per_second: f64,
    /// Frame store positions advanced per scheduler iteration
    pub frame_skip: usize,
    /// Wait between scheduler iterations at 1x speed
    pub base_interval_ms: u64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub track_width: f64,
    /// Every n-th frame is inspected when looking for retirements
    pub retirement_sample_stride: usize,
    /// Length of a track status window that has no end time
    pub status_default_window_s: f64,
    pub idle_timeout_s: u64,
    pub reaper_period_s: u64,
    /// Events buffered per viewer before the oldest are dropped
    pub viewer_buffer: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_frames_in_memory: MAX_FRAMES_IN_MEMORY,
            frames_per_second: FRAMES_PER_SECOND,
            frame_skip: FRAME_SKIP,
            base_interval_ms: BASE_INTERVAL_MS,
            min_speed: MIN_SPEED,
            max_speed: MAX_SPEED,
            track_width: TRACK_WIDTH,
            retirement_sample_stride: 25,
            status_default_window_s: 10.0,
            idle_timeout_s: 1800,
            reaper_period_s: 300,
            viewer_buffer: 256,
        }
    }
}

impl ReplayConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_s)
    }

    pub fn reaper_period(&self) -> Duration {
        Duration::from_secs(self.reaper_period_s)
    }

    /// Clamps into `[min_speed, max_speed]`. Never panics, even on a range that
    /// failed validation; `max_speed` wins when the bounds are inverted.
    pub fn clamp_speed(&self, speed: f64) -> f64 {
        speed.max(self.min_speed).min(self.max_speed)
    }

    /// Rejects values the replay engine cannot run with
    pub fn validate(&self) -> Result<(), ReplayError> {
        let positive = |value: f64| value.is_finite() && value > 0.0;

        if !positive(self.min_speed) || !positive(self.max_speed) {
            return Err(ReplayError::InvalidConfig {
                reason: format!(
                    "speed bounds must be positive, got [{}, {}]",
                    self.min_speed, self.max_speed
                ),
            });
        }
        if self.min_speed > self.max_speed {
            return Err(ReplayError::InvalidConfig {
                reason: format!(
                    "min_speed {} is above max_speed {}",
                    self.min_speed, self.max_speed
                ),
            });
        }
        if !positive(self.frames_per_second) {
            return Err(ReplayError::InvalidConfig {
                reason: format!(
                    "frames_per_second must be positive, got {}",
                    self.frames_per_second
                ),
            });
        }
        if !self.track_width.is_finite() {
            return Err(ReplayError::InvalidConfig {
                reason: format!("track_width must be finite, got {}", self.track_width),
            });
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let file =
            std::fs::File::open(path).map_err(|e| ReplayError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| ReplayError::ConfigParseError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config from the user's config directory. Returns `Ok(None)` when
    /// there is no config file yet.
    pub fn from_local_file() -> Result<Option<Self>, ReplayError> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(None);
        };
        let config_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

        if config_path.exists() {
            debug!("Reading replay config from {:?}", config_path);
            Self::from_file(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self) -> Result<(), ReplayError> {
        let config_path = dirs::config_dir()
            .ok_or(ReplayError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), ReplayError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReplayError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| ReplayError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| ReplayError::ConfigSerializeError { source: e })
    }
}
