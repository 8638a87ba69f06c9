pub mod events;
pub mod producer;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::track::Point2D;

pub use events::{EventKind, TimelineEvent, extract_timeline_events};
pub use producer::{JsonlTelemetryProducer, TelemetryProducer, TelemetryRecord};

/// Sampled state of one car in one frame
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverState {
    pub x: f64,
    pub y: f64,
    /// Speed in km/h
    pub speed: f64,
    pub gear: u8,
    /// 0-100
    pub throttle: f64,
    /// 0-1 (some sources report a 0/1 flag)
    pub brake: f64,
    /// Raw DRS channel value
    pub drs: u8,
    pub lap: u32,
    /// Running order position
    #[serde(alias = "pos")]
    pub position: u32,
    /// Tyre compound id
    pub tyre: u8,
    /// Laps on the current set
    pub tyre_life: f64,
    pub is_out: bool,
}

impl Default for DriverState {
    fn default() -> Self {
        Self {
            x: 0.,
            y: 0.,
            speed: 0.,
            gear: 0,
            throttle: 0.,
            brake: 0.,
            drs: 0,
            lap: 1,
            position: 0,
            tyre: 0,
            tyre_life: 0.,
            is_out: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Weather {
    pub track_temp: Option<f64>,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rain_state: Option<String>,
}

/// One time-sampled snapshot of every car on track
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Frame {
    /// Seconds since session start
    pub t: f64,
    /// Keyed by driver code. A BTreeMap keeps rendering order stable.
    pub drivers: BTreeMap<String, DriverState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Weather>,
}

/// Track status window as reported by race control
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackStatusInterval {
    pub status: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const UNKNOWN: Rgb = Rgb(128, 128, 128);

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Identifies one session of one event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub year: u16,
    pub round: u16,
    /// "R", "S", "Q", "FP1", ...
    pub session_type: String,
}

impl SessionKey {
    pub fn new(year: u16, round: u16, session_type: &str) -> Self {
        Self {
            year,
            round,
            session_type: session_type.to_string(),
        }
    }

    pub fn race(year: u16, round: u16) -> Self {
        Self::new(year, round, "R")
    }

    pub fn qualifying(year: u16, round: u16) -> Self {
        Self::new(year, round, "Q")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SessionMeta {
    pub event_name: String,
    pub location: String,
    pub country: String,
    pub year: u16,
    pub round: u16,
    pub session_type: String,
    pub total_laps: u32,
}

/// One round of a season as listed by a producer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub round: u16,
    pub event_name: String,
    pub location: String,
    /// Session types available for this round, e.g. `["Q", "R"]`
    pub sessions: Vec<String>,
}

/// Classification row of a qualifying session. Times are best lap times in
/// seconds per segment, `None` when the driver set no lap there.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QualifyingResult {
    pub position: u32,
    pub driver: String,
    pub q1: Option<f64>,
    pub q2: Option<f64>,
    pub q3: Option<f64>,
}

/// Everything the upstream source returns for one session
#[derive(Clone, Debug, Default)]
pub struct RaceTelemetry {
    pub meta: SessionMeta,
    pub frames: Vec<Frame>,
    pub track_statuses: Vec<TrackStatusInterval>,
    pub driver_colors: HashMap<String, Rgb>,
}

/// Position trace of a single lap, used both as a track centerline and as a
/// replayable single-car session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct LapTrace {
    pub driver: String,
    #[serde(default)]
    pub segment: Option<String>,
    pub t: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(default)]
    pub speed: Vec<f64>,
    #[serde(default)]
    pub gear: Vec<u8>,
    #[serde(default)]
    pub throttle: Vec<f64>,
    #[serde(default)]
    pub brake: Vec<f64>,
    #[serde(default)]
    pub drs: Vec<u8>,
}

impl LapTrace {
    pub fn centerline(&self) -> Vec<Point2D> {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(x, y)| Point2D::new(*x, *y))
            .collect()
    }

    /// Number of usable samples. Channels shorter than the position trace are
    /// padded with defaults when frames are built.
    pub fn len(&self) -> usize {
        self.t.len().min(self.x.len()).min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_hex() {
        assert_eq!(Rgb(255, 135, 0).to_hex(), "#ff8700");
        assert_eq!(Rgb::UNKNOWN.to_hex(), "#808080");
    }

    #[test]
    fn test_driver_state_accepts_pos_alias_and_missing_fields() {
        let state: DriverState =
            serde_json::from_str(r#"{"x": 1.5, "y": -2.0, "pos": 3, "is_out": true}"#).unwrap();
        assert_eq!(state.position, 3);
        assert_eq!(state.lap, 1);
        assert!(state.is_out);
        assert_eq!(state.gear, 0);
    }

    #[test]
    fn test_frame_without_weather() {
        let frame: Frame =
            serde_json::from_str(r#"{"t": 12.0, "drivers": {"VER": {"lap": 4}}}"#).unwrap();
        assert!(frame.weather.is_none());
        assert_eq!(frame.drivers["VER"].lap, 4);
    }

    #[test]
    fn test_lap_trace_len_uses_shortest_position_channel() {
        let trace = LapTrace {
            driver: "HAM".to_string(),
            t: vec![0.0, 0.1, 0.2],
            x: vec![0.0, 1.0, 2.0],
            y: vec![0.0, 1.0],
            ..Default::default()
        };
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.centerline().len(), 2);
    }
}
