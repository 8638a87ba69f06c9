// Error types for gridcast

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum ReplayError {
    // Errors while loading a session from the upstream producer
    #[snafu(display("No recorded session for {year} round {round} ({session_type})"))]
    SessionNotFound {
        year: u16,
        round: u16,
        session_type: String,
    },
    #[snafu(display("Session {year} round {round} ({session_type}) contains no frames"))]
    EmptySession {
        year: u16,
        round: u16,
        session_type: String,
    },
    #[snafu(display("No qualifying lap available: {reason}"))]
    NoQualifyingLap { reason: String },
    #[snafu(display("Error loading telemetry file"))]
    TelemetryLoaderError { source: io::Error },
    #[snafu(display("Malformed telemetry record: {description}"))]
    TelemetryParseError { description: String },

    // Track geometry errors
    #[snafu(display("Track geometry error: {reason}"))]
    GeometryError { reason: String },

    // Transport command errors
    #[snafu(display("No race data loaded"))]
    NoDataLoaded,
    #[snafu(display("Invalid playback speed: {speed}"))]
    InvalidSpeed { speed: f64 },
    #[snafu(display("Frame {index} out of range (sequence has {len} frames)"))]
    FrameOutOfRange { index: usize, len: usize },

    // Errors while broadcasting replay events
    #[snafu(display("Error broadcasting replay event: no viewers connected"))]
    TransientBroadcastError,

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error parsing config file"))]
    ConfigParseError { source: serde_json::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid replay config: {reason}"))]
    InvalidConfig { reason: String },

    // Errors for the event writer
    #[snafu(display("Error writing replay events"))]
    WriterError { source: io::Error },
}

impl ReplayError {
    /// True for errors caused by a command that does not fit the current session state.
    /// These are reported back to viewers and never change the session.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            ReplayError::NoDataLoaded | ReplayError::InvalidSpeed { .. }
        )
    }
}
