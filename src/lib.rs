// Library interface for gridcast
// This allows integration tests to access internal modules

pub mod config;
pub mod errors;
pub mod replay;
pub mod telemetry;
pub mod track;
pub mod writer;

// Re-export commonly used types
pub use config::ReplayConfig;
pub use errors::ReplayError;
pub use replay::{Command, IdleReaper, LoadedReplay, ReplayEvent, ReplaySession, Viewer};
pub use telemetry::{JsonlTelemetryProducer, SessionKey, TelemetryProducer};
