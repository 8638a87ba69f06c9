// Replay engine: frame store, shared session, playback loop and push channel

pub mod broadcast;
pub mod loader;
pub mod reaper;
mod scheduler;
pub mod session;
pub mod store;

pub use broadcast::{Broadcaster, FrameUpdate, InitialState, ReplayEvent, Viewer};
pub use loader::{LoadedReplay, build_replay, load_qualifying_lap, load_race};
pub use reaper::IdleReaper;
pub use session::{Command, ReplaySession, ReplayStatus, SessionState};
pub use store::FrameStore;
