use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, MutexGuard},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    ReplayConfig, ReplayError,
    telemetry::{SessionKey, SessionMeta, TelemetryProducer, TimelineEvent},
    track::TrackGeometry,
};

use super::{
    broadcast::{Broadcaster, FrameUpdate, InitialState, ReplayEvent, Viewer},
    loader::{self, LoadedReplay},
    scheduler,
    store::FrameStore,
};

/// Transport position of the shared session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub frame_index: usize,
    pub is_playing: bool,
    pub speed: f64,
    pub last_activity: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            frame_index: 0,
            is_playing: false,
            speed: 1.0,
            last_activity: Instant::now(),
        }
    }
}

/// Snapshot for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStatus {
    pub has_session: bool,
    pub has_frames: bool,
    pub total_frames: usize,
    pub original_total: usize,
    pub current_frame: usize,
    pub is_playing: bool,
    pub speed: f64,
    pub viewers: usize,
}

/// Transport commands accepted from viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Play,
    Pause,
    Seek {
        #[serde(alias = "frame")]
        index: i64,
    },
    SetSpeed {
        speed: f64,
    },
}

#[derive(Debug)]
pub(crate) struct ReplayData {
    pub(crate) meta: SessionMeta,
    pub(crate) geometry: Option<TrackGeometry>,
    pub(crate) events: Vec<TimelineEvent>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) store: FrameStore,
    pub(crate) replay: Option<ReplayData>,
    pub(crate) state: SessionState,
    /// Cancels the running playback loop, if any
    pub(crate) playback: Option<CancellationToken>,
    /// Bumped on every load and eviction; a playback loop started under an older
    /// generation exits on its next step
    pub(crate) generation: u64,
}

impl SessionInner {
    fn touch(&mut self) {
        self.state.last_activity = Instant::now();
    }

    pub(crate) fn stop_playback(&mut self) {
        self.state.is_playing = false;
        if let Some(token) = self.playback.take() {
            token.cancel();
        }
    }

    fn clear(&mut self) {
        self.stop_playback();
        self.generation += 1;
        self.store.clear();
        self.replay = None;
        self.state.frame_index = 0;
    }

    fn initial_state(&self) -> Option<InitialState> {
        if self.store.is_empty() {
            return None;
        }
        let replay = self.replay.as_ref()?;
        Some(InitialState {
            total_frames: self.store.len(),
            original_total: self.store.original_len(),
            event_name: replay.meta.event_name.clone(),
            circuit_name: replay.meta.location.clone(),
            country: replay.meta.country.clone(),
            year: replay.meta.year,
            round: replay.meta.round,
            total_laps: replay.meta.total_laps,
            track_data: replay.geometry.clone(),
            race_events: replay.events.clone(),
        })
    }
}

/// The single shared replay session.
///
/// Cloning is cheap and every clone refers to the same session. All transport
/// commands and the playback loop go through one lock, so a load never races a
/// running loop.
#[derive(Clone, Debug)]
pub struct ReplaySession {
    inner: Arc<Mutex<SessionInner>>,
    broadcaster: Broadcaster,
    config: Arc<ReplayConfig>,
}

impl ReplaySession {
    pub fn new(config: ReplayConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("{}", e);
        }
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                store: FrameStore::default(),
                replay: None,
                state: SessionState::new(),
                playback: None,
                generation: 0,
            })),
            broadcaster: Broadcaster::new(config.viewer_buffer),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub(crate) fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    /// Replaces everything the session holds. Any running playback is stopped
    /// and the position goes back to the first frame.
    pub async fn load(&self, replay: LoadedReplay) {
        let mut inner = self.inner.lock().await;
        inner.clear();
        inner.store = replay.store;
        inner.replay = Some(ReplayData {
            meta: replay.meta,
            geometry: replay.geometry,
            events: replay.events,
        });
        inner.touch();

        info!(
            "Replay loaded: {} frames ({} recorded), {} timeline events",
            inner.store.len(),
            inner.store.original_len(),
            inner.replay.as_ref().map_or(0, |r| r.events.len())
        );

        if let Some(initial_state) = inner.initial_state() {
            self.broadcaster
                .send_lossy(ReplayEvent::InitialState(Box::new(initial_state)));
        }
    }

    /// Loads a full session from `producer`. A failed load leaves the session
    /// Empty: playback stops and previously loaded frames are dropped.
    pub async fn load_race(
        &self,
        producer: &mut impl TelemetryProducer,
        key: &SessionKey,
    ) -> Result<(), ReplayError> {
        let result = loader::load_race(producer, key, &self.config);
        self.apply_load(result).await
    }

    /// Loads one driver's qualifying lap from `producer`, with the same failure
    /// handling as `load_race`.
    pub async fn load_qualifying_lap(
        &self,
        producer: &mut impl TelemetryProducer,
        key: &SessionKey,
        driver: &str,
        segment: &str,
    ) -> Result<(), ReplayError> {
        let result = loader::load_qualifying_lap(producer, key, driver, segment, &self.config);
        self.apply_load(result).await
    }

    async fn apply_load(
        &self,
        result: Result<LoadedReplay, ReplayError>,
    ) -> Result<(), ReplayError> {
        match result {
            Ok(replay) => {
                self.load(replay).await;
                Ok(())
            }
            Err(e) => {
                error!("Replay load failed: {}", e);
                let mut inner = self.inner.lock().await;
                inner.clear();
                inner.touch();
                self.broadcaster.send_lossy(ReplayEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Starts playback from the current position. Does nothing when already playing.
    pub async fn play(&self) -> Result<(), ReplayError> {
        let mut inner = self.inner.lock().await;
        inner.touch();

        if inner.store.is_empty() {
            warn!("Play requested with no frames loaded");
            return Err(ReplayError::NoDataLoaded);
        }
        if inner.state.is_playing {
            debug!("Already playing, ignoring play request");
            return Ok(());
        }

        let token = CancellationToken::new();
        inner.state.is_playing = true;
        inner.playback = Some(token.clone());

        info!(
            "Starting replay at frame {}/{} ({}x)",
            inner.state.frame_index,
            inner.store.len(),
            inner.state.speed
        );
        tokio::spawn(scheduler::playback_loop(
            self.clone(),
            token,
            inner.generation,
        ));
        Ok(())
    }

    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        inner.touch();
        if inner.state.is_playing {
            info!("Pausing replay at frame {}", inner.state.frame_index);
        }
        inner.stop_playback();
    }

    /// Moves to `target` (clamped into the sequence) and pushes that frame right
    /// away, whether playing or not.
    pub async fn seek(&self, target: i64) -> Result<usize, ReplayError> {
        let mut inner = self.inner.lock().await;
        inner.touch();

        if inner.store.is_empty() {
            return Err(ReplayError::NoDataLoaded);
        }
        let last = inner.store.len() as i64 - 1;
        let index = target.clamp(0, last) as usize;
        inner.state.frame_index = index;

        let update = FrameUpdate::render(index, inner.store.get(index)?, &inner.store);
        self.broadcaster
            .send_lossy(ReplayEvent::Frame(Box::new(update)));
        debug!("Seeked to frame {}", index);
        Ok(index)
    }

    /// Sets the speed multiplier, clamped into the configured range. Returns the
    /// speed actually applied.
    pub async fn set_speed(&self, speed: f64) -> Result<f64, ReplayError> {
        if !speed.is_finite() {
            return Err(ReplayError::InvalidSpeed { speed });
        }
        let speed = self.config.clamp_speed(speed);

        let mut inner = self.inner.lock().await;
        inner.touch();
        inner.state.speed = speed;
        debug!("Playback speed set to {}x", speed);
        Ok(speed)
    }

    /// Applies a viewer command. A rejected command is reported to viewers as an
    /// `error` event and leaves the session unchanged.
    pub async fn handle_command(&self, command: Command) -> Result<(), ReplayError> {
        let result = match command {
            Command::Play => self.play().await,
            Command::Pause => {
                self.pause().await;
                Ok(())
            }
            Command::Seek { index } => self.seek(index).await.map(|_| ()),
            Command::SetSpeed { speed } => self.set_speed(speed).await.map(|_| ()),
        };

        if let Err(e) = &result {
            if e.is_state_error() {
                warn!("Rejected command: {}", e);
            }
            self.broadcaster.send_lossy(ReplayEvent::Error {
                message: e.to_string(),
            });
        }
        result
    }

    /// Registers a new viewer. It receives the current session description
    /// first when a replay is loaded.
    pub async fn connect(&self) -> Viewer {
        self.evict_if_idle().await;

        let mut inner = self.inner.lock().await;
        inner.touch();
        let viewer = self.broadcaster.subscribe();
        match inner.initial_state() {
            Some(initial_state) => {
                debug!("Viewer connected, sending initial state");
                viewer.with_pending(ReplayEvent::InitialState(Box::new(initial_state)))
            }
            None => {
                debug!("Viewer connected, no race data loaded yet");
                viewer
            }
        }
    }

    /// Drops the loaded frames when the session is loaded, paused, and has been
    /// idle for longer than the configured timeout. The check and the eviction
    /// happen under the same lock.
    pub async fn evict_if_idle(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.store.is_empty() || inner.state.is_playing {
            return false;
        }

        let idle = inner.state.last_activity.elapsed();
        if idle <= self.config.idle_timeout() {
            return false;
        }

        info!(
            "Cleaning up old replay data (idle {:.0}s)",
            idle.as_secs_f64()
        );
        inner.clear();
        true
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn status(&self) -> ReplayStatus {
        let inner = self.inner.lock().await;
        ReplayStatus {
            has_session: inner.replay.is_some(),
            has_frames: !inner.store.is_empty(),
            total_frames: inner.store.len(),
            original_total: inner.store.original_len(),
            current_frame: inner.state.frame_index,
            is_playing: inner.state.is_playing,
            speed: inner.state.speed,
            viewers: self.broadcaster.viewer_count(),
        }
    }

    pub async fn timeline_events(&self) -> Vec<TimelineEvent> {
        self.inner
            .lock()
            .await
            .replay
            .as_ref()
            .map(|r| r.events.clone())
            .unwrap_or_default()
    }
}
