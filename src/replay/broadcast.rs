// Push channel: replay events fanned out to every connected viewer

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    ReplayError,
    telemetry::{Frame, TimelineEvent, Weather},
    track::TrackGeometry,
};

use super::store::FrameStore;

/// Sent once per viewer on connect and to everybody after a load
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InitialState {
    pub total_frames: usize,
    pub original_total: usize,
    pub event_name: String,
    pub circuit_name: String,
    pub country: String,
    pub year: u16,
    pub round: u16,
    pub total_laps: u32,
    pub track_data: Option<TrackGeometry>,
    pub race_events: Vec<TimelineEvent>,
}

/// Per-driver state as viewers render it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RenderedDriver {
    pub code: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub lap: u32,
    pub position: u32,
    pub tyre: u8,
    pub tyre_life: f64,
    pub throttle: f64,
    pub brake: f64,
    pub gear: u8,
    pub drs: u8,
    pub is_out: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RenderedWeather {
    pub track_temp: Option<f64>,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rain_state: String,
}

impl From<&Weather> for RenderedWeather {
    fn from(weather: &Weather) -> Self {
        Self {
            track_temp: weather.track_temp,
            air_temp: weather.air_temp,
            humidity: weather.humidity,
            wind_speed: weather.wind_speed,
            rain_state: weather
                .rain_state
                .clone()
                .unwrap_or_else(|| "DRY".to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FrameUpdate {
    pub frame: usize,
    pub total_frames: usize,
    pub time: f64,
    pub drivers: Vec<RenderedDriver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<RenderedWeather>,
}

impl FrameUpdate {
    pub fn render(index: usize, frame: &Frame, store: &FrameStore) -> Self {
        let drivers = frame
            .drivers
            .iter()
            .map(|(code, state)| RenderedDriver {
                code: code.clone(),
                color: store.color_of(code).to_hex(),
                x: state.x,
                y: state.y,
                speed: state.speed,
                lap: state.lap,
                position: state.position,
                tyre: state.tyre,
                tyre_life: state.tyre_life,
                throttle: state.throttle,
                brake: state.brake,
                gear: state.gear,
                drs: state.drs,
                is_out: state.is_out,
            })
            .collect();

        Self {
            frame: index,
            total_frames: store.len(),
            time: frame.t,
            drivers,
            weather: frame.weather.as_ref().map(RenderedWeather::from),
        }
    }
}

/// Events pushed to viewers
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ReplayEvent {
    InitialState(Box<InitialState>),
    Frame(Box<FrameUpdate>),
    EndOfReplay,
    Error { message: String },
}

/// Fan-out of replay events.
///
/// Every viewer gets its own bounded queue. A viewer that falls behind loses the
/// oldest events instead of slowing down the scheduler.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    sender: broadcast::Sender<ReplayEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Pushes an event to every connected viewer. Never blocks.
    pub fn send(&self, event: ReplayEvent) -> Result<usize, ReplayError> {
        self.sender
            .send(event)
            .map_err(|_| ReplayError::TransientBroadcastError)
    }

    /// Like `send`, but a failed push is only logged
    pub fn send_lossy(&self, event: ReplayEvent) {
        if let Err(e) = self.send(event) {
            debug!("{}", e);
        }
    }

    pub fn subscribe(&self) -> Viewer {
        Viewer {
            receiver: self.sender.subscribe(),
            pending: None,
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One connected viewer's end of the push channel
#[derive(Debug)]
pub struct Viewer {
    receiver: broadcast::Receiver<ReplayEvent>,
    pending: Option<ReplayEvent>,
}

impl Viewer {
    pub(crate) fn with_pending(mut self, event: ReplayEvent) -> Self {
        self.pending = Some(event);
        self
    }

    /// Waits for the next event. Returns `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<ReplayEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Viewer fell behind, dropped {} replay events", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of `recv` for viewers served from a plain thread. Must not
    /// be called from async code.
    pub fn blocking_recv(&mut self) -> Option<ReplayEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Viewer fell behind, dropped {} replay events", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ReplayEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!("Viewer fell behind, dropped {} replay events", missed);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every queued event
    pub fn drain(&mut self) -> Vec<ReplayEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
