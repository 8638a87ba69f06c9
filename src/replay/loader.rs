// Turns producer output into a replay bundle ready to hand to the session

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::{info, warn};

use crate::{
    ReplayConfig, ReplayError,
    telemetry::{
        DriverState, Frame, LapTrace, RaceTelemetry, SessionKey, SessionMeta, TelemetryProducer,
        TimelineEvent, events::ExtractionParams, extract_timeline_events,
    },
    track::{TrackGeometry, derive_corridor},
};

use super::store::FrameStore;

/// Qualifying segments tried, in order, after the requested one
const SEGMENT_FALLBACK: [&str; 2] = ["Q2", "Q1"];

/// Everything a session needs to start replaying
#[derive(Debug)]
pub struct LoadedReplay {
    pub meta: SessionMeta,
    pub store: FrameStore,
    pub geometry: Option<TrackGeometry>,
    pub events: Vec<TimelineEvent>,
}

/// Downsamples the frames of `telemetry` and extracts the timeline markers from
/// the stored sequence.
pub fn build_replay(
    telemetry: RaceTelemetry,
    geometry: Option<TrackGeometry>,
    config: &ReplayConfig,
) -> LoadedReplay {
    let RaceTelemetry {
        meta,
        frames,
        track_statuses,
        driver_colors,
    } = telemetry;

    let store = FrameStore::from_raw(frames, driver_colors, config.max_frames_in_memory);
    let params = ExtractionParams {
        sample_stride: config.retirement_sample_stride,
        // Status times map onto the stored sequence, not the recorded one
        frames_per_second: config.frames_per_second / store.stride() as f64,
        default_window_s: config.status_default_window_s,
    };
    let events = extract_timeline_events(store.frames(), &track_statuses, &params);

    LoadedReplay {
        meta,
        store,
        geometry,
        events,
    }
}

/// Loads a full session. The track outline comes from the fastest qualifying
/// lap of the same event; when that is unavailable the replay carries no track.
pub fn load_race(
    producer: &mut impl TelemetryProducer,
    key: &SessionKey,
    config: &ReplayConfig,
) -> Result<LoadedReplay, ReplayError> {
    info!(
        "Loading {} round {} session {}",
        key.year, key.round, key.session_type
    );
    let telemetry = producer.race_telemetry(key)?;
    if telemetry.frames.is_empty() {
        return Err(ReplayError::EmptySession {
            year: key.year,
            round: key.round,
            session_type: key.session_type.clone(),
        });
    }

    let geometry = match producer
        .fastest_qualifying_lap(key.year, key.round)
        .and_then(|lap| track_from_lap(&lap, config))
    {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            warn!("Could not build track outline: {}", e);
            None
        }
    };

    let replay = build_replay(telemetry, geometry, config);
    info!(
        "Loaded {}: {} frames, {} timeline events",
        replay.meta.event_name,
        replay.store.len(),
        replay.events.len()
    );
    Ok(replay)
}

/// Loads one driver's qualifying lap as a single-car replay. When the driver has
/// no lap in `segment`, Q2 and then Q1 are tried.
pub fn load_qualifying_lap(
    producer: &mut impl TelemetryProducer,
    key: &SessionKey,
    driver: &str,
    segment: &str,
    config: &ReplayConfig,
) -> Result<LoadedReplay, ReplayError> {
    let (mut meta, colors) = producer.session_info(key)?;

    let mut last_error = None;
    let mut found = None;
    for candidate in std::iter::once(segment)
        .chain(SEGMENT_FALLBACK)
        .unique()
    {
        match producer.driver_qualifying_lap(key, driver, candidate) {
            Ok(lap) => {
                found = Some((candidate, lap));
                break;
            }
            Err(e) => {
                info!("{} has no {} lap, trying next segment", driver, candidate);
                last_error = Some(e);
            }
        }
    }
    let Some((used_segment, lap)) = found else {
        return Err(last_error.unwrap_or_else(|| ReplayError::NoQualifyingLap {
            reason: format!("{} has no qualifying lap", driver),
        }));
    };
    if used_segment != segment {
        warn!(
            "{} has no {} lap, replaying {} instead",
            driver, segment, used_segment
        );
    }

    let frames = lap_frames(driver, &lap);
    if frames.is_empty() {
        return Err(ReplayError::NoQualifyingLap {
            reason: format!("{} {} lap has no samples", driver, used_segment),
        });
    }

    let geometry = match track_from_lap(&lap, config) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            warn!("Could not build track outline: {}", e);
            None
        }
    };

    meta.event_name = format!("{} - {} {}", meta.event_name, driver, used_segment);
    meta.total_laps = 1;

    let mut driver_colors = HashMap::new();
    if let Some(color) = colors.get(driver) {
        driver_colors.insert(driver.to_string(), *color);
    }

    let store = FrameStore::from_raw(frames, driver_colors, config.max_frames_in_memory);
    info!(
        "Loaded {} qualifying lap: {} frames",
        driver,
        store.len()
    );

    Ok(LoadedReplay {
        meta,
        store,
        geometry,
        events: Vec::new(),
    })
}

fn track_from_lap(lap: &LapTrace, config: &ReplayConfig) -> Result<TrackGeometry, ReplayError> {
    derive_corridor(&lap.centerline(), config.track_width)
        .map(|track| track.with_drs(lap.drs.clone()))
}

/// One frame per lap sample with only `driver` on track
fn lap_frames(driver: &str, lap: &LapTrace) -> Vec<Frame> {
    (0..lap.len())
        .map(|i| {
            let state = DriverState {
                x: lap.x[i],
                y: lap.y[i],
                speed: lap.speed.get(i).copied().unwrap_or_default(),
                gear: lap.gear.get(i).copied().unwrap_or_default(),
                throttle: lap.throttle.get(i).copied().unwrap_or_default(),
                brake: lap.brake.get(i).copied().unwrap_or_default(),
                drs: lap.drs.get(i).copied().unwrap_or_default(),
                lap: 1,
                position: 1,
                tyre: 1,
                tyre_life: 0.0,
                is_out: false,
            };
            Frame {
                t: lap.t[i],
                drivers: BTreeMap::from([(driver.to_string(), state)]),
                weather: None,
            }
        })
        .collect()
}
