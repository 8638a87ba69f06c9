use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use itertools::Itertools;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::ReplayError;

use super::{
    Frame, LapTrace, QualifyingResult, RaceTelemetry, Rgb, ScheduleEntry, SessionKey,
    SessionMeta, TrackStatusInterval,
};

const SEGMENTS: [&str; 3] = ["Q1", "Q2", "Q3"];

/// A source of recorded race telemetry.
///
/// This trait abstracts the upstream data provider so the replay engine can work
/// against live timing archives, recorded files or generated test data alike.
/// Loading is expected to be slow (tens of seconds for a full race); callers run
/// it once per session and hand the result to the replay session.
pub trait TelemetryProducer {
    /// Frames, track status intervals, lap count and driver colors for one session.
    fn race_telemetry(&mut self, key: &SessionKey) -> Result<RaceTelemetry, ReplayError>;

    /// Event description and team colors without the (large) frame sequence.
    fn session_info(
        &mut self,
        key: &SessionKey,
    ) -> Result<(SessionMeta, HashMap<String, Rgb>), ReplayError>;

    /// Position trace of the fastest qualifying lap of an event. Used as the
    /// centerline of the track.
    fn fastest_qualifying_lap(&mut self, year: u16, round: u16) -> Result<LapTrace, ReplayError>;

    /// Rounds of `year` the producer has data for, ordered by round.
    fn schedule(&mut self, year: u16) -> Result<Vec<ScheduleEntry>, ReplayError>;

    /// Qualifying classification of an event, best segment reached first.
    fn qualifying_results(
        &mut self,
        year: u16,
        round: u16,
    ) -> Result<Vec<QualifyingResult>, ReplayError>;

    /// Fastest lap of one driver in one qualifying segment ("Q1", "Q2", "Q3").
    fn driver_qualifying_lap(
        &mut self,
        key: &SessionKey,
        driver: &str,
        segment: &str,
    ) -> Result<LapTrace, ReplayError>;
}

/// One line of a JSON Lines telemetry recording
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TelemetryRecord {
    /// Starts a new session; following lines belong to it
    Session(SessionMeta),
    DriverColor { code: String, color: Rgb },
    Frame(Box<Frame>),
    TrackStatus(TrackStatusInterval),
    QualifyingLap(LapTrace),
}

#[derive(Debug, Default)]
struct RecordedSession {
    telemetry: RaceTelemetry,
    laps: Vec<LapTrace>,
}

/// Telemetry producer backed by a JSON Lines recording.
///
/// A recording can hold several sessions. Each starts with a `Session` line and
/// collects every following line until the next `Session` line.
#[derive(Debug, Default)]
pub struct JsonlTelemetryProducer {
    sessions: HashMap<SessionKey, RecordedSession>,
}

impl JsonlTelemetryProducer {
    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let records = serde_jsonlines::json_lines(path)
            .map_err(|e| ReplayError::TelemetryLoaderError { source: e })?
            .collect::<Result<Vec<TelemetryRecord>, std::io::Error>>()
            .map_err(|e| {
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
                ) {
                    ReplayError::TelemetryParseError {
                        description: format!("{:?}: {}", path, e),
                    }
                } else {
                    ReplayError::TelemetryLoaderError { source: e }
                }
            })?;

        let producer = Self::from_records(records)?;
        info!(
            "Loaded {:?}, found {} recorded sessions",
            path,
            producer.sessions.len()
        );
        Ok(producer)
    }

    pub fn from_records(
        records: impl IntoIterator<Item = TelemetryRecord>,
    ) -> Result<Self, ReplayError> {
        let mut sessions: HashMap<SessionKey, RecordedSession> = HashMap::new();
        let mut current: Option<SessionKey> = None;

        for record in records {
            match record {
                TelemetryRecord::Session(meta) => {
                    let key = SessionKey::new(meta.year, meta.round, &meta.session_type);
                    if sessions.contains_key(&key) {
                        warn!("Session {:?} recorded twice, keeping the last one", key);
                    }
                    sessions.insert(
                        key.clone(),
                        RecordedSession {
                            telemetry: RaceTelemetry {
                                meta,
                                ..Default::default()
                            },
                            laps: Vec::new(),
                        },
                    );
                    current = Some(key);
                }
                TelemetryRecord::DriverColor { code, color } => {
                    current_session(&mut sessions, &current)?
                        .telemetry
                        .driver_colors
                        .insert(code, color);
                }
                TelemetryRecord::Frame(frame) => current_session(&mut sessions, &current)?
                    .telemetry
                    .frames
                    .push(*frame),
                TelemetryRecord::TrackStatus(status) => current_session(&mut sessions, &current)?
                    .telemetry
                    .track_statuses
                    .push(status),
                TelemetryRecord::QualifyingLap(lap) => {
                    current_session(&mut sessions, &current)?.laps.push(lap)
                }
            }
        }

        Ok(Self { sessions })
    }

    fn session(&self, key: &SessionKey) -> Result<&RecordedSession, ReplayError> {
        self.sessions
            .get(key)
            .ok_or_else(|| ReplayError::SessionNotFound {
                year: key.year,
                round: key.round,
                session_type: key.session_type.clone(),
            })
    }
}

fn current_session<'a>(
    sessions: &'a mut HashMap<SessionKey, RecordedSession>,
    current: &Option<SessionKey>,
) -> Result<&'a mut RecordedSession, ReplayError> {
    current
        .as_ref()
        .and_then(|key| sessions.get_mut(key))
        .ok_or_else(|| ReplayError::TelemetryParseError {
            description: "telemetry record found before any Session record".to_string(),
        })
}

/// Index of the last segment a driver set a time in, and that time
fn furthest_segment(times: &[Option<f64>; 3]) -> (usize, f64) {
    times
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, time)| time.map(|t| (i, t)))
        .unwrap_or((0, f64::INFINITY))
}

/// Lap duration of a trace, used to pick the fastest one
fn lap_time(lap: &LapTrace) -> f64 {
    match (lap.t.first(), lap.t.last()) {
        (Some(first), Some(last)) => last - first,
        _ => f64::INFINITY,
    }
}

impl TelemetryProducer for JsonlTelemetryProducer {
    fn race_telemetry(&mut self, key: &SessionKey) -> Result<RaceTelemetry, ReplayError> {
        let session = self.session(key)?;
        debug!(
            "Recorded session {:?}: {} frames, {} track statuses",
            key,
            session.telemetry.frames.len(),
            session.telemetry.track_statuses.len()
        );
        Ok(session.telemetry.clone())
    }

    fn session_info(
        &mut self,
        key: &SessionKey,
    ) -> Result<(SessionMeta, HashMap<String, Rgb>), ReplayError> {
        let session = self.session(key)?;
        Ok((
            session.telemetry.meta.clone(),
            session.telemetry.driver_colors.clone(),
        ))
    }

    fn schedule(&mut self, year: u16) -> Result<Vec<ScheduleEntry>, ReplayError> {
        let mut rounds: BTreeMap<u16, ScheduleEntry> = BTreeMap::new();
        for (key, session) in self.sessions.iter().filter(|(key, _)| key.year == year) {
            let entry = rounds.entry(key.round).or_insert_with(|| ScheduleEntry {
                round: key.round,
                event_name: session.telemetry.meta.event_name.clone(),
                location: session.telemetry.meta.location.clone(),
                sessions: Vec::new(),
            });
            entry.sessions.push(key.session_type.clone());
        }

        Ok(rounds
            .into_values()
            .map(|mut entry| {
                entry.sessions.sort();
                entry
            })
            .collect())
    }

    fn qualifying_results(
        &mut self,
        year: u16,
        round: u16,
    ) -> Result<Vec<QualifyingResult>, ReplayError> {
        let session = self.session(&SessionKey::qualifying(year, round))?;

        let mut best: BTreeMap<&str, [Option<f64>; 3]> = BTreeMap::new();
        for lap in session.laps.iter().filter(|lap| !lap.is_empty()) {
            let Some(slot) = lap
                .segment
                .as_deref()
                .and_then(|segment| SEGMENTS.iter().position(|s| *s == segment))
            else {
                continue;
            };
            let time = lap_time(lap);
            let times = best.entry(lap.driver.as_str()).or_default();
            times[slot] = Some(times[slot].map_or(time, |current| current.min(time)));
        }

        Ok(best
            .into_iter()
            .sorted_by(|(_, a), (_, b)| {
                let (a_segment, a_time) = furthest_segment(a);
                let (b_segment, b_time) = furthest_segment(b);
                b_segment
                    .cmp(&a_segment)
                    .then_with(|| a_time.total_cmp(&b_time))
            })
            .enumerate()
            .map(|(i, (driver, times))| QualifyingResult {
                position: i as u32 + 1,
                driver: driver.to_string(),
                q1: times[0],
                q2: times[1],
                q3: times[2],
            })
            .collect())
    }

    fn fastest_qualifying_lap(&mut self, year: u16, round: u16) -> Result<LapTrace, ReplayError> {
        let session = self.session(&SessionKey::qualifying(year, round))?;
        session
            .laps
            .iter()
            .filter(|lap| !lap.is_empty())
            .min_by(|a, b| lap_time(a).total_cmp(&lap_time(b)))
            .cloned()
            .ok_or_else(|| ReplayError::NoQualifyingLap {
                reason: format!("no laps recorded for {} round {}", year, round),
            })
    }

    fn driver_qualifying_lap(
        &mut self,
        key: &SessionKey,
        driver: &str,
        segment: &str,
    ) -> Result<LapTrace, ReplayError> {
        let session = self.session(key)?;
        session
            .laps
            .iter()
            .filter(|lap| {
                lap.driver == driver && lap.segment.as_deref() == Some(segment) && !lap.is_empty()
            })
            .min_by(|a, b| lap_time(a).total_cmp(&lap_time(b)))
            .cloned()
            .ok_or_else(|| ReplayError::NoQualifyingLap {
                reason: format!("{} has no {} lap", driver, segment),
            })
    }
}
