// Timeline markers: retirements and track status windows

use std::collections::BTreeSet;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{Frame, TrackStatusInterval};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "dnf")]
    Retirement,
    #[serde(rename = "yellow")]
    YellowFlag,
    #[serde(rename = "sc")]
    SafetyCar,
    #[serde(rename = "red")]
    RedFlag,
    #[serde(rename = "vsc")]
    VirtualSafetyCar,
}

impl EventKind {
    /// Maps a race control track status code to the marker it produces.
    /// "6" (VSC deployed) and "7" (VSC ending) both map to the VSC marker.
    pub fn from_status_code(code: &str) -> Option<Self> {
        match code.trim() {
            "2" => Some(EventKind::YellowFlag),
            "4" => Some(EventKind::SafetyCar),
            "5" => Some(EventKind::RedFlag),
            "6" | "7" => Some(EventKind::VirtualSafetyCar),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "frame")]
    pub start_frame: usize,
    pub end_frame: Option<usize>,
    /// Driver code for retirements, empty otherwise
    pub label: String,
    pub lap: Option<u32>,
}

/// Parameters of the extraction passes
#[derive(Clone, Copy, Debug)]
pub struct ExtractionParams {
    /// Every n-th frame is compared against the previous sample
    pub sample_stride: usize,
    /// Frames per second of the (possibly downsampled) sequence
    pub frames_per_second: f64,
    /// Window length for status intervals without an end time
    pub default_window_s: f64,
}

/// Scans the frames and status intervals once and returns the timeline markers.
///
/// Retirement markers come first, in frame order, followed by status windows in
/// the order the intervals were given. The result is not sorted by frame.
pub fn extract_timeline_events(
    frames: &[Frame],
    track_statuses: &[TrackStatusInterval],
    params: &ExtractionParams,
) -> Vec<TimelineEvent> {
    if frames.is_empty() {
        return Vec::new();
    }

    let mut events = retirement_events(frames, params.sample_stride);
    let retirements = events.len();
    events.extend(status_events(frames.len(), track_statuses, params));

    debug!(
        "Extracted {} timeline events ({} retirements) from {} frames",
        events.len(),
        retirements,
        frames.len()
    );
    events
}

fn retirement_events(frames: &[Frame], sample_stride: usize) -> Vec<TimelineEvent> {
    let stride = sample_stride.max(1);

    (0..frames.len())
        .step_by(stride)
        .tuple_windows()
        .flat_map(|(prev_idx, cur_idx)| {
            let prev = &frames[prev_idx];
            let current: BTreeSet<&String> = frames[cur_idx].drivers.keys().collect();

            prev.drivers
                .iter()
                .filter(move |(code, _)| !current.contains(code))
                .map(move |(code, state)| TimelineEvent {
                    kind: EventKind::Retirement,
                    start_frame: cur_idx,
                    end_frame: None,
                    label: code.clone(),
                    lap: Some(state.lap),
                })
        })
        .collect()
}

fn status_events(
    n_frames: usize,
    track_statuses: &[TrackStatusInterval],
    params: &ExtractionParams,
) -> Vec<TimelineEvent> {
    let fps = params.frames_per_second;
    let default_window = (params.default_window_s * fps) as i64;

    track_statuses
        .iter()
        .filter_map(|status| {
            let kind = EventKind::from_status_code(&status.status)?;

            let start = (status.start_time * fps).floor() as i64;
            let end = match status.end_time {
                Some(end_time) => (end_time * fps).floor() as i64,
                None => start + default_window,
            };

            if end <= 0 {
                return None;
            }

            Some(TimelineEvent {
                kind,
                start_frame: start.max(0) as usize,
                end_frame: Some((end as usize).min(n_frames)),
                label: String::new(),
                lap: None,
            })
        })
        .collect()
}
