use std::collections::HashMap;

use log::{info, warn};

use crate::{
    ReplayError,
    telemetry::{Frame, Rgb},
};

/// Downsampling stride for a sequence of `raw_len` frames under a cap of
/// `max_frames`. Returns 1 when the sequence fits.
///
/// `raw_len / max_frames + 1` keeps the stored length within
/// `(max_frames / 2, max_frames]`.
pub fn downsample_stride(raw_len: usize, max_frames: usize) -> usize {
    if max_frames == 0 || raw_len <= max_frames {
        1
    } else {
        raw_len / max_frames + 1
    }
}

/// Keeps every `stride`-th frame, starting with the first one
pub fn downsample(frames: Vec<Frame>, stride: usize) -> Vec<Frame> {
    if stride <= 1 {
        return frames;
    }
    frames.into_iter().step_by(stride).collect()
}

/// Owner of the frame sequence of the loaded session
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<Frame>,
    original_len: usize,
    stride: usize,
    driver_colors: HashMap<String, Rgb>,
}

impl FrameStore {
    /// Builds a store from a raw sequence, downsampling it when it holds more than
    /// `max_frames` frames. The reduction is lossy and happens only here.
    pub fn from_raw(
        frames: Vec<Frame>,
        driver_colors: HashMap<String, Rgb>,
        max_frames: usize,
    ) -> Self {
        let original_len = frames.len();
        let stride = downsample_stride(original_len, max_frames);
        let frames = downsample(frames, stride);

        if stride > 1 {
            warn!(
                "Too many frames ({}), downsampled by {}x to {} frames (saves ~{:.0}% memory)",
                original_len,
                stride,
                frames.len(),
                (1.0 - frames.len() as f64 / original_len as f64) * 100.0
            );
        } else {
            info!("Frame store holds {} frames", original_len);
        }

        Self {
            frames,
            original_len,
            stride,
            driver_colors,
        }
    }

    pub fn get(&self, index: usize) -> Result<&Frame, ReplayError> {
        self.frames.get(index).ok_or(ReplayError::FrameOutOfRange {
            index,
            len: self.frames.len(),
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of stored (possibly downsampled) frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame count before downsampling, for display
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    pub fn stride(&self) -> usize {
        self.stride.max(1)
    }

    pub fn color_of(&self, code: &str) -> Rgb {
        self.driver_colors
            .get(code)
            .copied()
            .unwrap_or(Rgb::UNKNOWN)
    }

    /// Releases the frame sequence and colors
    pub fn clear(&mut self) {
        self.frames = Vec::new();
        self.driver_colors = HashMap::new();
        self.original_len = 0;
        self.stride = 1;
    }
}
