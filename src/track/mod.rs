// Track layout: centerline points and the drivable corridor derived from them

pub mod geometry;

pub use geometry::{TrackGeometry, derive_corridor};

use serde::{Deserialize, Serialize};

/// Represents a 2D coordinate point in track units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}
