// Drivable corridor derivation from a centerline trace

use log::debug;
use serde::{Deserialize, Serialize};

use super::Point2D;
use crate::errors::ReplayError;

/// Tangent norms below this are treated as zero (duplicate consecutive points)
const MIN_TANGENT_NORM: f64 = 1e-9;

/// Centerline plus inner and outer boundaries, one offset point per centerline point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackGeometry {
    pub centerline: Vec<Point2D>,
    pub inner: Vec<Point2D>,
    pub outer: Vec<Point2D>,
    /// DRS channel of the lap the centerline was taken from, empty when unknown
    #[serde(default)]
    pub drs: Vec<u8>,
}

impl TrackGeometry {
    pub fn len(&self) -> usize {
        self.centerline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centerline.is_empty()
    }

    pub fn with_drs(mut self, drs: Vec<u8>) -> Self {
        self.drs = drs;
        self
    }
}

/// Offset the centerline by half of `width` on each side.
///
/// The tangent at every point is estimated with central differences (one sided
/// at both ends), normalized, and rotated 90 degrees to the left to give the
/// normal. Inner points sit at `-normal * width / 2`, outer points at
/// `+normal * width / 2`.
///
/// # Errors
///
/// Returns `ReplayError::GeometryError` when fewer than two points are given.
pub fn derive_corridor(centerline: &[Point2D], width: f64) -> Result<TrackGeometry, ReplayError> {
    if centerline.len() < 2 {
        return Err(ReplayError::GeometryError {
            reason: format!(
                "need at least 2 centerline points, got {}",
                centerline.len()
            ),
        });
    }

    let half_width = width / 2.0;
    let last = centerline.len() - 1;
    let mut inner = Vec::with_capacity(centerline.len());
    let mut outer = Vec::with_capacity(centerline.len());

    for (i, point) in centerline.iter().enumerate() {
        let (dx, dy) = match i {
            0 => (
                centerline[1].x - centerline[0].x,
                centerline[1].y - centerline[0].y,
            ),
            i if i == last => (
                centerline[last].x - centerline[last - 1].x,
                centerline[last].y - centerline[last - 1].y,
            ),
            i => (
                (centerline[i + 1].x - centerline[i - 1].x) / 2.0,
                (centerline[i + 1].y - centerline[i - 1].y) / 2.0,
            ),
        };

        let mut norm = (dx * dx + dy * dy).sqrt();
        if norm < MIN_TANGENT_NORM {
            norm = 1.0;
        }
        let (tx, ty) = (dx / norm, dy / norm);
        let (nx, ny) = (-ty, tx);

        inner.push(Point2D::new(
            point.x - nx * half_width,
            point.y - ny * half_width,
        ));
        outer.push(Point2D::new(
            point.x + nx * half_width,
            point.y + ny * half_width,
        ));
    }

    debug!(
        "Derived track corridor: {} points, width {}",
        centerline.len(),
        width
    );

    Ok(TrackGeometry {
        centerline: centerline.to_vec(),
        inner,
        outer,
        drs: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_fewer_than_two_points_is_an_error() {
        assert!(matches!(
            derive_corridor(&[], 200.0),
            Err(ReplayError::GeometryError { .. })
        ));
        assert!(matches!(
            derive_corridor(&[Point2D::new(1.0, 1.0)], 200.0),
            Err(ReplayError::GeometryError { .. })
        ));
    }

    #[test]
    fn test_straight_line_along_x() {
        let centerline: Vec<Point2D> = (0..5).map(|i| Point2D::new(i as f64 * 10.0, 0.0)).collect();
        let geometry = derive_corridor(&centerline, 200.0).unwrap();

        assert_eq!(geometry.inner.len(), centerline.len());
        assert_eq!(geometry.outer.len(), centerline.len());
        for (i, c) in centerline.iter().enumerate() {
            // Heading +x, so the left normal points to +y
            assert!((geometry.outer[i].x - c.x).abs() < EPS);
            assert!((geometry.outer[i].y - 100.0).abs() < EPS);
            assert!((geometry.inner[i].x - c.x).abs() < EPS);
            assert!((geometry.inner[i].y + 100.0).abs() < EPS);
        }
    }

    #[test]
    fn test_duplicate_points_do_not_produce_nan() {
        let centerline = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(0.0, 0.0),
        ];
        let geometry = derive_corridor(&centerline, 200.0).unwrap();
        for p in geometry.inner.iter().chain(geometry.outer.iter()) {
            assert!(p.x.is_finite() && p.y.is_finite());
        }
        // Zero tangent means zero normal: the boundaries collapse onto the centerline
        assert_eq!(geometry.inner, centerline);
    }

    #[test]
    fn test_corner_uses_central_difference() {
        let centerline = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ];
        let geometry = derive_corridor(&centerline, 2.0).unwrap();
        // Middle tangent is (5, 5) normalized, left normal (-1, 1)/sqrt(2)
        let s = 1.0 / 2f64.sqrt();
        assert!((geometry.outer[1].x - (10.0 - s)).abs() < EPS);
        assert!((geometry.outer[1].y - s).abs() < EPS);
        assert!((geometry.inner[1].x - (10.0 + s)).abs() < EPS);
        assert!((geometry.inner[1].y + s).abs() < EPS);
    }

    #[test]
    fn test_with_drs_keeps_boundaries() {
        let centerline = vec![Point2D::new(0.0, 0.0), Point2D::new(0.0, 5.0)];
        let geometry = derive_corridor(&centerline, 10.0)
            .unwrap()
            .with_drs(vec![0, 12]);
        assert_eq!(geometry.drs, vec![0, 12]);
        assert_eq!(geometry.len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Colinear centerlines produce parallel boundaries at exactly half the
        // width on each side
        #[test]
        fn prop_straight_line_offsets_are_half_width(
            origin_x in -1000.0f64..1000.0,
            origin_y in -1000.0f64..1000.0,
            angle in 0.0f64..std::f64::consts::TAU,
            step in 0.5f64..50.0,
            points in 2usize..40,
            width in 1.0f64..400.0,
        ) {
            let (dir_x, dir_y) = (angle.cos(), angle.sin());
            let centerline: Vec<Point2D> = (0..points)
                .map(|i| Point2D::new(origin_x + dir_x * step * i as f64, origin_y + dir_y * step * i as f64))
                .collect();

            let geometry = derive_corridor(&centerline, width).unwrap();
            prop_assert_eq!(geometry.inner.len(), points);
            prop_assert_eq!(geometry.outer.len(), points);

            for i in 0..points {
                let c = centerline[i];
                let inner = geometry.inner[i];
                let outer = geometry.outer[i];
                prop_assert!((c.distance_to(&inner) - width / 2.0).abs() < 1e-6);
                prop_assert!((c.distance_to(&outer) - width / 2.0).abs() < 1e-6);
                // Offsets are perpendicular to the direction of travel
                let dot = (outer.x - c.x) * dir_x + (outer.y - c.y) * dir_y;
                prop_assert!(dot.abs() < 1e-6);
                // and on opposite sides
                prop_assert!(((inner.x + outer.x) / 2.0 - c.x).abs() < 1e-6);
                prop_assert!(((inner.y + outer.y) / 2.0 - c.y).abs() < 1e-6);
            }
        }
    }
}
