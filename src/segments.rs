// src/segments.rs - Principal direction per trace segment

use nalgebra::{Matrix3, Point3, SymmetricEigen, Unit, Vector3};

use crate::errors::{DyneinError, Result};

/// Unit vector along the dominant axis of one segment. Sign is arbitrary.
pub type DirectionVector = Unit<Vector3<f64>>;

/// Relative tolerance used to detect a tie for the largest eigenvalue
const DEGENERACY_TOLERANCE: f64 = 1e-9;

/// Ordered 3-D points of a single doublet in acquisition order
#[derive(Debug, Clone, PartialEq)]
pub struct DoubletTrace {
    pub doublet: u8,
    pub points: Vec<Point3<f64>>,
}

impl DoubletTrace {
    pub fn new(doublet: u8, points: Vec<Point3<f64>>) -> Self {
        Self { doublet, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// How a trace is cut into equal segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    pub segment_length: usize,
    pub used_points: usize,
    /// Trailing points that belong to no segment
    pub dropped_points: usize,
}

/// Floor-divide `trace_len` into `num_segments` segments. The remainder is dropped, never spread.
pub fn segment_layout(trace_len: usize, num_segments: usize) -> Result<SegmentLayout> {
    if num_segments == 0 {
        return Err(DyneinError::Config(
            "num_segments must be > 0".to_string(),
        ));
    }

    let segment_length = trace_len / num_segments;
    let used_points = segment_length * num_segments;

    Ok(SegmentLayout {
        segment_length,
        used_points,
        dropped_points: trace_len - used_points,
    })
}

/// Fit one direction vector per segment of `trace`.
///
/// Each segment is centred on its centroid and the eigenvector of the largest
/// eigenvalue of its scatter matrix is taken as the segment axis. Segments with
/// fewer than two points, coincident points, or a tie for the largest
/// eigenvalue are rejected with [`DyneinError::DegenerateSegment`].
pub fn fit_segments(trace: &DoubletTrace, num_segments: usize) -> Result<Vec<DirectionVector>> {
    let layout = segment_layout(trace.len(), num_segments)?;

    (0..num_segments)
        .map(|index| {
            let start = index * layout.segment_length;
            let segment = &trace.points[start..start + layout.segment_length];
            fit_direction(segment).map_err(|reason| DyneinError::DegenerateSegment {
                doublet: trace.doublet,
                segment: index,
                reason,
            })
        })
        .collect()
}

/// Principal axis of a point cloud. Errors carry a human-readable reason only.
fn fit_direction(points: &[Point3<f64>]) -> std::result::Result<DirectionVector, String> {
    if points.len() < 2 {
        return Err(format!("{} point(s), at least 2 required", points.len()));
    }

    if points.iter().all(|p| p == &points[0]) {
        return Err("all points coincide".to_string());
    }

    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;

    let mut scatter = Matrix3::<f64>::zeros();
    for p in points {
        let d = p.coords - centroid;
        scatter += d * d.transpose();
    }

    // Centred scatter only, no tolerance tied to absolute position
    if scatter.trace() <= 0.0 {
        return Err("all points coincide".to_string());
    }

    let eigen = SymmetricEigen::new(scatter);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let largest = eigen.eigenvalues[order[0]];
    let second = eigen.eigenvalues[order[1]];
    if largest - second <= DEGENERACY_TOLERANCE * largest {
        return Err("no unique dominant axis (tied eigenvalues)".to_string());
    }

    let axis: Vector3<f64> = eigen.eigenvectors.column(order[0]).into_owned();
    Unit::try_new(axis, f64::EPSILON).ok_or_else(|| "zero-length principal axis".to_string())
}

/// Raw dot product of two directions, no sign correction
pub fn direction_dot(a: &DirectionVector, b: &DirectionVector) -> f64 {
    a.into_inner().dot(&b.into_inner())
}

/// Flip each direction so its dot product with the previous one is non-negative
pub fn align_direction_signs(directions: &[DirectionVector]) -> Vec<DirectionVector> {
    let mut aligned: Vec<DirectionVector> = Vec::with_capacity(directions.len());

    for direction in directions {
        let next = match aligned.last() {
            Some(prev) if direction_dot(prev, direction) < 0.0 => {
                Unit::new_unchecked(-direction.into_inner())
            }
            _ => *direction,
        };
        aligned.push(next);
    }

    aligned
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn line_trace(n: usize, dir: Vector3<f64>) -> DoubletTrace {
        let points = (0..n)
            .map(|i| Point3::from(Vector3::new(1.0, 2.0, 3.0) + dir * i as f64))
            .collect();
        DoubletTrace::new(1, points)
    }

    #[test]
    fn colinear_points_give_parallel_directions() {
        let trace = line_trace(20, Vector3::new(1.0, 1.0, 0.5));
        let directions = fit_segments(&trace, 5).unwrap();
        assert_eq!(directions.len(), 5);
        for pair in directions.windows(2) {
            assert_approx_eq!(direction_dot(&pair[0], &pair[1]).abs(), 1.0, 1e-9);
        }
    }

    #[test]
    fn directions_are_unit_length() {
        let trace = line_trace(12, Vector3::new(3.0, -4.0, 12.0));
        for direction in fit_segments(&trace, 3).unwrap() {
            assert_approx_eq!(direction.norm(), 1.0, 1e-12);
            assert_approx_eq!(direction.z.abs(), 12.0 / 13.0, 1e-9);
        }
    }

    #[test]
    fn truncation_drops_trailing_points() {
        let layout = segment_layout(23, 10).unwrap();
        assert_eq!(layout.segment_length, 2);
        assert_eq!(layout.used_points, 20);
        assert_eq!(layout.dropped_points, 3);
        assert_eq!(layout.used_points + layout.dropped_points, 23);
    }

    #[test]
    fn trailing_points_do_not_affect_fit() {
        let mut trace = line_trace(20, Vector3::x());
        // Off-axis junk past the last full segment
        trace.points.push(Point3::new(0.0, 50.0, 0.0));
        trace.points.push(Point3::new(0.0, -50.0, 9.0));
        let directions = fit_segments(&trace, 5).unwrap();
        for direction in directions {
            assert_approx_eq!(direction.x.abs(), 1.0, 1e-9);
        }
    }

    #[test]
    fn zero_segments_is_rejected() {
        let trace = line_trace(10, Vector3::x());
        assert!(matches!(fit_segments(&trace, 0), Err(DyneinError::Config(_))));
    }

    #[test]
    fn short_trace_is_degenerate() {
        let trace = line_trace(5, Vector3::x());
        match fit_segments(&trace, 10) {
            Err(DyneinError::DegenerateSegment { doublet, segment, .. }) => {
                assert_eq!(doublet, 1);
                assert_eq!(segment, 0);
            }
            other => panic!("expected degenerate segment, got {:?}", other),
        }
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let trace = DoubletTrace::new(4, vec![Point3::new(0.1, 0.2, 0.3); 6]);
        assert!(matches!(
            fit_segments(&trace, 2),
            Err(DyneinError::DegenerateSegment { doublet: 4, .. })
        ));
    }

    #[test]
    fn isotropic_segment_is_degenerate() {
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let trace = DoubletTrace::new(2, points);
        assert!(matches!(
            fit_segments(&trace, 1),
            Err(DyneinError::DegenerateSegment { doublet: 2, segment: 0, .. })
        ));
    }

    #[test]
    fn fit_does_not_depend_on_position() {
        for offset in [0.0, 1e5] {
            let points = (0..8)
                .map(|i| Point3::new(offset + i as f64, offset, offset))
                .collect();
            let directions = fit_segments(&DoubletTrace::new(1, points), 2).unwrap();
            assert_eq!(directions.len(), 2);
            for direction in directions {
                assert_approx_eq!(direction.x.abs(), 1.0, 1e-9);
            }
        }
    }

    #[test]
    fn coincident_points_far_from_origin_are_degenerate() {
        let trace = DoubletTrace::new(3, vec![Point3::new(1e5 + 0.1, -2e5, 7e4); 4]);
        assert!(matches!(
            fit_segments(&trace, 1),
            Err(DyneinError::DegenerateSegment { doublet: 3, segment: 0, .. })
        ));
    }

    #[test]
    fn aligned_signs_have_non_negative_dots() {
        let x = Unit::new_normalize(Vector3::x());
        let flipped = Unit::new_normalize(-Vector3::x());
        let directions = vec![x, flipped, x, flipped];
        let aligned = align_direction_signs(&directions);
        for pair in aligned.windows(2) {
            assert!(direction_dot(&pair[0], &pair[1]) >= 0.0);
        }
        assert_eq!(aligned[0], x);
    }
}
