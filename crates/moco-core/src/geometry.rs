//! Projection geometry.
//!
//! A geometry is an ordered, immutable list of per-projection records. The
//! projectors only need two things from a record: the homogeneous source
//! position and the matrix mapping a detector physical point `(u, v, 0)` to
//! fixed (world) physical space.

use nalgebra::{Matrix3, Rotation3, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use crate::transform::HomogeneousMatrix;

/// Accessor contract between a projection geometry and the projectors.
pub trait GeometryRecord {
    /// Homogeneous source position in fixed physical space.
    ///
    /// `w = 0` encodes a parallel-beam source at infinity; the vector then
    /// points from the detector towards the source.
    fn source_position(&self) -> Vector4<f64>;

    /// Detector physical point `(u, v, 0)` to fixed physical space.
    fn projection_to_fixed_matrix(&self) -> HomogeneousMatrix;
}

/// Acquisition parameters of one projection on a circular trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircularParameters {
    /// Gantry angle in degrees, rotation about the y axis.
    pub gantry_angle: f64,
    /// Source to isocenter distance.
    pub source_to_isocenter: f64,
    /// Source to detector distance; zero selects a parallel beam.
    pub source_to_detector: f64,
    /// Detector offsets along `u` and `v`.
    pub detector_offset: [f64; 2],
}

/// One projection's geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    parameters: CircularParameters,
    source: Vector4<f64>,
    projection_to_fixed: HomogeneousMatrix,
}

impl ProjectionRecord {
    /// Build a record, deriving the source position and detector matrix.
    pub fn circular(parameters: CircularParameters) -> Self {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), parameters.gantry_angle.to_radians());
        let r: Matrix3<f64> = rotation.into_inner();

        let parallel = parameters.source_to_detector == 0.0;
        let source = if parallel {
            (r * Vector3::z()).push(0.0)
        } else {
            (r * Vector3::new(0.0, 0.0, parameters.source_to_isocenter)).push(1.0)
        };

        let depth = if parallel {
            0.0
        } else {
            parameters.source_to_isocenter - parameters.source_to_detector
        };
        let detector = Vector3::new(parameters.detector_offset[0], parameters.detector_offset[1], depth);
        let projection_to_fixed = HomogeneousMatrix::from_parts(r, r * detector);

        Self {
            parameters,
            source,
            projection_to_fixed,
        }
    }

    pub fn parameters(&self) -> &CircularParameters {
        &self.parameters
    }

    pub fn is_parallel(&self) -> bool {
        self.source[3] == 0.0
    }
}

impl GeometryRecord for ProjectionRecord {
    fn source_position(&self) -> Vector4<f64> {
        self.source
    }

    fn projection_to_fixed_matrix(&self) -> HomogeneousMatrix {
        self.projection_to_fixed
    }
}

/// Ordered per-projection geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionGeometry {
    records: Vec<ProjectionRecord>,
}

impl ProjectionGeometry {
    /// Number of projections.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record of projection `i`, if present.
    pub fn record(&self, i: usize) -> Option<&ProjectionRecord> {
        self.records.get(i)
    }

    pub fn records(&self) -> &[ProjectionRecord] {
        &self.records
    }
}

/// Builder for circular-trajectory geometries.
///
/// ```rust
/// use moco_core::geometry::CircularGeometry;
///
/// let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
/// assert_eq!(geometry.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CircularGeometry {
    source_to_isocenter: f64,
    source_to_detector: f64,
    detector_offset: [f64; 2],
    angles: Vec<f64>,
}

impl CircularGeometry {
    /// Cone-beam trajectory.
    pub fn new(source_to_isocenter: f64, source_to_detector: f64) -> Self {
        Self {
            source_to_isocenter,
            source_to_detector,
            detector_offset: [0.0; 2],
            angles: Vec::new(),
        }
    }

    /// Parallel-beam trajectory.
    pub fn parallel() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn with_detector_offset(mut self, offset: [f64; 2]) -> Self {
        self.detector_offset = offset;
        self
    }

    /// Append one projection at `angle` degrees.
    pub fn add_projection(mut self, angle: f64) -> Self {
        self.angles.push(angle);
        self
    }

    pub fn with_angles(mut self, angles: impl IntoIterator<Item = f64>) -> Self {
        self.angles.extend(angles);
        self
    }

    /// `count` projections evenly spread over `arc` degrees starting at `first`.
    pub fn with_arc(self, first: f64, arc: f64, count: usize) -> Self {
        let step = if count == 0 { 0.0 } else { arc / count as f64 };
        self.with_angles((0..count).map(move |i| first + step * i as f64))
    }

    pub fn build(self) -> ProjectionGeometry {
        let records = self
            .angles
            .iter()
            .map(|&gantry_angle| {
                ProjectionRecord::circular(CircularParameters {
                    gantry_angle,
                    source_to_isocenter: self.source_to_isocenter,
                    source_to_detector: self.source_to_detector,
                    detector_offset: self.detector_offset,
                })
            })
            .collect();
        ProjectionGeometry { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-12)
    }

    #[test]
    fn test_parallel_source_direction() {
        let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
        let s0 = geometry.record(0).unwrap().source_position();
        let s90 = geometry.record(1).unwrap().source_position();
        assert_eq!(s0[3], 0.0);
        assert!(close([s0[0], s0[1], s0[2]], [0.0, 0.0, 1.0]));
        assert!(close([s90[0], s90[1], s90[2]], [1.0, 0.0, 0.0]));
        assert!(geometry.record(1).unwrap().is_parallel());
    }

    #[test]
    fn test_cone_detector_plane() {
        let geometry = CircularGeometry::new(1000.0, 1500.0)
            .with_detector_offset([2.0, 0.0])
            .add_projection(0.0)
            .build();
        let record = geometry.record(0).unwrap();
        assert_eq!(record.source_position(), Vector4::new(0.0, 0.0, 1000.0, 1.0));
        let m = record.projection_to_fixed_matrix();
        assert!(close(m.transform_point([1.0, 3.0, 0.0]), [3.0, 3.0, -500.0]));
    }

    #[test]
    fn test_rotated_detector_axes() {
        let geometry = CircularGeometry::parallel().add_projection(90.0).build();
        let m = geometry.record(0).unwrap().projection_to_fixed_matrix();
        assert!(close(m.transform_point([1.0, 2.0, 0.0]), [0.0, 2.0, -1.0]));
    }

    #[test]
    fn test_arc() {
        let geometry = CircularGeometry::parallel().with_arc(10.0, 360.0, 4).build();
        let angles: Vec<f64> = geometry.records().iter().map(|r| r.parameters().gantry_angle).collect();
        assert_eq!(angles, vec![10.0, 100.0, 190.0, 280.0]);
        assert!(ProjectionGeometry::default().is_empty());
    }
}
