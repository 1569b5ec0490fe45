//! Per-projection transform composition.
//!
//! Four spaces meet in the projectors: projection index space, physical
//! space, volume sampling space and displacement-field sampling space. A
//! *sampling coordinate* is buffer-relative and shifted by the voxel
//! convention's offset, so buffer element `k` of a volume sits at `k + offset`.

use moco_core::image::ImageMetadata;
use moco_core::transform::HomogeneousMatrix;
use moco_core::{GeometryRecord, VoxelConvention};
use nalgebra::Vector4;
use crate::error::{ReconError, Result};

/// Everything a projector needs for one projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionTransforms {
    /// Projection pixel `(u, v, 0)` relative to the slice start to volume sampling coordinate.
    pub ray_matrix: HomogeneousMatrix,
    /// Homogeneous source in volume sampling coordinates; `w = 0` for a parallel beam.
    pub source: Vector4<f64>,
    /// Volume sampling coordinate to physical point.
    pub index_to_physical: HomogeneousMatrix,
    /// Physical point to displacement-field sampling coordinate.
    pub physical_to_field_index: HomogeneousMatrix,
    /// Physical point to absolute (unshifted) volume index.
    pub physical_to_index: HomogeneousMatrix,
    /// Added to an absolute unshifted index to get a sampling coordinate.
    pub sampling_offset: [f64; 3],
}

impl ProjectionTransforms {
    pub fn is_parallel(&self) -> bool {
        self.source[3] == 0.0
    }

    /// Sampling coordinate of the displaced physical point `physical + displacement`.
    pub fn warped_sampling_coordinate(&self, physical: [f64; 3], displacement: [f64; 3]) -> [f64; 3] {
        let moved = [
            physical[0] + displacement[0],
            physical[1] + displacement[1],
            physical[2] + displacement[2],
        ];
        let index = self.physical_to_index.transform_point(moved);
        [
            index[0] + self.sampling_offset[0],
            index[1] + self.sampling_offset[1],
            index[2] + self.sampling_offset[2],
        ]
    }

    /// Source in the single-precision transfer format.
    pub fn source_wire(&self) -> [f32; 4] {
        [
            self.source[0] as f32,
            self.source[1] as f32,
            self.source[2] as f32,
            self.source[3] as f32,
        ]
    }
}

/// Composes [`ProjectionTransforms`] for a fixed volume, projection stack and
/// displacement-field grid.
///
/// Grid inversions are validated once at construction; composing a single
/// projection cannot fail.
#[derive(Debug, Clone)]
pub struct TransformComposer {
    /// Physical to volume sampling coordinate.
    volume_sampling: HomogeneousMatrix,
    volume_index_to_physical: HomogeneousMatrix,
    volume_physical_to_index: HomogeneousMatrix,
    sampling_offset: [f64; 3],
    projection_index_to_physical: HomogeneousMatrix,
    physical_to_field_index: HomogeneousMatrix,
}

impl TransformComposer {
    /// # Arguments
    /// * `volume` - Grid of the 3D volume being projected
    /// * `stack` - Grid of the projection stack; its third axis is a projection counter
    /// * `field` - Grid of the displacement field, if warping
    pub fn new(
        volume: &ImageMetadata<3>,
        stack: &ImageMetadata<3>,
        field: Option<&ImageMetadata<3>>,
        convention: VoxelConvention,
    ) -> Result<Self> {
        let offset = convention.offset();

        let volume_physical_to_index = volume
            .physical_to_index_matrix()
            .ok_or_else(|| ReconError::invalid_configuration("volume grid is not invertible"))?;
        let buffered = volume.index();
        let sampling_offset = [
            offset - buffered[0] as f64,
            offset - buffered[1] as f64,
            offset - buffered[2] as f64,
        ];
        let volume_sampling = volume_physical_to_index.translated(sampling_offset);
        let volume_index_to_physical = volume_sampling
            .try_inverse()
            .ok_or_else(|| ReconError::invalid_configuration("volume grid is not invertible"))?;

        // The projection counter axis maps to depth zero on the detector.
        let mut projection_index_to_physical = stack.index_to_physical_matrix();
        for c in 0..4 {
            projection_index_to_physical.0[(2, c)] = 0.0;
        }

        let physical_to_field_index = match field {
            Some(field) => {
                let to_index = field.physical_to_index_matrix().ok_or_else(|| {
                    ReconError::invalid_configuration("displacement field grid is not invertible")
                })?;
                let buffered = field.index();
                to_index.translated([
                    offset - buffered[0] as f64,
                    offset - buffered[1] as f64,
                    offset - buffered[2] as f64,
                ])
            }
            None => HomogeneousMatrix::identity(),
        };

        Ok(Self {
            volume_sampling,
            volume_index_to_physical,
            volume_physical_to_index,
            sampling_offset,
            projection_index_to_physical,
            physical_to_field_index,
        })
    }

    /// Compose the transforms of one projection.
    ///
    /// `slice_start` is the absolute `(u, v)` index of the first pixel of the
    /// slice the projector will be handed.
    pub fn compose<G: GeometryRecord>(&self, record: &G, slice_start: [i64; 2]) -> ProjectionTransforms {
        let slice_translation = HomogeneousMatrix::translation([slice_start[0] as f64, slice_start[1] as f64, 0.0]);
        let ray_matrix = self.volume_sampling
            * record.projection_to_fixed_matrix()
            * self.projection_index_to_physical
            * slice_translation;

        let source = self.volume_sampling.transform_homogeneous(&record.source_position());

        ProjectionTransforms {
            ray_matrix,
            source,
            index_to_physical: self.volume_index_to_physical,
            physical_to_field_index: self.physical_to_field_index,
            physical_to_index: self.volume_physical_to_index,
            sampling_offset: self.sampling_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moco_core::geometry::CircularGeometry;
    use moco_core::spatial::{Direction, Point, Spacing};

    fn volume() -> ImageMetadata<3> {
        ImageMetadata::new(Point::new([-1.5, -1.5, -1.5]), Spacing::uniform(1.0), Direction::identity())
    }

    fn stack() -> ImageMetadata<3> {
        ImageMetadata::new(Point::new([-3.0, -3.0, 0.0]), Spacing::new([2.0, 2.0, 1.0]), Direction::identity())
            .with_index([0, 0, 7])
    }

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-9)
    }

    #[test]
    fn test_ray_matrix_maps_pixels_into_sampling_space() {
        let composer = TransformComposer::new(&volume(), &stack(), None, VoxelConvention::Corner).unwrap();
        let geometry = CircularGeometry::parallel().add_projection(0.0).build();
        let t = composer.compose(geometry.record(0).unwrap(), [0, 0]);

        // Pixel (1, 2) sits at physical (-1, 1, 0), volume index (0.5, 2.5, 1.5).
        assert!(close(t.ray_matrix.transform_point([1.0, 2.0, 0.0]), [1.0, 3.0, 2.0]));
        assert!(t.is_parallel());
        assert_eq!(t.source, Vector4::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_slice_start_shifts_pixels() {
        let composer = TransformComposer::new(&volume(), &stack(), None, VoxelConvention::Center).unwrap();
        let geometry = CircularGeometry::parallel().add_projection(0.0).build();
        let record = geometry.record(0).unwrap();
        let full = composer.compose(record, [0, 0]);
        let window = composer.compose(record, [1, 2]);
        assert!(close(
            window.ray_matrix.transform_point([0.0, 0.0, 0.0]),
            full.ray_matrix.transform_point([1.0, 2.0, 0.0])
        ));
    }

    #[test]
    fn test_projection_counter_has_no_depth() {
        let composer = TransformComposer::new(&volume(), &stack(), None, VoxelConvention::Corner).unwrap();
        let geometry = CircularGeometry::parallel().add_projection(0.0).build();
        let t = composer.compose(geometry.record(0).unwrap(), [0, 0]);
        assert!(close(
            t.ray_matrix.transform_point([1.0, 1.0, 0.0]),
            t.ray_matrix.transform_point([1.0, 1.0, 5.0])
        ));
    }

    #[test]
    fn test_buffered_index_and_unwarped_roundtrip() {
        let meta = volume().with_index([2, 0, -1]);
        let composer = TransformComposer::new(&meta, &stack(), Some(&volume()), VoxelConvention::Corner).unwrap();
        let geometry = CircularGeometry::new(100.0, 150.0).add_projection(30.0).build();
        let t = composer.compose(geometry.record(0).unwrap(), [0, 0]);

        assert_eq!(t.sampling_offset, [-1.5, 0.5, 1.5]);
        let c = [1.25, 2.0, 0.75];
        let physical = t.index_to_physical.transform_point(c);
        assert!(close(t.warped_sampling_coordinate(physical, [0.0; 3]), c));

        // Field grid equals the unbuffered volume grid: sampling coordinates differ by the buffer shift.
        let field = t.physical_to_field_index.transform_point(physical);
        assert!(close(field, [c[0] + 2.0, c[1], c[2] - 1.0]));
    }

    #[test]
    fn test_cone_source_is_point() {
        let composer = TransformComposer::new(&volume(), &stack(), None, VoxelConvention::Corner).unwrap();
        let geometry = CircularGeometry::new(100.0, 150.0).add_projection(0.0).build();
        let t = composer.compose(geometry.record(0).unwrap(), [0, 0]);
        assert!(!t.is_parallel());
        assert_eq!(t.source_wire(), [2.0, 2.0, 102.0, 1.0]);
    }

    #[test]
    fn test_singular_volume_is_rejected() {
        let meta = ImageMetadata::new(Point::origin(), Spacing::new([1.0, 0.0, 1.0]), Direction::identity());
        let err = TransformComposer::new(&meta, &stack(), None, VoxelConvention::Corner).unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfiguration(_)));
    }
}
