use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use moco_core::image::{Image, ImageMetadata, ImageRegion};
use moco_core::interpolation::{sample_trilinear, Interpolator, LinearInterpolator, VoxelConvention};
use moco_core::spatial::{Direction, Point, Spacing};
use nalgebra::{Rotation3, Vector3};
use proptest::prelude::*;
use std::f64::consts::PI;

type Backend = NdArray<f32>;
type Point3 = Point<3>;
type Spacing3 = Spacing<3>;
type Direction3 = Direction<3>;

#[test]
fn test_rotated_image_transform() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
    let origin = Point3::new([0.0, 0.0, 0.0]);
    let spacing = Spacing3::new([1.0, 1.0, 1.0]);

    // Rotate 90 degrees around Z axis: X -> Y, Y -> -X
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
    let direction = Direction(rotation.into_inner());

    let image = Image::new(data, origin, spacing, direction);

    // (1, 0, 0) lies along the negative second image axis
    let point = Point3::new([1.0, 0.0, 0.0]);
    let index = image.transform_physical_point_to_continuous_index(&point).unwrap();

    assert!((index[0] - 0.0).abs() < 1e-5, "Expected index[0] to be 0.0, got {}", index[0]);
    assert!((index[1] - (-1.0)).abs() < 1e-5, "Expected index[1] to be -1.0, got {}", index[1]);
    assert!((index[2] - 0.0).abs() < 1e-5, "Expected index[2] to be 0.0, got {}", index[2]);

    let m = image.physical_to_index_matrix().unwrap();
    let mapped = m.transform_point([1.0, 0.0, 0.0]);
    assert!((mapped[1] - (-1.0)).abs() < 1e-9);
}

#[test]
fn test_projection_stack_region() {
    let device = Default::default();
    let metadata = ImageMetadata::new(
        Point3::new([-3.0, -3.0, 0.0]),
        Spacing3::new([2.0, 2.0, 1.0]),
        Direction3::identity(),
    )
    .with_index([0, 0, 5]);
    let stack = Image::<Backend, 3>::constant([4, 4, 3], 0.0, metadata, &device);

    assert_eq!(stack.shape(), [3, 4, 4]);
    assert_eq!(stack.region(), ImageRegion::new([0, 0, 5], [4, 4, 3]));
    assert!(stack.region().contains_index(&[3, 3, 7]));
    assert!(!stack.region().contains_index(&[0, 0, 8]));
}

proptest! {
    #[test]
    fn test_tensor_sampler_matches_host_sampler(
        x in -1.0f64..4.0, y in -1.0f64..3.0, z in -1.0f64..3.0,
        corner in any::<bool>()
    ) {
        let device = Default::default();
        let values: Vec<f32> = (0..24).map(|v| (v as f32 * 0.37).sin()).collect();
        let data = Tensor::<Backend, 3>::from_data(TensorData::new(values.clone(), [2, 3, 4]), &device);

        let convention = if corner { VoxelConvention::Corner } else { VoxelConvention::Center };
        let interpolator = LinearInterpolator::new(convention);

        let coords = Tensor::<Backend, 2>::from_floats([[x as f32, y as f32, z as f32]], &device);
        let tensor_value = interpolator.interpolate(&data, coords).into_data().to_vec::<f32>().unwrap()[0];
        let host_value = sample_trilinear(
            &values,
            [4, 3, 2],
            [f64::from(x as f32), f64::from(y as f32), f64::from(z as f32)],
            convention.offset(),
        );

        prop_assert!((f64::from(tensor_value) - host_value).abs() < 1e-4,
            "tensor {} vs host {} at ({}, {}, {})", tensor_value, host_value, x, y, z);
    }
}
