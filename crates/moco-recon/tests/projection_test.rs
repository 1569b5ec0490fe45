use std::sync::Arc;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use moco_core::image::{Image, ImageMetadata, ImageRegion};
use moco_core::spatial::{Direction, Point, Spacing};
use moco_core::{CircularGeometry, ProjectionGeometry};
use moco_recon::config::{ProjectorConfig, ProjectorKind, ReconstructionConfig};
use moco_recon::displaced::DisplacedDetectorWeighting;
use moco_recon::displacement::DisplacementFieldSequence;
use moco_recon::driver::{FourDToProjectionStack, MotionModel, ProjectionStackToFourD};
use moco_recon::error::ReconError;
use moco_recon::progress::{CancellationToken, HistoryCallback, ProgressTracker};
use moco_recon::temporal::{PhaseSignal, TemporalWeights};

type B = NdArray<f32>;

/// A single-phase series of `n³` voxels with unit spacing, centred on the origin.
fn cube_series(n: usize, value: f32) -> Image<B, 4> {
    let half = (n as f64 - 1.0) / 2.0;
    let metadata = ImageMetadata::new(
        Point::new([-half, -half, -half, 0.0]),
        Spacing::new([1.0, 1.0, 1.0, 1.0]),
        Direction::identity(),
    );
    Image::constant([n, n, n, 1], value, metadata, &Default::default())
}

/// A zero stack of `count` projections with `n × n` pixels of `spacing`, centred on the axis.
fn stack(n: usize, spacing: f64, count: usize) -> Image<B, 3> {
    let half = (n as f64 - 1.0) / 2.0 * spacing;
    let metadata = ImageMetadata::new(
        Point::new([-half, -half, 0.0]),
        Spacing::new([spacing, spacing, 1.0]),
        Direction::identity(),
    );
    Image::constant([n, n, count], 0.0, metadata, &Default::default())
}

fn static_config(kind: ProjectorKind) -> ReconstructionConfig {
    ReconstructionConfig::new().with_projector(ProjectorConfig::new().with_kind(kind).without_warp())
}

fn unit_weights(projections: usize) -> TemporalWeights {
    TemporalWeights::from_rows(&vec![vec![1.0]; projections]).unwrap()
}

fn values<const D: usize>(t: &Tensor<B, D>) -> Vec<f32> {
    t.clone().into_data().to_vec::<f32>().unwrap()
}

fn forward(
    geometry: &ProjectionGeometry,
    weights: &TemporalWeights,
    config: ReconstructionConfig,
    series: &Image<B, 4>,
    stack: Image<B, 3>,
) -> Vec<f32> {
    let driver = FourDToProjectionStack::new(MotionModel::new(geometry, weights), config);
    let out = driver.execute(series, stack).unwrap();
    values(out.data())
}

#[test]
fn test_cube_at_0_and_90_degrees() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
    let weights = unit_weights(2);
    let series = cube_series(4, 1.0);

    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let out = forward(&geometry, &weights, static_config(kind), &series, stack(4, 2.0, 2));
        for p in 0..2 {
            for v in 0..4 {
                for u in 0..4 {
                    let value = out[p * 16 + v * 4 + u];
                    let central = (1..3).contains(&u) && (1..3).contains(&v);
                    let expected = if central { 4.0 } else { 0.0 };
                    assert!(
                        (value - expected).abs() < 1e-4,
                        "{:?} projection {} pixel ({}, {}): expected {}, got {}",
                        kind,
                        p,
                        u,
                        v,
                        expected,
                        value
                    );
                }
            }
        }
    }
}

#[test]
fn test_zero_volume_projects_to_zero() {
    let geometry = CircularGeometry::new(100.0, 150.0).with_arc(0.0, 360.0, 5).build();
    let weights = unit_weights(5);
    let series = cube_series(5, 0.0);
    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let out = forward(&geometry, &weights, static_config(kind), &series, stack(6, 1.5, 5));
        assert!(out.iter().all(|&v| v == 0.0), "{:?} produced a non-zero value", kind);
    }
}

#[test]
fn test_oblique_parallel_path_length() {
    // Central ray at 30 degrees crosses all 8 z planes inside the box.
    let geometry = CircularGeometry::parallel().with_angles([30.0]).build();
    let weights = unit_weights(1);
    let series = cube_series(8, 1.0);
    let expected = 8.0 / 30f64.to_radians().cos();

    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let out = forward(&geometry, &weights, static_config(kind), &series, stack(3, 1.0, 1));
        let centre = out[4] as f64;
        assert!((centre - expected).abs() < 1e-3, "{:?}: expected {}, got {}", kind, expected, centre);
    }
}

#[test]
fn test_cone_beam_path_length() {
    // Detector pixel 2 mm off axis, 100 mm past the isocenter.
    let geometry = CircularGeometry::new(100.0, 200.0).with_angles([0.0]).build();
    let weights = unit_weights(1);
    let series = cube_series(4, 1.0);
    let out = forward(&geometry, &weights, static_config(ProjectorKind::Host), &series, stack(5, 1.0, 1));

    let centre = out[2 * 5 + 2] as f64;
    assert!((centre - 4.0).abs() < 1e-5, "central ray: {}", centre);

    let off_axis = out[2 * 5 + 4] as f64;
    let expected = 4.0 * (4.0f64 + 200.0 * 200.0).sqrt() / 200.0;
    assert!((off_axis - expected).abs() < 1e-4, "off-axis ray: expected {}, got {}", expected, off_axis);
}

fn filled_stack(n: usize, spacing: f64, count: usize, value: f32) -> Image<B, 3> {
    let (data, metadata) = stack(n, spacing, count).into_parts();
    Image::from_metadata(data + value, metadata)
}

#[test]
fn test_forward_overwrites_existing_values() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(1);
    let series = cube_series(4, 1.0);

    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let out = forward(&geometry, &weights, static_config(kind), &series, filled_stack(4, 2.0, 1, 10.0));
        assert!((out[5] - 4.0).abs() < 1e-4, "{:?} centre: {}", kind, out[5]);
        assert_eq!(out[0], 0.0, "{:?} corner kept the old value", kind);
    }
}

#[test]
fn test_empty_weights_row_writes_zeros() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
    let weights = TemporalWeights::from_rows(&[vec![1.0], vec![0.0]]).unwrap();
    let series = cube_series(4, 1.0);

    let out = forward(&geometry, &weights, static_config(ProjectorKind::Host), &series, filled_stack(4, 2.0, 2, 10.0));
    assert!((out[5] - 4.0).abs() < 1e-4);
    assert!(out[16..].iter().all(|&v| v == 0.0));
}

#[test]
fn test_region_outside_request_keeps_existing_values() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
    let weights = unit_weights(2);
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host));

    let out = driver
        .execute_region(&series, filled_stack(4, 2.0, 2, 10.0), ImageRegion::new([0, 0, 1], [4, 4, 1]))
        .unwrap();
    let out = values(out.data());
    assert!(out[..16].iter().all(|&v| v == 10.0));
    assert!((out[16 + 5] - 4.0).abs() < 1e-4);
    assert_eq!(out[16], 0.0);
}

#[test]
fn test_requested_region_leaves_other_projections_untouched() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 45.0, 90.0]).build();
    let weights = unit_weights(3);
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host));

    let full = driver.execute(&series, stack(4, 2.0, 3)).unwrap();

    // Project 0 first, then 1..3 into the same destination.
    let s = stack(4, 2.0, 3);
    let s = driver
        .execute_region(&series, s, ImageRegion::new([0, 0, 0], [4, 4, 1]))
        .unwrap();
    let after_first = values(s.data());
    let s = driver
        .execute_region(&series, s, ImageRegion::new([0, 0, 1], [4, 4, 2]))
        .unwrap();
    let after_all = values(s.data());

    assert_eq!(&after_all[..16], &after_first[..16], "projection 0 changed after later projections");
    assert_eq!(after_all, values(full.data()));
    assert!(after_first[16..].iter().all(|&v| v == 0.0));
}

#[test]
fn test_requested_pixel_subregion() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(1);
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Tensor));

    let full = values(driver.execute(&series, stack(4, 2.0, 1)).unwrap().data());
    let part = values(
        driver
            .execute_region(&series, stack(4, 2.0, 1), ImageRegion::new([1, 1, 0], [2, 1, 1]))
            .unwrap()
            .data(),
    );
    for i in 0..16 {
        let inside = i == 5 || i == 6;
        let expected = if inside { full[i] } else { 0.0 };
        assert!((part[i] - expected).abs() < 1e-5, "pixel {}: {} vs {}", i, part[i], expected);
    }
}

#[test]
fn test_region_outside_stack_is_rejected() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
    let weights = unit_weights(2);
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host));
    let err = driver.execute_region(&series, stack(4, 2.0, 2), ImageRegion::new([0, 0, 1], [4, 4, 2]));
    assert!(matches!(err, Err(ReconError::InvalidConfiguration(_))));
}

#[test]
fn test_missing_geometry_is_rejected_before_projecting() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(2);
    let series = cube_series(4, 1.0);
    let history = Arc::new(HistoryCallback::new());
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host))
        .with_progress(ProgressTracker::new().with_callback(history.clone()));

    let err = driver.execute(&series, stack(4, 2.0, 2));
    assert!(matches!(err, Err(ReconError::ProjectionOutOfRange { index: 1, available: 1 })));
    assert!(history.get_history().is_empty());
}

#[test]
fn test_weights_phase_mismatch_is_rejected() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = TemporalWeights::from_rows(&[vec![0.5, 0.5]]).unwrap();
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host));
    assert!(matches!(
        driver.execute(&series, stack(4, 2.0, 1)),
        Err(ReconError::DimensionMismatch(_))
    ));
}

#[test]
fn test_warp_requires_field_and_signal() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(1);
    let series = cube_series(4, 1.0);
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), ReconstructionConfig::default());
    assert!(matches!(
        driver.execute(&series, stack(4, 2.0, 1)),
        Err(ReconError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_cancellation_stops_between_projections() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0, 180.0]).build();
    let weights = unit_weights(3);
    let series = cube_series(4, 1.0);
    let token = CancellationToken::new();
    token.cancel();
    let driver = FourDToProjectionStack::new(MotionModel::new(&geometry, &weights), static_config(ProjectorKind::Host))
        .with_progress(ProgressTracker::new().with_callback(Arc::new(token)));

    match driver.execute(&series, stack(4, 2.0, 3)) {
        Err(ReconError::Cancelled { completed, total }) => {
            assert_eq!(completed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_progress_reports_every_projection() {
    let geometry = CircularGeometry::parallel().with_angles([0.0, 90.0]).build();
    let weights = unit_weights(2);
    let history = Arc::new(HistoryCallback::new());
    let driver = ProjectionStackToFourD::new(MotionModel::<B>::new(&geometry, &weights), static_config(ProjectorKind::Host))
        .with_progress(ProgressTracker::new().with_callback(history.clone()));

    let series = cube_series(4, 0.0);
    let (_, metadata) = series.into_parts();
    let destination = driver.destination([4, 4, 4, 1], metadata, &Default::default());
    driver.execute(&stack(4, 2.0, 2), destination).unwrap();

    let reported: Vec<i64> = history.get_history().iter().map(|i| i.projection).collect();
    assert_eq!(reported, vec![0, 1]);
}

fn back_project(
    geometry: &ProjectionGeometry,
    weights: &TemporalWeights,
    config: ReconstructionConfig,
    stack: &Image<B, 3>,
) -> Vec<f32> {
    let driver = ProjectionStackToFourD::new(MotionModel::<B>::new(geometry, weights), config);
    let (_, metadata) = cube_series(4, 0.0).into_parts();
    let destination = driver.destination([4, 4, 4, 1], metadata, &Default::default());
    values(driver.execute(stack, destination).unwrap().data())
}

/// A stack of ones whose detector columns span `u = -2 .. 8` around the central ray.
fn displaced_stack(count: usize) -> Image<B, 3> {
    let metadata = ImageMetadata::new(Point::new([-2.0, -3.0, 0.0]), Spacing::uniform(1.0), Direction::identity());
    Image::constant([11, 7, count], 1.0, metadata, &Default::default())
}

#[test]
fn test_displaced_detector_is_weighted_before_back_projection() {
    let geometry = CircularGeometry::new(60.0, 90.0).with_angles([0.0, 180.0]).build();
    let weights = unit_weights(2);
    let stack = displaced_stack(2);

    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let weighted = back_project(&geometry, &weights, static_config(kind), &stack);

        // Same result when the columns are weighted by hand and the driver's weighting is off.
        let weighting = DisplacedDetectorWeighting::new();
        let columns = weighting
            .column_weights(geometry.record(0).unwrap(), stack.metadata(), 11)
            .unwrap()
            .unwrap();
        let (data, metadata) = stack.clone().into_parts();
        let pre_weighted = Image::from_metadata(weighting.apply(data.reshape([14, 11]), &columns, 0).reshape([2, 7, 11]), metadata);
        let manual = back_project(
            &geometry,
            &weights,
            static_config(kind).with_displaced_detector(false),
            &pre_weighted,
        );
        for (a, b) in weighted.iter().zip(&manual) {
            assert!((a - b).abs() < 1e-4, "{:?}: {} vs {}", kind, a, b);
        }

        let unweighted = back_project(&geometry, &weights, static_config(kind).with_displaced_detector(false), &stack);
        assert!(weighted.iter().zip(&unweighted).any(|(a, b)| (a - b).abs() > 1e-3));
    }
}

#[test]
fn test_centred_detector_is_not_weighted() {
    let geometry = CircularGeometry::new(60.0, 90.0).with_angles([0.0, 90.0]).build();
    let weights = unit_weights(2);
    let s = stack(5, 1.5, 2);
    let (data, metadata) = s.into_parts();
    let s = Image::from_metadata(data + 1.0, metadata);

    let enabled = back_project(&geometry, &weights, static_config(ProjectorKind::Host), &s);
    let disabled = back_project(&geometry, &weights, static_config(ProjectorKind::Host).with_displaced_detector(false), &s);
    assert_eq!(enabled, disabled);
    assert!(enabled.iter().any(|&v| v > 0.0));
}

#[test]
fn test_detector_missing_central_ray_is_rejected_before_projecting() {
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(1);
    let metadata = ImageMetadata::new(Point::new([1.0, -3.0, 0.0]), Spacing::uniform(1.0), Direction::identity());
    let stack = Image::<B, 3>::constant([5, 7, 1], 1.0, metadata, &Default::default());
    let history = Arc::new(HistoryCallback::new());
    let driver = ProjectionStackToFourD::new(MotionModel::<B>::new(&geometry, &weights), static_config(ProjectorKind::Host))
        .with_progress(ProgressTracker::new().with_callback(history.clone()));

    let (_, series_grid) = cube_series(4, 0.0).into_parts();
    let destination = driver.destination([4, 4, 4, 1], series_grid, &Default::default());
    assert!(matches!(driver.execute(&stack, destination), Err(ReconError::InvalidConfiguration(_))));
    assert!(history.get_history().is_empty());
}

#[test]
fn test_warp_disabled_matches_zero_field() {
    let geometry = CircularGeometry::new(50.0, 80.0).with_angles([0.0, 37.0, 121.0]).build();
    let weights = unit_weights(3);
    let device = Default::default();

    let n = 5;
    let data: Vec<f32> = (0..n * n * n).map(|i| ((i * 7) % 11) as f32 / 11.0).collect();
    let series = Image::from_metadata(
        Tensor::<B, 4>::from_data(TensorData::new(data, [1, n, n, n]), &device),
        ImageMetadata::new(Point::new([-2.0, -2.0, -2.0, 0.0]), Spacing::uniform(1.0), Direction::identity()),
    );
    let field_grid = ImageMetadata::new(Point::new([-3.0, -3.0, -3.0]), Spacing::uniform(2.0), Direction::identity());
    let field = DisplacementFieldSequence::<B>::zeros(3, [4, 4, 4], field_grid, &device).unwrap();
    let signal = PhaseSignal::new(vec![0.1, 0.5, 0.8]).unwrap();

    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        let plain = forward(&geometry, &weights, static_config(kind), &series, stack(6, 1.0, 3));

        let model = MotionModel::new(&geometry, &weights).with_field(&field).with_signal(&signal);
        let config = ReconstructionConfig::new().with_projector(ProjectorConfig::new().with_kind(kind));
        let warped = FourDToProjectionStack::new(model, config)
            .execute(&series, stack(6, 1.0, 3))
            .unwrap();

        for (a, b) in plain.iter().zip(values(warped.data())) {
            assert!((a - b).abs() < 1e-4, "{:?}: {} vs {}", kind, a, b);
        }
    }
}

#[test]
fn test_uniform_displacement_shifts_projection() {
    // A constant displacement of one voxel along x moves the parallel
    // projection at 0 degrees by one detector pixel.
    let geometry = CircularGeometry::parallel().with_angles([0.0]).build();
    let weights = unit_weights(1);
    let device = Default::default();

    let n = 6;
    let mut data = vec![0.0f32; n * n * n];
    for z in 0..n {
        for y in 2..4 {
            data[z * n * n + y * n + 2] = 1.0;
        }
    }
    let series = Image::from_metadata(
        Tensor::<B, 4>::from_data(TensorData::new(data, [1, n, n, n]), &device),
        ImageMetadata::new(Point::new([-2.5, -2.5, -2.5, 0.0]), Spacing::uniform(1.0), Direction::identity()),
    );

    let field_grid = ImageMetadata::new(Point::new([-5.0, -5.0, -5.0]), Spacing::uniform(2.0), Direction::identity());
    let vectors: Vec<f32> = (0..6 * 6 * 6).flat_map(|_| [1.0f32, 0.0, 0.0]).collect();
    let field = DisplacementFieldSequence::new(
        Tensor::<B, 5>::from_data(TensorData::new(vectors, [1, 6, 6, 6, 3]), &device),
        field_grid,
    )
    .unwrap();
    let signal = PhaseSignal::new(vec![0.0]).unwrap();

    let plain = forward(&geometry, &weights, static_config(ProjectorKind::Host), &series, stack(6, 1.0, 1));
    let model = MotionModel::new(&geometry, &weights).with_field(&field).with_signal(&signal);
    let warped = FourDToProjectionStack::new(model, ReconstructionConfig::default())
        .execute(&series, stack(6, 1.0, 1))
        .unwrap();
    let warped = values(warped.data());

    // Sampling at x + 1 sees the line that sits one voxel further along x.
    let row = 2 * 6;
    assert!((plain[row + 2] - 6.0).abs() < 1e-4);
    assert!((warped[row + 1] - 6.0).abs() < 1e-4);
    assert!(warped[row + 2].abs() < 1e-4);
}

#[test]
fn test_host_and_tensor_projectors_agree() {
    let geometry = CircularGeometry::new(40.0, 70.0).with_arc(10.0, 360.0, 4).build();
    let signal = PhaseSignal::new(vec![0.0, 0.3, 0.55, 0.9]).unwrap();
    let weights = TemporalWeights::from_signal(&signal, 2).unwrap();
    let device = Default::default();

    let n = 5;
    let data: Vec<f32> = (0..2 * n * n * n).map(|i| ((i * 13) % 17) as f32 / 17.0).collect();
    let series = Image::from_metadata(
        Tensor::<B, 4>::from_data(TensorData::new(data, [2, n, n, n]), &device),
        ImageMetadata::new(Point::new([-2.0, -2.0, -2.0, 0.0]), Spacing::uniform(1.0), Direction::identity()),
    );
    let vectors: Vec<f32> = (0..2 * 3 * 3 * 3)
        .flat_map(|i| [0.2 * (i % 3) as f32, -0.3, 0.1 * (i % 5) as f32])
        .collect();
    let field = DisplacementFieldSequence::new(
        Tensor::<B, 5>::from_data(TensorData::new(vectors, [2, 3, 3, 3, 3]), &device),
        ImageMetadata::new(Point::new([-2.5, -2.5, -2.5]), Spacing::uniform(2.5), Direction::identity()),
    )
    .unwrap();

    let run = |kind| {
        let model = MotionModel::new(&geometry, &weights).with_field(&field).with_signal(&signal);
        let config = ReconstructionConfig::new().with_projector(ProjectorConfig::new().with_kind(kind));
        let out = FourDToProjectionStack::new(model, config)
            .execute(&series, stack(7, 1.0, 4))
            .unwrap();
        values(out.data())
    };

    let host = run(ProjectorKind::Host);
    let tensor = run(ProjectorKind::Tensor);
    assert!(host.iter().any(|&v| v > 0.1));
    for (i, (h, t)) in host.iter().zip(&tensor).enumerate() {
        assert!((h - t).abs() < 1e-3 * (1.0 + h.abs()), "pixel {}: host {} vs tensor {}", i, h, t);
    }
}
