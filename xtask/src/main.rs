use anyhow::{bail, Context, Result};
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use moco_core::spatial::{Direction, Point, Spacing};
use moco_core::{CircularGeometry, Image, ImageMetadata, VoxelConvention};
use moco_recon::{
    Control, DisplacementFieldSequence, FourDToProjectionStack, MotionModel, PhaseSignal, ProgressCallback,
    ProgressInfo, ProgressTracker, ProjectionStackToFourD, ProjectorConfig, ProjectorKind, ReconstructionConfig,
    TemporalWeights,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for the moco projection operators")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward project a breathing cube phantom
    Simulate {
        /// Number of projections over a full rotation
        #[arg(short, long, default_value_t = 60)]
        projections: usize,

        /// Number of respiratory phases
        #[arg(long, default_value_t = 4)]
        phases: usize,

        /// Volume edge length in voxels
        #[arg(short, long, default_value_t = 24)]
        size: usize,

        /// Breathing amplitude along Z, in mm
        #[arg(long, default_value_t = 3.0)]
        amplitude: f32,

        /// Breathing cycles over the acquisition
        #[arg(long, default_value_t = 3.0)]
        cycles: f64,

        /// Projector implementation (host, tensor)
        #[arg(long, default_value = "host")]
        projector: String,

        /// Output directory for the signal, weights and projection sums
        #[arg(short, long, default_value = "simulation")]
        output: PathBuf,
    },

    /// Dot-product test of the 4D forward and back projection drivers
    AdjointCheck {
        /// Number of projections
        #[arg(short, long, default_value_t = 8)]
        projections: usize,

        /// Number of respiratory phases
        #[arg(long, default_value_t = 3)]
        phases: usize,

        /// Volume edge length in voxels
        #[arg(short, long, default_value_t = 8)]
        size: usize,

        /// Maximum accepted relative error
        #[arg(long, default_value_t = 1e-4)]
        tolerance: f64,
    },

    /// Write the cyclic interpolation weights of a phase signal file
    Weights {
        /// Phase signal, one value per projection
        signal: PathBuf,

        /// Number of respiratory phases
        #[arg(long, default_value_t = 10)]
        phases: usize,

        /// Output file (printed to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { projections, phases, size, amplitude, cycles, projector, output } => {
            let kind = parse_projector(&projector)?;
            simulate(projections, phases, size, amplitude, cycles, kind, &output)?;
        }
        Commands::AdjointCheck { projections, phases, size, tolerance } => {
            adjoint_check(projections, phases, size, tolerance)?;
        }
        Commands::Weights { signal, phases, output } => {
            dump_weights(&signal, phases, output.as_deref())?;
        }
    }

    Ok(())
}

fn parse_projector(name: &str) -> Result<ProjectorKind> {
    match name {
        "host" => Ok(ProjectorKind::Host),
        "tensor" => Ok(ProjectorKind::Tensor),
        _ => bail!("Unknown projector: {}. Use 'host' or 'tensor'.", name),
    }
}

/// Drives an `indicatif` bar from the projection drivers.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) -> Control {
        self.bar.set_position(info.completed as u64);
        Control::Continue
    }

    fn on_start(&self, stage: &'static str, total: usize) {
        self.bar.reset();
        self.bar.set_message(stage);
        self.bar.set_length(total as u64);
    }

    fn on_complete(&self, _info: &ProgressInfo) {
        self.bar.finish();
    }
}

/// Volume grid of `size³` unit voxels centred on the isocenter, with `phases` frames.
fn series_grid(size: usize) -> ImageMetadata<4> {
    let half = -(size as f64) / 2.0;
    ImageMetadata::new(Point::new([half, half, half, 0.0]), Spacing::uniform(1.0), Direction::identity())
}

/// Detector grid wide enough for the magnified volume.
fn stack_grid(width: usize) -> ImageMetadata<3> {
    let half = -(width as f64) / 2.0;
    ImageMetadata::new(Point::new([half, half, 0.0]), Spacing::uniform(1.0), Direction::identity())
}

/// Deterministic pseudo-random values in `[0, 1)`.
fn pattern(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 40) as f32) / (1u64 << 24) as f32
        })
        .collect()
}

fn values<const D: usize>(tensor: &Tensor<Backend, D>) -> Vec<f32> {
    tensor.clone().into_data().iter::<f32>().collect()
}

fn simulate(
    projections: usize,
    phases: usize,
    size: usize,
    amplitude: f32,
    cycles: f64,
    kind: ProjectorKind,
    output: &Path,
) -> Result<()> {
    if projections == 0 || phases == 0 || size == 0 {
        bail!("projections, phases and size must all be positive");
    }
    info!("Simulating {} projections of a {}³ phantom with {} phases", projections, size, phases);
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let device = Default::default();
    let geometry = CircularGeometry::new(10.0 * size as f64, 15.0 * size as f64)
        .with_arc(0.0, 360.0, projections)
        .build();
    let signal = PhaseSignal::new(
        (0..projections)
            .map(|p| cycles * p as f64 / projections as f64)
            .collect(),
    )?;
    let weights = TemporalWeights::from_signal(&signal, phases)?;

    // Every phase holds the same centred cube; the motion lives in the field.
    let quarter = size / 4;
    let mut cube = vec![0.0f32; size * size * size];
    for z in quarter..size - quarter {
        for y in quarter..size - quarter {
            for x in quarter..size - quarter {
                cube[(z * size + y) * size + x] = 1.0;
            }
        }
    }
    let series_data: Vec<f32> = (0..phases).flat_map(|_| cube.iter().copied()).collect();
    let series = Image::from_metadata(
        Tensor::<Backend, 4>::from_data(TensorData::new(series_data, [phases, size, size, size]), &device),
        series_grid(size),
    );

    // Uniform Z displacement following one sine period over the phases.
    let frame_len = size * size * size;
    let vectors: Vec<f32> = (0..phases)
        .flat_map(|t| {
            let dz = amplitude * (std::f32::consts::TAU * t as f32 / phases as f32).sin();
            (0..frame_len).flat_map(move |_| [0.0, 0.0, dz])
        })
        .collect();
    let field = DisplacementFieldSequence::new(
        Tensor::<Backend, 5>::from_data(TensorData::new(vectors, [phases, size, size, size, 3]), &device),
        spatial_grid(size),
    )?;

    let width = 2 * size;
    let stack = Image::from_metadata(Tensor::zeros([projections, width, width], &device), stack_grid(width));

    let model = MotionModel::new(&geometry, &weights).with_signal(&signal).with_field(&field);
    let config = ReconstructionConfig::new().with_projector(ProjectorConfig::new().with_kind(kind));
    let tracker = ProgressTracker::new().with_callback(Arc::new(BarProgress::new()));
    let stack = FourDToProjectionStack::new(model, config)
        .with_progress(tracker)
        .execute(&series, stack)?;

    let data = values(stack.data());
    let mut sums = String::from("# projection phase line-integral-sum\n");
    for (p, projection) in data.chunks(width * width).enumerate() {
        let sum: f64 = projection.iter().map(|&v| f64::from(v)).sum();
        writeln!(sums, "{} {:.4} {:.6}", p, signal.phase(p).unwrap_or_default(), sum)?;
    }

    moco_io::write_signal_file(output.join("signal.txt"), &signal)?;
    moco_io::write_weights_file(output.join("weights.txt"), &weights)?;
    let sums_path = output.join("projections.txt");
    std::fs::write(&sums_path, sums).with_context(|| format!("Failed to write {}", sums_path.display()))?;

    info!("Wrote simulation to {}", output.display());
    Ok(())
}

fn spatial_grid(size: usize) -> ImageMetadata<3> {
    let half = -(size as f64) / 2.0;
    ImageMetadata::new(Point::new([half, half, half]), Spacing::uniform(1.0), Direction::identity())
}

fn adjoint_check(projections: usize, phases: usize, size: usize, tolerance: f64) -> Result<()> {
    if projections == 0 || phases == 0 || size == 0 {
        bail!("projections, phases and size must all be positive");
    }
    let device = Default::default();
    let geometry = CircularGeometry::new(4.0 * size as f64, 6.0 * size as f64)
        .with_detector_offset([0.5, -0.25])
        .with_arc(0.0, 360.0, projections)
        .build();
    let signal = PhaseSignal::new((0..projections).map(|p| 1.7 * p as f64 / projections as f64).collect())?;
    let weights = TemporalWeights::from_signal(&signal, phases)?;

    let field_len = phases * size * size * size * 3;
    let vectors: Vec<f32> = pattern(field_len, 7).into_iter().map(|v| 0.8 * (v - 0.5)).collect();
    let field = DisplacementFieldSequence::new(
        Tensor::<Backend, 5>::from_data(TensorData::new(vectors, [phases, size, size, size, 3]), &device),
        spatial_grid(size),
    )?;

    let width = 2 * size;
    let x = Image::from_metadata(
        Tensor::<Backend, 4>::from_data(
            TensorData::new(pattern(phases * size * size * size, 1), [phases, size, size, size]),
            &device,
        ),
        series_grid(size),
    );
    let y = Image::from_metadata(
        Tensor::<Backend, 3>::from_data(
            TensorData::new(pattern(projections * width * width, 2), [projections, width, width]),
            &device,
        ),
        stack_grid(width),
    );

    let mut worst = 0.0f64;
    for kind in [ProjectorKind::Host, ProjectorKind::Tensor] {
        for convention in [VoxelConvention::Corner, VoxelConvention::Center] {
            let model = MotionModel::new(&geometry, &weights).with_signal(&signal).with_field(&field);
            let config = ReconstructionConfig::new()
                .with_projector(ProjectorConfig::new().with_kind(kind).with_convention(convention))
                .with_displaced_detector(false);

            let zero_stack = Image::from_metadata(Tensor::zeros([projections, width, width], &device), stack_grid(width));
            let ax = FourDToProjectionStack::new(model, config).execute(&x, zero_stack)?;

            let backward = ProjectionStackToFourD::new(model, config);
            let destination = backward.destination([size, size, size, phases], series_grid(size), &device);
            let aty = backward.execute(&y, destination)?;

            let lhs: f64 = values(ax.data()).iter().zip(values(y.data())).map(|(&a, b)| f64::from(a) * f64::from(b)).sum();
            let rhs: f64 = values(x.data()).iter().zip(values(aty.data())).map(|(&a, b)| f64::from(a) * f64::from(b)).sum();
            let error = (lhs - rhs).abs() / lhs.abs().max(rhs.abs()).max(1.0);
            info!("{:?}/{:?}: <Ax, y> = {:.6}, <x, A^T y> = {:.6}, relative error {:.2e}", kind, convention, lhs, rhs, error);
            worst = worst.max(error);
        }
    }

    if worst > tolerance {
        bail!("Adjoint check failed: relative error {:.2e} exceeds {:.2e}", worst, tolerance);
    }
    info!("Adjoint check passed (worst relative error {:.2e})", worst);
    Ok(())
}

fn dump_weights(signal_path: &Path, phases: usize, output: Option<&Path>) -> Result<()> {
    let signal = moco_io::read_signal_file(signal_path)?;
    let weights = TemporalWeights::from_signal(&signal, phases)?;
    match output {
        Some(path) => {
            moco_io::write_weights_file(path, &weights)?;
            info!("Wrote {}x{} weights to {}", weights.projections(), weights.phases(), path.display());
        }
        None => {
            for row in weights.matrix().row_iter() {
                let fields: Vec<String> = row.iter().map(|w| format!("{:.6}", w)).collect();
                println!("{}", fields.join(" "));
            }
        }
    }
    Ok(())
}
