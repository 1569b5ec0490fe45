//! Motion-compensated projection operators for 4D tomographic reconstruction.
//!
//! The crate provides the building blocks of the data term of a 4D
//! (3D + respiratory phase) iterative reconstruction:
//!
//! * [`TransformComposer`] composes, per projection, the matrices between
//!   projection index space, physical space, volume index space and
//!   displacement-field index space.
//! * [`DisplacementSampler`] reads a time-varying displacement field.
//! * [`Projector`] forward projects a warped volume and back-projects a
//!   projection, on the host ([`HostProjector`]) or as batched tensor
//!   operations ([`TensorProjector`]).
//! * [`DisplacedDetectorWeighting`] weights projections from an offset
//!   detector before back-projection.
//! * [`TemporalSplatAccumulator`] moves between one volume and the phases of
//!   a series.
//! * [`FourDToProjectionStack`] and [`ProjectionStackToFourD`] drive the
//!   per-projection loops.

pub mod composer;
pub mod config;
pub mod displaced;
pub mod displacement;
pub mod driver;
pub mod error;
pub mod progress;
pub mod projector;
pub mod regularization;
pub mod splat;
pub mod temporal;
pub mod validation;

pub use composer::{ProjectionTransforms, TransformComposer};
pub use config::{ProjectorConfig, ProjectorKind, ReconstructionConfig};
pub use displaced::DisplacedDetectorWeighting;
pub use displacement::{DecomposedField, DisplacementFieldSequence, DisplacementSampler, FramePosition, HostDisplacementSampler};
pub use driver::{FourDToProjectionStack, MotionModel, ProjectionStackToFourD};
pub use error::{ReconError, Result};
pub use progress::{CancellationToken, Control, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker, TracingProgress};
pub use projector::{build_projector, HostProjector, Projector, RayContext, RayPlan, TensorProjector, Warp};
pub use regularization::{Regularizer, TotalVariationDenoising};
pub use splat::TemporalSplatAccumulator;
pub use temporal::{PhaseSignal, TemporalWeights};
