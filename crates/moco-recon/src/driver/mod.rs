//! Iteration drivers: the per-projection loops of the 4D operators.
//!
//! [`FourDToProjectionStack`] computes `R_θ S_θ` (interpolate the series at
//! each projection's weights, then forward project) and
//! [`ProjectionStackToFourD`] its adjoint `S_θᵀ R_θᵀ`. Both validate every
//! input before launching the first projection, then walk the projections
//! strictly in order, moving the destination from one iteration to the next.

pub mod backward;
pub mod forward;
pub mod region;

use std::ops::Range;
use std::sync::Arc;
use burn::tensor::backend::Backend;
use moco_core::image::ImageMetadata;
use moco_core::{Direction, Point, ProjectionGeometry, ProjectionRecord, Spacing};
use nalgebra::Matrix3;
use tracing::warn;
use crate::config::ReconstructionConfig;
use crate::displacement::{DecomposedField, DisplacementFieldSequence, FramePosition};
use crate::error::{ReconError, Result};
use crate::progress::{ProgressTracker, TracingProgress};
use crate::temporal::{PhaseSignal, TemporalWeights};

pub use backward::ProjectionStackToFourD;
pub use forward::FourDToProjectionStack;
pub use region::{backward_input_regions, forward_input_regions, projection_range, BackwardRegions, ForwardRegions};

/// The acquisition and motion model shared by both drivers.
#[derive(Debug)]
pub struct MotionModel<'a, B: Backend> {
    pub geometry: &'a ProjectionGeometry,
    pub weights: &'a TemporalWeights,
    /// Respiratory phase per projection; selects the displacement frames.
    pub signal: Option<&'a PhaseSignal>,
    pub field: Option<&'a DisplacementFieldSequence<B>>,
}

impl<B: Backend> Clone for MotionModel<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for MotionModel<'_, B> {}

impl<'a, B: Backend> MotionModel<'a, B> {
    /// A static model: no signal, no displacement field.
    pub fn new(geometry: &'a ProjectionGeometry, weights: &'a TemporalWeights) -> Self {
        Self {
            geometry,
            weights,
            signal: None,
            field: None,
        }
    }

    pub fn with_signal(mut self, signal: &'a PhaseSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_field(mut self, field: &'a DisplacementFieldSequence<B>) -> Self {
        self.field = Some(field);
        self
    }

    /// Check the model against `phases` reconstructed phases and the
    /// projection numbers in `projections`.
    ///
    /// Returns the decomposed displacement field when warping is enabled.
    pub(crate) fn prepare(
        &self,
        config: &ReconstructionConfig,
        phases: usize,
        projections: &Range<i64>,
        device: &B::Device,
    ) -> Result<Option<MotionScratch<'a, B>>> {
        if self.weights.phases() != phases {
            return Err(ReconError::dimension_mismatch(format!(
                "temporal weights have {} phases but the series has {}",
                self.weights.phases(),
                phases
            )));
        }
        if projections.is_empty() {
            return Ok(None);
        }
        if projections.start < 0 {
            return Err(ReconError::ProjectionOutOfRange {
                index: projections.start,
                available: self.geometry.len(),
            });
        }
        check_covers(projections, self.geometry.len())?;
        check_covers(projections, self.weights.projections())?;

        if !config.projector.warp {
            return Ok(None);
        }
        let field = self.field.ok_or_else(|| {
            ReconError::invalid_configuration("warping is enabled but no displacement field was given")
        })?;
        let signal = self.signal.ok_or_else(|| {
            ReconError::invalid_configuration("warping is enabled but no phase signal was given")
        })?;
        check_covers(projections, signal.len())?;
        if &field.data().device() != device {
            return Err(ReconError::device(format!(
                "displacement field lives on {:?}, projections on {:?}",
                field.data().device(),
                device
            )));
        }

        Ok(Some(MotionScratch {
            field: field.decompose(),
            signal,
        }))
    }

    /// Geometry record of an already validated projection number.
    pub(crate) fn record(&self, projection: i64) -> Result<&'a ProjectionRecord> {
        usize::try_from(projection)
            .ok()
            .and_then(|p| self.geometry.record(p))
            .ok_or(ReconError::ProjectionOutOfRange {
                index: projection,
                available: self.geometry.len(),
            })
    }

    /// Weights row of an already validated projection number.
    pub(crate) fn row(&self, projection: i64) -> Result<Vec<f32>> {
        usize::try_from(projection)
            .ok()
            .and_then(|p| self.weights.row(p))
            .ok_or(ReconError::ProjectionOutOfRange {
                index: projection,
                available: self.weights.projections(),
            })
    }
}

/// Per-call scratch state for warping, dropped when the call ends.
#[derive(Debug)]
pub(crate) struct MotionScratch<'a, B: Backend> {
    pub field: DecomposedField<B>,
    pub signal: &'a PhaseSignal,
}

impl<B: Backend> MotionScratch<'_, B> {
    pub fn frame(&self, projection: i64) -> FramePosition {
        let phase = usize::try_from(projection)
            .ok()
            .and_then(|p| self.signal.phase(p))
            .unwrap_or(0.0);
        FramePosition::from_phase(phase, self.field.frames())
    }
}

fn check_covers(projections: &Range<i64>, available: usize) -> Result<()> {
    if projections.end > available as i64 {
        return Err(ReconError::ProjectionOutOfRange {
            index: projections.end - 1,
            available,
        });
    }
    Ok(())
}

/// Progress tracker for one call, with progress logging when configured.
pub(crate) fn call_tracker(config: &ReconstructionConfig, tracker: &ProgressTracker) -> ProgressTracker {
    if config.log_interval == 0 {
        tracker.clone()
    } else {
        tracker
            .clone()
            .with_callback(Arc::new(TracingProgress::new(config.log_interval)))
    }
}

pub(crate) fn warn_if_empty(projection: i64, row: &[f32]) -> bool {
    let empty = row.iter().all(|&w| w == 0.0);
    if empty {
        warn!("Projection {} has an all-zero weights row, nothing to project", projection);
    }
    empty
}

/// Spatial grid of a volume series: its first three axes.
pub fn spatial_metadata(series: &ImageMetadata<4>) -> ImageMetadata<3> {
    let origin = series.origin();
    let spacing = series.spacing();
    let direction: Matrix3<f64> = series.direction().inner().fixed_view::<3, 3>(0, 0).into_owned();
    let index = series.index();
    ImageMetadata::new(
        Point::new([origin[0], origin[1], origin[2]]),
        Spacing::new([spacing[0], spacing[1], spacing[2]]),
        Direction(direction),
    )
    .with_index([index[0], index[1], index[2]])
}
