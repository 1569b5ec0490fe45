//! Projection stack to 4D series (`S_θᵀ R_θᵀ`).

use std::ops::Range;
use burn::tensor::backend::Backend;
use moco_core::{Image, ImageMetadata};
use tracing::{debug, info, warn};
use super::region::{backward_input_regions, projection_range};
use super::{call_tracker, spatial_metadata, warn_if_empty, MotionModel};
use crate::composer::TransformComposer;
use crate::config::ReconstructionConfig;
use crate::displaced::DisplacedDetectorWeighting;
use crate::error::{ReconError, Result};
use crate::progress::{Control, ProgressTracker};
use crate::projector::{build_projector, Projector, RayContext, Warp};
use crate::splat::TemporalSplatAccumulator;
use crate::validation::{validate_grid, validate_same_device};

/// Back-projects a projection stack and splats each projection into the
/// phases of a volume series.
///
/// Projections from a laterally displaced detector are column-weighted
/// before back-projection (see [`DisplacedDetectorWeighting`]). With the
/// weighting disabled, or on a centred detector, this is the adjoint of
/// [`FourDToProjectionStack`](super::FourDToProjectionStack) for the same
/// model and configuration.
#[derive(Debug)]
pub struct ProjectionStackToFourD<'a, B: Backend> {
    model: MotionModel<'a, B>,
    config: ReconstructionConfig,
    projector: Box<dyn Projector<B>>,
    tracker: ProgressTracker,
}

impl<'a, B: Backend> ProjectionStackToFourD<'a, B> {
    pub fn new(model: MotionModel<'a, B>, config: ReconstructionConfig) -> Self {
        Self {
            model,
            config,
            projector: build_projector(&config.projector),
            tracker: ProgressTracker::new(),
        }
    }

    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// A fresh destination filled with the configured initial value.
    ///
    /// `size` is in `(x, y, z, phase)` order.
    pub fn destination(&self, size: [usize; 4], metadata: ImageMetadata<4>, device: &B::Device) -> Image<B, 4> {
        Image::constant(size, self.config.initial_value, metadata, device)
    }

    /// Accumulate every projection of `stack` into `destination`.
    pub fn execute(&self, stack: &Image<B, 3>, destination: Image<B, 4>) -> Result<Image<B, 4>> {
        self.execute_range(stack, destination, projection_range(&stack.region()))
    }

    /// Accumulate the projection numbers in `projections` only.
    pub fn execute_range(
        &self,
        stack: &Image<B, 3>,
        destination: Image<B, 4>,
        projections: Range<i64>,
    ) -> Result<Image<B, 4>> {
        let field_region = self.model.field.map(|f| f.region());
        let regions = backward_input_regions(
            &stack.region(),
            projections.clone(),
            &destination.region(),
            field_region.as_ref(),
        );
        if !stack.region().contains(&regions.stack) {
            return Err(ReconError::invalid_configuration(format!(
                "projections {:?} are not inside the stack region {:?}",
                projections,
                stack.region()
            )));
        }
        validate_same_device(destination.data(), stack.data(), "series and projection stack")?;
        validate_grid(destination.metadata(), "series")?;
        validate_grid(stack.metadata(), "projection stack")?;
        let device = stack.data().device();
        if regions.stack.is_empty() {
            return Ok(destination);
        }

        let [phases, nz, ny, nx] = destination.shape();
        let motion = self.model.prepare(&self.config, phases, &projections, &device)?;
        let composer = TransformComposer::new(
            &spatial_metadata(destination.metadata()),
            stack.metadata(),
            motion.as_ref().map(|m| m.field.metadata()),
            self.config.projector.convention,
        )?;

        let [_, nv, nu] = stack.shape();
        let weighting = DisplacedDetectorWeighting::new();
        let column_weights = projections
            .clone()
            .map(|p| {
                if self.config.displaced_detector {
                    weighting.column_weights(self.model.record(p)?, stack.metadata(), nu)
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Back-projecting {} projections into a {}-phase series ({:?} projector, warp {})",
            projections.end - projections.start,
            phases,
            self.projector.kind(),
            motion.is_some()
        );

        let tracker = call_tracker(&self.config, &self.tracker);
        let mut run = tracker.start("back-projection", regions.stack.size[2]);
        let splat = TemporalSplatAccumulator::new();

        let stack_index = *stack.index();
        let mut destination = destination;

        for (p, columns) in projections.clone().zip(&column_weights) {
            let row = self.model.row(p)?;
            if !warn_if_empty(p, &row) {
                let transforms = composer.compose(self.model.record(p)?, [stack_index[0], stack_index[1]]);
                let warp = motion.as_ref().map(|m| Warp {
                    field: &m.field,
                    frame: m.frame(p),
                });
                debug!("Projection {}: frame {:?}", p, warp.map(|w| w.frame));

                let k = (p - stack_index[2]) as usize;
                let slice = stack
                    .data()
                    .clone()
                    .slice([k..k + 1, 0..nv, 0..nu])
                    .reshape([nv, nu]);
                let slice = match columns {
                    Some(weights) => weighting.apply(slice, weights, 0),
                    None => slice,
                };
                let ctx = RayContext {
                    transforms: &transforms,
                    warp,
                };
                let volume = self.projector.backward(&slice, [nz, ny, nx], &ctx);
                destination = splat.splat(destination, &volume, &row)?;
            }

            if run.step(p) == Control::Stop && run.completed() < run.total() {
                warn!("Back-projection cancelled after {} of {} projections", run.completed(), run.total());
                return Err(ReconError::Cancelled {
                    completed: run.completed(),
                    total: run.total(),
                });
            }
        }

        run.finish(projections.end - 1);
        Ok(destination)
    }
}
