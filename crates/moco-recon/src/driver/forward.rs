//! 4D series to projection stack (`R_θ S_θ`).

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use moco_core::{Image, ImageRegion};
use tracing::{debug, info, warn};
use super::region::{forward_input_regions, projection_range};
use super::{call_tracker, spatial_metadata, warn_if_empty, MotionModel};
use crate::composer::TransformComposer;
use crate::config::ReconstructionConfig;
use crate::error::{ReconError, Result};
use crate::progress::{Control, ProgressTracker};
use crate::projector::{build_projector, Projector, RayContext, Warp};
use crate::splat::TemporalSplatAccumulator;
use crate::validation::{validate_grid, validate_same_device};

/// Forward projects a volume series into a projection stack.
///
/// For every projection the series is blended to one volume with the
/// projection's weights row, warped to the projection's respiratory phase
/// and forward projected. Each requested pixel is overwritten with its line
/// integral; a projection with an all-zero weights row is written as zeros.
///
/// # Example
/// ```rust,ignore
/// let driver = FourDToProjectionStack::new(model, ReconstructionConfig::default());
/// let stack = driver.execute(&series, stack)?;
/// ```
#[derive(Debug)]
pub struct FourDToProjectionStack<'a, B: Backend> {
    model: MotionModel<'a, B>,
    config: ReconstructionConfig,
    projector: Box<dyn Projector<B>>,
    tracker: ProgressTracker,
}

impl<'a, B: Backend> FourDToProjectionStack<'a, B> {
    pub fn new(model: MotionModel<'a, B>, config: ReconstructionConfig) -> Self {
        Self {
            model,
            config,
            projector: build_projector(&config.projector),
            tracker: ProgressTracker::new(),
        }
    }

    /// Report per-projection progress to `tracker`; its callbacks may cancel.
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Project every projection of `stack`.
    pub fn execute(&self, series: &Image<B, 4>, stack: Image<B, 3>) -> Result<Image<B, 3>> {
        let requested = stack.region();
        self.execute_region(series, stack, requested)
    }

    /// Project the pixels of `requested` only; the rest of `stack` is
    /// returned untouched.
    pub fn execute_region(
        &self,
        series: &Image<B, 4>,
        stack: Image<B, 3>,
        requested: ImageRegion<3>,
    ) -> Result<Image<B, 3>> {
        let field_region = self.model.field.map(|f| f.region());
        let regions = forward_input_regions(&requested, &series.region(), field_region.as_ref());
        if !stack.region().contains(&regions.stack) {
            return Err(ReconError::invalid_configuration(format!(
                "requested region {:?} is not inside the stack region {:?}",
                regions.stack,
                stack.region()
            )));
        }
        validate_same_device(series.data(), stack.data(), "series and projection stack")?;
        validate_grid(series.metadata(), "series")?;
        validate_grid(stack.metadata(), "projection stack")?;
        let device = stack.data().device();
        if requested.is_empty() {
            return Ok(stack);
        }

        let phases = series.shape()[0];
        let projections = projection_range(&requested);
        let motion = self.model.prepare(&self.config, phases, &projections, &device)?;
        let composer = TransformComposer::new(
            &spatial_metadata(series.metadata()),
            stack.metadata(),
            motion.as_ref().map(|m| m.field.metadata()),
            self.config.projector.convention,
        )?;

        info!(
            "Forward projecting {} projections from a {}-phase series ({:?} projector, warp {})",
            projections.end - projections.start,
            phases,
            self.projector.kind(),
            motion.is_some()
        );

        let tracker = call_tracker(&self.config, &self.tracker);
        let mut run = tracker.start("forward projection", regions.stack.size[2]);
        let splat = TemporalSplatAccumulator::new();

        let (mut data, metadata) = stack.into_parts();
        let stack_index = *metadata.index();
        let [nu, nv, _] = requested.size;
        let u0 = (requested.index[0] - stack_index[0]) as usize;
        let v0 = (requested.index[1] - stack_index[1]) as usize;

        for p in projections.clone() {
            let row = self.model.row(p)?;
            let k = (p - stack_index[2]) as usize;
            let ranges = [k..k + 1, v0..v0 + nv, u0..u0 + nu];
            let zero = Tensor::zeros([nv, nu], &device);
            let projected = if warn_if_empty(p, &row) {
                zero
            } else {
                let transforms = composer.compose(self.model.record(p)?, [requested.index[0], requested.index[1]]);
                let warp = motion.as_ref().map(|m| Warp {
                    field: &m.field,
                    frame: m.frame(p),
                });
                debug!("Projection {}: frame {:?}", p, warp.map(|w| w.frame));

                let volume = splat.interpolate(series, &row)?;
                let ctx = RayContext {
                    transforms: &transforms,
                    warp,
                };
                self.projector.forward(&volume, zero, &ctx)
            };
            data = data.slice_assign(ranges, projected.unsqueeze::<3>());

            if run.step(p) == Control::Stop && run.completed() < run.total() {
                warn!("Forward projection cancelled after {} of {} projections", run.completed(), run.total());
                return Err(ReconError::Cancelled {
                    completed: run.completed(),
                    total: run.total(),
                });
            }
        }

        run.finish(projections.end - 1);
        Ok(Image::from_metadata(data, metadata))
    }
}
