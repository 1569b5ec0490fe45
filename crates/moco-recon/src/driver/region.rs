//! Input regions required for a requested output region.

use std::ops::Range;
use moco_core::ImageRegion;

/// Projection numbers covered by a stack region.
pub fn projection_range(region: &ImageRegion<3>) -> Range<i64> {
    region.index[2]..region.upper(2)
}

/// Inputs of [`FourDToProjectionStack`](super::FourDToProjectionStack).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardRegions {
    /// The requested projections of the input stack, added to in place.
    pub stack: ImageRegion<3>,
    pub series: ImageRegion<4>,
    pub field: Option<ImageRegion<4>>,
}

/// Every ray may cross the whole volume and every phase may carry weight,
/// so the series and field are needed in full.
pub fn forward_input_regions(
    requested: &ImageRegion<3>,
    series: &ImageRegion<4>,
    field: Option<&ImageRegion<4>>,
) -> ForwardRegions {
    ForwardRegions {
        stack: *requested,
        series: *series,
        field: field.copied(),
    }
}

/// Inputs of [`ProjectionStackToFourD`](super::ProjectionStackToFourD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackwardRegions {
    /// Full detector extent of the stack over the requested projections.
    pub stack: ImageRegion<3>,
    pub series: ImageRegion<4>,
    pub field: Option<ImageRegion<4>>,
}

pub fn backward_input_regions(
    stack: &ImageRegion<3>,
    projections: Range<i64>,
    series: &ImageRegion<4>,
    field: Option<&ImageRegion<4>>,
) -> BackwardRegions {
    let count = usize::try_from(projections.end - projections.start).unwrap_or(0);
    BackwardRegions {
        stack: stack.with_axis(2, projections.start, count),
        series: *series,
        field: field.copied(),
    }
}
