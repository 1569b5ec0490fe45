//! Core types for motion-compensated tomographic projection.
//!
//! Spatial primitives, images with a buffered index, homogeneous 4×4
//! matrices, circular projection geometries and trilinear samplers.

pub mod geometry;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use geometry::{CircularGeometry, GeometryRecord, ProjectionGeometry, ProjectionRecord};
pub use image::{Image, ImageMetadata, ImageRegion};
pub use interpolation::VoxelConvention;
pub use spatial::{Direction, Point, Spacing, Vector};
pub use transform::HomogeneousMatrix;
