//! Image types and operations.
//!
//! Volumes, projection stacks and volume series are all `Image`s: a burn
//! tensor plus the physical metadata (origin, spacing, direction) and the
//! buffered index of its first element.

pub mod image;
pub mod metadata;
pub mod region;

pub use image::Image;
pub use metadata::ImageMetadata;
pub use region::ImageRegion;
