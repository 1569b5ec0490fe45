//! Image metadata types.

use serde::{Deserialize, Serialize};
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::{index_to_physical_matrix, physical_to_index_matrix, HomogeneousMatrix};

/// Physical grid description of an image, without its pixel data.
///
/// Axis order is `(x, y, z, ...)`, the reverse of the tensor dimension
/// order. `index` is the absolute index of the first buffered element,
/// so buffer element `k` along an axis has index `index + k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata<const D: usize> {
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    #[serde(with = "index_array")]
    index: [i64; D],
}

impl<const D: usize> ImageMetadata<D> {
    /// Create new image metadata with a zero buffered index.
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            origin,
            spacing,
            direction,
            index: [0; D],
        }
    }

    /// Set the buffered index.
    pub fn with_index(mut self, index: [i64; D]) -> Self {
        self.index = index;
        self
    }

    /// Get the origin.
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction.
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Get the buffered index.
    pub fn index(&self) -> &[i64; D] {
        &self.index
    }

    pub fn set_index(&mut self, index: [i64; D]) {
        self.index = index;
    }
}

impl ImageMetadata<3> {
    /// Absolute index to physical point.
    pub fn index_to_physical_matrix(&self) -> HomogeneousMatrix {
        index_to_physical_matrix(&self.origin, &self.spacing, &self.direction)
    }

    /// Physical point to absolute index, `None` for a degenerate grid.
    pub fn physical_to_index_matrix(&self) -> Option<HomogeneousMatrix> {
        physical_to_index_matrix(&self.origin, &self.spacing, &self.direction)
    }
}

impl<const D: usize> Default for ImageMetadata<D> {
    fn default() -> Self {
        Self::new(Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }
}

/// serde does not derive for `[T; D]` with a const generic `D`.
mod index_array {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const D: usize>(index: &[i64; D], s: S) -> Result<S::Ok, S::Error> {
        index.as_slice().serialize(s)
    }

    pub fn deserialize<'de, De: Deserializer<'de>, const D: usize>(d: De) -> Result<[i64; D], De::Error> {
        let values = Vec::<i64>::deserialize(d)?;
        let len = values.len();
        values
            .try_into()
            .map_err(|_| De::Error::custom(format!("expected {} index components, got {}", D, len)))
    }
}
