//! Rectangular index regions.

/// A rectangular region of an image grid: start index and size per axis.
///
/// Axis order is `(x, y, z, ...)`. Regions replace the requested/buffered
/// region negotiation of a demand-driven pipeline: each stage computes the
/// input regions it needs with a plain function of the requested output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRegion<const D: usize> {
    pub index: [i64; D],
    pub size: [usize; D],
}

impl<const D: usize> ImageRegion<D> {
    pub fn new(index: [i64; D], size: [usize; D]) -> Self {
        Self { index, size }
    }

    /// Number of pixels in the region.
    pub fn num_pixels(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// One past the last index along `axis`.
    pub fn upper(&self, axis: usize) -> i64 {
        self.index[axis] + self.size[axis] as i64
    }

    /// Whether `index` lies inside the region.
    pub fn contains_index(&self, index: &[i64; D]) -> bool {
        (0..D).all(|a| index[a] >= self.index[a] && index[a] < self.upper(a))
    }

    /// Whether `other` lies entirely inside this region.
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty()
            || (0..D).all(|a| other.index[a] >= self.index[a] && other.upper(a) <= self.upper(a))
    }

    /// Replace the extent along one axis.
    pub fn with_axis(mut self, axis: usize, index: i64, size: usize) -> Self {
        self.index[axis] = index;
        self.size[axis] = size;
        self
    }
}
