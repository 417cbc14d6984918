use snafu::Snafu;
use std::fmt;

#[derive(Debug, Snafu, PartialEq)]
pub enum RegionError {
    #[snafu(display("region index has {} axes but size has {}", index, size))]
    AxisCountMismatch { index: usize, size: usize },
    #[snafu(display("region size must be at least 1 on every axis, got {:?}", size))]
    EmptyAxis { size: Vec<usize> },
}

/// An axis-aligned box in index space, described by its first index and its size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    index: Vec<i64>,
    size: Vec<usize>,
}

impl Region {
    pub fn new(index: Vec<i64>, size: Vec<usize>) -> Result<Self, RegionError> {
        if index.len() != size.len() {
            return Err(RegionError::AxisCountMismatch {
                index: index.len(),
                size: size.len(),
            });
        }
        if size.iter().any(|&s| s == 0) {
            return Err(RegionError::EmptyAxis { size });
        }
        Ok(Self { index, size })
    }

    /// Build a region from inclusive bounds. Axes where `max < min` are rejected.
    pub fn from_bounds(min: &[i64], max: &[i64]) -> Result<Self, RegionError> {
        if min.len() != max.len() {
            return Err(RegionError::AxisCountMismatch {
                index: min.len(),
                size: max.len(),
            });
        }
        let size = min
            .iter()
            .zip(max)
            .map(|(&lo, &hi)| (hi - lo + 1).max(0) as usize)
            .collect();
        Self::new(min.to_vec(), size)
    }

    /// A region starting at the origin of index space.
    pub fn from_size(size: Vec<usize>) -> Result<Self, RegionError> {
        Self::new(vec![0; size.len()], size)
    }

    pub fn ndim(&self) -> usize {
        self.size.len()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn min(&self) -> Vec<i64> {
        self.index.clone()
    }

    /// Last index on each axis (inclusive).
    pub fn max(&self) -> Vec<i64> {
        self.index
            .iter()
            .zip(&self.size)
            .map(|(&i, &s)| i + s as i64 - 1)
            .collect()
    }

    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    pub fn contains(&self, index: &[i64]) -> bool {
        index.len() == self.ndim()
            && index
                .iter()
                .zip(self.index.iter().zip(&self.size))
                .all(|(&x, (&start, &size))| x >= start && x < start + size as i64)
    }

    pub fn contains_region(&self, other: &Region) -> bool {
        other.ndim() == self.ndim() && self.contains(&other.min()) && self.contains(&other.max())
    }

    /// Offset of an absolute index relative to the region start, if inside.
    pub fn offset_of(&self, index: &[i64]) -> Option<Vec<usize>> {
        if !self.contains(index) {
            return None;
        }
        Some(
            index
                .iter()
                .zip(&self.index)
                .map(|(&x, &start)| (x - start) as usize)
                .collect(),
        )
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index={:?} size={:?}", self.index, self.size)
    }
}
