//! Regular-grid scalar volumes placed in physical space.
//!
//! A [`Volume`] pairs an `ndarray` buffer with a [`Geometry`]. The buffer is
//! stored in axis order, so for a 3D volume `data[[x, y, z]]` is the sample at
//! offset `(x, y, z)` from the start of the region. Absolute indices (which may
//! be negative) are translated through the region.

pub mod geometry;
pub mod region;

pub use geometry::*;
pub use region::*;

use ndarray::{ArrayD, IxDyn};
use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("buffer shape {:?} does not match region size {:?}", shape, size))]
pub struct ShapeError {
    shape: Vec<usize>,
    size: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    geometry: Geometry,
    data: ArrayD<f32>,
}

impl Volume {
    pub fn new(geometry: Geometry, data: ArrayD<f32>) -> Result<Self, ShapeError> {
        if data.shape() != geometry.region().size() {
            return Err(ShapeError {
                shape: data.shape().to_vec(),
                size: geometry.region().size().to_vec(),
            });
        }
        Ok(Self { geometry, data })
    }

    pub fn filled(geometry: Geometry, value: f32) -> Self {
        let data = ArrayD::from_elem(IxDyn(geometry.region().size()), value);
        Self { geometry, data }
    }

    /// Build a volume by evaluating `f` at every absolute index of the region.
    pub fn from_fn<F>(geometry: Geometry, mut f: F) -> Self
    where
        F: FnMut(&[i64]) -> f32,
    {
        let start = geometry.region().index().to_vec();
        let mut absolute = start.clone();
        let data = ArrayD::from_shape_fn(IxDyn(geometry.region().size()), |offset| {
            for (axis, value) in absolute.iter_mut().enumerate() {
                *value = start[axis] + offset[axis] as i64;
            }
            f(&absolute)
        });
        Self { geometry, data }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn region(&self) -> &Region {
        self.geometry.region()
    }

    pub fn ndim(&self) -> usize {
        self.geometry.ndim()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    /// Sample at an absolute index, or `None` outside the region.
    pub fn get(&self, index: &[i64]) -> Option<f32> {
        let offset = self.region().offset_of(index)?;
        self.data.get(IxDyn(&offset)).copied()
    }

    /// Write a sample at an absolute index. Returns `false` outside the region.
    pub fn set(&mut self, index: &[i64], value: f32) -> bool {
        let Some(offset) = self.region().offset_of(index) else {
            return false;
        };
        match self.data.get_mut(IxDyn(&offset)) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    /// A new volume on the same grid with every sample set to `value`.
    pub fn same_grid_filled(&self, value: f32) -> Self {
        Self::filled(self.geometry.clone(), value)
    }

    pub fn same_grid(&self, other: &Volume) -> bool {
        self.geometry.same_grid(&other.geometry)
    }

    /// Largest sample, or zero for an all-negative or empty volume.
    pub fn max_value(&self) -> f64 {
        self.data
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(index: Vec<i64>, size: Vec<usize>) -> Geometry {
        Geometry::unit(Region::new(index, size).unwrap())
    }

    #[test]
    fn test_shape_mismatch() {
        let data = ArrayD::zeros(IxDyn(&[2, 3]));
        assert!(Volume::new(geometry(vec![0, 0], vec![3, 2]), data).is_err());
    }

    #[test]
    fn test_absolute_indexing() {
        let mut volume = Volume::filled(geometry(vec![-2, 5], vec![4, 2]), 0.0);
        assert!(volume.set(&[-2, 5], 1.0));
        assert!(volume.set(&[1, 6], 2.0));
        assert!(!volume.set(&[2, 6], 3.0));

        assert_eq!(volume.get(&[-2, 5]), Some(1.0));
        assert_eq!(volume.get(&[1, 6]), Some(2.0));
        assert_eq!(volume.get(&[-3, 5]), None);
        assert_eq!(volume.data()[[3, 1]], 2.0);
    }

    #[test]
    fn test_from_fn() {
        let volume = Volume::from_fn(geometry(vec![1, -1, 0], vec![2, 2, 2]), |index| {
            (index[0] * 100 + index[1] * 10 + index[2]) as f32
        });
        assert_eq!(volume.get(&[2, 0, 1]), Some(201.0));
        assert_eq!(volume.get(&[1, -1, 0]), Some(90.0));
        assert_eq!(volume.max_value(), 201.0);
    }
}
