use crate::volume::{Geometry, Region, RegionError};

/// Per-axis padding applied around each volume's region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Boundary(Vec<u64>);

impl Boundary {
    pub fn new(padding: Vec<u64>) -> Self {
        Self(padding)
    }

    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// The padding to use for a volume of `ndim` axes. A boundary with a
    /// different number of entries is ignored.
    pub fn padding_for(&self, ndim: usize) -> Option<&[u64]> {
        (self.0.len() == ndim).then_some(self.0.as_slice())
    }
}

impl From<Vec<u64>> for Boundary {
    fn from(padding: Vec<u64>) -> Self {
        Self(padding)
    }
}

/// First and last index of a region after boundary padding.
///
/// The padding is subtracted once from the first index and the last index is
/// then extended by twice the padding, measured from the shifted start. Files
/// produced by earlier merges rely on this exact extent.
pub fn padded_corners(geometry: &Geometry, boundary: &Boundary) -> (Vec<i64>, Vec<i64>) {
    let region = geometry.region();
    let mut min = region.min();
    let padding = boundary.padding_for(region.ndim());
    if let Some(padding) = padding {
        for (m, &p) in min.iter_mut().zip(padding) {
            *m -= p as i64;
        }
    }
    let mut max: Vec<i64> = min
        .iter()
        .zip(region.size())
        .map(|(&m, &s)| m + s as i64 - 1)
        .collect();
    if let Some(padding) = padding {
        for (m, &p) in max.iter_mut().zip(padding) {
            *m += 2 * p as i64;
        }
    }
    (min, max)
}

/// Accumulates the output region of a merge in the base volume's frame.
///
/// Starts from the padded base region. Each secondary contributes both corners
/// of its padded region, mapped through physical space; a rotated secondary may
/// swap their order, so both corners are compared against both bounds.
#[derive(Debug, Clone)]
pub struct BoundsAccumulator {
    base: Geometry,
    boundary: Boundary,
    min: Vec<i64>,
    max: Vec<i64>,
}

impl BoundsAccumulator {
    pub fn new(base: &Geometry, boundary: &Boundary) -> Self {
        let (min, max) = padded_corners(base, boundary);
        Self {
            base: base.clone(),
            boundary: boundary.clone(),
            min,
            max,
        }
    }

    /// Grow the bounds to hold the padded extent of `secondary`.
    pub fn include(&mut self, secondary: &Geometry) {
        let (min_org, max_org) = padded_corners(secondary, &self.boundary);
        let corners = [min_org, max_org].map(|corner| {
            let point = secondary.index_to_physical(&corner);
            self.base.physical_to_index(&point)
        });

        for axis in 0..self.min.len() {
            for corner in &corners {
                self.min[axis] = self.min[axis].min(corner[axis]);
                self.max[axis] = self.max[axis].max(corner[axis]);
            }
        }
    }

    pub fn min(&self) -> &[i64] {
        &self.min
    }

    pub fn max(&self) -> &[i64] {
        &self.max
    }

    pub fn region(&self) -> Result<Region, RegionError> {
        Region::from_bounds(&self.min, &self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Direction;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    fn geometry(index: Vec<i64>, size: Vec<usize>, origin: Vec<f64>) -> Geometry {
        let ndim = size.len();
        Geometry::new(
            Region::new(index, size).unwrap(),
            vec![1.0; ndim],
            origin,
            Direction::identity(ndim),
        )
        .unwrap()
    }

    #[rstest]
    #[case(vec![], vec![0, 0, 0], vec![9, 9, 9])]
    #[case(vec![0, 0, 0], vec![0, 0, 0], vec![9, 9, 9])]
    #[case(vec![1, 2, 0], vec![-1, -2, 0], vec![10, 11, 9])]
    #[case(vec![1, 1], vec![0, 0, 0], vec![9, 9, 9])]
    fn test_padded_corners(
        #[case] boundary: Vec<u64>,
        #[case] expected_min: Vec<i64>,
        #[case] expected_max: Vec<i64>,
    ) {
        let base = geometry(vec![0, 0, 0], vec![10, 10, 10], vec![0.0; 3]);
        let (min, max) = padded_corners(&base, &Boundary::new(boundary));
        assert_eq!(min, expected_min);
        assert_eq!(max, expected_max);
    }

    #[test]
    fn test_mismatched_boundary_is_zero_padding() {
        let base = geometry(vec![0, 0, 0], vec![8, 6, 4], vec![0.0; 3]);
        let secondary = geometry(vec![0, 0, 0], vec![8, 6, 4], vec![3.0, -2.0, 1.0]);

        let mut padded = BoundsAccumulator::new(&base, &Boundary::new(vec![2, 2]));
        padded.include(&secondary);
        let mut unpadded = BoundsAccumulator::new(&base, &Boundary::new(vec![0, 0, 0]));
        unpadded.include(&secondary);

        assert_eq!(padded.region().unwrap(), unpadded.region().unwrap());
    }

    #[test]
    fn test_shifted_secondary() {
        let base = geometry(vec![0, 0, 0], vec![10, 10, 10], vec![0.0; 3]);
        let secondary = geometry(vec![0, 0, 0], vec![10, 10, 10], vec![5.0, -3.0, 0.0]);

        let mut bounds = BoundsAccumulator::new(&base, &Boundary::none());
        bounds.include(&secondary);
        let region = bounds.region().unwrap();
        assert_eq!(region.index(), &[0, -3, 0]);
        assert_eq!(region.size(), &[15, 13, 10]);
    }

    #[test]
    fn test_boundary_applies_to_secondary() {
        let base = geometry(vec![0, 0], vec![4, 4], vec![0.0; 2]);
        let secondary = geometry(vec![0, 0], vec![4, 4], vec![10.0, 0.0]);

        let mut bounds = BoundsAccumulator::new(&base, &Boundary::new(vec![1, 0]));
        bounds.include(&secondary);
        // Secondary padded corners are (-1, 0) and (4, 3), i.e. x in [9, 14] in the base frame
        assert_eq!(bounds.min(), &[-1, 0]);
        assert_eq!(bounds.max(), &[14, 3]);
    }

    #[test]
    fn test_rotated_secondary_swaps_corners() {
        let base = geometry(vec![0, 0], vec![5, 5], vec![0.0; 2]);
        // Axes flipped: increasing index moves towards negative physical x and y
        let direction = Direction::new(array![[-1.0, 0.0], [0.0, -1.0]]).unwrap();
        let secondary = Geometry::new(
            Region::from_size(vec![5, 5]).unwrap(),
            vec![1.0, 1.0],
            vec![2.0, 2.0],
            direction,
        )
        .unwrap();

        let mut bounds = BoundsAccumulator::new(&base, &Boundary::none());
        bounds.include(&secondary);
        assert_eq!(bounds.min(), &[-2, -2]);
        assert_eq!(bounds.max(), &[4, 4]);
    }

    #[test]
    fn test_random_regions_contain_inputs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let base_size: Vec<usize> = (0..3).map(|_| rng.gen_range(1..20)).collect();
            let base_index: Vec<i64> = (0..3).map(|_| rng.gen_range(-5..5)).collect();
            let base = geometry(base_index, base_size, vec![0.0; 3]);

            let mut bounds = BoundsAccumulator::new(&base, &Boundary::none());
            let mut secondaries = Vec::new();
            for _ in 0..rng.gen_range(0..4) {
                let size: Vec<usize> = (0..3).map(|_| rng.gen_range(1..20)).collect();
                let origin: Vec<f64> = (0..3).map(|_| rng.gen_range(-30..30) as f64).collect();
                let secondary = geometry(vec![0, 0, 0], size, origin);
                bounds.include(&secondary);
                secondaries.push(secondary);
            }
            let region = bounds.region().unwrap();

            assert!(region.contains_region(base.region()));
            for secondary in &secondaries {
                for axis in 0..3 {
                    assert!(region.size()[axis] >= base.region().size()[axis]);
                    assert!(region.size()[axis] >= secondary.region().size()[axis]);
                }
            }
        }
    }
}
