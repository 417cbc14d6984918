use ndarray::{Array1, Array2};
use snafu::Snafu;

use crate::volume::region::Region;

const SINGULAR_EPSILON: f64 = 1e-12;

#[derive(Debug, Snafu, PartialEq)]
pub enum GeometryError {
    #[snafu(display("direction matrix must be square, got {}x{}", rows, cols))]
    NonSquareDirection { rows: usize, cols: usize },
    #[snafu(display("direction matrix is singular"))]
    SingularDirection,
    #[snafu(display("{} has {} entries, expected {}", name, actual, expected))]
    AxisCount {
        name: &'static str,
        actual: usize,
        expected: usize,
    },
    #[snafu(display("spacing must be positive and finite, got {:?}", spacing))]
    InvalidSpacing { spacing: Vec<f64> },
}

/// Direction cosines of the index axes, with the inverse cached for
/// physical-to-index conversions.
#[derive(Clone, Debug, PartialEq)]
pub struct Direction {
    matrix: Array2<f64>,
    inverse: Array2<f64>,
}

impl Direction {
    pub fn identity(ndim: usize) -> Self {
        Self {
            matrix: Array2::eye(ndim),
            inverse: Array2::eye(ndim),
        }
    }

    pub fn new(matrix: Array2<f64>) -> Result<Self, GeometryError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(GeometryError::NonSquareDirection { rows, cols });
        }
        let inverse = invert(&matrix).ok_or(GeometryError::SingularDirection)?;
        Ok(Self { matrix, inverse })
    }

    /// Build from a row-major list of `ndim * ndim` values.
    pub fn from_row_major(ndim: usize, values: &[f64]) -> Result<Self, GeometryError> {
        if values.len() != ndim * ndim {
            return Err(GeometryError::AxisCount {
                name: "direction",
                actual: values.len(),
                expected: ndim * ndim,
            });
        }
        let matrix = Array2::from_shape_vec((ndim, ndim), values.to_vec())
            .map_err(|_| GeometryError::SingularDirection)?;
        Self::new(matrix)
    }

    pub fn ndim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }

    pub fn to_row_major(&self) -> Vec<f64> {
        self.matrix.iter().copied().collect()
    }
}

/// Gauss-Jordan elimination with partial pivoting.
pub(crate) fn invert(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < SINGULAR_EPSILON {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
        }
        let p = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= p;
            inv[[col, k]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Some(inv)
}

/// Round half up, matching the usual index convention for medical images.
#[inline]
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Placement of a voxel grid in physical space.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    region: Region,
    spacing: Vec<f64>,
    origin: Vec<f64>,
    direction: Direction,
}

impl Geometry {
    pub fn new(
        region: Region,
        spacing: Vec<f64>,
        origin: Vec<f64>,
        direction: Direction,
    ) -> Result<Self, GeometryError> {
        let ndim = region.ndim();
        for (name, actual) in [
            ("spacing", spacing.len()),
            ("origin", origin.len()),
            ("direction", direction.ndim()),
        ] {
            if actual != ndim {
                return Err(GeometryError::AxisCount {
                    name,
                    actual,
                    expected: ndim,
                });
            }
        }
        if spacing.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(GeometryError::InvalidSpacing { spacing });
        }
        Ok(Self {
            region,
            spacing,
            origin,
            direction,
        })
    }

    /// Unit spacing, zero origin and identity direction.
    pub fn unit(region: Region) -> Self {
        let ndim = region.ndim();
        Self {
            region,
            spacing: vec![1.0; ndim],
            origin: vec![0.0; ndim],
            direction: Direction::identity(ndim),
        }
    }

    pub fn ndim(&self) -> usize {
        self.region.ndim()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    pub fn direction(&self) -> &Direction {
        &self.direction
    }

    /// Same physical frame, different index region.
    pub fn with_region(&self, region: Region) -> Self {
        Self {
            region,
            ..self.clone()
        }
    }

    pub fn continuous_index_to_physical(&self, index: &[f64]) -> Vec<f64> {
        let scaled: Array1<f64> = index
            .iter()
            .zip(&self.spacing)
            .map(|(&i, &s)| i * s)
            .collect();
        let rotated = self.direction.matrix().dot(&scaled);
        rotated
            .iter()
            .zip(&self.origin)
            .map(|(&r, &o)| r + o)
            .collect()
    }

    pub fn index_to_physical(&self, index: &[i64]) -> Vec<f64> {
        let index: Vec<f64> = index.iter().map(|&i| i as f64).collect();
        self.continuous_index_to_physical(&index)
    }

    pub fn physical_to_continuous_index(&self, point: &[f64]) -> Vec<f64> {
        let shifted: Array1<f64> = point
            .iter()
            .zip(&self.origin)
            .map(|(&p, &o)| p - o)
            .collect();
        let rotated = self.direction.inverse().dot(&shifted);
        rotated
            .iter()
            .zip(&self.spacing)
            .map(|(&r, &s)| r / s)
            .collect()
    }

    pub fn physical_to_index(&self, point: &[f64]) -> Vec<i64> {
        self.physical_to_continuous_index(point)
            .into_iter()
            .map(round_half_up)
            .collect()
    }

    /// True when both grids share region, spacing, origin and direction.
    pub fn same_grid(&self, other: &Geometry) -> bool {
        self == other
    }
}
