use ndarray::{Array1, Array2};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};

#[derive(Debug, Snafu)]
pub enum TransformError {
    #[snafu(display("transform parts disagree on dimensionality: {:?}", shapes))]
    Dimensionality { shapes: Vec<usize> },
    #[snafu(display("could not write transform file {}", path.display()))]
    WriteTransform {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

/// Rigid mapping from fixed physical space to moving physical space:
/// `p -> R (p - c) + c + t`.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidTransform {
    matrix: Array2<f64>,
    translation: Array1<f64>,
    center: Array1<f64>,
}

impl RigidTransform {
    pub fn identity(ndim: usize) -> Self {
        Self {
            matrix: Array2::eye(ndim),
            translation: Array1::zeros(ndim),
            center: Array1::zeros(ndim),
        }
    }

    pub fn new(
        matrix: Array2<f64>,
        translation: Array1<f64>,
        center: Array1<f64>,
    ) -> Result<Self, TransformError> {
        let (rows, cols) = matrix.dim();
        if rows != cols || translation.len() != rows || center.len() != rows {
            return Err(TransformError::Dimensionality {
                shapes: vec![rows, cols, translation.len(), center.len()],
            });
        }
        Ok(Self {
            matrix,
            translation,
            center,
        })
    }

    /// Pure translation by `offset`.
    pub fn translation(offset: Vec<f64>) -> Self {
        let ndim = offset.len();
        Self {
            matrix: Array2::eye(ndim),
            translation: Array1::from(offset),
            center: Array1::zeros(ndim),
        }
    }

    pub fn ndim(&self) -> usize {
        self.translation.len()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn offset(&self) -> &Array1<f64> {
        &self.translation
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    pub fn transform_point(&self, point: &[f64]) -> Vec<f64> {
        let p = Array1::from_iter(point.iter().copied()) - &self.center;
        let mapped = self.matrix.dot(&p) + &self.center + &self.translation;
        mapped.to_vec()
    }

    /// Serialize in the plain-text transform format read by ITK-based tools.
    pub fn to_itk_text(&self) -> String {
        let n = self.ndim();
        let join = |values: &mut dyn Iterator<Item = f64>| {
            values.map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
        };
        let parameters = join(&mut self.matrix.iter().chain(self.translation.iter()).copied());
        let fixed = join(&mut self.center.iter().copied());

        format!(
            "#Insight Transform File V1.0\n\
             #Transform 0\n\
             Transform: AffineTransform_double_{n}_{n}\n\
             Parameters: {parameters}\n\
             FixedParameters: {fixed}\n"
        )
    }

    pub fn save(&self, path: &Path) -> Result<(), TransformError> {
        std::fs::write(path, self.to_itk_text()).context(WriteTransformSnafu {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_transform_point() {
        // 90 degree rotation about (1, 1) followed by a shift of (0, 2)
        let transform = RigidTransform::new(
            array![[0.0, -1.0], [1.0, 0.0]],
            array![0.0, 2.0],
            array![1.0, 1.0],
        )
        .unwrap();
        let mapped = transform.transform_point(&[2.0, 1.0]);
        assert!((mapped[0] - 1.0).abs() < 1e-12);
        assert!((mapped[1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimensionality() {
        let result = RigidTransform::new(Array2::eye(3), array![0.0, 0.0], array![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(TransformError::Dimensionality { .. })));
    }

    #[test]
    fn test_save() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("transform.tfm");
        RigidTransform::translation(vec![1.5, -2.0, 0.0])
            .save(&path)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#Insight Transform File V1.0");
        assert_eq!(lines[2], "Transform: AffineTransform_double_3_3");
        assert_eq!(lines[3], "Parameters: 1 0 0 0 1 0 0 0 1 1.5 -2 0");
        assert_eq!(lines[4], "FixedParameters: 0 0 0");
    }

    #[test]
    fn test_itk_text_layout() {
        let transform = RigidTransform::new(
            array![[0.0, -1.0], [1.0, 0.0]],
            array![0.5, 2.0],
            array![1.0, 1.0],
        )
        .unwrap();
        assert_eq!(
            transform.to_itk_text(),
            "#Insight Transform File V1.0\n\
             #Transform 0\n\
             Transform: AffineTransform_double_2_2\n\
             Parameters: 0 -1 1 0 0.5 2\n\
             FixedParameters: 1 1\n"
        );
    }
}
