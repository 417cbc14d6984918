//! Rigid alignment of a moving volume onto a fixed volume.
//!
//! The optimiser is behind [`RegistrationService`]; the merge only relies on
//! the returned [`RigidTransform`] and on [`resample`] to bring the moving
//! volume (and any auxiliary volume on the moving grid) onto the fixed grid.

pub mod resample;
pub mod transform;

pub use resample::*;
pub use transform::*;

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;
use tracing::debug;

use crate::volume::{Geometry, Volume};

pub const DEFAULT_SAMPLING_RATIO: f64 = 0.01;
pub const DEFAULT_ITERATIONS: u32 = 300;
pub const DEFAULT_EXPECTED_OFFSET: f64 = 10.0;
pub const DEFAULT_EXPECTED_ROTATION: f64 = 0.1;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistrationError {
    #[snafu(display("invalid registration setting: {}", reason))]
    InvalidConfig { reason: String },

    #[snafu(display("fixed volume has {} axes but moving volume has {}", fixed, moving))]
    Dimensionality { fixed: usize, moving: usize },

    #[snafu(display("moving volume does not overlap the fixed volume"))]
    NoOverlap,

    #[snafu(display("registration did not converge within {} iterations", iterations))]
    NotConverged { iterations: u32 },

    #[snafu(display("could not save transform: {}", source))]
    SaveTransform {
        #[snafu(source(from(TransformError, Box::new)))]
        source: Box<TransformError>,
    },
}

/// Settings passed through to the registration service. Only rigid
/// registration is requested: no initial or loaded transform, no affine or
/// deformable stages.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationConfig {
    pub sampling_ratio: f64,
    pub iterations: u32,
    pub expected_offset: f64,
    pub expected_rotation: f64,
    pub sample_from_overlap: bool,
    pub save_transform: Option<PathBuf>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            sampling_ratio: DEFAULT_SAMPLING_RATIO,
            iterations: DEFAULT_ITERATIONS,
            expected_offset: DEFAULT_EXPECTED_OFFSET,
            expected_rotation: DEFAULT_EXPECTED_ROTATION,
            sample_from_overlap: true,
            save_transform: None,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !(self.sampling_ratio > 0.0 && self.sampling_ratio <= 1.0) {
            return InvalidConfigSnafu {
                reason: format!("sampling ratio {} is not in (0, 1]", self.sampling_ratio),
            }
            .fail();
        }
        if self.iterations == 0 {
            return InvalidConfigSnafu {
                reason: "iteration cap must be at least 1",
            }
            .fail();
        }
        if self.expected_offset < 0.0 || self.expected_rotation < 0.0 {
            return InvalidConfigSnafu {
                reason: "expected offset and rotation must be non-negative",
            }
            .fail();
        }
        Ok(())
    }
}

pub trait RegistrationService {
    /// Estimate the rigid transform taking fixed physical points to moving
    /// physical points.
    fn register(
        &self,
        fixed: &Volume,
        moving: &Volume,
        config: &RegistrationConfig,
    ) -> Result<RigidTransform, RegistrationError>;
}

impl<T: RegistrationService + ?Sized> RegistrationService for &T {
    fn register(
        &self,
        fixed: &Volume,
        moving: &Volume,
        config: &RegistrationConfig,
    ) -> Result<RigidTransform, RegistrationError> {
        (**self).register(fixed, moving, config)
    }
}

/// Trusts the scanner geometry of both volumes: the rigid transform is the
/// identity in physical space.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometryRegistration;

impl RegistrationService for GeometryRegistration {
    fn register(
        &self,
        fixed: &Volume,
        moving: &Volume,
        config: &RegistrationConfig,
    ) -> Result<RigidTransform, RegistrationError> {
        config.validate()?;
        if fixed.ndim() != moving.ndim() {
            return DimensionalitySnafu {
                fixed: fixed.ndim(),
                moving: moving.ndim(),
            }
            .fail();
        }
        if config.sample_from_overlap && !overlaps(fixed.geometry(), moving.geometry()) {
            return NoOverlapSnafu.fail();
        }
        debug!(
            "Geometry registration (sampling ratio {}, {} iterations, offset {}, rotation {})",
            config.sampling_ratio,
            config.iterations,
            config.expected_offset,
            config.expected_rotation
        );
        Ok(RigidTransform::identity(fixed.ndim()))
    }
}

/// Whether the physical extent of `moving` intersects the region of `fixed`.
pub fn overlaps(fixed: &Geometry, moving: &Geometry) -> bool {
    let corners = [moving.region().min(), moving.region().max()].map(|corner| {
        fixed.physical_to_continuous_index(&moving.index_to_physical(&corner))
    });
    let (min, max) = (fixed.region().min(), fixed.region().max());
    (0..fixed.ndim()).all(|axis| {
        let lo = corners[0][axis].min(corners[1][axis]);
        let hi = corners[0][axis].max(corners[1][axis]);
        hi >= min[axis] as f64 - 0.5 && lo <= max[axis] as f64 + 0.5
    })
}

/// A moving volume brought onto the grid of the fixed volume.
#[derive(Debug)]
pub struct Registered {
    pub transform: RigidTransform,
    pub resampled: Volume,
}

impl Registered {
    /// Apply the same transform to another volume defined on the moving grid.
    pub fn resample_auxiliary(
        &self,
        auxiliary: &Volume,
        interpolation: Interpolation,
        background: f64,
    ) -> Volume {
        resample(
            auxiliary,
            self.resampled.geometry(),
            &self.transform,
            interpolation,
            background,
        )
    }

    /// Binary mask of the output voxels that the moving volume covers.
    pub fn coverage_mask(&self, moving: &Geometry) -> Volume {
        let ones = Volume::filled(moving.clone(), 1.0);
        let mut mask = self.resample_auxiliary(&ones, Interpolation::NearestNeighbor, 0.0);
        mask.data_mut()
            .mapv_inplace(|v| if v != 0.0 { 1.0 } else { 0.0 });
        mask
    }
}

/// Drives a [`RegistrationService`] with a fixed configuration.
pub struct RegistrationAdapter<'a, R: ?Sized> {
    service: &'a R,
    config: &'a RegistrationConfig,
}

impl<'a, R: RegistrationService + ?Sized> RegistrationAdapter<'a, R> {
    pub fn new(service: &'a R, config: &'a RegistrationConfig) -> Self {
        Self { service, config }
    }

    /// Register `moving` to `fixed` and resample it onto the fixed grid with
    /// linear interpolation. When configured, the transform is saved before
    /// resampling.
    pub fn align(
        &self,
        fixed: &Volume,
        moving: &Volume,
        background: f64,
    ) -> Result<Registered, RegistrationError> {
        let transform = self.service.register(fixed, moving, self.config)?;
        if let Some(path) = &self.config.save_transform {
            transform.save(path).context(SaveTransformSnafu)?;
            debug!("Saved transform to {}", path.display());
        }
        let resampled = resample(
            moving,
            fixed.geometry(),
            &transform,
            Interpolation::Linear,
            background,
        );
        Ok(Registered {
            transform,
            resampled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Direction, Region};
    use rstest::rstest;
    use tempfile::tempdir;

    fn volume(index: Vec<i64>, size: Vec<usize>, origin: Vec<f64>, value: f32) -> Volume {
        let ndim = size.len();
        let geometry = Geometry::new(
            Region::new(index, size).unwrap(),
            vec![1.0; ndim],
            origin,
            Direction::identity(ndim),
        )
        .unwrap();
        Volume::filled(geometry, value)
    }

    #[rstest]
    #[case(RegistrationConfig { sampling_ratio: 0.0, ..Default::default() })]
    #[case(RegistrationConfig { sampling_ratio: 1.5, ..Default::default() })]
    #[case(RegistrationConfig { iterations: 0, ..Default::default() })]
    #[case(RegistrationConfig { expected_offset: -1.0, ..Default::default() })]
    fn test_invalid_config(#[case] config: RegistrationConfig) {
        assert!(matches!(
            config.validate(),
            Err(RegistrationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_geometry_registration_identity() {
        let fixed = volume(vec![0, 0, 0], vec![4, 4, 4], vec![0.0; 3], 1.0);
        let moving = volume(vec![0, 0, 0], vec![4, 4, 4], vec![2.0, 0.0, 0.0], 2.0);
        let transform = GeometryRegistration
            .register(&fixed, &moving, &RegistrationConfig::default())
            .unwrap();
        assert_eq!(transform, RigidTransform::identity(3));
    }

    #[test]
    fn test_no_overlap() {
        let fixed = volume(vec![0, 0], vec![4, 4], vec![0.0; 2], 1.0);
        let moving = volume(vec![0, 0], vec![4, 4], vec![100.0, 0.0], 2.0);
        let result = GeometryRegistration.register(&fixed, &moving, &RegistrationConfig::default());
        assert!(matches!(result, Err(RegistrationError::NoOverlap)));
    }

    #[test]
    fn test_dimensionality() {
        let fixed = volume(vec![0, 0], vec![4, 4], vec![0.0; 2], 1.0);
        let moving = volume(vec![0, 0, 0], vec![4, 4, 4], vec![0.0; 3], 2.0);
        let result = GeometryRegistration.register(&fixed, &moving, &RegistrationConfig::default());
        assert!(matches!(
            result,
            Err(RegistrationError::Dimensionality { fixed: 2, moving: 3 })
        ));
    }

    #[test]
    fn test_align_and_coverage_mask() {
        let fixed = volume(vec![0, 0], vec![6, 2], vec![0.0; 2], 1.0);
        let moving = volume(vec![0, 0], vec![3, 2], vec![2.0, 0.0], 5.0);

        let temp_dir = tempdir().unwrap();
        let config = RegistrationConfig {
            save_transform: Some(temp_dir.path().join("last.tfm")),
            ..Default::default()
        };
        let adapter = RegistrationAdapter::new(&GeometryRegistration, &config);
        let registered = adapter.align(&fixed, &moving, -1.0).unwrap();
        assert!(temp_dir.path().join("last.tfm").exists());

        let values: Vec<f32> = (0..6).map(|x| registered.resampled.get(&[x, 0]).unwrap()).collect();
        assert_eq!(values, vec![-1.0, -1.0, 5.0, 5.0, 5.0, -1.0]);

        let mask = registered.coverage_mask(moving.geometry());
        let mask: Vec<f32> = (0..6).map(|x| mask.get(&[x, 1]).unwrap()).collect();
        assert_eq!(mask, vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
