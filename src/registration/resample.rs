use itertools::Itertools;
use ndarray::parallel::prelude::*;
use ndarray::{Axis, Dimension, IxDyn};
use std::fmt;

use crate::registration::transform::RigidTransform;
use crate::volume::{round_half_up, Geometry, Volume};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    NearestNeighbor,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interpolation_str = match self {
            Interpolation::Linear => "linear",
            Interpolation::NearestNeighbor => "nearest-neighbor",
        };
        write!(f, "{}", interpolation_str)
    }
}

/// Sampling of a moving volume at continuous indices.
struct Sampler<'a> {
    volume: &'a Volume,
    start: Vec<i64>,
    end: Vec<i64>,
    corners: Vec<Vec<i64>>,
}

impl<'a> Sampler<'a> {
    fn new(volume: &'a Volume) -> Self {
        let region = volume.region();
        let start = region.min();
        let end = region.max();
        let corners = (0..region.ndim())
            .map(|_| 0..2_i64)
            .multi_cartesian_product()
            .collect();
        Self {
            volume,
            start,
            end,
            corners,
        }
    }

    /// A continuous index is inside when it lies within half a voxel of the buffer.
    fn is_inside(&self, index: &[f64]) -> bool {
        index
            .iter()
            .zip(self.start.iter().zip(&self.end))
            .all(|(&c, (&s, &e))| c >= s as f64 - 0.5 && c < e as f64 + 0.5)
    }

    fn sample_clamped(&self, index: &[i64]) -> f64 {
        let offset: Vec<usize> = index
            .iter()
            .zip(self.start.iter().zip(&self.end))
            .map(|(&i, (&s, &e))| (i.clamp(s, e) - s) as usize)
            .collect();
        self.volume.data()[IxDyn(&offset)] as f64
    }

    fn nearest(&self, index: &[f64]) -> f64 {
        let nearest: Vec<i64> = index.iter().map(|&c| round_half_up(c)).collect();
        self.sample_clamped(&nearest)
    }

    fn linear(&self, index: &[f64]) -> f64 {
        let base: Vec<i64> = index.iter().map(|&c| c.floor() as i64).collect();
        let frac: Vec<f64> = index
            .iter()
            .zip(&base)
            .map(|(&c, &b)| c - b as f64)
            .collect();

        let mut value = 0.0;
        let mut neighbor = vec![0_i64; base.len()];
        for corner in &self.corners {
            let mut weight = 1.0;
            for (axis, &bit) in corner.iter().enumerate() {
                weight *= if bit == 1 { frac[axis] } else { 1.0 - frac[axis] };
                neighbor[axis] = base[axis] + bit;
            }
            if weight != 0.0 {
                value += weight * self.sample_clamped(&neighbor);
            }
        }
        value
    }

    fn sample(&self, index: &[f64], interpolation: Interpolation) -> Option<f64> {
        if !self.is_inside(index) {
            return None;
        }
        Some(match interpolation {
            Interpolation::Linear => self.linear(index),
            Interpolation::NearestNeighbor => self.nearest(index),
        })
    }
}

/// Resample `moving` onto `grid`. Each output voxel is mapped to physical
/// space, through `transform` into the moving frame, and interpolated there.
/// Voxels that land outside the moving buffer receive `background`.
pub fn resample(
    moving: &Volume,
    grid: &Geometry,
    transform: &RigidTransform,
    interpolation: Interpolation,
    background: f64,
) -> Volume {
    let sampler = Sampler::new(moving);
    let start = grid.region().min();
    let mut output = Volume::filled(grid.clone(), background as f32);

    output
        .data_mut()
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(first, mut plane)| {
            let mut index = start.clone();
            index[0] = start[0] + first as i64;
            for (offset, value) in plane.indexed_iter_mut() {
                for (axis, &o) in offset.slice().iter().enumerate() {
                    index[axis + 1] = start[axis + 1] + o as i64;
                }
                let point = transform.transform_point(&grid.index_to_physical(&index));
                let continuous = moving.geometry().physical_to_continuous_index(&point);
                if let Some(sample) = sampler.sample(&continuous, interpolation) {
                    *value = sample as f32;
                }
            }
        });
    output
}
