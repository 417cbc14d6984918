//! Distance from covered voxels to the nearest uncovered voxel.
//!
//! [`EuclideanDistanceTransform`] computes exact Euclidean distances in
//! physical units with the separable lower-envelope algorithm of Felzenszwalb
//! and Huttenlocher: one 1D pass per axis over squared distances, scaled by the
//! voxel spacing along that axis.
//!
//! Uncovered voxels hold zero. Everything outside the grid counts as
//! uncovered, so a covered voxel always has a positive distance. Axes of length
//! one are not bounded by the exterior, so a single slice is measured in-plane.

use ndarray::{ArrayD, Axis, IxDyn, Slice, Zip};

use crate::volume::Volume;

pub trait DistanceTransformService {
    /// Distance field of a binary mask, on the mask's grid. Any nonzero
    /// sample is treated as covered.
    fn distance_field(&self, mask: &Volume) -> Volume;
}

impl<T: DistanceTransformService + ?Sized> DistanceTransformService for &T {
    fn distance_field(&self, mask: &Volume) -> Volume {
        (**self).distance_field(mask)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanDistanceTransform;

impl DistanceTransformService for EuclideanDistanceTransform {
    fn distance_field(&self, mask: &Volume) -> Volume {
        let shape = mask.data().shape().to_vec();
        let all_singleton = shape.iter().all(|&len| len == 1);
        let pad: Vec<usize> = shape
            .iter()
            .map(|&len| usize::from(len > 1 || all_singleton))
            .collect();

        // Squared distances, with a ring of uncovered voxels on padded axes
        let padded_shape: Vec<usize> = shape.iter().zip(&pad).map(|(&n, &p)| n + 2 * p).collect();
        let mut squared = ArrayD::<f64>::zeros(IxDyn(&padded_shape));
        {
            let mut interior = squared.slice_each_axis_mut(|ax| {
                Slice::from(pad[ax.axis.index()]..ax.len - pad[ax.axis.index()])
            });
            Zip::from(&mut interior)
                .and(mask.data())
                .for_each(|d, &m| *d = if m != 0.0 { f64::INFINITY } else { 0.0 });
        }

        for (axis, &spacing) in mask.geometry().spacing().iter().enumerate() {
            let spacing_sq = spacing * spacing;
            Zip::from(squared.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
                let f: Vec<f64> = lane.iter().copied().collect();
                let d = lower_envelope(&f, spacing_sq);
                lane.iter_mut().zip(d).for_each(|(l, v)| *l = v);
            });
        }

        let interior = squared.slice_each_axis(|ax| {
            Slice::from(pad[ax.axis.index()]..ax.len - pad[ax.axis.index()])
        });
        let mut field = mask.same_grid_filled(0.0);
        Zip::from(field.data_mut())
            .and(&interior)
            .for_each(|out, &d| *out = d.sqrt() as f32);
        field
    }
}

/// One pass of the squared distance transform along a line:
/// `d[q] = min_p (spacing_sq * (q - p)^2 + f[p])`.
fn lower_envelope(f: &[f64], spacing_sq: f64) -> Vec<f64> {
    let n = f.len();
    let mut vertices: Vec<usize> = Vec::with_capacity(n);
    let mut bounds: Vec<f64> = Vec::with_capacity(n);

    let intersect = |p: usize, q: usize| {
        let (pf, qf) = (p as f64, q as f64);
        ((f[q] + spacing_sq * qf * qf) - (f[p] + spacing_sq * pf * pf))
            / (2.0 * spacing_sq * (qf - pf))
    };

    for q in (0..n).filter(|&q| f[q].is_finite()) {
        loop {
            match (vertices.last(), bounds.last()) {
                (Some(&p), Some(&z)) => {
                    let s = intersect(p, q);
                    if s <= z {
                        vertices.pop();
                        bounds.pop();
                        continue;
                    }
                    vertices.push(q);
                    bounds.push(s);
                }
                _ => {
                    vertices.push(q);
                    bounds.push(f64::NEG_INFINITY);
                }
            }
            break;
        }
    }

    if vertices.is_empty() {
        return vec![f64::INFINITY; n];
    }

    let mut k = 0;
    (0..n)
        .map(|q| {
            let qf = q as f64;
            while k + 1 < vertices.len() && bounds[k + 1] < qf {
                k += 1;
            }
            let p = vertices[k];
            let dq = qf - p as f64;
            spacing_sq * dq * dq + f[p]
        })
        .collect()
}

/// Largest value of a distance field, used to normalise weights.
pub fn distance_max(field: &Volume) -> f64 {
    field.max_value()
}
