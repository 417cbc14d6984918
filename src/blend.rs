//! Per-voxel combination of the running output with a registered secondary.
//!
//! Every voxel carries four values: the current output sample `tf1`, the
//! output coverage distance `tf1d`, the resampled secondary sample `tf2` and
//! the secondary coverage distance `tf2d`. A nonzero distance means the source
//! covers the voxel. Arithmetic is carried out in `f64`.

use ndarray::{ArrayD, Zip};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendPolicy {
    /// Secondary samples replace the output wherever the secondary has data
    #[default]
    Overwrite,
    /// Mean of both sources where they overlap
    Average,
    /// Distance-weighted mean where they overlap
    Weighted,
}

impl BlendPolicy {
    /// Policy from the `--average` / `--weighted` switches. Weighted wins when
    /// both are set; neither selects overwrite.
    pub fn from_flags(average: bool, weighted: bool) -> Self {
        match (average, weighted) {
            (_, true) => BlendPolicy::Weighted,
            (true, false) => BlendPolicy::Average,
            (false, false) => BlendPolicy::Overwrite,
        }
    }
}

impl fmt::Display for BlendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy_str = match self {
            BlendPolicy::Overwrite => "overwrite",
            BlendPolicy::Average => "average",
            BlendPolicy::Weighted => "weighted",
        };
        write!(f, "{}", policy_str)
    }
}

/// Blend a single voxel and return the new output value.
///
/// Under [`BlendPolicy::Weighted`] a voxel covered only by the secondary keeps
/// its current output value. Unlike [`BlendPolicy::Average`], weighted blending
/// never fills output gaps from the secondary.
#[inline]
pub fn blend_voxel(
    policy: BlendPolicy,
    tf1: f64,
    tf1d: f64,
    tf2: f64,
    tf2d: f64,
    dist_max: f64,
) -> f64 {
    let both = tf1d != 0.0 && tf2d != 0.0;
    match policy {
        BlendPolicy::Weighted => {
            if both {
                let ratio = 0.5 * (tf2d / dist_max);
                if tf1d > tf2d {
                    ratio * tf2 + (1.0 - ratio) * tf1
                } else {
                    (1.0 - ratio) * tf2 + ratio * tf1
                }
            } else {
                tf1
            }
        }
        BlendPolicy::Average => {
            if both {
                (tf1 + tf2) / 2.0
            } else if tf2d != 0.0 {
                tf2
            } else {
                tf1
            }
        }
        BlendPolicy::Overwrite => {
            if tf2d != 0.0 {
                tf2
            } else {
                tf1
            }
        }
    }
}

/// Blend a registered secondary into the output, voxel by voxel. All arrays
/// share the output grid.
pub fn blend_volume(
    policy: BlendPolicy,
    output: &mut ArrayD<f32>,
    output_distance: &ArrayD<f32>,
    secondary: &ArrayD<f32>,
    secondary_distance: &ArrayD<f32>,
    dist_max: f64,
) {
    Zip::from(output)
        .and(output_distance)
        .and(secondary)
        .and(secondary_distance)
        .par_for_each(|tf1, &tf1d, &tf2, &tf2d| {
            *tf1 = blend_voxel(
                policy,
                *tf1 as f64,
                tf1d as f64,
                tf2 as f64,
                tf2d as f64,
                dist_max,
            ) as f32;
        });
}

/// Mark every voxel covered by the secondary as covered in the output map.
/// Returns the number of voxels that became covered.
pub fn update_coverage(coverage: &mut ArrayD<f32>, secondary_mask: &ArrayD<f32>) -> usize {
    let mut newly_covered = 0;
    Zip::from(coverage)
        .and(secondary_mask)
        .for_each(|covered, &secondary| {
            if secondary != 0.0 {
                if *covered == 0.0 {
                    newly_covered += 1;
                }
                *covered = 1.0;
            }
        });
    newly_covered
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, BlendPolicy::Overwrite)]
    #[case(true, false, BlendPolicy::Average)]
    #[case(false, true, BlendPolicy::Weighted)]
    #[case(true, true, BlendPolicy::Weighted)]
    fn test_from_flags(#[case] average: bool, #[case] weighted: bool, #[case] expected: BlendPolicy) {
        assert_eq!(BlendPolicy::from_flags(average, weighted), expected);
    }

    #[rstest]
    // Overwrite
    #[case(BlendPolicy::Overwrite, 1.0, 1.0, 2.0, 1.0, 2.0)]
    #[case(BlendPolicy::Overwrite, 1.0, 0.0, 2.0, 1.0, 2.0)]
    #[case(BlendPolicy::Overwrite, 1.0, 1.0, 2.0, 0.0, 1.0)]
    // Average
    #[case(BlendPolicy::Average, 10.0, 3.0, 20.0, 1.0, 15.0)]
    #[case(BlendPolicy::Average, 10.0, 0.0, 20.0, 1.0, 20.0)]
    #[case(BlendPolicy::Average, 10.0, 3.0, 20.0, 0.0, 10.0)]
    #[case(BlendPolicy::Average, 10.0, 0.0, 20.0, 0.0, 10.0)]
    // Weighted, output claim stronger: ratio = 0.5 * 1 / 4
    #[case(BlendPolicy::Weighted, 10.0, 3.0, 20.0, 1.0, 11.25)]
    // Weighted, secondary claim stronger: ratio = 0.5 * 4 / 4
    #[case(BlendPolicy::Weighted, 10.0, 1.0, 20.0, 4.0, 15.0)]
    #[case(BlendPolicy::Weighted, 10.0, 3.0, 20.0, 0.0, 10.0)]
    fn test_blend_voxel(
        #[case] policy: BlendPolicy,
        #[case] tf1: f64,
        #[case] tf1d: f64,
        #[case] tf2: f64,
        #[case] tf2d: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(blend_voxel(policy, tf1, tf1d, tf2, tf2d, 4.0), expected);
    }

    #[test]
    fn test_weighted_keeps_output_for_secondary_only_voxels() {
        // Only the secondary covers this voxel; weighted blending leaves the
        // background in place where average would take the secondary value.
        let weighted = blend_voxel(BlendPolicy::Weighted, 0.0, 0.0, 20.0, 2.0, 4.0);
        let average = blend_voxel(BlendPolicy::Average, 0.0, 0.0, 20.0, 2.0, 4.0);
        assert_eq!(weighted, 0.0);
        assert_eq!(average, 20.0);
    }

    #[rstest]
    #[case(10.0, 20.0)]
    #[case(-3.0, 7.5)]
    fn test_weighted_equal_distances_is_symmetric(#[case] tf1: f64, #[case] tf2: f64) {
        // Equal distances at the maximum give ratio 0.5 on either branch
        let forward = blend_voxel(BlendPolicy::Weighted, tf1, 2.0, tf2, 2.0, 2.0);
        let swapped = blend_voxel(BlendPolicy::Weighted, tf2, 2.0, tf1, 2.0, 2.0);
        assert_eq!(forward, (tf1 + tf2) / 2.0);
        assert_eq!(forward, swapped);
    }

    #[test]
    fn test_average_constant_volumes() {
        let shape = IxDyn(&[4, 4, 4]);
        let mut output = ArrayD::from_elem(shape.clone(), 10.0_f32);
        let distance = ArrayD::from_elem(shape.clone(), 1.0_f32);
        let secondary = ArrayD::from_elem(shape, 20.0_f32);
        blend_volume(
            BlendPolicy::Average,
            &mut output,
            &distance,
            &secondary,
            &distance,
            1.0,
        );
        assert!(output.iter().all(|&v| v == 15.0));
    }

    #[test]
    fn test_update_coverage() {
        let mut coverage = ArrayD::from_shape_vec(IxDyn(&[4]), vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let mask = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(update_coverage(&mut coverage, &mask), 1);
        assert_eq!(coverage.as_slice().unwrap(), &[1.0, 1.0, 0.0, 1.0]);
    }
}
