use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Axis};
use rayon::prelude::*;
use std::fmt;

use crate::transform::Transform;
use crate::volume::{Geometry, Volume};

/// Fill value for label voxels that fall outside the source volume.
pub const DEFAULT_LABEL_FILL: f32 = 0.0;
/// Fill value for CT voxels that fall outside the source volume (air).
pub const DEFAULT_CT_FILL: f32 = -1024.0;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Interpolator {
    NearestNeighbor,
    #[default]
    Linear,
}

impl Interpolator {
    /// Labels must keep their discrete values.
    pub fn for_label(is_label: bool) -> Self {
        if is_label {
            Interpolator::NearestNeighbor
        } else {
            Interpolator::Linear
        }
    }
}

impl fmt::Display for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interpolator_str = match self {
            Interpolator::NearestNeighbor => "nearest-neighbor",
            Interpolator::Linear => "linear",
        };
        write!(f, "{interpolator_str}")
    }
}

/// Resamples a volume onto a target grid through the identity transform in
/// physical space.
#[derive(Debug, Clone, PartialEq)]
pub struct Resample {
    pub geometry: Geometry,
    pub interpolator: Interpolator,
    pub default_value: f32,
}

impl Resample {
    /// Resample onto the grid of a reference volume.
    pub fn to_reference(
        reference: &Geometry,
        interpolator: Interpolator,
        default_value: f32,
    ) -> Self {
        Self {
            geometry: reference.clone(),
            interpolator,
            default_value,
        }
    }

    /// Resample to a new voxel spacing while covering the same physical extent.
    pub fn to_spacing(
        input: &Geometry,
        spacing: [f64; 3],
        interpolator: Interpolator,
        default_value: f32,
    ) -> Self {
        let size = std::array::from_fn(|i| {
            ((input.size[i] as f64 * input.spacing[i] / spacing[i]).round() as usize).max(1)
        });
        Self {
            geometry: Geometry {
                size,
                spacing,
                origin: input.origin,
                direction: input.direction,
            },
            interpolator,
            default_value,
        }
    }

    /// Affine map from output voxel indices to continuous input indices.
    fn index_map(&self, input: &Geometry) -> Option<(Matrix3<f64>, Vector3<f64>)> {
        let inverse = input.direction.try_inverse()?;
        let to_input = Matrix3::from_diagonal(&Vector3::from(input.spacing.map(|s| 1.0 / s)))
            * inverse;
        let from_output =
            self.geometry.direction * Matrix3::from_diagonal(&Vector3::from(self.geometry.spacing));
        let offset = Vector3::from(self.geometry.origin) - Vector3::from(input.origin);
        Some((to_input * from_output, to_input * offset))
    }
}

impl Transform<Volume> for Resample {
    fn apply(&self, volume: &Volume) -> Volume {
        let mut output = Volume::filled(self.geometry.clone(), self.default_value)
            .with_pixel_type(volume.pixel_type);
        let input = &volume.geometry;
        let (linear, offset) = match self.index_map(input) {
            Some(map) if input.numel() > 0 => map,
            _ => {
                tracing::warn!("Cannot resample from degenerate grid\n{}", input);
                return output;
            }
        };

        output
            .data
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, mut plane)| {
                for ((y, x), voxel) in plane.indexed_iter_mut() {
                    let index = linear * Vector3::new(x as f64, y as f64, z as f64) + offset;
                    let value = match self.interpolator {
                        Interpolator::NearestNeighbor => {
                            sample_nearest(&volume.data, &input.size, &index)
                        }
                        Interpolator::Linear => sample_linear(&volume.data, &input.size, &index),
                    };
                    if let Some(value) = value {
                        *voxel = value;
                    }
                }
            });
        output
    }
}

/// Nearest voxel, rounding half indices up. `None` outside the grid.
fn sample_nearest(data: &Array3<f32>, size: &[usize; 3], index: &Vector3<f64>) -> Option<f32> {
    let mut voxel = [0usize; 3];
    for d in 0..3 {
        let rounded = (index[d] + 0.5).floor();
        if rounded < 0.0 || rounded >= size[d] as f64 {
            return None;
        }
        voxel[d] = rounded as usize;
    }
    Some(data[[voxel[2], voxel[1], voxel[0]]])
}

/// Trilinear interpolation. Points within half a voxel of the border are
/// clamped to the edge. `None` outside `[-0.5, n - 0.5)`, as for nearest.
fn sample_linear(data: &Array3<f32>, size: &[usize; 3], index: &Vector3<f64>) -> Option<f32> {
    let mut lower = [0usize; 3];
    let mut upper = [0usize; 3];
    let mut frac = [0f64; 3];
    for d in 0..3 {
        let n = size[d] as f64;
        if index[d] < -0.5 || index[d] >= n - 0.5 {
            return None;
        }
        let clamped = index[d].clamp(0.0, n - 1.0);
        let floor = clamped.floor();
        lower[d] = floor as usize;
        upper[d] = (lower[d] + 1).min(size[d] - 1);
        frac[d] = clamped - floor;
    }

    let mut value = 0f64;
    for corner in 0..8 {
        let mut weight = 1f64;
        let mut voxel = [0usize; 3];
        for d in 0..3 {
            if (corner >> d) & 1 == 1 {
                weight *= frac[d];
                voxel[d] = upper[d];
            } else {
                weight *= 1.0 - frac[d];
                voxel[d] = lower[d];
            }
        }
        if weight > 0.0 {
            value += weight * data[[voxel[2], voxel[1], voxel[0]]] as f64;
        }
    }
    Some(value as f32)
}
