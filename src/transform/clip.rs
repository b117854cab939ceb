use crate::transform::Transform;
use crate::volume::Volume;

/// Intensity window applied to Hounsfield units before saving.
pub const DEFAULT_CT_RANGE: (f32, f32) = (-1024.0, 3071.0);
/// Labels are stored as binary masks.
pub const DEFAULT_LABEL_RANGE: (f32, f32) = (0.0, 1.0);

/// Clamps every voxel into `[min, max]`. NaN voxels become `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub min: f32,
    pub max: f32,
}

impl Clip {
    pub fn new(min: f32, max: f32) -> Self {
        debug_assert!(min <= max, "clip range is empty");
        Self { min, max }
    }

    pub fn ct() -> Self {
        Self::new(DEFAULT_CT_RANGE.0, DEFAULT_CT_RANGE.1)
    }

    pub fn label() -> Self {
        Self::new(DEFAULT_LABEL_RANGE.0, DEFAULT_LABEL_RANGE.1)
    }

    #[inline]
    pub fn clip_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

impl From<(f32, f32)> for Clip {
    fn from((min, max): (f32, f32)) -> Self {
        Self::new(min, max)
    }
}

impl Transform<Volume> for Clip {
    fn apply(&self, volume: &Volume) -> Volume {
        Volume::new(
            volume.data.mapv(|v| self.clip_value(v)),
            volume.geometry.clone(),
        )
        .with_pixel_type(volume.pixel_type)
    }
}
