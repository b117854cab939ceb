use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use snafu::ResultExt;
use std::path::Path;

use crate::errors::nifti::{IOSnafu, WriteSnafu};
use crate::errors::NiftiError;
use crate::volume::{Geometry, PixelType, Volume};

/// NIfTI `xyzt_units` code for millimetres.
const UNITS_MM: u8 = 2;
/// NIfTI `sform_code` for scanner-based anatomical coordinates.
const SFORM_SCANNER_ANAT: i16 = 1;

/// Writes volumes as NIfTI-1 in their [`PixelType`]. Integer types are rounded
/// and saturated. Paths ending in `.gz` are compressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NiftiSaver;

impl NiftiSaver {
    pub fn new() -> Self {
        Self
    }

    pub fn save<P: AsRef<Path>>(&self, volume: &Volume, path: P) -> Result<(), NiftiError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(IOSnafu { path: parent })?;
        }
        let header = header_for(&volume.geometry);
        let writer = WriterOptions::new(path).reference_header(&header);
        // Stored as [z, y, x], NIfTI expects [x, y, z]
        let data = volume.data.view().reversed_axes();
        match volume.pixel_type {
            PixelType::Uint8 => writer.write_nifti(&data.mapv(|v| v.round() as u8)),
            PixelType::Int8 => writer.write_nifti(&data.mapv(|v| v.round() as i8)),
            PixelType::Uint16 => writer.write_nifti(&data.mapv(|v| v.round() as u16)),
            PixelType::Int16 => writer.write_nifti(&data.mapv(|v| v.round() as i16)),
            PixelType::Uint32 => writer.write_nifti(&data.mapv(|v| v.round() as u32)),
            PixelType::Int32 => writer.write_nifti(&data.mapv(|v| v.round() as i32)),
            PixelType::Uint64 => writer.write_nifti(&data.mapv(|v| v.round() as u64)),
            PixelType::Int64 => writer.write_nifti(&data.mapv(|v| v.round() as i64)),
            PixelType::Float32 => writer.write_nifti(&data),
            PixelType::Float64 => writer.write_nifti(&data.mapv(f64::from)),
        }
        .context(WriteSnafu { path })?;
        tracing::debug!("Wrote {} as {}", path.display(), volume.pixel_type);
        Ok(())
    }
}

/// Builds a header whose sform maps voxel indices to RAS millimetres.
pub fn header_for(geometry: &Geometry) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim = [
        1.0,
        geometry.spacing[0] as f32,
        geometry.spacing[1] as f32,
        geometry.spacing[2] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    header.xyzt_units = UNITS_MM;
    header.qform_code = 0;
    header.sform_code = SFORM_SCANNER_ANAT;

    let mut rows = [[0f32; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        // LPS -> RAS flips the first two axes
        let sign = if r < 2 { -1.0 } else { 1.0 };
        for c in 0..3 {
            row[c] = (sign * geometry.direction[(r, c)] * geometry.spacing[c]) as f32;
        }
        row[3] = (sign * geometry.origin[r]) as f32;
    }
    header.srow_x = rows[0];
    header.srow_y = rows[1];
    header.srow_z = rows[2];
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_for() {
        let geometry = Geometry::new([4, 5, 6], [0.5, 0.75, 2.0], [10.0, -20.0, 30.0]);
        let header = header_for(&geometry);
        assert_eq!(&header.pixdim[1..4], &[0.5, 0.75, 2.0]);
        assert_eq!(header.sform_code, 1);
        assert_eq!(header.qform_code, 0);
        assert_eq!(header.srow_x, [-0.5, 0.0, 0.0, -10.0]);
        assert_eq!(header.srow_y, [0.0, -0.75, 0.0, 20.0]);
        assert_eq!(header.srow_z, [0.0, 0.0, 2.0, 30.0]);
    }
}
