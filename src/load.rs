use nalgebra::{Matrix3, Vector3};
use ndarray::Ix3;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use snafu::{OptionExt, ResultExt};
use std::path::Path;

use crate::errors::nifti::{ReadSnafu, UnsupportedDataTypeSnafu};
use crate::errors::NiftiError;
use crate::volume::{Geometry, PixelType, Volume};

/// Read a 3D NIfTI file into a [`Volume`] in LPS coordinates.
pub fn load_nifti<P: AsRef<Path>>(path: P) -> Result<Volume, NiftiError> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .context(ReadSnafu { path })?;
    let header = obj.header().clone();
    let datatype = header.data_type().context(ReadSnafu { path })?;
    let pixel_type = PixelType::from_nifti(datatype).context(UnsupportedDataTypeSnafu {
        path,
        datatype: header.datatype,
    })?;
    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context(ReadSnafu { path })?;

    let ndim = array.ndim();
    let array = array
        .into_dimensionality::<Ix3>()
        .map_err(|_| NiftiError::DimensionError {
            path: path.to_path_buf(),
            ndim,
        })?;
    let (nx, ny, nz) = array.dim();
    let data = array.reversed_axes().as_standard_layout().into_owned();

    let geometry = geometry_from_header(&header, [nx, ny, nz]);
    Ok(Volume::new(data, geometry).with_pixel_type(pixel_type))
}

/// Uses the sform when set, else only the voxel spacing.
pub fn geometry_from_header(header: &NiftiHeader, size: [usize; 3]) -> Geometry {
    let pixdim = [
        header.pixdim[1].abs() as f64,
        header.pixdim[2].abs() as f64,
        header.pixdim[3].abs() as f64,
    ];
    let spacing = pixdim.map(|s| if s > 0.0 { s } else { 1.0 });
    if header.sform_code <= 0 {
        return Geometry::new(size, spacing, [0.0; 3]);
    }

    // RAS -> LPS
    let rows = [
        header.srow_x.map(|v| -(v as f64)),
        header.srow_y.map(|v| -(v as f64)),
        header.srow_z.map(|v| v as f64),
    ];
    let mut direction = Matrix3::identity();
    let mut spacing = spacing;
    for c in 0..3 {
        let column = Vector3::new(rows[0][c], rows[1][c], rows[2][c]);
        let norm = column.norm();
        if norm > 0.0 {
            spacing[c] = norm;
            direction.set_column(c, &(column / norm));
        }
    }
    Geometry {
        size,
        spacing,
        origin: [rows[0][3], rows[1][3], rows[2][3]],
        direction,
    }
}
